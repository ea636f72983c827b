use std::collections::{HashMap, HashSet};

use generational_arena::{Arena, Index};
use termtree::Tree;
use tracing::instrument;

use crate::domain::node::{NestedSetNode, NodeId, NodeRow};
use crate::domain::walk::{SlotCounter, WalkEvent};

/// Tree node in the arena-based hierarchy structure.
#[derive(Debug)]
pub struct TreeNode {
    /// Stored row of this node
    pub row: NodeRow,
    /// Index of parent node in the arena, None for roots and orphans
    pub parent: Option<Index>,
    /// Indices of child nodes in the arena, ordered by stored left
    pub children: Vec<Index>,
}

/// Arena-based tree of one group, built from its rows.
///
/// Links follow `parent_id`, not the stored left/right, so a corrupt group
/// still yields the tree its parent pointers imply.
#[derive(Debug)]
pub struct TreeArena {
    arena: Arena<TreeNode>,
    /// First root by (left, id)
    root: Option<Index>,
    /// Further nodes claiming the root sentinel
    extra_roots: Vec<Index>,
    /// Nodes whose parent id resolves to no row of the group
    orphans: Vec<Index>,
    by_id: HashMap<NodeId, Index>,
    /// Insertion order, i.e. the order rows were supplied in
    order: Vec<Index>,
}

impl Default for TreeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeArena {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            root: None,
            extra_roots: Vec::new(),
            orphans: Vec::new(),
            by_id: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Build from rows of one group; rows should arrive ordered by left.
    #[instrument(level = "debug", skip(rows))]
    pub fn from_rows(rows: impl IntoIterator<Item = NodeRow>) -> Self {
        let mut tree = Self::new();
        for row in rows {
            let id = row.id;
            let idx = tree.arena.insert(TreeNode {
                row,
                parent: None,
                children: Vec::new(),
            });
            tree.by_id.insert(id, idx);
            tree.order.push(idx);
        }

        let mut roots: Vec<Index> = Vec::new();
        for pos in 0..tree.order.len() {
            let idx = tree.order[pos];
            let Some(node) = tree.arena.get(idx) else {
                continue;
            };
            if node.row.is_root() {
                roots.push(idx);
                continue;
            }
            match tree.by_id.get(&node.row.parent_id).copied() {
                Some(parent_idx) => tree.link(idx, parent_idx),
                None => tree.orphans.push(idx),
            }
        }

        roots.sort_by_key(|&idx| tree.sort_key(idx));
        let mut roots = roots.into_iter();
        tree.root = roots.next();
        tree.extra_roots = roots.collect();

        let order = tree.order.clone();
        for idx in order {
            let mut children = match tree.arena.get(idx) {
                Some(node) => node.children.clone(),
                None => continue,
            };
            children.sort_by_key(|&child| tree.sort_key(child));
            if let Some(node) = tree.arena.get_mut(idx) {
                node.children = children;
            }
        }
        tree
    }

    fn link(&mut self, child: Index, parent: Index) {
        if let Some(node) = self.arena.get_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.arena.get_mut(parent) {
            node.children.push(child);
        }
    }

    fn sort_key(&self, idx: Index) -> (i64, NodeId) {
        self.arena
            .get(idx)
            .map(|n| (n.row.left, n.row.id))
            .unwrap_or((i64::MAX, NodeId::MAX))
    }

    #[instrument(level = "trace", skip(self))]
    pub fn get_node(&self, idx: Index) -> Option<&TreeNode> {
        self.arena.get(idx)
    }

    pub fn index_of(&self, id: NodeId) -> Option<Index> {
        self.by_id.get(&id).copied()
    }

    pub fn root(&self) -> Option<Index> {
        self.root
    }

    pub fn extra_roots(&self) -> &[Index] {
        &self.extra_roots
    }

    pub fn orphans(&self) -> &[Index] {
        &self.orphans
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn iter(&self) -> TreeIterator {
        TreeIterator::new(self, self.root)
    }

    /// Number of levels below and including the root; 0 for an empty tree.
    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self) -> usize {
        let Some(root) = self.root else {
            return 0;
        };
        let mut deepest = 0;
        let mut stack = vec![(root, 1usize)];
        while let Some((idx, level)) = stack.pop() {
            deepest = deepest.max(level);
            if let Some(node) = self.get_node(idx) {
                stack.extend(node.children.iter().map(|&c| (c, level + 1)));
            }
        }
        deepest
    }

    pub fn leaf_nodes(&self) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, node)| node.children.is_empty())
            .map(|(_, node)| node.row.id)
            .collect()
    }

    /// Members of parent cycles that no top-level node reaches.
    ///
    /// One node per cycle is returned: the cycle member with the lowest
    /// (left, id). Result is ordered by (left, id).
    #[instrument(level = "debug", skip(self))]
    pub fn cycle_tops(&self) -> Vec<Index> {
        let mut reached: HashSet<Index> = HashSet::new();
        let tops = self
            .root
            .iter()
            .chain(self.extra_roots.iter())
            .chain(self.orphans.iter())
            .copied();
        for top in tops {
            self.mark_reachable(top, &mut reached);
        }

        let mut cycle_tops = Vec::new();
        for &idx in &self.order {
            if reached.contains(&idx) {
                continue;
            }
            let mut path: Vec<Index> = Vec::new();
            let mut seen: HashSet<Index> = HashSet::new();
            let mut current = Some(idx);
            while let Some(cur) = current {
                if !seen.insert(cur) {
                    break;
                }
                path.push(cur);
                current = self.get_node(cur).and_then(|n| n.parent);
            }
            // an unreached node always ends in a cycle; its first repeat starts it
            let cycle_start = current
                .and_then(|repeat| path.iter().position(|&p| p == repeat))
                .unwrap_or(0);
            let top = path[cycle_start..]
                .iter()
                .copied()
                .min_by_key(|&p| self.sort_key(p))
                .unwrap_or(idx);
            self.mark_reachable(top, &mut reached);
            cycle_tops.push(top);
        }
        cycle_tops.sort_by_key(|&idx| self.sort_key(idx));
        cycle_tops
    }

    fn mark_reachable(&self, start: Index, reached: &mut HashSet<Index>) {
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            if !reached.insert(idx) {
                continue;
            }
            if let Some(node) = self.get_node(idx) {
                stack.extend(node.children.iter().copied());
            }
        }
    }

    /// Stack-based depth-first walk below `start`, numbering slots from 1.
    pub fn walk(&self, start: Index, mut visit: impl FnMut(WalkEvent)) -> usize {
        let mut counter = SlotCounter::default();
        let mut visited = 0;
        let mut stack: Vec<(Index, i64, bool)> = vec![(start, 0, false)];
        while let Some((idx, depth, entered)) = stack.pop() {
            let Some(node) = self.get_node(idx) else {
                continue;
            };
            if entered {
                visit(WalkEvent::Leave {
                    id: node.row.id,
                    right: counter.next(),
                });
                continue;
            }
            visit(WalkEvent::Enter {
                id: node.row.id,
                left: counter.next(),
                depth,
            });
            visited += 1;
            stack.push((idx, depth, true));
            for &child in node.children.iter().rev() {
                stack.push((child, depth + 1, false));
            }
        }
        visited
    }

    /// Render the subtree below `start` for terminal display.
    pub fn subtree_string(&self, start: Index) -> Tree<String> {
        fn build(arena: &TreeArena, idx: Index, seen: &mut HashSet<Index>) -> Tree<String> {
            let label = arena
                .get_node(idx)
                .map(|n| n.row.to_string())
                .unwrap_or_default();
            let mut tree = Tree::new(label);
            if !seen.insert(idx) {
                return tree;
            }
            if let Some(node) = arena.get_node(idx) {
                for &child in &node.children {
                    tree.push(build(arena, child, seen));
                }
            }
            tree
        }
        build(self, start, &mut HashSet::new())
    }
}

pub trait TreeNodeConvert {
    fn to_tree_string(&self) -> Tree<String>;
}

impl TreeNodeConvert for TreeArena {
    fn to_tree_string(&self) -> Tree<String> {
        match self.root {
            Some(root) => self.subtree_string(root),
            None => Tree::new("Empty tree".to_string()),
        }
    }
}

pub struct TreeIterator<'a> {
    arena: &'a TreeArena,
    stack: Vec<Index>,
}

impl<'a> TreeIterator<'a> {
    fn new(arena: &'a TreeArena, start: Option<Index>) -> Self {
        Self {
            arena,
            stack: start.into_iter().collect(),
        }
    }
}

impl<'a> Iterator for TreeIterator<'a> {
    type Item = (Index, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        let current_idx = self.stack.pop()?;
        let node = self.arena.get_node(current_idx)?;
        // Push children in reverse order for left-to-right traversal
        for &child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some((current_idx, node))
    }
}
