//! `NestedString`: a whole group encoded as one token string
//!
//! Structural queries are positional scans over the string, so a group can be
//! re-nested without building an object graph. A string is "fully nested"
//! when every token whose parent is present directly follows its parent's
//! block; the tokens left unresolved are the missing ones.

use std::collections::HashSet;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, instrument};

use crate::domain::codec::forest::Forest;
use crate::domain::codec::token::{self, LeftRight, Slot, Token, BLANK_TOKEN};
use crate::domain::error::DomainError;
use crate::domain::node::{NodeId, ROOT_SENTINEL};
use crate::domain::walk::{SlotCounter, WalkEvent};

/// Default chunk size of [`NestedString::nest_by_all_with_chunk`].
pub const DEFAULT_CHUNK_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedString {
    string: String,
    lr_string: String,
    root_value: NodeId,
}

impl Default for NestedString {
    fn default() -> Self {
        Self::new()
    }
}

impl NestedString {
    pub fn new() -> Self {
        Self::with_root_value(ROOT_SENTINEL)
    }

    pub fn with_root_value(root_value: NodeId) -> Self {
        Self {
            string: String::new(),
            lr_string: String::new(),
            root_value,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.string
    }

    pub fn root_value(&self) -> NodeId {
        self.root_value
    }

    pub fn tokens(&self) -> impl Iterator<Item = Token> + '_ {
        token::tokens(&self.string)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens().next().is_none()
    }

    // ==== building ====

    pub fn push_node(&mut self, id: NodeId, parent: NodeId) {
        self.push(Token::new(id, parent));
    }

    pub fn push(&mut self, token: Token) {
        self.string.push_str(&token.to_string());
    }

    pub fn push_left_right(&mut self, id: NodeId, left: i64, right: i64) {
        self.lr_string
            .push_str(&LeftRight { id, left, right }.to_string());
    }

    pub fn append(&mut self, nodes: &str) {
        self.string.push_str(nodes);
    }

    pub fn prepend(&mut self, nodes: &str) {
        self.string.insert_str(0, nodes);
    }

    // ==== lookups ====

    pub fn find(&self, id: NodeId) -> Option<Token> {
        self.tokens().find(|t| t.id == id)
    }

    fn position(&self, id: NodeId) -> Option<Range<usize>> {
        token::slots(&self.string).find_map(|(range, slot)| match slot {
            Slot::Node(t) if t.id == id => Some(range),
            _ => None,
        })
    }

    /// First token whose parent is the root sentinel.
    pub fn find_root(&self) -> Option<Token> {
        self.tokens().find(|t| t.parent == self.root_value)
    }

    pub fn find_roots(&self) -> Vec<Token> {
        self.tokens().filter(|t| t.parent == self.root_value).collect()
    }

    /// Direct-child tokens of `parent_id`, in string order.
    pub fn find_children(&self, parent_id: NodeId) -> Vec<Token> {
        self.tokens()
            .filter(|t| t.parent == parent_id && t.id != parent_id)
            .collect()
    }

    /// Direct children of `parent_id` concatenated, chunk by chunk.
    pub fn find_children_string(&self, parent_id: NodeId) -> Option<String> {
        let children: String = self
            .find_children(parent_id)
            .iter()
            .map(Token::to_string)
            .collect();
        (!children.is_empty()).then_some(children)
    }

    /// Byte range of the block starting at `id`: the token plus every
    /// following token that descends from it. Stops at `stop_id`.
    fn block_range(&self, id: NodeId, stop_id: NodeId) -> Option<Range<usize>> {
        let mut members: HashSet<NodeId> = HashSet::new();
        let mut block: Option<Range<usize>> = None;
        for (range, slot) in token::slots(&self.string) {
            let Slot::Node(t) = slot else {
                continue;
            };
            match block.as_mut() {
                None if t.id == id => {
                    members.insert(id);
                    block = Some(range);
                }
                None => {}
                Some(current) => {
                    if t.id == stop_id || !members.contains(&t.parent) {
                        break;
                    }
                    members.insert(t.id);
                    current.end = range.end;
                }
            }
        }
        block
    }

    /// The token of `id` followed by its nested descendants.
    pub fn find_block(&self, id: NodeId) -> Option<String> {
        self.block_range(id, id)
            .map(|range| self.string[range].to_string())
    }

    /// Every direct-child block of `parent_id`, concatenated in string order.
    pub fn find_nested_children(&self, parent_id: NodeId) -> Option<String> {
        let mut out = String::new();
        let mut covered_until = 0;
        for child in self.find_children(parent_id) {
            let Some(range) = self.block_range(child.id, parent_id) else {
                continue;
            };
            if range.start < covered_until {
                continue;
            }
            covered_until = range.end;
            out.push_str(&self.string[range]);
        }
        (!out.is_empty()).then_some(out)
    }

    /// Tokens still carrying the unresolved sign, root included.
    pub fn find_missing(&self) -> Vec<Token> {
        self.tokens().filter(Token::is_missing).collect()
    }

    pub fn find_missing_and_root(&self) -> (Vec<Token>, Option<Token>) {
        let root = self.find_root();
        let missing = self
            .find_missing()
            .into_iter()
            .filter(|t| Some(t.id) != root.map(|r| r.id))
            .collect();
        (missing, root)
    }

    pub fn find_missing_without_root(&self) -> Vec<Token> {
        self.find_missing_and_root().0
    }

    /// Number of slots, blanks included.
    pub fn count(&self) -> usize {
        token::slots(&self.string).count()
    }

    pub fn node_count(&self) -> usize {
        self.tokens().count()
    }

    pub fn get_by_index(&self, index: usize) -> Option<Slot> {
        token::slots(&self.string).nth(index).map(|(_, slot)| slot)
    }

    pub fn get_left_right(&self, id: NodeId) -> Option<(i64, i64)> {
        self.left_rights()
            .find(|lr| lr.id == id)
            .map(|lr| (lr.left, lr.right))
    }

    /// Entries of the left/right stream in the order they were pushed.
    pub fn left_rights(&self) -> impl Iterator<Item = LeftRight> + '_ {
        self.lr_string
            .split_terminator('>')
            .filter_map(|part| part.strip_prefix('<'))
            .filter_map(LeftRight::parse_body)
    }

    // ==== edits ====

    /// Remove every token whose id occurs in `nodes`.
    pub fn delete_nodes(&mut self, nodes: &str) {
        let ids: HashSet<NodeId> = token::tokens(nodes).map(|t| t.id).collect();
        self.blank_ids(&ids);
        self.delete_temp();
    }

    /// Replace the tokens of `ids` with blanks; slot positions stay stable.
    pub fn blank_ids(&mut self, ids: &HashSet<NodeId>) {
        if ids.is_empty() {
            return;
        }
        let mut out = String::with_capacity(self.string.len());
        for (range, slot) in token::slots(&self.string) {
            match slot {
                Slot::Node(t) if ids.contains(&t.id) => out.push_str(BLANK_TOKEN),
                _ => out.push_str(&self.string[range]),
            }
        }
        self.string = out;
    }

    /// Drop every blanked slot.
    pub fn delete_temp(&mut self) {
        self.string = self.string.replace(BLANK_TOKEN, "");
    }

    pub fn change_parent(&mut self, id: NodeId, new_parent: NodeId) -> bool {
        let Some(range) = self.position(id) else {
            return false;
        };
        let Some(Slot::Node(t)) = token::slots(&self.string[range.clone()])
            .next()
            .map(|(_, slot)| slot)
        else {
            return false;
        };
        self.string
            .replace_range(range, &t.with_parent(new_parent).to_string());
        true
    }

    /// Re-point `id` to `new_parent` and move its whole block under it.
    #[instrument(level = "trace", skip(self))]
    pub fn change_parent_and_nest(&mut self, id: NodeId, new_parent: NodeId) -> bool {
        if !self.change_parent(id, new_parent) {
            return false;
        }
        match self.block_range(id, new_parent) {
            Some(range) => {
                let block = self.string[range].to_string();
                self.nest_for_parent(new_parent, &block)
            }
            None => false,
        }
    }

    /// Insert `children` right after the parent token, removing any earlier
    /// occurrence, and mark them nested. False when the parent is absent or
    /// part of `children`.
    pub fn nest_for_parent(&mut self, parent_id: NodeId, children: &str) -> bool {
        let ids: HashSet<NodeId> = token::tokens(children).map(|t| t.id).collect();
        if ids.contains(&parent_id) || self.find(parent_id).is_none() {
            return false;
        }
        self.blank_ids(&ids);
        self.delete_temp();
        let Some(range) = self.position(parent_id) else {
            return false;
        };
        self.string.insert_str(range.end, &mark_nested(children));
        true
    }

    // ==== chunked re-nesting ====

    /// Split into fresh strings of at most `size` tokens, consuming `self`.
    pub fn chunk_to_arrays(self, size: usize) -> Vec<NestedString> {
        let size = size.max(1);
        let mut chunks = Vec::new();
        let mut current = NestedString::with_root_value(self.root_value);
        let mut filled = 0;
        for token in self.tokens() {
            current.push(token);
            filled += 1;
            if filled == size {
                chunks.push(std::mem::replace(
                    &mut current,
                    NestedString::with_root_value(self.root_value),
                ));
                filled = 0;
            }
        }
        if filled > 0 {
            chunks.push(current);
        }
        chunks
    }

    /// Rebuild the set as a fully nested string, visiting tokens in their
    /// current order one chunk at a time.
    ///
    /// The left/right stream is carried over unchanged.
    #[instrument(level = "debug", skip(self), fields(nodes = self.node_count()))]
    pub fn nest_by_all_with_chunk(self, chunk_size: usize) -> NestedString {
        let mut out = NestedString::with_root_value(self.root_value);
        out.lr_string = self.lr_string.clone();
        let mut forest = Forest::with_capacity(self.node_count());
        let chunks = self.chunk_to_arrays(chunk_size);
        debug!(chunks = chunks.len(), "nesting token set");
        for chunk in chunks {
            for token in chunk.tokens() {
                forest.place(token);
            }
        }
        forest.write_into(&mut out.string);
        out
    }

    // ==== traversal ====

    /// Depth-first walk over the block of `root_id`, numbering slots from 1.
    ///
    /// Returns how many nodes were entered.
    pub fn walk(&self, root_id: NodeId, mut visit: impl FnMut(WalkEvent)) -> usize {
        let mut stack: Vec<NodeId> = Vec::new();
        let mut counter = SlotCounter::default();
        let mut visited = 0;
        let mut started = false;

        for t in self.tokens() {
            if !started {
                if t.id != root_id {
                    continue;
                }
                started = true;
            } else {
                while let Some(&top) = stack.last() {
                    if top == t.parent {
                        break;
                    }
                    stack.pop();
                    visit(WalkEvent::Leave {
                        id: top,
                        right: counter.next(),
                    });
                }
                if stack.is_empty() {
                    break;
                }
            }
            visit(WalkEvent::Enter {
                id: t.id,
                left: counter.next(),
                depth: stack.len() as i64,
            });
            stack.push(t.id);
            visited += 1;
        }
        while let Some(top) = stack.pop() {
            visit(WalkEvent::Leave {
                id: top,
                right: counter.next(),
            });
        }
        visited
    }
}

fn mark_nested(nodes: &str) -> String {
    token::tokens(nodes)
        .map(|t| t.nested().to_string())
        .collect()
}

impl fmt::Display for NestedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string)
    }
}

impl FromStr for NestedString {
    type Err = DomainError;

    /// Parse an externally supplied token string; every slot must be well formed.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN
            .get_or_init(|| Regex::new(r"^(?:<(?:[0-9]+[-=][0-9]+)?>)*$").expect("valid regex"));
        if !pattern.is_match(s) {
            return Err(DomainError::InvalidToken(s.to_string()));
        }
        Ok(Self {
            string: s.to_string(),
            lr_string: String::new(),
            root_value: ROOT_SENTINEL,
        })
    }
}
