//! Indexed nesting state behind [`NestedString::nest_by_all_with_chunk`]
//!
//! Tokens are kept in arrival slots with their resolved child lists, so
//! placing a token is a few map lookups instead of rescans of the string.
//! Top-level blocks are grouped by the (absent) parent they wait for; a group
//! is collected in one piece when that parent arrives.
//!
//! [`NestedString::nest_by_all_with_chunk`]: super::NestedString::nest_by_all_with_chunk

use std::collections::HashMap;

use tracing::trace;

use crate::domain::codec::token::Token;
use crate::domain::node::NodeId;

#[derive(Debug, Default)]
pub(super) struct Forest {
    tokens: Vec<Token>,
    slot_of: HashMap<NodeId, usize>,
    nested: Vec<bool>,
    children: Vec<Vec<usize>>,
    // union-find over slots; `top` is only meaningful at a set representative
    link: Vec<usize>,
    top: Vec<usize>,
    // absent parent id -> (creation sequence, top-level slots in arrival order)
    waiting: HashMap<NodeId, (usize, Vec<usize>)>,
    next_group: usize,
}

impl Forest {
    pub(super) fn with_capacity(n: usize) -> Self {
        Self {
            tokens: Vec::with_capacity(n),
            slot_of: HashMap::with_capacity(n),
            nested: Vec::with_capacity(n),
            children: Vec::with_capacity(n),
            link: Vec::with_capacity(n),
            top: Vec::with_capacity(n),
            ..Self::default()
        }
    }

    /// Place one token: adopt the blocks waiting for it, then hang it under
    /// its parent unless the parent is absent or already inside its block.
    pub(super) fn place(&mut self, token: Token) {
        if self.slot_of.contains_key(&token.id) {
            trace!(%token, "duplicate token skipped");
            return;
        }
        let slot = self.tokens.len();
        self.tokens.push(token);
        self.slot_of.insert(token.id, slot);
        self.nested.push(false);
        self.children.push(Vec::new());
        self.link.push(slot);
        self.top.push(slot);

        if let Some((_, waiting)) = self.waiting.remove(&token.id) {
            trace!(%token, children = waiting.len(), "nesting collected children");
            for child in waiting {
                self.nested[child] = true;
                let rep = self.find(child);
                self.link[rep] = slot;
                self.children[slot].push(child);
            }
        }

        let parent_slot = match self.slot_of.get(&token.parent).copied() {
            Some(p) if token.parent != token.id && self.top_of(p) != slot => Some(p),
            _ => None,
        };
        match parent_slot {
            Some(p) => {
                self.nested[slot] = true;
                self.children[p].push(slot);
                let rep = self.find(slot);
                let parent_rep = self.find(p);
                self.link[rep] = parent_rep;
            }
            None => {
                let seq = self.next_group;
                let group = self
                    .waiting
                    .entry(token.parent)
                    .or_insert_with(|| (seq, Vec::new()));
                if group.0 == seq {
                    self.next_group += 1;
                }
                group.1.push(slot);
            }
        }
    }

    /// Serialize top-level groups in creation order, each block depth-first.
    pub(super) fn write_into(&self, out: &mut String) {
        let mut groups: Vec<&(usize, Vec<usize>)> = self.waiting.values().collect();
        groups.sort_unstable_by_key(|(seq, _)| *seq);
        let mut stack: Vec<usize> = Vec::new();
        for (_, members) in groups {
            for &member in members {
                stack.push(member);
                while let Some(slot) = stack.pop() {
                    let token = if self.nested[slot] {
                        self.tokens[slot].nested()
                    } else {
                        self.tokens[slot].missing()
                    };
                    out.push_str(&token.to_string());
                    stack.extend(self.children[slot].iter().rev());
                }
            }
        }
    }

    fn find(&mut self, mut slot: usize) -> usize {
        while self.link[slot] != slot {
            self.link[slot] = self.link[self.link[slot]];
            slot = self.link[slot];
        }
        slot
    }

    fn top_of(&mut self, slot: usize) -> usize {
        let rep = self.find(slot);
        self.top[rep]
    }
}
