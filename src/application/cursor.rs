//! Paged row cursor over a group

use std::collections::VecDeque;

use tracing::trace;

use crate::domain::{CursorKey, GroupId, NodeOrder, NodeRow};
use crate::infrastructure::traits::NodeStore;
use crate::infrastructure::InfraResult;

/// Lazy row stream holding at most one page in memory.
///
/// Pages are fetched with keyset pagination on `(order column, id)`, so rows
/// are neither skipped nor repeated while paging an unchanged group.
pub struct NodeCursor<'a> {
    store: &'a dyn NodeStore,
    group: GroupId,
    order: NodeOrder,
    page_size: usize,
    after: Option<CursorKey>,
    buffer: VecDeque<NodeRow>,
    exhausted: bool,
}

impl<'a> NodeCursor<'a> {
    pub fn new(store: &'a dyn NodeStore, group: GroupId, order: NodeOrder, page_size: usize) -> Self {
        Self {
            store,
            group,
            order,
            page_size: page_size.max(1),
            after: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn fetch(&mut self) -> InfraResult<()> {
        let page = self
            .store
            .page(self.group, self.order, self.after, self.page_size)?;
        trace!(group = self.group, rows = page.len(), "fetched page");
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.after = Some(self.order.key_of(last));
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl Iterator for NodeCursor<'_> {
    type Item = InfraResult<NodeRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
