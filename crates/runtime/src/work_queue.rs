use std::collections::BTreeMap;

use crate::budget::FrameBudget;

/// Handle of a queued item, valid until the item is popped or cancelled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkId(u64);

/// Returned by [`WorkQueue::try_push`] when the queue is at its limit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WorkQueueFull {
    pub max_len: usize,
}

impl std::fmt::Display for WorkQueueFull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "work queue full ({} pending)", self.max_len)
    }
}

impl std::error::Error for WorkQueueFull {}

/// Priority queue of pending loads.
///
/// Lower priority values pop first; equal priorities pop in insertion order.
/// Every item costs one unit of a [`FrameBudget`].
#[derive(Debug)]
pub struct WorkQueue<T> {
    next_seq: u64,
    order: BTreeMap<(i32, WorkId), T>,
    priorities: BTreeMap<WorkId, i32>,
    max_len: Option<usize>,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self {
            next_seq: 0,
            order: BTreeMap::new(),
            priorities: BTreeMap::new(),
            max_len: None,
        }
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn try_push(&mut self, priority: i32, payload: T) -> Result<WorkId, WorkQueueFull> {
        if let Some(max_len) = self.max_len
            && self.len() >= max_len
        {
            return Err(WorkQueueFull { max_len });
        }
        let id = WorkId(self.next_seq);
        self.next_seq += 1;
        self.order.insert((priority, id), payload);
        self.priorities.insert(id, priority);
        Ok(id)
    }

    /// Removes a queued item; `None` once it was popped or cancelled.
    pub fn cancel(&mut self, id: WorkId) -> Option<T> {
        let priority = self.priorities.remove(&id)?;
        self.order.remove(&(priority, id))
    }

    pub fn pop_next(&mut self) -> Option<(WorkId, T)> {
        let ((_, id), payload) = self.order.pop_first()?;
        self.priorities.remove(&id);
        Some((id, payload))
    }

    /// Like [`WorkQueue::pop_next`], charging one unit to `budget`.
    pub fn pop_next_with_budget(&mut self, budget: &mut FrameBudget) -> Option<(WorkId, T)> {
        if self.is_empty() || !budget.try_consume(1) {
            return None;
        }
        self.pop_next()
    }

    /// Drops everything queued, returning how many items were discarded.
    pub fn clear(&mut self) -> usize {
        let dropped = self.order.len();
        self.order.clear();
        self.priorities.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::{WorkQueue, WorkQueueFull};
    use crate::budget::FrameBudget;

    fn drain<T>(q: &mut WorkQueue<T>) -> Vec<T> {
        std::iter::from_fn(|| q.pop_next().map(|(_, v)| v)).collect()
    }

    #[test]
    fn coarse_levels_pop_first_then_fifo() {
        let mut q = WorkQueue::new();
        for (priority, key) in [(2, "l2-a"), (0, "l0"), (2, "l2-b"), (1, "l1")] {
            q.try_push(priority, key).expect("push");
        }
        assert_eq!(drain(&mut q), vec!["l0", "l1", "l2-a", "l2-b"]);
    }

    #[test]
    fn cancelled_items_never_pop() {
        let mut q = WorkQueue::new();
        let a = q.try_push(0, "a").expect("push");
        q.try_push(0, "b").expect("push");
        assert_eq!(q.cancel(a), Some("a"));
        assert_eq!(q.cancel(a), None);
        assert_eq!(drain(&mut q), vec!["b"]);
    }

    #[test]
    fn full_queue_rejects_until_drained() {
        let mut q = WorkQueue::with_max_len(2);
        q.try_push(0, 1).expect("push");
        q.try_push(0, 2).expect("push");
        assert_eq!(q.try_push(0, 3), Err(WorkQueueFull { max_len: 2 }));
        q.pop_next();
        assert!(q.try_push(0, 3).is_ok());
        assert_eq!(q.clear(), 2);
        assert!(q.is_empty());
    }

    #[test]
    fn budget_limits_pops_per_frame() {
        let mut q = WorkQueue::new();
        for i in 0..3 {
            q.try_push(0, i).expect("push");
        }
        let mut budget = FrameBudget::new(2);
        assert!(q.pop_next_with_budget(&mut budget).is_some());
        assert!(q.pop_next_with_budget(&mut budget).is_some());
        assert!(q.pop_next_with_budget(&mut budget).is_none());
        assert_eq!(q.len(), 1);
        assert_eq!(budget.consumed_units(), 2);
    }
}
