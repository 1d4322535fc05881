use std::sync::{Arc, Weak};

use foundation::sector::Sector;
use parking_lot::Mutex;

/// Past this many queued sectors the queue collapses into their union.
pub const MAX_QUEUED_SECTORS: usize = 256;

/// Sectors whose elevation data changed, queued for a single consumer.
///
/// Load threads publish; the consumer drains once per frame.
#[derive(Debug, Default)]
pub struct ChangeFeed {
    pending: Mutex<Vec<Sector>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, sector: Sector) {
        let mut pending = self.pending.lock();
        pending.push(sector);
        if pending.len() > MAX_QUEUED_SECTORS
            && let Some(union) = pending.iter().copied().reduce(|a, b| a.union(&b))
        {
            pending.clear();
            pending.push(union);
        }
    }

    /// Takes everything published since the previous drain.
    pub fn drain(&self) -> Vec<Sector> {
        std::mem::take(&mut *self.pending.lock())
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

/// Fan-out to every live subscriber. Dropped feeds are pruned on publish.
#[derive(Debug, Default)]
pub(crate) struct FeedRegistry {
    feeds: Mutex<Vec<Weak<ChangeFeed>>>,
}

impl FeedRegistry {
    pub(crate) fn subscribe(&self) -> Arc<ChangeFeed> {
        let feed = Arc::new(ChangeFeed::new());
        self.feeds.lock().push(Arc::downgrade(&feed));
        feed
    }

    pub(crate) fn publish(&self, sector: Sector) {
        self.feeds.lock().retain(|weak| match weak.upgrade() {
            Some(feed) => {
                feed.publish(sector);
                true
            }
            None => false,
        });
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.feeds.lock().len()
    }
}
