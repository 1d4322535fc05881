use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use runtime::budget::FrameBudget;
use runtime::work_queue::{WorkId, WorkQueue};
use tracing::{debug, info, warn};

/// Work performed for one key. Runs on a loader thread, or on the caller's
/// thread inside [`LoadPipeline::run_pending`].
pub type LoadHandler<K> = Arc<dyn Fn(K) + Send + Sync>;

/// Outcome of [`LoadPipeline::submit`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Submission {
    Queued,
    /// The key is already queued or being loaded.
    Coalesced,
    /// Backpressure: the queue is at `max_pending`.
    Full,
}

struct PipelineState<K> {
    queue: WorkQueue<K>,
    pending: BTreeMap<K, WorkId>,
    in_flight: BTreeSet<K>,
    shutdown: bool,
}

impl<K: Ord + Clone> PipelineState<K> {
    fn take_next(&mut self, budget: Option<&mut FrameBudget>) -> Option<K> {
        let (_, key) = match budget {
            Some(budget) => self.queue.pop_next_with_budget(budget)?,
            None => self.queue.pop_next()?,
        };
        self.pending.remove(&key);
        self.in_flight.insert(key.clone());
        Some(key)
    }
}

struct Shared<K> {
    state: Mutex<PipelineState<K>>,
    ready: Condvar,
    handler: LoadHandler<K>,
}

/// Clears the in-flight mark even if the handler panics.
struct InFlightGuard<'a, K: Ord> {
    shared: &'a Shared<K>,
    key: Option<K>,
}

impl<K: Ord> Drop for InFlightGuard<'_, K> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.shared.state.lock().in_flight.remove(&key);
        }
    }
}

impl<K: Ord + Clone> Shared<K> {
    fn run(&self, key: K) {
        let _guard = InFlightGuard {
            shared: self,
            key: Some(key.clone()),
        };
        (self.handler)(key);
    }
}

/// Deduplicating background loader.
///
/// Requests are keyed; a key that is queued or in flight is never queued a
/// second time, so each key is handled by at most one task at a time.
/// Ordering follows [`WorkQueue`]: lower priority values first, then FIFO.
///
/// With zero worker threads nothing runs until the owner calls
/// [`LoadPipeline::run_pending`], which keeps tests deterministic.
pub struct LoadPipeline<K: Ord + Clone + Send + 'static> {
    shared: Arc<Shared<K>>,
    workers: Vec<JoinHandle<()>>,
}

impl<K: Ord + Clone + Send + 'static> fmt::Debug for LoadPipeline<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadPipeline")
            .field("workers", &self.workers.len())
            .finish_non_exhaustive()
    }
}

impl<K> LoadPipeline<K>
where
    K: Ord + Clone + Send + fmt::Debug + 'static,
{
    pub fn new(max_pending: usize, threads: usize, handler: LoadHandler<K>) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(PipelineState {
                queue: WorkQueue::with_max_len(max_pending),
                pending: BTreeMap::new(),
                in_flight: BTreeSet::new(),
                shutdown: false,
            }),
            ready: Condvar::new(),
            handler,
        });

        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let shared = Arc::clone(&shared);
            let spawned = std::thread::Builder::new()
                .name(format!("tile-loader-{i}"))
                .spawn(move || worker_loop(shared));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => warn!("failed to spawn tile loader thread {i}: {err}"),
            }
        }
        if !workers.is_empty() {
            info!(threads = workers.len(), "tile load pipeline started");
        }

        Self { shared, workers }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue `key` unless it is already queued or in flight.
    pub fn submit(&self, key: K, priority: i32) -> Submission {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Submission::Full;
        }
        if state.pending.contains_key(&key) || state.in_flight.contains(&key) {
            debug!(?key, "coalesced duplicate load request");
            return Submission::Coalesced;
        }
        let Ok(id) = state.queue.try_push(priority, key.clone()) else {
            return Submission::Full;
        };
        state.pending.insert(key, id);
        drop(state);
        self.shared.ready.notify_one();
        Submission::Queued
    }

    /// Drop a queued request. A request already in flight is unaffected.
    pub fn cancel(&self, key: &K) -> bool {
        let mut state = self.shared.state.lock();
        let Some(id) = state.pending.remove(key) else {
            return false;
        };
        state.queue.cancel(id).is_some()
    }

    /// `true` while the key is queued or being loaded.
    pub fn is_pending(&self, key: &K) -> bool {
        let state = self.shared.state.lock();
        state.pending.contains_key(key) || state.in_flight.contains(key)
    }

    /// Queued keys in key order.
    pub fn queued_keys(&self) -> Vec<K> {
        self.shared.state.lock().pending.keys().cloned().collect()
    }

    pub fn queued_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.shared.state.lock().in_flight.len()
    }

    /// Run queued work on the calling thread, one unit per request, until the
    /// queue or the budget runs out. Returns the number of requests handled.
    pub fn run_pending(&self, budget: &mut FrameBudget) -> usize {
        let mut handled = 0;
        loop {
            let next = self.shared.state.lock().take_next(Some(&mut *budget));
            let Some(key) = next else {
                break;
            };
            self.shared.run(key);
            handled += 1;
        }
        handled
    }
}

impl<K: Ord + Clone + Send + 'static> LoadPipeline<K> {
    /// Stop the workers. Queued requests are dropped without running.
    /// Returns how many workers had died from a panicking handler.
    pub fn shutdown(&mut self) -> usize {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            state.pending.clear();
            let dropped = state.queue.clear();
            if dropped > 0 {
                debug!(dropped, "discarded queued loads on shutdown");
            }
        }
        self.shared.ready.notify_all();
        let mut panicked = 0;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("tile loader thread panicked");
                panicked += 1;
            }
        }
        panicked
    }
}

impl<K: Ord + Clone + Send + 'static> Drop for LoadPipeline<K> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop<K: Ord + Clone>(shared: Arc<Shared<K>>) {
    loop {
        let key = {
            let mut state = shared.state.lock();
            loop {
                if state.shutdown {
                    return;
                }
                if let Some(key) = state.take_next(None) {
                    break key;
                }
                shared.ready.wait(&mut state);
            }
        };
        shared.run(key);
    }
}

#[cfg(test)]
mod tests {
    use super::{LoadHandler, LoadPipeline, Submission};
    use parking_lot::Mutex;
    use runtime::budget::FrameBudget;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn recording() -> (Arc<Mutex<Vec<u32>>>, LoadHandler<u32>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, Arc::new(move |k| sink.lock().push(k)))
    }

    #[test]
    fn duplicate_requests_coalesce() {
        let (seen, handler) = recording();
        let p = LoadPipeline::new(16, 0, handler);
        assert_eq!(p.submit(7, 0), Submission::Queued);
        assert_eq!(p.submit(7, 0), Submission::Coalesced);
        assert_eq!(p.queued_len(), 1);

        assert_eq!(p.run_pending(&mut FrameBudget::unlimited()), 1);
        assert_eq!(*seen.lock(), vec![7]);
        assert!(!p.is_pending(&7));
    }

    #[test]
    fn lower_priority_value_runs_first() {
        let (seen, handler) = recording();
        let p = LoadPipeline::new(16, 0, handler);
        p.submit(30, 3);
        p.submit(10, 1);
        p.submit(0, 0);
        p.run_pending(&mut FrameBudget::unlimited());
        assert_eq!(*seen.lock(), vec![0, 10, 30]);
    }

    #[test]
    fn cancel_is_a_silent_no_op() {
        let (seen, handler) = recording();
        let p = LoadPipeline::new(16, 0, handler);
        p.submit(1, 0);
        p.submit(2, 0);
        assert!(p.cancel(&1));
        assert!(!p.cancel(&1));
        p.run_pending(&mut FrameBudget::unlimited());
        assert_eq!(*seen.lock(), vec![2]);
    }

    #[test]
    fn backpressure_and_budget() {
        let (seen, handler) = recording();
        let p = LoadPipeline::new(2, 0, handler);
        assert_eq!(p.submit(1, 0), Submission::Queued);
        assert_eq!(p.submit(2, 0), Submission::Queued);
        assert_eq!(p.submit(3, 0), Submission::Full);

        assert_eq!(p.run_pending(&mut FrameBudget::new(1)), 1);
        assert_eq!(p.queued_keys(), vec![2]);
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn worker_threads_handle_each_key_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler: LoadHandler<u32> = Arc::new(move |_| {
            std::thread::sleep(Duration::from_millis(20));
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut p = LoadPipeline::new(64, 2, handler);

        let submitters: Vec<_> = (0..8)
            .map(|_| {
                let p = &p;
                move || p.submit(42, 0)
            })
            .collect();
        std::thread::scope(|s| {
            for f in submitters {
                s.spawn(f);
            }
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while (p.is_pending(&42)) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(p.shutdown(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_loader_is_reported_on_shutdown() {
        let handler: LoadHandler<u32> = Arc::new(|key| {
            if key == 13 {
                panic!("corrupt tile {key}");
            }
        });
        let mut p = LoadPipeline::new(8, 1, handler);
        p.submit(13, 0);

        let deadline = Instant::now() + Duration::from_secs(5);
        while p.is_pending(&13) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!p.is_pending(&13));
        assert_eq!(p.shutdown(), 1);
        assert_eq!(p.worker_count(), 0);
    }
}
