//! Invisible sample cache: a bounded, mutex-guarded two-stage FIFO that
//! decouples network arrival from application polling.
//!
//! The reactor thread pushes arriving samples into the reactor stage;
//! the application thread drains them into the app stage on demand. The
//! two stages let a slow consumer fall behind without blocking the
//! reactor, at the cost of dropping the oldest samples once `capacity`
//! is exceeded.

use std::collections::VecDeque;
use std::sync::Mutex;

/// Initial construction parameters for an [`InvisibleSampleCache`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleCacheConfig {
    /// Initial capacity shared across both stages.
    pub capacity: usize,
}

impl SampleCacheConfig {
    /// Create a configuration with the given initial capacity.
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }
}

struct CacheState<T> {
    capacity: usize,
    reactor_list: VecDeque<T>,
    app_list: VecDeque<T>,
}

impl<T> CacheState<T> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            reactor_list: VecDeque::new(),
            app_list: VecDeque::new(),
        }
    }
}

/// A bounded two-stage sample cache, shared between a reactor thread
/// (producer) and one or more application threads (consumers).
pub struct InvisibleSampleCache<T> {
    state: Mutex<CacheState<T>>,
}

impl<T> InvisibleSampleCache<T> {
    /// Create a new cache from `config`.
    pub fn new(config: SampleCacheConfig) -> Self {
        Self {
            state: Mutex::new(CacheState::new(config.capacity)),
        }
    }

    /// Change the capacity. Does not drop any data by itself; excess
    /// entries are trimmed lazily, at the next `enqueue` or
    /// `get_samples` call.
    pub fn resize(&self, capacity: usize) {
        self.state.lock().unwrap().capacity = capacity;
    }

    /// Push one sample from the reactor thread.
    ///
    /// Returns `false` and drops the sample if `capacity` is zero.
    /// Otherwise, if the reactor stage is already at capacity, the
    /// oldest reactor-stage entry is dropped to make room.
    pub fn enqueue(&self, sample: T) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.capacity == 0 {
            return false;
        }
        if state.reactor_list.len() >= state.capacity {
            state.reactor_list.pop_front();
        }
        state.reactor_list.push_back(sample);
        true
    }

    /// Drain up to `n` samples for the application thread.
    ///
    /// First trims the app stage so `app_list.len() + reactor_list.len()
    /// <= capacity`, oldest app-stage entries first. Then, if the app
    /// stage still holds fewer than `n` entries, moves the oldest
    /// reactor-stage entries over to make up the difference. Returns the
    /// (possibly still non-empty) app stage for in-place consumption.
    pub fn get_samples(&self, n: usize) -> Vec<T> {
        let mut state = self.state.lock().unwrap();

        while state.app_list.len() + state.reactor_list.len() > state.capacity
            && !state.app_list.is_empty()
        {
            state.app_list.pop_front();
        }

        if state.app_list.len() < n {
            let needed = (n - state.app_list.len()).min(state.reactor_list.len());
            for _ in 0..needed {
                if let Some(sample) = state.reactor_list.pop_front() {
                    state.app_list.push_back(sample);
                }
            }
        }

        state.app_list.drain(..).collect()
    }

    /// Reset the cache: capacity goes to zero and both stages are
    /// cleared.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.capacity = 0;
        state.reactor_list.clear();
        state.app_list.clear();
    }

    /// Number of samples currently held in the reactor stage.
    pub fn reactor_len(&self) -> usize {
        self.state.lock().unwrap().reactor_list.len()
    }

    /// Number of samples currently held in the application stage.
    pub fn app_len(&self) -> usize {
        self.state.lock().unwrap().app_list.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_respects_capacity() {
        let cache = InvisibleSampleCache::new(SampleCacheConfig::new(2));
        assert!(cache.enqueue(1));
        assert!(cache.enqueue(2));
        assert!(cache.enqueue(3));
        assert_eq!(cache.reactor_len(), 2);
    }

    #[test]
    fn test_zero_capacity_drops_everything() {
        let cache = InvisibleSampleCache::new(SampleCacheConfig::new(0));
        assert!(!cache.enqueue(1));
        assert_eq!(cache.reactor_len(), 0);
    }

    #[test]
    fn test_get_samples_moves_from_reactor_to_app() {
        let cache = InvisibleSampleCache::new(SampleCacheConfig::new(10));
        for i in 0..5 {
            cache.enqueue(i);
        }

        let samples = cache.get_samples(3);
        assert_eq!(samples, vec![0, 1, 2]);
        assert_eq!(cache.reactor_len(), 2);
    }

    #[test]
    fn test_get_samples_is_fifo_across_stages() {
        let cache = InvisibleSampleCache::new(SampleCacheConfig::new(10));
        for i in 0..4 {
            cache.enqueue(i);
        }

        let first = cache.get_samples(2);
        assert_eq!(first, vec![0, 1]);

        let second = cache.get_samples(2);
        assert_eq!(second, vec![2, 3]);
    }

    #[test]
    fn test_resize_down_trims_app_list_lazily_at_get_samples() {
        let cache = InvisibleSampleCache::new(SampleCacheConfig::new(10));
        for i in 0..5 {
            cache.enqueue(i);
        }
        // Pull everything into the app stage under the old capacity.
        let first = cache.get_samples(5);
        assert_eq!(first, vec![0, 1, 2, 3, 4]);

        for i in 5..8 {
            cache.enqueue(i);
        }
        cache.resize(2);

        // No data dropped yet by resize alone.
        assert_eq!(cache.reactor_len(), 3);

        // Only app-stage entries are trimmed to respect the new capacity;
        // the newest reactor entries still arrive on top.
        let samples = cache.get_samples(2);
        assert_eq!(samples, vec![5, 6]);
    }

    #[test]
    fn test_clear_resets_capacity_and_drops_all() {
        let cache = InvisibleSampleCache::new(SampleCacheConfig::new(10));
        cache.enqueue(1);
        cache.clear();

        assert_eq!(cache.reactor_len(), 0);
        assert!(!cache.enqueue(2));
    }
}
