use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
};

use pushsub_common::Channel;

/// Advisory mirror of per-channel subscription state. The backend is
/// authoritative; entries here only answer fast local queries.
#[derive(Default)]
pub struct SubscriptionCache {
    entries: Mutex<HashMap<Channel, bool>>,
}

impl SubscriptionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel: &Channel) -> Option<bool> {
        self.lock().get(channel).copied()
    }

    /// Returns the previous value.
    pub fn set(&self, channel: Channel, subscribed: bool) -> Option<bool> {
        self.lock().insert(channel, subscribed)
    }

    pub fn invalidate(&self, channel: &Channel) -> Option<bool> {
        self.lock().remove(channel)
    }

    pub fn clear(&self) -> usize {
        let mut entries = self.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn snapshot(&self) -> BTreeMap<Channel, bool> {
        self.lock()
            .iter()
            .map(|(channel, subscribed)| (channel.clone(), *subscribed))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Channel, bool>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn channel(name: &str) -> Channel {
        Channel::new(name).unwrap()
    }

    #[test]
    fn last_write_wins() {
        let cache = SubscriptionCache::new();
        assert_eq!(cache.set(channel("news"), true), None);
        assert_eq!(cache.set(channel("news"), false), Some(true));
        assert_eq!(cache.get(&channel("news")), Some(false));
    }

    #[test]
    fn invalidate_and_clear() {
        let cache = SubscriptionCache::new();
        cache.set(channel("a"), true);
        cache.set(channel("b"), false);
        assert_eq!(cache.invalidate(&channel("a")), Some(true));
        assert_eq!(cache.get(&channel("a")), None);
        assert_eq!(cache.clear(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn snapshot_is_sorted() {
        let cache = SubscriptionCache::new();
        cache.set(channel("b"), true);
        cache.set(channel("a"), false);
        let names: Vec<_> = cache.snapshot().into_keys().map(String::from).collect();
        assert_eq!(names, ["a", "b"]);
    }
}
