//! Pending-request and subscription registries, and the correlation-key
//! generator.

use crate::error::ClientError;
use bytes::Bytes;
use dashmap::DashMap;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, OnceLock, PoisonError};
use tokio::sync::{mpsc, oneshot};

/// What a pending waiter receives: raw result bytes, or the error the server
/// attached to the response.
pub(crate) type Outcome = Result<Bytes, ClientError>;

const REQUEST_KEY_LENGTH: usize = 16;
const KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

const VAR_PREFIX_LENGTH: usize = 32;
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Bounded capacity of each subscription channel. The dispatcher drops
/// notifications (with an error log) when a send does not complete within
/// the shared request timeout.
pub(crate) const SUBSCRIPTION_CHANNEL_CAPACITY: usize = 256;

static RNG: OnceLock<Mutex<SmallRng>> = OnceLock::new();

fn sample(alphabet: &[u8], len: usize) -> String {
    let rng = RNG.get_or_init(|| Mutex::new(SmallRng::from_entropy()));
    let mut rng = rng.lock().unwrap_or_else(PoisonError::into_inner);
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

/// Mints a fresh correlation key: 16 alphanumeric characters.
///
/// The generator is fast rather than uniform; collisions are negligible for
/// tens of thousands of concurrent requests (62^16 key space).
pub(crate) fn request_key() -> String {
    sample(KEY_ALPHABET, REQUEST_KEY_LENGTH)
}

/// Mints a variable-name prefix for the live-query rewrite: 32 letters.
pub(crate) fn var_prefix() -> String {
    sample(LETTERS, VAR_PREFIX_LENGTH)
}

/// In-flight requests keyed by correlation key.
///
/// Taking the sender out of the map to deliver is what enforces the
/// at-most-one-delivery invariant; dropping a sender closes its channel, so
/// `reset` wakes every waiter with `ChannelClosed`.
#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    entries: DashMap<String, oneshot::Sender<Outcome>>,
}

impl PendingRequests {
    /// Mints a key, registers a delivery channel and returns the caller's
    /// receiver end.
    pub fn prepare(&self) -> (String, oneshot::Receiver<Outcome>) {
        let key = request_key();
        let (tx, rx) = oneshot::channel();
        self.entries.insert(key.clone(), tx);
        (key, rx)
    }

    /// Removes and returns the delivery channel for `key`, if still pending.
    pub fn take(&self, key: &str) -> Option<oneshot::Sender<Outcome>> {
        self.entries.remove(key).map(|(_, tx)| tx)
    }

    /// Deregisters `key`, closing its channel if it was never delivered.
    /// Idempotent.
    pub fn cleanup(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Closes every pending channel and empties the map.
    pub fn reset(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Live-query channels keyed by the server-issued subscription id.
#[derive(Debug, Default)]
pub(crate) struct Subscriptions {
    entries: DashMap<Vec<u8>, mpsc::Sender<Bytes>>,
}

impl Subscriptions {
    /// Registers a fresh channel for `id` and returns its receiver, or
    /// `None` if the id is already registered.
    pub fn insert(&self, id: &[u8]) -> Option<mpsc::Receiver<Bytes>> {
        match self.entries.entry(id.to_vec()) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let (tx, rx) = mpsc::channel(SUBSCRIPTION_CHANNEL_CAPACITY);
                slot.insert(tx);
                Some(rx)
            }
        }
    }

    /// Returns the delivery end for `id`, if registered.
    pub fn sender(&self, id: &[u8]) -> Option<mpsc::Sender<Bytes>> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    /// Closes the channel for `id` and removes the entry. Idempotent.
    pub fn remove(&self, id: &[u8]) {
        self.entries.remove(id);
    }

    /// Closes and removes all entries.
    pub fn reset(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_shape() {
        for _ in 0..100 {
            let key = request_key();
            assert_eq!(key.len(), REQUEST_KEY_LENGTH);
            assert!(key.bytes().all(|b| b.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_key_uniqueness() {
        let keys: HashSet<String> = (0..10_000).map(|_| request_key()).collect();
        assert_eq!(keys.len(), 10_000);
    }

    #[test]
    fn test_var_prefix_shape() {
        let prefix = var_prefix();
        assert_eq!(prefix.len(), VAR_PREFIX_LENGTH);
        assert!(prefix.bytes().all(|b| b.is_ascii_alphabetic()));
    }

    #[tokio::test]
    async fn test_pending_delivery() {
        let pending = PendingRequests::default();
        let (key, rx) = pending.prepare();
        assert_eq!(pending.len(), 1);

        let tx = pending.take(&key).expect("entry registered");
        tx.send(Ok(Bytes::from_static(b"result"))).unwrap();
        assert_eq!(pending.len(), 0);

        let outcome = rx.await.unwrap();
        assert_eq!(outcome.unwrap(), Bytes::from_static(b"result"));

        // A second take finds nothing: at most one delivery per key.
        assert!(pending.take(&key).is_none());
    }

    #[tokio::test]
    async fn test_pending_reset_closes_waiters() {
        let pending = PendingRequests::default();
        let (_key, rx) = pending.prepare();
        let (_key2, rx2) = pending.prepare();

        pending.reset();
        assert_eq!(pending.len(), 0);
        assert!(rx.await.is_err());
        assert!(rx2.await.is_err());
    }

    #[test]
    fn test_pending_cleanup_idempotent() {
        let pending = PendingRequests::default();
        let (key, _rx) = pending.prepare();
        pending.cleanup(&key);
        pending.cleanup(&key);
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test]
    async fn test_subscription_lifecycle() {
        let subscriptions = Subscriptions::default();
        let id = b"sub-1".to_vec();

        let mut rx = subscriptions.insert(&id).expect("fresh id");
        // The id maps to at most one channel.
        assert!(subscriptions.insert(&id).is_none());

        let tx = subscriptions.sender(&id).expect("registered");
        tx.send(Bytes::from_static(b"event")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"event"));

        drop(tx);
        subscriptions.remove(&id);
        assert!(subscriptions.sender(&id).is_none());
        // Channel closed once the registry's sender is gone.
        assert!(rx.recv().await.is_none());

        // Idempotent remove.
        subscriptions.remove(&id);
    }

    #[tokio::test]
    async fn test_subscription_reset() {
        let subscriptions = Subscriptions::default();
        let mut rx1 = subscriptions.insert(b"a").expect("fresh");
        let mut rx2 = subscriptions.insert(b"b").expect("fresh");
        assert_eq!(subscriptions.len(), 2);

        subscriptions.reset();
        assert_eq!(subscriptions.len(), 0);
        assert!(rx1.recv().await.is_none());
        assert!(rx2.recv().await.is_none());
    }
}
