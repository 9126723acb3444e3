//! Subscriber hub — one producer, many viewers.
//!
//! The hub is an actor: three inbound channels (register, unregister,
//! broadcast) feed one event loop that owns the subscriber set and the
//! keyframe cache. Because registration and broadcast are handled by
//! the same loop, a new subscriber's cached keyframe is enqueued
//! strictly before any packet produced after its registration — the
//! keyframe-first guarantee holds by construction, with no locking.
//!
//! Back-pressure policy is drop-subscriber, not drop-packet: a viewer
//! whose queue is full is unregistered on the spot and the live stream
//! is preserved for everyone else. Every send into a subscriber queue
//! is non-blocking, so the capture thread can never be suspended by a
//! stalled socket.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::encoder::EncodedPacket;
use crate::keyframe::KeyframeCache;

/// Outbound queue depth per subscriber.
pub const SUBSCRIBER_QUEUE_DEPTH: usize = 256;

// ── Messages ─────────────────────────────────────────────────────

struct Registration {
    id: Uuid,
    tx: mpsc::Sender<Vec<u8>>,
}

enum Unregister {
    /// Remove one subscriber.
    One(Uuid),
    /// Remove every subscriber and clear the keyframe cache
    /// (pipeline stop).
    All,
}

// ── Hub ──────────────────────────────────────────────────────────

/// Handle to the hub actor. Cheap to clone; all clones feed the same
/// event loop.
#[derive(Clone)]
pub struct Hub {
    register_tx: mpsc::UnboundedSender<Registration>,
    unregister_tx: mpsc::UnboundedSender<Unregister>,
    broadcast_tx: mpsc::UnboundedSender<EncodedPacket>,
    count: Arc<AtomicUsize>,
    keyframe_wanted: Arc<AtomicBool>,
}

impl Hub {
    /// Spawn the hub event loop on the current tokio runtime.
    ///
    /// `keyframe_wanted` is shared with the supervisor: the hub raises
    /// it when a subscriber registers while the cache is empty, and the
    /// capture loop services it by forcing the next frame to be an IDR.
    pub fn spawn(keyframe_wanted: Arc<AtomicBool>) -> Self {
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::unbounded_channel();
        let count = Arc::new(AtomicUsize::new(0));

        tokio::spawn(run_loop(
            register_rx,
            unregister_rx,
            broadcast_rx,
            Arc::clone(&count),
            Arc::clone(&keyframe_wanted),
        ));

        Self {
            register_tx,
            unregister_tx,
            broadcast_tx,
            count,
            keyframe_wanted,
        }
    }

    /// Register a new subscriber.
    ///
    /// Returns a guard that unregisters on drop, and the receiving end
    /// of the subscriber's bounded outbound queue.
    pub fn subscribe(&self) -> (SubscriberGuard, mpsc::Receiver<Vec<u8>>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        let _ = self.register_tx.send(Registration { id, tx });
        (
            SubscriberGuard {
                id,
                unregister_tx: self.unregister_tx.clone(),
            },
            rx,
        )
    }

    /// Enqueue a packet for every live subscriber. Never blocks.
    pub fn broadcast(&self, packet: EncodedPacket) {
        let _ = self.broadcast_tx.send(packet);
    }

    /// Current subscriber count.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Whether no subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the event loop is still processing messages.
    pub fn is_alive(&self) -> bool {
        !self.register_tx.is_closed()
    }

    /// Disconnect every subscriber and drop the keyframe cache.
    pub fn disconnect_all(&self) {
        let _ = self.unregister_tx.send(Unregister::All);
    }

    /// The shared forced-keyframe flag (read+cleared by the capture
    /// loop).
    pub fn keyframe_wanted(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.keyframe_wanted)
    }
}

// ── SubscriberGuard ──────────────────────────────────────────────

/// Scoped registration handle: dropping it unregisters the subscriber,
/// covering every endpoint exit path (clean close, send failure, read
/// error, panic unwind).
pub struct SubscriberGuard {
    id: Uuid,
    unregister_tx: mpsc::UnboundedSender<Unregister>,
}

impl SubscriberGuard {
    /// The subscriber's stable identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        let _ = self.unregister_tx.send(Unregister::One(self.id));
    }
}

// ── Event loop ───────────────────────────────────────────────────

async fn run_loop(
    mut register_rx: mpsc::UnboundedReceiver<Registration>,
    mut unregister_rx: mpsc::UnboundedReceiver<Unregister>,
    mut broadcast_rx: mpsc::UnboundedReceiver<EncodedPacket>,
    count: Arc<AtomicUsize>,
    keyframe_wanted: Arc<AtomicBool>,
) {
    let mut subscribers: HashMap<Uuid, mpsc::Sender<Vec<u8>>> = HashMap::new();
    let mut cache = KeyframeCache::new();

    loop {
        tokio::select! {
            Some(reg) = register_rx.recv() => {
                info!(subscriber = %reg.id, "subscriber registered");

                // Keyframe-first: enqueue the cached prefix before the
                // subscriber can observe any later broadcast.
                match cache.get() {
                    Some(keyframe) => match reg.tx.try_send(keyframe) {
                        Ok(()) => debug!(subscriber = %reg.id, "cached keyframe delivered"),
                        Err(_) => warn!(subscriber = %reg.id, "cached keyframe refused (queue full)"),
                    },
                    None => {
                        debug!(subscriber = %reg.id, "no cached keyframe, requesting one");
                        keyframe_wanted.store(true, Ordering::SeqCst);
                    }
                }

                subscribers.insert(reg.id, reg.tx);
                count.store(subscribers.len(), Ordering::SeqCst);
            }

            Some(unreg) = unregister_rx.recv() => {
                match unreg {
                    Unregister::One(id) => {
                        if subscribers.remove(&id).is_some() {
                            info!(subscriber = %id, "subscriber unregistered");
                        }
                    }
                    Unregister::All => {
                        if !subscribers.is_empty() {
                            info!(count = subscribers.len(), "disconnecting all subscribers");
                        }
                        subscribers.clear();
                        cache.clear();
                    }
                }
                count.store(subscribers.len(), Ordering::SeqCst);
            }

            Some(packet) = broadcast_rx.recv() => {
                cache.update(&packet);

                let mut stalled = Vec::new();
                for (id, tx) in &subscribers {
                    if tx.try_send(packet.data.clone()).is_err() {
                        stalled.push(*id);
                    }
                }
                for id in stalled {
                    subscribers.remove(&id);
                    warn!(subscriber = %id, "subscriber evicted (queue full or closed)");
                }
                count.store(subscribers.len(), Ordering::SeqCst);
            }

            else => break,
        }
    }

    debug!("hub event loop ended");
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Codec;
    use std::time::Duration;

    fn packet(seq: u64, keyframe: bool, tag: u8) -> EncodedPacket {
        let data = if keyframe {
            vec![0x00, 0x00, 0x00, 0x01, 0x65, tag]
        } else {
            vec![0x00, 0x00, 0x00, 0x01, 0x41, tag]
        };
        EncodedPacket {
            codec: Codec::H264,
            is_keyframe: keyframe,
            sequence: seq,
            data,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    #[tokio::test]
    async fn register_with_empty_cache_requests_keyframe() {
        let wanted = Arc::new(AtomicBool::new(false));
        let hub = Hub::spawn(Arc::clone(&wanted));

        let (_guard, _rx) = hub.subscribe();
        settle().await;

        assert_eq!(hub.len(), 1);
        assert!(wanted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn warm_join_receives_cached_keyframe_first() {
        let hub = Hub::spawn(Arc::new(AtomicBool::new(false)));

        // Prime the cache via a first subscriber's stream.
        let (_g1, mut rx1) = hub.subscribe();
        settle().await;
        hub.broadcast(packet(1, true, 0x01));
        settle().await;

        // Second subscriber joins mid-stream.
        let (_g2, mut rx2) = hub.subscribe();
        settle().await;
        hub.broadcast(packet(2, false, 0x02));
        settle().await;

        // First frame for the warm joiner is the cached keyframe (with
        // the AUD prefix), then the live delta.
        let first = rx2.recv().await.unwrap();
        assert!(crate::nal::contains_idr(&first));
        assert!(crate::nal::contains_aud(&first));
        let second = rx2.recv().await.unwrap();
        assert!(!crate::nal::contains_idr(&second));

        // The existing subscriber saw both packets, no duplicates.
        assert!(crate::nal::contains_idr(&rx1.recv().await.unwrap()));
        assert!(!crate::nal::contains_idr(&rx1.recv().await.unwrap()));
    }

    #[tokio::test]
    async fn broadcast_preserves_production_order() {
        let hub = Hub::spawn(Arc::new(AtomicBool::new(false)));
        let (_guard, mut rx) = hub.subscribe();
        settle().await;

        for seq in 0..10u8 {
            hub.broadcast(packet(seq as u64, seq == 0, seq));
        }
        settle().await;

        for expected in 0..10u8 {
            let data = rx.recv().await.unwrap();
            assert_eq!(*data.last().unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn slow_subscriber_is_evicted() {
        let hub = Hub::spawn(Arc::new(AtomicBool::new(false)));
        let (_guard, rx) = hub.subscribe();
        settle().await;
        assert_eq!(hub.len(), 1);

        // Never drain rx: the queue fills at 256, the next broadcast
        // is refused, and the subscriber is dropped.
        for seq in 0..(SUBSCRIBER_QUEUE_DEPTH as u64 + 1) {
            hub.broadcast(packet(seq, false, 0));
        }
        settle().await;

        assert_eq!(hub.len(), 0);
        drop(rx);
    }

    #[tokio::test]
    async fn guard_drop_unregisters() {
        let hub = Hub::spawn(Arc::new(AtomicBool::new(false)));
        let (guard, _rx) = hub.subscribe();
        settle().await;
        assert_eq!(hub.len(), 1);

        drop(guard);
        settle().await;
        assert_eq!(hub.len(), 0);
    }

    #[tokio::test]
    async fn disconnect_all_clears_cache() {
        let wanted = Arc::new(AtomicBool::new(false));
        let hub = Hub::spawn(Arc::clone(&wanted));

        let (_g1, _rx1) = hub.subscribe();
        settle().await;
        hub.broadcast(packet(1, true, 0));
        settle().await;

        hub.disconnect_all();
        settle().await;
        assert_eq!(hub.len(), 0);

        // A fresh subscriber finds no cache and must request an IDR.
        wanted.store(false, Ordering::SeqCst);
        let (_g2, _rx2) = hub.subscribe();
        settle().await;
        assert!(wanted.load(Ordering::SeqCst));
    }
}
