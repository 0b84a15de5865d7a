//! Listener fan-out
//!
//! A source group delivers ordered packets, bye and end-of-stream signals to
//! its listeners. The group never owns a listener: it keeps weak references
//! and skips the ones that were dropped.

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use sfu_rtp_core::RtpPacket;

/// Consumer of an incoming source group
///
/// Callbacks run on the group's owning context and must not block.
pub trait RtpListener: Send + Sync {
    /// One packet, in order
    fn on_rtp(&self, packet: &Arc<RtpPacket>);

    /// A batch of packets in order
    ///
    /// Defaults to calling [`Self::on_rtp`] for every packet.
    fn on_rtp_batch(&self, packets: &[Arc<RtpPacket>]) {
        for packet in packets {
            self.on_rtp(packet);
        }
    }

    /// The sender said goodbye on the media SSRC
    fn on_bye(&self) {}

    /// The source group stopped, no further callbacks follow
    fn on_ended(&self) {}
}

/// Weak, identity compared set of listeners
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Vec<Weak<dyn RtpListener>>,
}

impl ListenerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener, once
    pub fn add(&mut self, listener: &Arc<dyn RtpListener>) -> bool {
        let weak = Arc::downgrade(listener);
        if self.listeners.iter().any(|known| Weak::ptr_eq(known, &weak)) {
            return false;
        }
        self.listeners.push(weak);
        debug!("Listener added [count:{}]", self.listeners.len());
        true
    }

    /// Unregister a listener
    pub fn remove(&mut self, listener: &Arc<dyn RtpListener>) -> bool {
        let weak = Arc::downgrade(listener);
        let before = self.listeners.len();
        self.listeners.retain(|known| !Weak::ptr_eq(known, &weak));
        let removed = self.listeners.len() != before;
        if removed {
            debug!("Listener removed [count:{}]", self.listeners.len());
        }
        removed
    }

    /// Number of registered listeners, including dropped ones not yet pruned
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether no listener is registered
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Forget every listener
    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    /// Call `f` on every live listener, pruning dropped ones
    pub fn for_each(&mut self, mut f: impl FnMut(&dyn RtpListener)) {
        self.listeners.retain(|weak| match weak.upgrade() {
            Some(listener) => {
                f(listener.as_ref());
                true
            }
            None => {
                trace!("Pruning dropped listener");
                false
            }
        });
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Event published by a [`ChannelListener`]
#[derive(Debug, Clone)]
pub enum SourceGroupEvent {
    /// Ordered batch of packets
    Packets(Vec<Arc<RtpPacket>>),
    /// Bye on the media SSRC
    Bye,
    /// The source group stopped
    Ended,
}

/// Listener forwarding everything to a tokio channel
///
/// Lets async code consume a source group without implementing
/// [`RtpListener`] itself. Groups hold listeners weakly, the caller keeps the
/// returned `Arc` alive for as long as it wants events.
#[derive(Debug)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<SourceGroupEvent>,
}

impl ChannelListener {
    /// Create a listener and the receiving end of its channel
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<SourceGroupEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn publish(&self, event: SourceGroupEvent) {
        // A closed receiver only means nobody is interested anymore
        if self.tx.send(event).is_err() {
            trace!("Dropping source group event, receiver closed");
        }
    }
}

impl RtpListener for ChannelListener {
    fn on_rtp(&self, packet: &Arc<RtpPacket>) {
        self.publish(SourceGroupEvent::Packets(vec![packet.clone()]));
    }

    fn on_rtp_batch(&self, packets: &[Arc<RtpPacket>]) {
        self.publish(SourceGroupEvent::Packets(packets.to_vec()));
    }

    fn on_bye(&self) {
        self.publish(SourceGroupEvent::Bye);
    }

    fn on_ended(&self) {
        self.publish(SourceGroupEvent::Ended);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seqs: Mutex<Vec<u16>>,
    }

    impl RtpListener for Recorder {
        fn on_rtp(&self, packet: &Arc<RtpPacket>) {
            self.seqs.lock().push(packet.seq_num());
        }
    }

    fn packets(seqs: &[u16]) -> Vec<Arc<RtpPacket>> {
        seqs.iter().map(|&seq| Arc::new(RtpPacket::new(1, seq, 0, 0))).collect()
    }

    #[test]
    fn test_default_batch_calls_single_in_order() {
        let recorder = Recorder::default();
        recorder.on_rtp_batch(&packets(&[4, 5, 6]));
        assert_eq!(*recorder.seqs.lock(), vec![4, 5, 6]);
    }

    #[test]
    fn test_registry_dedup_and_remove() {
        let mut registry = ListenerRegistry::new();
        let listener: Arc<dyn RtpListener> = Arc::new(Recorder::default());

        assert!(registry.add(&listener));
        assert!(!registry.add(&listener));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(&listener));
        assert!(!registry.remove(&listener));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_does_not_own_listeners() {
        let mut registry = ListenerRegistry::new();
        let kept = Arc::new(Recorder::default());
        let kept_dyn: Arc<dyn RtpListener> = kept.clone();
        let dropped: Arc<dyn RtpListener> = Arc::new(Recorder::default());

        registry.add(&kept_dyn);
        registry.add(&dropped);
        drop(dropped);

        let batch = packets(&[1]);
        registry.for_each(|listener| listener.on_rtp_batch(&batch));
        assert_eq!(registry.len(), 1);
        assert_eq!(*kept.seqs.lock(), vec![1]);
    }

    #[tokio::test]
    async fn test_channel_listener_events() {
        let (listener, mut rx) = ChannelListener::new();
        listener.on_rtp_batch(&packets(&[1, 2]));
        listener.on_bye();
        listener.on_ended();

        match rx.recv().await {
            Some(SourceGroupEvent::Packets(batch)) => assert_eq!(batch.len(), 2),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(rx.recv().await, Some(SourceGroupEvent::Bye)));
        assert!(matches!(rx.recv().await, Some(SourceGroupEvent::Ended)));
    }
}
