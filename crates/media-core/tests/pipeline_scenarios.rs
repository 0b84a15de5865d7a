//! End-to-end ordering scenarios through the jitter buffer, the loss tracker
//! and the source group.

use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;

use sfu_media_core::prelude::*;
use sfu_media_core::{PacketBuffer, ReorderingBuffer};
use sfu_rtp_core::stats::LossTracker;

const MEDIA: u32 = 0x5EED;

fn queued(ext_seq: u64, time: u64) -> Arc<RtpPacket> {
    let mut packet = RtpPacket::new(MEDIA, 0, 0, time).with_payload(vec![0x11; 20]);
    packet.set_ext_seq_num(ext_seq);
    Arc::new(packet)
}

fn media(seq: u16, time: u64) -> RtpPacket {
    RtpPacket::new(MEDIA, seq, u32::from(seq) * 960, time)
        .with_clock_rate(48_000)
        .with_payload(vec![0x22; 60])
}

#[derive(Default)]
struct Collector {
    seqs: Mutex<Vec<u64>>,
}

impl RtpListener for Collector {
    fn on_rtp(&self, packet: &Arc<RtpPacket>) {
        self.seqs.lock().push(packet.ext_seq_num());
    }
}

fn started_group(wait: u64) -> (IncomingSourceGroup, Arc<Collector>) {
    let config = SourceGroupConfigBuilder::audio()
        .max_wait_time_override_ms(Some(wait))
        .build()
        .unwrap();
    let mut group = IncomingSourceGroup::new(config, MEDIA, None, None).unwrap();
    let collector = Arc::new(Collector::default());
    let listener: Arc<dyn RtpListener> = collector.clone();
    group.add_listener(&listener);
    group.start(0);
    (group, collector)
}

#[test]
fn scenario_in_order_without_wait() {
    let mut buffer = ReorderingBuffer::new(0);
    let mut released = Vec::new();

    for (now, seq) in [1u64, 2, 3].into_iter().enumerate() {
        assert!(buffer.add(queued(seq, now as u64)));
        released.push(buffer.get_ordered(now as u64).unwrap().ext_seq_num());
    }

    assert_eq!(released, vec![1, 2, 3]);
    assert_eq!(buffer.discarded(), 0);
}

#[test]
fn scenario_gap_released_after_wait() {
    let mut buffer = ReorderingBuffer::new(50);
    let mut losts = LossTracker::default();

    losts.add_packet(1);
    buffer.add(queued(1, 0));
    assert_eq!(buffer.get_ordered(0).unwrap().ext_seq_num(), 1);

    // 2 never arrives
    assert_eq!(losts.add_packet(3), 1);
    buffer.add(queued(3, 10));

    assert!(buffer.get_ordered(10).is_none());
    assert!(buffer.get_ordered(59).is_none());
    assert_eq!(buffer.get_ordered(60).unwrap().ext_seq_num(), 3);
    assert_eq!(buffer.next_expected(), Some(4));

    assert_eq!(losts.total(), 1);
    assert_eq!(buffer.discarded(), 0);
    assert_eq!(losts.get_nacks(), vec![NackField::new(2, 0)]);
}

#[test]
fn scenario_group_in_order_without_wait() {
    let (mut group, collector) = started_group(0);
    for (now, seq) in [1u16, 2, 3].into_iter().enumerate() {
        group.receive(media(seq, now as u64), now as u64);
        assert_eq!(group.dispatch(now as u64), 1);
    }

    assert_eq!(*collector.seqs.lock(), vec![1, 2, 3]);
    assert_eq!(group.stats().discarded, 0);
    assert_eq!(group.stats().lost, 0);
}

#[test]
fn scenario_group_gap_released_after_wait() {
    let (mut group, collector) = started_group(50);

    group.receive(media(1, 0), 0);
    group.dispatch(0);
    assert_eq!(group.receive(media(3, 10), 10), PacketAdmission::Queued { lost: 1 });

    assert_eq!(group.deadline(), Some(60));
    assert_eq!(group.dispatch(30), 0);
    assert_eq!(group.dispatch(60), 1);

    assert_eq!(*collector.seqs.lock(), vec![1, 3]);
    assert_eq!(group.stats().lost, 1);
    assert_eq!(group.stats().discarded, 0);
    assert_eq!(group.stats().max_waited_time, 50);
}

#[test]
fn hurry_up_bypasses_wait() {
    let mut buffer = ReorderingBuffer::new(10_000);
    buffer.add(queued(1, 0));
    buffer.get_ordered(0);
    buffer.add(queued(4, 1));

    assert!(buffer.get_ordered(1).is_none());
    buffer.hurry_up();
    assert_eq!(buffer.get_ordered(1).unwrap().ext_seq_num(), 4);
}

#[test]
fn reset_starts_a_new_stream() {
    let mut buffer = ReorderingBuffer::new(100);
    buffer.add(queued(100, 0));
    buffer.get_ordered(0);

    buffer.reset();
    assert!(buffer.add(queued(5, 1)));
    assert_eq!(buffer.get_ordered(1).unwrap().ext_seq_num(), 5);
}

proptest! {
    #[test]
    fn group_delivers_strictly_increasing(
        seqs in proptest::collection::vec(0u16..300, 1..150),
        wait in 0u64..40,
    ) {
        let (mut group, collector) = started_group(wait);
        let mut now = 0;
        for seq in seqs {
            now += 5;
            group.receive(media(seq, now), now);
            if group.deadline().is_some_and(|deadline| deadline <= now) {
                group.dispatch(now);
            }
        }
        group.dispatch(now + 1_000);

        let seqs = collector.seqs.lock();
        prop_assert!(seqs.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
