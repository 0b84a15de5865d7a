//! Source group task lifecycle driven through the handle with paused time.

use std::sync::Arc;
use std::time::Duration;

use sfu_media_core::prelude::*;
use sfu_media_core::Error;
use sfu_rtp_core::NtpTimestamp;

const MEDIA: u32 = 0x1000;
const RTX: u32 = 0x2000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn spawn(config: SourceGroupConfig) -> SourceGroupHandle {
    let group = IncomingSourceGroup::new(config, MEDIA, Some(RTX), None).unwrap();
    let (handle, _task) = SourceGroupHandle::spawn(group, MediaClock::new());
    handle
}

fn media(handle: &SourceGroupHandle, seq: u16) -> RtpPacket {
    RtpPacket::new(MEDIA, seq, u32::from(seq) * 3000, handle.clock().now_ms())
        .with_clock_rate(90_000)
        .with_payload(vec![0x33; 200])
}

async fn next_batch(rx: &mut tokio::sync::mpsc::UnboundedReceiver<SourceGroupEvent>) -> Vec<u16> {
    match rx.recv().await {
        Some(SourceGroupEvent::Packets(batch)) => {
            batch.iter().map(|packet| packet.seq_num()).collect()
        }
        other => panic!("expected packets, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn retransmission_fills_gap_before_deadline() {
    init_tracing();
    let handle = spawn(SourceGroupConfig::video());
    let (listener, mut rx) = ChannelListener::new();
    handle.add_listener(listener.clone());
    handle.start();

    handle.add_packet(media(&handle, 1)).await.unwrap();
    assert_eq!(next_batch(&mut rx).await, vec![1]);

    handle.add_packet(media(&handle, 3)).await.unwrap();
    assert_eq!(handle.get_nacks().await.unwrap(), vec![NackField::new(2, 0)]);

    tokio::time::sleep(Duration::from_millis(30)).await;
    let rtx = RtpPacket::new(RTX, 9, 6000, handle.clock().now_ms())
        .with_payload(vec![0x00, 0x02, 0x33, 0x33]);
    assert_eq!(handle.add_packet(rtx).await.unwrap(), PacketAdmission::Queued { lost: 0 });

    assert_eq!(next_batch(&mut rx).await, vec![2, 3]);
    assert_eq!(handle.clock().now_ms(), 30);
}

#[tokio::test(start_paused = true)]
async fn rtt_probe_adjusts_wait_window() {
    init_tracing();
    let handle = spawn(SourceGroupConfig::video());
    let (listener, mut rx) = ChannelListener::new();
    handle.add_listener(listener.clone());
    handle.start();

    handle.add_packet(media(&handle, 40)).await.unwrap();
    next_batch(&mut rx).await;

    assert_eq!(
        handle.add_packet(media(&handle, 42)).await.unwrap(),
        PacketAdmission::Queued { lost: 1 }
    );
    let probe_seq = handle.set_rtt_rtx().await.unwrap().unwrap();
    assert_eq!(probe_seq, 42);

    tokio::time::sleep(Duration::from_millis(80)).await;
    let probe =
        RtpPacket::new(RTX, 1, 0, handle.clock().now_ms()).with_payload(vec![0x00, 42, 0x01]);
    assert_eq!(handle.add_packet(probe).await.unwrap(), PacketAdmission::Probe { rtt: 80 });
    assert_eq!(handle.stats().await.unwrap().rtt, Some(80));

    // Wait window grew to 240ms, measured from the arrival of 42
    let start = handle.clock().now_ms();
    assert_eq!(next_batch(&mut rx).await, vec![42]);
    assert_eq!(handle.clock().now_ms() - start, 160);
}

#[tokio::test(start_paused = true)]
async fn reports_and_bye() {
    init_tracing();
    let handle = spawn(SourceGroupConfig::video());
    let (listener, mut rx) = ChannelListener::new();
    handle.add_listener(listener.clone());
    handle.start();

    handle.sender_report(SenderReportInfo::new(MEDIA, NtpTimestamp::from_millis(50_000), 0));
    for seq in [1u16, 2, 3, 5] {
        handle.add_packet(media(&handle, seq)).await.unwrap();
    }

    let blocks = handle.create_reports().await.unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].highest_seq, 5);
    assert_eq!(blocks[0].cumulative_lost, 1);
    assert_eq!(blocks[0].fraction_lost, 51);

    handle.bye(MEDIA);
    loop {
        match rx.recv().await {
            Some(SourceGroupEvent::Bye) => break,
            Some(SourceGroupEvent::Packets(_)) => continue,
            other => panic!("expected bye, got {:?}", other),
        }
    }
    assert!(handle.get_nacks().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn mute_and_override() {
    init_tracing();
    let handle = spawn(SourceGroupConfig::audio());
    let (listener, mut rx) = ChannelListener::new();
    handle.add_listener(listener.clone());
    handle.set_max_wait_time(Some(0));
    handle.start();

    handle.mute(true);
    handle.add_packet(media(&handle, 1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(rx.try_recv().is_err());

    handle.mute(false);
    handle.add_packet(media(&handle, 3)).await.unwrap();
    assert_eq!(next_batch(&mut rx).await, vec![3]);
}

#[tokio::test(start_paused = true)]
async fn stop_is_final() {
    init_tracing();
    let handle = spawn(SourceGroupConfig::default());
    let (listener, mut rx) = ChannelListener::new();
    let listener: Arc<dyn RtpListener> = listener;
    handle.add_listener(listener.clone());
    handle.start();

    handle.stop().await.unwrap();
    assert!(matches!(rx.recv().await, Some(SourceGroupEvent::Ended)));

    assert!(handle.stop().await.is_ok());
    assert_eq!(handle.stats().await, Err(Error::GroupStopped));
    assert_eq!(handle.remove_listener(listener).await, Err(Error::GroupStopped));
    // Fire and forget requests are dropped silently
    handle.start();
    handle.set_rtt(100);
}
