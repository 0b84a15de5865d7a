//! Source group worker task
//!
//! An [`IncomingSourceGroup`] has no locks, so it lives on exactly one tokio
//! task. [`SourceGroupHandle`] is the cloneable front end other tasks use: each
//! call becomes a command on an ordered channel. Mutations that may not block
//! are sent and forgotten; calls that return a value, and the destructive
//! ones (remove listener, stop), wait for the task to acknowledge them.
//!
//! The task exits once a started group is stopped or every handle is dropped.

use std::future;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep_until;
use tracing::{debug, info, trace};

use sfu_rtp_core::{
    NackField, RtcpReportBlock, RtpPacket, RtpSequenceNumber, RtpSsrc, SenderReportInfo,
};

use super::listener::RtpListener;
use super::source_group::{GroupState, IncomingSourceGroup, PacketAdmission, SourceGroupStats};
use crate::clock::MediaClock;
use crate::error::{Error, Result};

enum Command {
    AddListener(Arc<dyn RtpListener>),
    RemoveListener(Arc<dyn RtpListener>, oneshot::Sender<bool>),
    AddPacket(RtpPacket, oneshot::Sender<PacketAdmission>),
    SetMaxWaitTime(Option<u64>),
    SetRtt(u64),
    SetRttRtx(oneshot::Sender<Option<RtpSequenceNumber>>),
    SetRemoteBitrateEstimation(u64),
    Mute(bool),
    Start,
    SenderReport(SenderReportInfo),
    Bye(RtpSsrc),
    CreateReports(oneshot::Sender<Vec<RtcpReportBlock>>),
    GetNacks(oneshot::Sender<Vec<NackField>>),
    AddPli(oneshot::Sender<bool>),
    Stats(oneshot::Sender<SourceGroupStats>),
    Stop(oneshot::Sender<()>),
}

/// Handle to a source group running on its own task
#[derive(Debug, Clone)]
pub struct SourceGroupHandle {
    tx: mpsc::UnboundedSender<Command>,
    clock: MediaClock,
}

impl SourceGroupHandle {
    /// Move a group onto a new task
    ///
    /// Packet arrival times must be stamped with `clock`.
    pub fn spawn(group: IncomingSourceGroup, clock: MediaClock) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(group, rx, clock));
        (Self { tx, clock }, task)
    }

    /// Clock the group reads time from
    pub fn clock(&self) -> MediaClock {
        self.clock
    }

    /// Whether the task has exited
    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            trace!("Source group stopped, dropping command");
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(command(reply))?;
        Ok(rx.await?)
    }

    /// Register a listener
    pub fn add_listener(&self, listener: Arc<dyn RtpListener>) {
        self.send(Command::AddListener(listener));
    }

    /// Unregister a listener
    ///
    /// Once this returns, the listener receives no further callbacks.
    pub async fn remove_listener(&self, listener: Arc<dyn RtpListener>) -> Result<bool> {
        self.request(|reply| Command::RemoveListener(listener, reply)).await
    }

    /// Hand a received packet to the group
    pub async fn add_packet(&self, packet: RtpPacket) -> Result<PacketAdmission> {
        self.request(|reply| Command::AddPacket(packet, reply)).await
    }

    /// Pin or unpin the jitter buffer wait time
    pub fn set_max_wait_time(&self, wait: Option<u64>) {
        self.send(Command::SetMaxWaitTime(wait));
    }

    /// Update the round trip time
    pub fn set_rtt(&self, rtt: u64) {
        self.send(Command::SetRtt(rtt));
    }

    /// Arm an RTT probe, returning the sequence number to retransmit
    pub async fn set_rtt_rtx(&self) -> Result<Option<RtpSequenceNumber>> {
        self.request(Command::SetRttRtx).await
    }

    /// Store the latest remote bitrate estimate
    pub fn set_remote_bitrate_estimation(&self, bitrate: u64) {
        self.send(Command::SetRemoteBitrateEstimation(bitrate));
    }

    /// Stop or resume delivery
    pub fn mute(&self, muted: bool) {
        self.send(Command::Mute(muted));
    }

    /// Start dispatching
    pub fn start(&self) {
        self.send(Command::Start);
    }

    /// Forward a sender report
    pub fn sender_report(&self, sr: SenderReportInfo) {
        self.send(Command::SenderReport(sr));
    }

    /// Forward an RTCP BYE
    pub fn bye(&self, ssrc: RtpSsrc) {
        self.send(Command::Bye(ssrc));
    }

    /// Receiver report blocks for the media and RTX sources
    pub async fn create_reports(&self) -> Result<Vec<RtcpReportBlock>> {
        self.request(Command::CreateReports).await
    }

    /// NACK fields for the packets currently missing
    pub async fn get_nacks(&self) -> Result<Vec<NackField>> {
        self.request(Command::GetNacks).await
    }

    /// Account a PLI, returning whether it should be sent
    pub async fn add_pli(&self) -> Result<bool> {
        self.request(Command::AddPli).await
    }

    /// Statistics published by the last dispatch
    pub async fn stats(&self) -> Result<SourceGroupStats> {
        self.request(Command::Stats).await
    }

    /// Stop the group and wait for the task to finish with it
    ///
    /// Every listener got its end notification when this returns. Stopping
    /// an already stopped group succeeds. A group that was never started
    /// ignores the stop and its task keeps running.
    pub async fn stop(&self) -> Result<()> {
        match self.request(Command::Stop).await {
            Err(Error::GroupStopped) => Ok(()),
            other => other,
        }
    }
}

async fn wait_deadline(deadline: Option<u64>, clock: MediaClock) {
    match deadline {
        Some(ms) => sleep_until(clock.instant_at(ms)).await,
        None => future::pending().await,
    }
}

async fn run(
    mut group: IncomingSourceGroup,
    mut rx: mpsc::UnboundedReceiver<Command>,
    clock: MediaClock,
) {
    debug!("Source group task running [media:{}]", group.media().ssrc);

    loop {
        // Re-armed every iteration, so a reschedule always replaces the wake-up
        let deadline = group.deadline();

        tokio::select! {
            command = rx.recv() => {
                let Some(command) = command else {
                    debug!(
                        "All handles dropped, stopping source group [media:{}]",
                        group.media().ssrc
                    );
                    group.stop();
                    break;
                };
                if !handle(&mut group, command, clock.now_ms()) {
                    break;
                }
            }
            _ = wait_deadline(deadline, clock) => {
                group.dispatch(clock.now_ms());
            }
        }
    }

    info!("Source group task finished [media:{}]", group.media().ssrc);
}

/// Apply one command, returning `false` once the group has ended
fn handle(group: &mut IncomingSourceGroup, command: Command, now: u64) -> bool {
    // A dropped reply receiver only means the caller stopped waiting
    match command {
        Command::AddListener(listener) => {
            group.add_listener(&listener);
        }
        Command::RemoveListener(listener, reply) => {
            let _ = reply.send(group.remove_listener(&listener));
        }
        Command::AddPacket(packet, reply) => {
            let _ = reply.send(group.receive(packet, now));
        }
        Command::SetMaxWaitTime(wait) => group.set_max_wait_time(wait, now),
        Command::SetRtt(rtt) => group.set_rtt(rtt, now),
        Command::SetRttRtx(reply) => {
            let _ = reply.send(group.set_rtt_rtx(now));
        }
        Command::SetRemoteBitrateEstimation(bitrate) => {
            group.set_remote_bitrate_estimation(bitrate);
        }
        Command::Mute(muted) => group.mute(muted),
        Command::Start => group.start(now),
        Command::SenderReport(sr) => group.process_sender_report(now, &sr),
        Command::Bye(ssrc) => group.bye(ssrc),
        Command::CreateReports(reply) => {
            let _ = reply.send(group.create_reports(now));
        }
        Command::GetNacks(reply) => {
            let _ = reply.send(group.get_nacks(now));
        }
        Command::AddPli(reply) => {
            let _ = reply.send(group.add_pli(now));
        }
        Command::Stats(reply) => {
            group.update(now);
            let _ = reply.send(group.stats().clone());
        }
        Command::Stop(reply) => {
            group.stop();
            let _ = reply.send(());
            return group.state() != GroupState::Ended;
        }
    }
    true
}
