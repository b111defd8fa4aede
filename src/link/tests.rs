//! Supervisor tests against the loopback transport
//!
//! Run on tokio's paused clock so handshake timeouts and reconnect delays
//! elapse instantly whenever every task is idle.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::codec::{self, Command};
use crate::config::{LinkConfig, ReconnectPolicy};
use crate::sink::{ChannelSink, DeliveredFrame};
use crate::test_utils::{emg_bytes, frame_run, multichannel_bytes, timestamp_bytes};
use crate::transports::{LoopbackPeripheral, loopback};
use crate::types::{ConnectionPhase, DeviceId, LinkStatus};

struct Harness {
    peripheral: LoopbackPeripheral,
    frames: mpsc::Receiver<DeliveredFrame>,
    status: watch::Receiver<LinkStatus>,
    cancel: CancellationToken,
    task: JoinHandle<SupervisorExit>,
}

fn test_config() -> LinkConfig {
    LinkConfig {
        reconnect: ReconnectPolicy { max_attempts: 3, ..ReconnectPolicy::default() },
        ..LinkConfig::default()
    }
}

fn spawn_supervisor(config: LinkConfig) -> Harness {
    spawn_with_sink_capacity(config, 64)
}

fn spawn_with_sink_capacity(config: LinkConfig, capacity: usize) -> Harness {
    let _ = tracing_subscriber::fmt::try_init();
    let (transport, peripheral) = loopback();
    let (sink, frames) = ChannelSink::new(capacity);
    let (supervisor, status) =
        LinkSupervisor::new(DeviceId::new("b0:b1:13:2d:b4:01"), transport, Arc::new(config), Arc::new(sink));
    let cancel = CancellationToken::new();
    let task = tokio::spawn(supervisor.run(cancel.clone()));
    Harness { peripheral, frames, status, cancel, task }
}

async fn expect_command(peripheral: &mut LoopbackPeripheral, command: Command) {
    let written = peripheral.next_command().await.expect("transport alive");
    assert_eq!(written, vec![command.byte()], "expected {command:?}");
}

/// Answer the next HELLO with an acknowledgment and wait for the host's ACK.
async fn complete_handshake(peripheral: &mut LoopbackPeripheral, sequence: u16) {
    expect_command(peripheral, Command::Hello).await;
    assert!(peripheral.notify(codec::encode_handshake(sequence).to_vec()));
    expect_command(peripheral, Command::Ack).await;
}

#[tokio::test(start_paused = true)]
async fn frames_are_delivered_in_order_across_fragments() {
    let mut h = spawn_supervisor(test_config());
    complete_handshake(&mut h.peripheral, 0).await;

    let stream = frame_run(1, 6);
    for chunk in stream.chunks(5) {
        assert!(h.peripheral.notify(chunk.to_vec()));
    }

    for expected in 1..=6u16 {
        let delivered = h.frames.recv().await.expect("frame delivered");
        assert_eq!(delivered.frame.sequence(), expected);
        assert_eq!(delivered.device.as_str(), "b0:b1:13:2d:b4:01");
    }

    let status = *h.status.borrow();
    assert_eq!(status.phase, ConnectionPhase::Synced);
    assert_eq!(status.sequence, 7);
    assert_eq!(status.frames_delivered, 6);
    assert_eq!(status.faults, 0);

    h.cancel.cancel();
    assert_eq!(h.task.await.unwrap(), SupervisorExit::Stopped);
}

#[tokio::test(start_paused = true)]
async fn data_in_ack_notification_is_not_lost() {
    let mut h = spawn_supervisor(test_config());
    expect_command(&mut h.peripheral, Command::Hello).await;

    let mut chunk = codec::encode_handshake(0).to_vec();
    chunk.extend(emg_bytes(1, -7));
    assert!(h.peripheral.notify(chunk));
    expect_command(&mut h.peripheral, Command::Ack).await;

    let delivered = h.frames.recv().await.expect("frame delivered");
    assert_eq!(delivered.frame.sequence(), 1);
    h.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn sequence_gap_forces_reset_and_resync() {
    let mut h = spawn_supervisor(test_config());
    complete_handshake(&mut h.peripheral, 0).await;

    assert!(h.peripheral.notify(multichannel_bytes(5, [1, 2, 3, 4, 5, 6])));
    expect_command(&mut h.peripheral, Command::Reset).await;

    let status = *h.status.borrow();
    assert_eq!(status.phase, ConnectionPhase::ResetPending);
    assert_eq!(status.faults, 1);
    assert_eq!(status.resets, 1);
    assert_eq!(status.sequence, 0);
    assert_eq!(status.frames_delivered, 0);

    // Firmware restarts numbering after RESET
    complete_handshake(&mut h.peripheral, 0).await;
    assert!(h.peripheral.notify(timestamp_bytes(1, 1_700_000_000)));
    let delivered = h.frames.recv().await.expect("frame after resync");
    assert_eq!(delivered.frame.sequence(), 1);
    assert_eq!(h.peripheral.connect_count(), 2);

    h.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn checksum_fault_keeps_earlier_frames() {
    let mut h = spawn_supervisor(test_config());
    complete_handshake(&mut h.peripheral, 0).await;

    let mut chunk = emg_bytes(1, 10);
    let mut corrupt = emg_bytes(2, 11);
    corrupt[5] ^= 0x01;
    chunk.extend(corrupt);
    assert!(h.peripheral.notify(chunk));

    expect_command(&mut h.peripheral, Command::Reset).await;
    let delivered = h.frames.recv().await.expect("valid frame delivered");
    assert_eq!(delivered.frame.sequence(), 1);
    assert!(h.frames.try_recv().is_err());
    h.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn thirty_silent_hellos_force_exactly_one_reset() {
    let mut h = spawn_supervisor(test_config());

    for _ in 0..30 {
        expect_command(&mut h.peripheral, Command::Hello).await;
    }
    expect_command(&mut h.peripheral, Command::Reset).await;
    expect_command(&mut h.peripheral, Command::Hello).await;

    let status = *h.status.borrow();
    assert_eq!(status.resets, 1);
    assert_eq!(status.phase, ConnectionPhase::Handshaking);
    assert_eq!(h.peripheral.connect_count(), 2);

    // Probing resumes normally after the forced reset
    assert!(h.peripheral.notify(codec::encode_handshake(0).to_vec()));
    expect_command(&mut h.peripheral, Command::Ack).await;
    h.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn disconnect_reconnects_then_resets() {
    let mut h = spawn_supervisor(test_config());
    complete_handshake(&mut h.peripheral, 0).await;
    assert!(h.peripheral.notify(emg_bytes(1, 1)));
    h.frames.recv().await.expect("frame before drop");

    h.peripheral.drop_link();

    expect_command(&mut h.peripheral, Command::Reset).await;
    let status = *h.status.borrow();
    assert_eq!(status.reconnects, 1);
    assert_eq!(status.sequence, 0);
    assert_eq!(h.peripheral.connect_count(), 2);

    complete_handshake(&mut h.peripheral, 0).await;
    assert!(h.peripheral.notify(emg_bytes(1, 2)));
    let delivered = h.frames.recv().await.expect("frame after reconnect");
    assert_eq!(delivered.frame.sequence(), 1);
    h.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn unreachable_after_reconnect_cap() {
    let _ = tracing_subscriber::fmt::try_init();
    let (transport, peripheral) = loopback();
    peripheral.fail_next_connects(3);
    let (sink, _frames) = ChannelSink::new(4);
    let (supervisor, status) =
        LinkSupervisor::new(DeviceId::new("aa"), transport, Arc::new(test_config()), Arc::new(sink));

    let exit = supervisor.run(CancellationToken::new()).await;

    assert_eq!(exit, SupervisorExit::Unreachable { attempts: 3 });
    assert_eq!(status.borrow().phase, ConnectionPhase::Unreachable);
    assert_eq!(peripheral.connect_count(), 3);
    // One teardown before each retry, one on exit
    assert_eq!(peripheral.disconnect_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn cancel_interrupts_handshake_wait() {
    let mut h = spawn_supervisor(test_config());
    expect_command(&mut h.peripheral, Command::Hello).await;

    h.cancel.cancel();
    let exit = h.task.await.unwrap();

    assert_eq!(exit, SupervisorExit::Stopped);
    assert_eq!(h.status.borrow().phase, ConnectionPhase::Stopped);
    assert!(!h.peripheral.is_connected());
}

#[tokio::test(start_paused = true)]
async fn late_reply_to_earlier_hello_is_ignored() {
    let mut h = spawn_supervisor(test_config());
    expect_command(&mut h.peripheral, Command::Hello).await;
    expect_command(&mut h.peripheral, Command::Hello).await;

    assert!(h.peripheral.notify(codec::encode_handshake(0).to_vec()));
    expect_command(&mut h.peripheral, Command::Ack).await;

    // The reply to the first HELLO arrives after sync, followed by data
    assert!(h.peripheral.notify(codec::encode_handshake(0).to_vec()));
    assert!(h.peripheral.notify(emg_bytes(1, 5)));

    let delivered = h.frames.recv().await.expect("frame delivered");
    assert_eq!(delivered.frame.sequence(), 1);
    let status = *h.status.borrow();
    assert_eq!(status.phase, ConnectionPhase::Synced);
    assert_eq!(status.faults, 0);
    assert_eq!(status.resets, 0);
    assert_eq!(h.peripheral.written(), b"HHA".to_vec());

    h.cancel.cancel();
    assert_eq!(h.task.await.unwrap(), SupervisorExit::Stopped);
}

#[tokio::test(start_paused = true)]
async fn write_failure_during_handshake_reconnects() {
    let _ = tracing_subscriber::fmt::try_init();
    let (transport, mut peripheral) = loopback();
    peripheral.fail_next_writes(1);
    let (sink, _frames) = ChannelSink::new(4);
    let (supervisor, mut status) =
        LinkSupervisor::new(DeviceId::new("aa"), transport, Arc::new(test_config()), Arc::new(sink));
    let cancel = CancellationToken::new();
    let task = tokio::spawn(supervisor.run(cancel.clone()));

    status.wait_for(|s| s.phase == ConnectionPhase::Reconnecting).await.expect("supervisor alive");

    expect_command(&mut peripheral, Command::Reset).await;
    expect_command(&mut peripheral, Command::Hello).await;
    let current = *status.borrow();
    assert_eq!(current.phase, ConnectionPhase::Handshaking);
    assert_eq!(current.reconnects, 1);
    assert_eq!(current.faults, 0);
    assert_eq!(peripheral.connect_count(), 2);

    cancel.cancel();
    assert_eq!(task.await.unwrap(), SupervisorExit::Stopped);
}

#[tokio::test(start_paused = true)]
async fn frames_refused_by_full_sink_are_counted_as_dropped() {
    let mut h = spawn_with_sink_capacity(test_config(), 1);
    complete_handshake(&mut h.peripheral, 0).await;

    assert!(h.peripheral.notify(frame_run(1, 3)));
    h.status.wait_for(|s| s.sequence == 4).await.expect("supervisor alive");

    let status = *h.status.borrow();
    assert_eq!(status.frames_delivered, 1);
    assert_eq!(status.frames_dropped, 2);
    assert_eq!(status.faults, 0);
    assert_eq!(h.frames.recv().await.expect("first frame").frame.sequence(), 1);

    h.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn transport_receives_address_as_given() {
    let _ = tracing_subscriber::fmt::try_init();
    let (transport, mut peripheral) = loopback();
    let (sink, _frames) = ChannelSink::new(4);
    let device = DeviceId::new("6E400001-B5A3-F393-E0A9-E50E24DCCA9E");
    let (supervisor, _status) = LinkSupervisor::new(device, transport, Arc::new(test_config()), Arc::new(sink));
    let cancel = CancellationToken::new();
    let task = tokio::spawn(supervisor.run(cancel.clone()));

    expect_command(&mut peripheral, Command::Hello).await;
    let connected = peripheral.connected_device().expect("connect attempted");
    assert_eq!(connected.as_str(), "6E400001-B5A3-F393-E0A9-E50E24DCCA9E");

    cancel.cancel();
    task.await.unwrap();
}
