//! Integration tests for `BoksClient` transaction handling.
//!
//! Each test drives a real client against a `RecordingTransport`: commands
//! are written through the public API and device replies are injected as
//! raw frames, exactly as a BLE stack would deliver them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use boks_client::application::diagnostics::{LogEvent, MemorySink};
use boks_client::application::transaction::TransactionStatus;
use boks_client::infrastructure::transport::RecordingTransport;
use boks_client::{BoksClient, ClientError, ClientTimeouts, Expect};
use boks_core::protocol::commands::{AskDoorStatus, CountCodes, CreateSingleUseCode, OpenDoor};
use boks_core::protocol::history::{
    CodeKeyValidHistory, DoorOpenHistory, HistoryCode, HistoryHeader,
};
use boks_core::protocol::notifications::{
    AnswerDoorStatus, EndHistory, ErrorUnauthorized, NotifyCodesCount, NotifyDoorStatus,
    OperationError, OperationSuccess, ValidOpenCode,
};
use boks_core::{Opcode, Packet};
use tokio_test::{assert_err, assert_ok};

// ── Helpers ───────────────────────────────────────────────────────────────────

struct Harness {
    transport: Arc<RecordingTransport>,
    sink: Arc<MemorySink>,
    client: Arc<BoksClient>,
}

async fn connected() -> Harness {
    let transport = Arc::new(RecordingTransport::new());
    let sink = Arc::new(MemorySink::new());
    let client = Arc::new(BoksClient::with_timeouts(
        transport.clone(),
        sink.clone(),
        ClientTimeouts::default(),
    ));
    assert_ok!(client.connect().await);
    Harness {
        transport,
        sink,
        client,
    }
}

fn door_status() -> Expect {
    Expect::new([Opcode::AnswerDoorStatus])
}

fn frame(packet: impl Into<Packet>) -> Vec<u8> {
    packet.into().encode().unwrap()
}

fn history_header(age_secs: u32) -> HistoryHeader {
    HistoryHeader::at(age_secs, std::time::SystemTime::now())
}

// ── Single-flight ─────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_second_command_is_written_only_after_first_resolves() {
    // Arrange
    let h = connected().await;
    let first = {
        let client = h.client.clone();
        tokio::spawn(async move { client.execute(AskDoorStatus.into(), door_status()).await })
    };
    h.transport.wait_for_writes(1).await;

    let second = {
        let client = h.client.clone();
        tokio::spawn(async move {
            client
                .execute(CountCodes.into(), Expect::new([Opcode::NotifyCodesCount]))
                .await
        })
    };

    // Act: give the second task every chance to jump the queue
    tokio::time::sleep(Duration::from_millis(100)).await;
    let writes_while_first_pending = h.transport.written_opcodes();
    assert_ok!(h.transport.inject_packet(AnswerDoorStatus { inverted: 0, raw: 1 }));
    h.transport.wait_for_writes(2).await;
    assert_ok!(h.transport.inject_packet(NotifyCodesCount {
        master: 2,
        other: 10
    }));

    // Assert
    assert_eq!(writes_while_first_pending, [0x02]);
    let first = assert_ok!(first.await.unwrap());
    let second = assert_ok!(second.await.unwrap());
    assert_eq!(first.response().map(Packet::opcode), Some(Opcode::AnswerDoorStatus));
    assert_eq!(second.response().map(Packet::opcode), Some(Opcode::NotifyCodesCount));
    assert_eq!(h.transport.written_opcodes(), [0x02, 0x14]);
}

#[tokio::test]
async fn test_reply_delivered_during_write_is_not_missed() {
    // Arrange: the transport answers synchronously from inside write()
    let h = connected().await;
    h.transport
        .respond_with(|_| vec![frame(AnswerDoorStatus { inverted: 0, raw: 1 })]);

    // Act
    let tx = assert_ok!(h.client.execute(AskDoorStatus.into(), door_status()).await);

    // Assert
    assert_eq!(tx.status(), TransactionStatus::Success);
    assert!(!h.client.is_busy());
}

#[tokio::test]
async fn test_send_does_not_wait_for_a_reply() {
    let h = connected().await;

    assert_ok!(h.client.send(OpenDoor::new("123456").unwrap().into()).await);

    assert_eq!(h.transport.written_opcodes(), [0x01]);
    assert_eq!(
        h.sink.named("send"),
        [LogEvent::Send {
            opcode: Opcode::OpenDoor,
            length: 9
        }]
    );
}

// ── Timeouts ──────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_timeout_clears_pending_and_late_reply_resolves_nothing() {
    // Arrange
    let h = connected().await;
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let _sub = h.client.on_packet(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    // Act
    let err = assert_err!(
        h.client
            .execute(
                AskDoorStatus.into(),
                door_status().with_timeout(Duration::from_millis(100)),
            )
            .await
    );
    assert_ok!(h.transport.inject_packet(AnswerDoorStatus { inverted: 0, raw: 1 }));

    // Assert
    assert_eq!(
        err,
        ClientError::Timeout {
            opcode: Opcode::AskDoorStatus
        }
    );
    assert!(err.to_string().contains("timed out"));
    assert!(!h.client.is_busy());
    assert_eq!(seen.load(Ordering::SeqCst), 1, "listeners still see the late reply");
}

#[tokio::test(start_paused = true)]
async fn test_late_reply_does_not_resolve_the_next_command() {
    // Arrange: the first command times out, its reply arrives during the second
    let h = connected().await;
    assert_err!(
        h.client
            .execute(
                AskDoorStatus.into(),
                door_status().with_timeout(Duration::from_millis(50)),
            )
            .await
    );
    let second = {
        let client = h.client.clone();
        tokio::spawn(async move {
            client
                .execute(CountCodes.into(), Expect::new([Opcode::NotifyCodesCount]))
                .await
        })
    };
    h.transport.wait_for_writes(2).await;

    // Act
    assert_ok!(h.transport.inject_packet(AnswerDoorStatus { inverted: 0, raw: 1 }));
    assert_ok!(h.transport.inject_packet(NotifyCodesCount {
        master: 1,
        other: 0
    }));

    // Assert
    let tx = assert_ok!(second.await.unwrap());
    assert_eq!(tx.response().map(Packet::opcode), Some(Opcode::NotifyCodesCount));
    assert_eq!(tx.intermediates().len(), 1);
    assert_eq!(tx.intermediates()[0].opcode(), Opcode::AnswerDoorStatus);
}

#[tokio::test(start_paused = true)]
async fn test_configured_command_timeout_applies_by_default() {
    let transport = Arc::new(RecordingTransport::new());
    let client = BoksClient::with_timeouts(
        transport,
        Arc::new(MemorySink::new()),
        ClientTimeouts {
            command: Duration::from_millis(300),
            ..ClientTimeouts::default()
        },
    );
    assert_ok!(client.connect().await);
    let started = tokio::time::Instant::now();

    assert_err!(client.execute(AskDoorStatus.into(), door_status()).await);

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_secs(1));
}

// ── Error opcodes ─────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_dropped_execute_releases_the_pending_expectation() {
    // Arrange
    let h = connected().await;
    let expect = door_status().with_timeout(Duration::from_secs(5));

    // Act: the caller gives up long before the command timeout
    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        h.client.execute(AskDoorStatus.into(), expect),
    )
    .await;

    // Assert
    assert!(abandoned.is_err());
    assert!(!h.client.is_busy());

    // A late reply is not collected by anyone, and the next command runs clean.
    h.transport.inject(&frame(AnswerDoorStatus { inverted: 0, raw: 1 }));
    assert!(!h.client.is_busy());
    h.transport
        .respond_with(|_| vec![frame(AnswerDoorStatus { inverted: 1, raw: 0 })]);
    let tx = assert_ok!(h.client.execute(AskDoorStatus.into(), door_status()).await);
    assert!(tx.intermediates().is_empty());
    assert_eq!(h.transport.written_opcodes(), [0x02, 0x02]);
}

#[tokio::test]
async fn test_error_opcode_rejects_with_that_opcode() {
    // Arrange
    let h = connected().await;
    h.transport.respond_with(|_| vec![frame(ErrorUnauthorized)]);
    let request = CreateSingleUseCode::new("AABBCCDD", "123456").unwrap();
    let expect = Expect::new([Opcode::OperationSuccess])
        .or_error([Opcode::OperationError, Opcode::ErrorUnauthorized]);

    // Act
    let err = assert_err!(h.client.execute(request.into(), expect).await);

    // Assert
    assert_eq!(
        err,
        ClientError::Rejected {
            opcode: Opcode::ErrorUnauthorized
        }
    );
    assert_eq!(err.id(), "REJECTED");
    assert!(!h.client.is_busy());
    assert!(h
        .sink
        .named("error")
        .iter()
        .any(|e| matches!(e, LogEvent::Error { opcode: Some(Opcode::ErrorUnauthorized), .. })));
}

#[tokio::test]
async fn test_unrelated_packets_become_intermediates() {
    let h = connected().await;
    h.transport.respond_with(|_| {
        vec![
            frame(NotifyDoorStatus { inverted: 0, raw: 1 }),
            frame(OperationSuccess),
        ]
    });

    let tx = assert_ok!(
        h.client
            .execute(
                OpenDoor::new("123456").unwrap().into(),
                Expect::new([Opcode::OperationSuccess, Opcode::ValidOpenCode])
                    .or_error([Opcode::OperationError]),
            )
            .await
    );

    let opcodes: Vec<Opcode> = tx.all_packets().iter().map(|p| p.opcode()).collect();
    assert_eq!(
        opcodes,
        [Opcode::OpenDoor, Opcode::NotifyDoorStatus, Opcode::OperationSuccess]
    );
}

// ── History ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_history_collects_events_until_end_marker() {
    // Arrange
    let h = connected().await;
    h.transport.respond_with(|_| {
        vec![
            frame(DoorOpenHistory {
                header: history_header(60),
            }),
            frame(NotifyDoorStatus { inverted: 1, raw: 0 }),
            frame(CodeKeyValidHistory {
                header: history_header(30),
                code: HistoryCode::try_from("1234AB").unwrap(),
            }),
            frame(EndHistory),
        ]
    });

    // Act
    let events = assert_ok!(h.client.fetch_history(None).await);

    // Assert
    let opcodes: Vec<Opcode> = events.iter().map(Packet::opcode).collect();
    assert_eq!(
        opcodes,
        [Opcode::DoorOpenHistory, Opcode::CodeKeyValidHistory]
    );
    assert_eq!(h.transport.written_opcodes(), [0x03]);
}

#[tokio::test(start_paused = true)]
async fn test_history_timer_rearms_on_every_packet() {
    // Arrange: 3 s of total traffic against a 2 s per-packet timeout
    let h = connected().await;
    let download = {
        let client = h.client.clone();
        tokio::spawn(async move { client.fetch_history(Duration::from_secs(2)).await })
    };
    h.transport.wait_for_writes(1).await;

    // Act
    for age in [90, 80] {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_ok!(h.transport.inject_packet(DoorOpenHistory {
            header: history_header(age)
        }));
    }
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_ok!(h.transport.inject_packet(EndHistory));

    // Assert
    let events = assert_ok!(download.await.unwrap());
    assert_eq!(events.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_history_times_out_when_the_gap_is_too_long() {
    let h = connected().await;
    let download = {
        let client = h.client.clone();
        tokio::spawn(async move { client.fetch_history(Duration::from_secs(2)).await })
    };
    h.transport.wait_for_writes(1).await;

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_ok!(h.transport.inject_packet(DoorOpenHistory {
        header: history_header(5)
    }));
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let err = assert_err!(download.await.unwrap());
    assert_eq!(
        err,
        ClientError::Timeout {
            opcode: Opcode::RequestLogs
        }
    );
}

// ── Inbound dispatch ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_checksum_failure_is_reported_and_dropped() {
    // Arrange
    let h = connected().await;
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let _sub = h.client.on_packet(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    // Act
    h.transport.inject(&[0x02, 0x00, 0xFF]);

    // Assert
    assert_eq!(
        h.sink.events(),
        [LogEvent::ChecksumError {
            opcode: 0x02,
            expected: 0x02,
            received: 0xFF
        }]
    );
    assert_eq!(seen.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_opcode_is_ignored_silently() {
    let h = connected().await;
    h.transport.inject(&[0xFE, 0x00, 0xFE]);
    assert!(h.sink.events().is_empty());
}

#[tokio::test]
async fn test_panicking_listener_does_not_affect_others() {
    // Arrange
    let h = connected().await;
    let _bad = h.client.on_packet(|_| panic!("listener exploded"));
    let received = Arc::new(Mutex::new(Vec::new()));
    let log = received.clone();
    let _good = h.client.on_packet(move |p| log.lock().unwrap().push(p.opcode()));

    // Act
    assert_ok!(h.transport.inject_packet(ValidOpenCode));

    // Assert
    assert_eq!(*received.lock().unwrap(), [Opcode::ValidOpenCode]);
    assert_eq!(
        h.sink.named("listener_error"),
        [LogEvent::ListenerError {
            opcode: Opcode::ValidOpenCode,
            error: "listener exploded".into()
        }]
    );
}

#[tokio::test]
async fn test_once_listener_and_unsubscribe() {
    let h = connected().await;
    let once_hits = Arc::new(AtomicUsize::new(0));
    let persistent_hits = Arc::new(AtomicUsize::new(0));
    let (a, b) = (once_hits.clone(), persistent_hits.clone());
    let _once = h.client.once(move |_| {
        a.fetch_add(1, Ordering::SeqCst);
    });
    let persistent = h.client.on_packet(move |_| {
        b.fetch_add(1, Ordering::SeqCst);
    });

    assert_ok!(h.transport.inject_packet(OperationSuccess));
    assert_ok!(h.transport.inject_packet(OperationSuccess));
    persistent.unsubscribe();
    assert_ok!(h.transport.inject_packet(OperationSuccess));

    assert_eq!(once_hits.load(Ordering::SeqCst), 1);
    assert_eq!(persistent_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_packet_resolves_independently_of_the_queue() {
    let h = connected().await;
    let waiter = {
        let client = h.client.clone();
        tokio::spawn(async move {
            client
                .wait_for_packet(Opcode::NotifyDoorStatus, Duration::from_secs(1))
                .await
        })
    };
    tokio::task::yield_now().await;

    assert_ok!(h.transport.inject_packet(OperationError { error_code: 1 }));
    assert_ok!(h.transport.inject_packet(NotifyDoorStatus { inverted: 0, raw: 1 }));

    let packet = assert_ok!(waiter.await.unwrap());
    assert_eq!(packet.opcode(), Opcode::NotifyDoorStatus);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_packet_times_out_with_the_awaited_opcode() {
    let h = connected().await;

    let err = assert_err!(
        h.client
            .wait_for_packet(Opcode::NfcTagFound, Duration::from_millis(500))
            .await
    );

    assert_eq!(
        err,
        ClientError::Timeout {
            opcode: Opcode::NfcTagFound
        }
    );
}

// ── Connection ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_disconnect_requires_reconnect() {
    let h = connected().await;

    assert_ok!(h.client.disconnect().await);
    let err = assert_err!(h.client.send(AskDoorStatus.into()).await);

    assert_eq!(err, ClientError::NotConnected);
    assert!(!h.transport.is_connected());
}

#[tokio::test]
async fn test_failed_write_surfaces_as_write_failure() {
    let transport = Arc::new(RecordingTransport::failing_writes());
    let client = BoksClient::new(transport);
    assert_ok!(client.connect().await);

    let err = assert_err!(client.execute(AskDoorStatus.into(), door_status()).await);

    assert_eq!(err.id(), "WRITE_FAILURE");
    assert!(!client.is_busy());
}
