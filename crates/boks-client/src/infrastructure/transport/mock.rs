//! Recording transport for tests and offline tooling.
//!
//! # Why a recording transport?
//!
//! A real BLE link needs an adapter, a powered box within range, and a
//! device that answers on its own schedule.  None of that is available (or
//! deterministic) in a test run.
//!
//! `RecordingTransport` replaces the link with in-memory state:
//!
//! - Every written frame is pushed into a `Mutex<Vec<...>>` so assertions can
//!   inspect exactly what was sent and in what order.
//! - [`inject`](RecordingTransport::inject) plays the device side by feeding
//!   bytes to the subscribed notification callback.
//! - A *responder* can answer writes synchronously, from inside `write`,
//!   which is the harshest ordering a real stack can produce.
//!
//! # Usage in tests
//!
//! ```ignore
//! let transport = Arc::new(RecordingTransport::new());
//! let client = BoksClient::new(transport.clone());
//! client.connect().await?;
//!
//! transport.respond_with(|frame| vec![answer_for(frame)]);
//! client.execute(AskDoorStatus.into(), Expect::new([Opcode::AnswerDoorStatus])).await?;
//! assert_eq!(transport.written_opcodes(), [0x02]);
//! ```
//!
//! # `should_fail_*` flags
//!
//! Set a flag before wrapping the transport in an `Arc` to make the matching
//! operation return [`TransportError::Failed`].  The flags are public but the
//! recording state is not, so outside this module build from `new()` and
//! assign, or use [`failing_writes`](RecordingTransport::failing_writes).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use boks_core::{Packet, ProtocolError};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::application::transport::{NotificationCallback, Transport, TransportError};

type Responder = Box<dyn Fn(&[u8]) -> Vec<Vec<u8>> + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory [`Transport`] that records writes and replays injected frames.
#[derive(Default)]
pub struct RecordingTransport {
    /// Every frame passed to `write`, in order.
    pub writes: Mutex<Vec<Vec<u8>>>,
    /// Characteristic values returned by `read`.
    pub characteristics: Mutex<HashMap<Uuid, Vec<u8>>>,
    /// Fails `connect` when `true`.
    pub should_fail_connect: bool,
    /// Fails `write` when `true`.  The failed frame is not recorded.
    pub should_fail_write: bool,
    /// Fails `subscribe` and `subscribe_to` when `true`.
    pub should_fail_subscribe: bool,
    connected: AtomicBool,
    callback: Mutex<Option<NotificationCallback>>,
    extra_callbacks: Mutex<Vec<(Uuid, NotificationCallback)>>,
    responder: Mutex<Option<Responder>>,
    written: Notify,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose `write` always fails.
    pub fn failing_writes() -> Self {
        Self {
            should_fail_write: true,
            ..Self::default()
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Delivers `frame` to the notification callback, as if the device had
    /// sent it.  Does nothing before `subscribe`.
    pub fn inject(&self, frame: &[u8]) {
        // Clone out of the lock: the callback may write re-entrantly.
        let callback = lock(&self.callback).clone();
        if let Some(callback) = callback {
            callback(frame);
        }
    }

    /// Encodes and injects a packet.
    pub fn inject_packet(&self, packet: impl Into<Packet>) -> Result<(), ProtocolError> {
        let frame = packet.into().encode()?;
        self.inject(&frame);
        Ok(())
    }

    /// Delivers `value` to subscribers of `characteristic`.
    pub fn inject_on(&self, characteristic: Uuid, value: &[u8]) {
        let callbacks: Vec<NotificationCallback> = lock(&self.extra_callbacks)
            .iter()
            .filter(|(uuid, _)| *uuid == characteristic)
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in callbacks {
            callback(value);
        }
    }

    /// Answers every subsequent write with the frames returned by `responder`,
    /// delivered before `write` returns.
    pub fn respond_with(&self, responder: impl Fn(&[u8]) -> Vec<Vec<u8>> + Send + Sync + 'static) {
        *lock(&self.responder) = Some(Box::new(responder));
    }

    pub fn set_characteristic(&self, characteristic: Uuid, value: Vec<u8>) {
        lock(&self.characteristics).insert(characteristic, value);
    }

    /// Snapshot of the written frames.
    pub fn written(&self) -> Vec<Vec<u8>> {
        lock(&self.writes).clone()
    }

    /// Opcode byte of each written frame.
    pub fn written_opcodes(&self) -> Vec<u8> {
        lock(&self.writes)
            .iter()
            .filter_map(|frame| frame.first().copied())
            .collect()
    }

    /// Waits until at least `count` frames have been written.
    pub async fn wait_for_writes(&self, count: usize) {
        loop {
            let notified = self.written.notified();
            if lock(&self.writes).len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.should_fail_connect {
            return Err(TransportError::Failed("simulated connect failure".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        *lock(&self.callback) = None;
        lock(&self.extra_callbacks).clear();
        Ok(())
    }

    async fn write(&self, frame: &[u8]) -> Result<(), TransportError> {
        if self.should_fail_write {
            return Err(TransportError::Failed("simulated write failure".into()));
        }
        lock(&self.writes).push(frame.to_vec());
        self.written.notify_waiters();

        let replies = lock(&self.responder)
            .as_ref()
            .map(|responder| responder(frame))
            .unwrap_or_default();
        for reply in replies {
            self.inject(&reply);
        }
        Ok(())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, TransportError> {
        lock(&self.characteristics)
            .get(&characteristic)
            .cloned()
            .ok_or_else(|| {
                TransportError::Failed(format!("characteristic {characteristic} not found"))
            })
    }

    async fn subscribe(&self, callback: NotificationCallback) -> Result<(), TransportError> {
        if self.should_fail_subscribe {
            return Err(TransportError::Failed("simulated subscribe failure".into()));
        }
        *lock(&self.callback) = Some(callback);
        Ok(())
    }

    async fn subscribe_to(
        &self,
        characteristic: Uuid,
        callback: NotificationCallback,
    ) -> Result<(), TransportError> {
        if self.should_fail_subscribe {
            return Err(TransportError::Failed("simulated subscribe failure".into()));
        }
        lock(&self.extra_callbacks).push((characteristic, callback));
        Ok(())
    }
}
