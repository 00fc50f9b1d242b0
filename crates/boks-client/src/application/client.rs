//! `BoksClient`: the transaction orchestrator.
//!
//! # Overview (for beginners)
//!
//! The device answers commands asynchronously on a notification channel, and
//! it cannot correlate answers with requests: a reply carries no request id.
//! The client therefore runs **one exchange at a time**:
//!
//! 1. `execute` waits for its turn on an async FIFO lock.
//! 2. It installs a *pending expectation* (which opcodes end the exchange
//!    successfully, which end it with an error) **before** writing, so a
//!    reply that arrives while the write is still completing is not missed.
//! 3. Every inbound frame is decoded by [`BoksClient::handle_frame`] and
//!    offered to listeners, to `wait_for_packet` waiters, and finally to the
//!    pending expectation.
//! 4. The exchange ends on a success opcode, an error opcode, or a timeout.
//!    On timeout the expectation is removed, so a late reply is only seen by
//!    listeners and cannot resolve a later exchange.  The same happens when
//!    the caller drops the `execute` future before it settles.
//!
//! History download is the one multi-packet exchange: its timer re-arms on
//! every packet, and it ends when `EndHistory` arrives.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use boks_core::protocol::battery::{parse_battery_level, parse_battery_stats, BatteryStats};
use boks_core::protocol::commands::RequestLogs;
use boks_core::protocol::frame::ChecksumMismatch;
use boks_core::{create_from_frame, Opcode, Packet};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::diagnostics::{DiagnosticSink, LogEvent, TracingSink};
use crate::application::error::ClientError;
use crate::application::transaction::{Transaction, TransactionStatus};
use crate::application::transport::{
    NotificationCallback, Transport, BATTERY_LEVEL_UUID, CUSTOM_BATTERY_UUID,
};

/// Callback invoked with every decoded inbound packet.
pub type PacketListener = Arc<dyn Fn(&Packet) + Send + Sync>;

// ── Configuration ─────────────────────────────────────────────────────────────

/// Default timeouts applied when a call does not specify its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTimeouts {
    /// Whole-exchange timeout for `execute`.
    pub command: Duration,
    /// Maximum gap between packets during `fetch_history`.
    pub history: Duration,
    /// Timeout for `wait_for_packet`.
    pub wait: Duration,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            command: Duration::from_millis(5000),
            history: Duration::from_millis(2000),
            wait: Duration::from_millis(5000),
        }
    }
}

/// What ends an exchange started by [`BoksClient::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expect {
    success: Vec<Opcode>,
    error: Vec<Opcode>,
    timeout: Option<Duration>,
    rearm_on_packet: bool,
}

impl Expect {
    /// Completes on any of `success`, using the client's command timeout.
    pub fn new(success: impl IntoIterator<Item = Opcode>) -> Self {
        Self {
            success: success.into_iter().collect(),
            error: Vec::new(),
            timeout: None,
            rearm_on_packet: false,
        }
    }

    /// Fails with [`ClientError::Rejected`] on any of `error`.
    pub fn or_error(mut self, error: impl IntoIterator<Item = Opcode>) -> Self {
        self.error.extend(error);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Restarts the timer whenever an unrelated packet arrives, turning the
    /// timeout into a maximum gap between packets.
    pub fn rearm_on_packet(mut self) -> Self {
        self.rearm_on_packet = true;
        self
    }
}

// ── Shared inbound state ──────────────────────────────────────────────────────

struct PendingExpectation {
    id: u64,
    success: Vec<Opcode>,
    error: Vec<Opcode>,
    transaction: Transaction,
    resolve: oneshot::Sender<Transaction>,
    activity: Arc<Notify>,
}

struct ListenerEntry {
    id: u64,
    once: bool,
    listener: PacketListener,
}

struct Waiter {
    id: u64,
    opcode: Opcode,
    resolve: oneshot::Sender<Packet>,
}

/// State reachable from the transport callback.
struct Shared {
    sink: Arc<dyn DiagnosticSink>,
    pending: Mutex<Option<PendingExpectation>>,
    listeners: Mutex<Vec<ListenerEntry>>,
    waiters: Mutex<Vec<Waiter>>,
    next_id: AtomicU64,
}

/// None of the guarded sections can leave the data half-updated, so a
/// poisoned lock is still safe to use.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "listener panicked".to_owned()
    }
}

impl Shared {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn handle_frame(&self, bytes: &[u8]) {
        let packet = create_from_frame(bytes, &mut |mismatch: &ChecksumMismatch| {
            self.sink.record(LogEvent::ChecksumError {
                opcode: mismatch.opcode,
                expected: mismatch.expected,
                received: mismatch.received,
            });
        });
        let Some(packet) = packet else {
            return;
        };

        self.sink.record(LogEvent::Receive {
            opcode: packet.opcode(),
        });
        self.notify_listeners(&packet);
        self.resolve_waiters(&packet);
        self.advance_pending(packet);
    }

    fn notify_listeners(&self, packet: &Packet) {
        // Snapshot first: listeners may subscribe or unsubscribe re-entrantly.
        let due: Vec<PacketListener> = {
            let mut listeners = lock(&self.listeners);
            let due = listeners.iter().map(|e| Arc::clone(&e.listener)).collect();
            listeners.retain(|e| !e.once);
            due
        };

        for listener in due {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(packet))) {
                self.sink.record(LogEvent::ListenerError {
                    opcode: packet.opcode(),
                    error: panic_message(panic.as_ref()),
                });
            }
        }
    }

    fn resolve_waiters(&self, packet: &Packet) {
        let opcode = packet.opcode();
        let matched: Vec<Waiter> = {
            let mut waiters = lock(&self.waiters);
            let (matched, rest): (Vec<Waiter>, Vec<Waiter>) =
                waiters.drain(..).partition(|w| w.opcode == opcode);
            *waiters = rest;
            matched
        };
        for waiter in matched {
            let _ = waiter.resolve.send(packet.clone());
        }
    }

    fn advance_pending(&self, packet: Packet) {
        let finished = {
            let mut slot = lock(&self.pending);
            let Some(pending) = slot.as_mut() else {
                return;
            };

            let opcode = packet.opcode();
            if pending.success.contains(&opcode) {
                pending.transaction.complete(packet);
            } else if pending.error.contains(&opcode) {
                pending.transaction.add_intermediate(packet);
                pending.transaction.fail(ClientError::Rejected { opcode });
            } else {
                pending.transaction.add_intermediate(packet);
                pending.activity.notify_one();
                return;
            }
            slot.take()
        };

        if let Some(pending) = finished {
            let _ = pending.resolve.send(pending.transaction);
        }
    }

    /// Removes the expectation if it is still the one identified by `id`.
    fn clear_pending(&self, id: u64) -> Option<PendingExpectation> {
        let mut slot = lock(&self.pending);
        if slot.as_ref().is_some_and(|p| p.id == id) {
            slot.take()
        } else {
            None
        }
    }

    fn subscribe(&self, once: bool, listener: PacketListener) -> u64 {
        let id = self.next_id();
        lock(&self.listeners).push(ListenerEntry { id, once, listener });
        id
    }

    fn unsubscribe(&self, id: u64) {
        lock(&self.listeners).retain(|e| e.id != id);
    }
}

/// Removes pending expectation `id` on drop.  Normal settlement has already
/// taken the slot by then, so this only acts when `execute` is abandoned.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.shared.clear_pending(self.id).is_some() {
            debug!(id = self.id, "pending expectation dropped with its caller");
        }
    }
}

// ── Subscription ──────────────────────────────────────────────────────────────

/// Handle returned by [`BoksClient::on_packet`] and [`BoksClient::once`].
///
/// The listener stays registered until the handle is dropped or
/// [`unsubscribe`](Subscription::unsubscribe) is called.
#[must_use = "dropping a Subscription unregisters its listener"]
pub struct Subscription {
    id: u64,
    shared: Weak<Shared>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.unsubscribe(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// ── BoksClient ────────────────────────────────────────────────────────────────

/// Drives one Boks device through an injected [`Transport`].
///
/// All methods take `&self`; wrap the client in an `Arc` to share it
/// between tasks.  Concurrent `execute`/`send` calls are serialized in the
/// order they were made.
pub struct BoksClient {
    transport: Arc<dyn Transport>,
    timeouts: ClientTimeouts,
    shared: Arc<Shared>,
    queue: tokio::sync::Mutex<()>,
    connected: AtomicBool,
}

impl BoksClient {
    /// Creates a client that reports diagnostics through `tracing`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_sink(transport, Arc::new(TracingSink))
    }

    pub fn with_sink(transport: Arc<dyn Transport>, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self::with_timeouts(transport, sink, ClientTimeouts::default())
    }

    pub fn with_timeouts(
        transport: Arc<dyn Transport>,
        sink: Arc<dyn DiagnosticSink>,
        timeouts: ClientTimeouts,
    ) -> Self {
        Self {
            transport,
            timeouts,
            shared: Arc::new(Shared {
                sink,
                pending: Mutex::new(None),
                listeners: Mutex::new(Vec::new()),
                waiters: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
            queue: tokio::sync::Mutex::new(()),
            connected: AtomicBool::new(false),
        }
    }

    pub fn timeouts(&self) -> ClientTimeouts {
        self.timeouts
    }

    // ── Connection ───────────────────────────────────────────────────────────

    /// Connects the transport and routes its notifications into
    /// [`handle_frame`](Self::handle_frame).  Calling it again while
    /// connected is a no-op.
    ///
    /// # Errors
    ///
    /// [`ClientError::ConnectionFailed`] or [`ClientError::SubscribeFailed`].
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.is_connected() {
            return Ok(());
        }

        self.transport
            .connect()
            .await
            .map_err(|e| ClientError::from_transport(e, ClientError::ConnectionFailed))?;

        let shared = Arc::downgrade(&self.shared);
        let callback: NotificationCallback = Arc::new(move |bytes: &[u8]| {
            if let Some(shared) = shared.upgrade() {
                shared.handle_frame(bytes);
            }
        });
        self.transport
            .subscribe(callback)
            .await
            .map_err(|e| ClientError::from_transport(e, ClientError::SubscribeFailed))?;

        self.connected.store(true, Ordering::SeqCst);
        info!("connected to Boks device");
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.transport
            .disconnect()
            .await
            .map_err(|e| ClientError::from_transport(e, ClientError::DisconnectFailed))?;
        self.connected.store(false, Ordering::SeqCst);
        info!("disconnected from Boks device");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// True while an exchange is waiting for its terminal packet.
    pub fn is_busy(&self) -> bool {
        lock(&self.shared.pending).is_some()
    }

    fn ensure_connected(&self) -> Result<(), ClientError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    // ── Outbound ─────────────────────────────────────────────────────────────

    async fn write_frame(&self, opcode: Opcode, frame: &[u8]) -> Result<(), ClientError> {
        self.shared.sink.record(LogEvent::Send {
            opcode,
            length: frame.len(),
        });
        self.transport.write(frame).await.map_err(|e| {
            let err = ClientError::from_transport(e, ClientError::WriteFailed);
            self.shared.sink.record(LogEvent::Error {
                opcode: Some(opcode),
                error: err.to_string(),
            });
            err
        })
    }

    /// Writes a packet without waiting for any reply.
    ///
    /// The write still takes its turn behind any exchange in progress.
    pub async fn send(&self, packet: Packet) -> Result<(), ClientError> {
        let _turn = self.queue.lock().await;
        self.ensure_connected()?;
        let frame = packet.encode()?;
        self.write_frame(packet.opcode(), &frame).await
    }

    /// Writes `request` and waits for one of the opcodes in `expect`.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Rejected`] when an error opcode arrives.
    /// - [`ClientError::Timeout`] carrying the request opcode.
    /// - [`ClientError::WriteFailed`], [`ClientError::NotConnected`] or
    ///   [`ClientError::Protocol`] when the request never left.
    pub async fn execute(&self, request: Packet, expect: Expect) -> Result<Transaction, ClientError> {
        let _turn = self.queue.lock().await;
        self.ensure_connected()?;

        let opcode = request.opcode();
        let frame = request.encode()?;
        let timeout = expect.timeout.unwrap_or(self.timeouts.command);
        let rearm = expect.rearm_on_packet;

        let id = self.shared.next_id();
        let activity = Arc::new(Notify::new());
        let (resolve, mut resolved) = oneshot::channel();
        *lock(&self.shared.pending) = Some(PendingExpectation {
            id,
            success: expect.success,
            error: expect.error,
            transaction: Transaction::new(request),
            resolve,
            activity: Arc::clone(&activity),
        });
        let _pending = PendingGuard {
            shared: &self.shared,
            id,
        };

        if let Err(err) = self.write_frame(opcode, &frame).await {
            self.shared.clear_pending(id);
            return Err(err);
        }

        match await_outcome(&mut resolved, &activity, timeout, rearm).await {
            Some(transaction) => self.settle(transaction),
            None => match self.shared.clear_pending(id) {
                Some(mut pending) => {
                    pending.transaction.time_out();
                    let err = ClientError::Timeout { opcode };
                    self.shared.sink.record(LogEvent::Error {
                        opcode: Some(opcode),
                        error: err.to_string(),
                    });
                    Err(err)
                }
                // Resolved between the timer firing and the slot being cleared.
                None => match resolved.try_recv() {
                    Ok(transaction) => self.settle(transaction),
                    Err(_) => Err(ClientError::Timeout { opcode }),
                },
            },
        }
    }

    fn settle(&self, transaction: Transaction) -> Result<Transaction, ClientError> {
        if transaction.status() == TransactionStatus::Success {
            debug!(
                opcode = %transaction.request().opcode(),
                elapsed_ms = transaction.duration().as_millis() as u64,
                "transaction completed"
            );
            return Ok(transaction);
        }

        let err = transaction
            .error()
            .cloned()
            .unwrap_or_else(|| ClientError::Rejected {
                opcode: transaction.request().opcode(),
            });
        let opcode = match &err {
            ClientError::Rejected { opcode } | ClientError::Timeout { opcode } => *opcode,
            _ => transaction.request().opcode(),
        };
        self.shared.sink.record(LogEvent::Error {
            opcode: Some(opcode),
            error: err.to_string(),
        });
        Err(err)
    }

    /// Downloads the device log.
    ///
    /// Sends `RequestLogs` and collects history events until `EndHistory`.
    /// The timeout bounds the gap between consecutive packets, not the whole
    /// download; `None` uses the configured history timeout.
    pub async fn fetch_history(
        &self,
        per_packet_timeout: impl Into<Option<Duration>>,
    ) -> Result<Vec<Packet>, ClientError> {
        let timeout = per_packet_timeout.into().unwrap_or(self.timeouts.history);
        let expect = Expect::new([Opcode::EndHistory])
            .with_timeout(timeout)
            .rearm_on_packet();

        let transaction = self.execute(RequestLogs.into(), expect).await?;
        let events: Vec<Packet> = transaction
            .into_intermediates()
            .into_iter()
            .filter(Packet::is_history)
            .collect();
        info!(count = events.len(), "history downloaded");
        Ok(events)
    }

    // ── Inbound ──────────────────────────────────────────────────────────────

    /// Decodes one notification and dispatches it.
    ///
    /// Transports normally reach this through the callback installed by
    /// [`connect`](Self::connect); it is public for transports that push
    /// data directly.
    pub fn handle_frame(&self, bytes: &[u8]) {
        self.shared.handle_frame(bytes);
    }

    /// Registers a listener for every inbound packet.
    pub fn on_packet(&self, listener: impl Fn(&Packet) + Send + Sync + 'static) -> Subscription {
        let id = self.shared.subscribe(false, Arc::new(listener));
        Subscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Registers a listener for the next inbound packet only.
    pub fn once(&self, listener: impl Fn(&Packet) + Send + Sync + 'static) -> Subscription {
        let id = self.shared.subscribe(true, Arc::new(listener));
        Subscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Resolves with the next packet carrying `opcode`.
    ///
    /// Independent of the exchange queue: it does not wait for its turn and
    /// does not affect a pending exchange.
    pub async fn wait_for_packet(
        &self,
        opcode: Opcode,
        timeout: impl Into<Option<Duration>>,
    ) -> Result<Packet, ClientError> {
        let timeout = timeout.into().unwrap_or(self.timeouts.wait);
        let id = self.shared.next_id();
        let (resolve, resolved) = oneshot::channel();
        lock(&self.shared.waiters).push(Waiter { id, opcode, resolve });

        match tokio::time::timeout(timeout, resolved).await {
            Ok(Ok(packet)) => Ok(packet),
            _ => {
                lock(&self.shared.waiters).retain(|w| w.id != id);
                Err(ClientError::Timeout { opcode })
            }
        }
    }

    // ── Characteristics ──────────────────────────────────────────────────────

    /// Reads a characteristic directly, bypassing the frame protocol.
    pub async fn read_characteristic(&self, characteristic: Uuid) -> Result<Vec<u8>, ClientError> {
        self.ensure_connected()?;
        self.transport
            .read(characteristic)
            .await
            .map_err(|e| ClientError::from_transport(e, ClientError::ReadFailed))
    }

    /// Battery level in percent, or `None` if unavailable.
    pub async fn battery_level(&self) -> Option<u8> {
        match self.read_characteristic(BATTERY_LEVEL_UUID).await {
            Ok(bytes) => parse_battery_level(&bytes),
            Err(err) => {
                debug!(error = %err, "battery level unavailable");
                None
            }
        }
    }

    /// Detailed battery measurements, or `None` if unavailable.
    pub async fn battery_stats(&self) -> Option<BatteryStats> {
        match self.read_characteristic(CUSTOM_BATTERY_UUID).await {
            Ok(bytes) => parse_battery_stats(&bytes),
            Err(err) => {
                debug!(error = %err, "battery statistics unavailable");
                None
            }
        }
    }
}

/// Waits for the pending expectation to resolve.  `None` means timed out.
async fn await_outcome(
    resolved: &mut oneshot::Receiver<Transaction>,
    activity: &Notify,
    timeout: Duration,
    rearm: bool,
) -> Option<Transaction> {
    loop {
        tokio::select! {
            biased;
            outcome = &mut *resolved => return outcome.ok(),
            _ = activity.notified(), if rearm => continue,
            _ = tokio::time::sleep(timeout) => return None,
        }
    }
}
