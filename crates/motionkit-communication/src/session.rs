//! Flow-controlled streaming session
//!
//! The concurrency core: one dedicated sending worker drains the execution
//! queue whenever buffer credit allows, and the transport's read side feeds
//! decoded responses back through [`StreamingSession::on_line`]. Shared
//! mutable state (queue, credit counter, in-flight list) lives behind a
//! single per-session lock; confirmations are matched to commands in strict
//! send order.
//!
//! # Flow control
//! The credit counter starts at the configured buffer capacity and is
//! decremented on every send. An acknowledgment returns one credit (the
//! acknowledged command left the device's receive buffer); a queue-depth
//! report is authoritative for the moment it was emitted, so it replaces
//! the counter minus the commands sent since that snapshot that are still
//! unacknowledged. The sender suspends at zero credit and is woken on any
//! credit increase.

use crate::config::StreamingConfig;
use crate::execution::{ExecutionQueue, ExecutionToken};
use crate::offsets::CoordinateOffsetTable;
use crate::probing::{ProbeHandle, ProbeOutcome, ProbingService};
use crate::protocol::{DeviceResponse, ProtocolAdapter, StatusUpdate};
use crate::transport::Transport;
use motionkit_core::{
    ControllerError, MachineState, MachineValue, MachineValueId, MachineValueStore, ModalContext,
    Result, SessionEvent, SessionEventBus, SpindleState, TokenId, TokenState,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// A command written to the transport and not yet acknowledged
#[derive(Debug, Clone, Copy)]
struct InFlight {
    token: TokenId,
    index: usize,
}

/// State guarded by the per-session lock
struct SessionInner {
    queue: ExecutionQueue,
    credit: usize,
    /// Unacknowledged sends since the last queue report; a report's
    /// availability snapshot predates these, so they are subtracted when it
    /// is applied
    sends_since_report: usize,
    /// Upper bound for ack-driven credit replenishment: the configured
    /// capacity or the last report's availability, whichever is larger
    credit_ceiling: usize,
    in_flight: VecDeque<InFlight>,
    /// Set by the stop path; no sends until an explicit resume
    suspended: bool,
}

struct SessionShared {
    inner: Mutex<SessionInner>,
    wakeup: Notify,
    shutdown: AtomicBool,
    events: Arc<SessionEventBus>,
    values: Arc<MachineValueStore>,
    context: Mutex<ModalContext>,
    offsets: Arc<CoordinateOffsetTable>,
    probes: Arc<ProbingService>,
}

/// Flow-controlled sender and response-confirmation matcher
pub struct StreamingSession {
    transport: Arc<dyn Transport>,
    protocol: Arc<dyn ProtocolAdapter>,
    config: StreamingConfig,
    shared: Arc<SessionShared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StreamingSession {
    /// Create a session over the given transport and protocol adapter
    pub fn new(
        transport: Arc<dyn Transport>,
        protocol: Arc<dyn ProtocolAdapter>,
        config: StreamingConfig,
    ) -> Self {
        let events = Arc::new(SessionEventBus::new());
        let shared = Arc::new(SessionShared {
            inner: Mutex::new(SessionInner {
                queue: ExecutionQueue::new(),
                credit: config.buffer_capacity,
                sends_since_report: 0,
                credit_ceiling: config.buffer_capacity,
                in_flight: VecDeque::new(),
                suspended: false,
            }),
            wakeup: Notify::new(),
            shutdown: AtomicBool::new(false),
            events: events.clone(),
            values: Arc::new(MachineValueStore::new(events)),
            context: Mutex::new(ModalContext::default()),
            offsets: Arc::new(CoordinateOffsetTable::new()),
            probes: Arc::new(ProbingService::new()),
        });

        Self {
            transport,
            protocol,
            config,
            shared,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Declare telemetry defaults and spawn the sending worker and poll task
    pub fn start(&self) {
        let values = &self.shared.values;
        values.declare(MachineValueId::State, MachineValue::State(MachineState::Undefined));
        values.declare(
            MachineValueId::AvailableBuffer,
            MachineValue::Integer(self.config.buffer_capacity as i64),
        );
        values.declare(
            MachineValueId::Spindle,
            MachineValue::Spindle(SpindleState::Unknown),
        );
        values.declare(MachineValueId::Velocity, MachineValue::Decimal(0.0));

        let mut tasks = self.tasks.lock();
        tasks.push(self.spawn_sender());
        tasks.push(self.spawn_poller());
        tracing::debug!("Streaming session started");
    }

    /// Stop the worker tasks; pending tokens stay queued
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.wakeup.notify_one();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        tracing::debug!("Streaming session shut down");
    }

    /// Submit a command program for execution
    ///
    /// Fails fast, before any state mutation, when the transport is
    /// disconnected or the device-side flow control the streaming protocol
    /// depends on is off.
    pub fn submit(&self, commands: Vec<String>) -> Result<TokenId> {
        if !self.transport.is_connected() {
            return Err(ControllerError::NotConnected.into());
        }
        if !self.config.flow_control {
            return Err(ControllerError::FlowControlDisabled.into());
        }
        if self.config.planner_buffer_check && self.protocol.queue_depth_query().is_none() {
            return Err(ControllerError::QueueReportingDisabled.into());
        }
        if commands.is_empty() {
            // A zero-command token could never reach COMPLETED
            return Err(ControllerError::Other {
                message: "empty command program".to_string(),
            }
            .into());
        }

        let token = ExecutionToken::new(commands);
        let id = token.id();
        self.shared.inner.lock().queue.add(token);
        self.shared.wakeup.notify_one();
        tracing::debug!("Submitted {id}");
        Ok(id)
    }

    /// Halt or resume the sender without discarding progress
    ///
    /// A feed hold is issued to the device immediately, out of band; the
    /// local pause flag keeps the sender from pushing further commands.
    pub fn pause(&self, paused: bool) -> Result<()> {
        if paused {
            self.transport.write(&self.protocol.feed_hold())?;
            self.shared.inner.lock().queue.set_paused(true);
        } else {
            self.transport.write(&self.protocol.cycle_start())?;
            self.shared.inner.lock().queue.set_paused(false);
            self.shared.wakeup.notify_one();
        }
        Ok(())
    }

    /// Cancel the current token, drop all pending tokens and flush the
    /// device buffer
    ///
    /// The hold + flush control sequence bypasses flow control. All local
    /// pending-confirmation bookkeeping is cleared and the sender stays
    /// suspended until [`StreamingSession::resume`].
    pub fn stop(&self) -> Result<()> {
        self.transport.write(&self.protocol.feed_hold())?;
        self.transport.write(&self.protocol.queue_flush())?;

        let cancelled = {
            let mut inner = self.shared.inner.lock();
            inner.in_flight.clear();
            inner.credit = self.config.buffer_capacity;
            inner.sends_since_report = 0;
            inner.credit_ceiling = self.config.buffer_capacity;
            inner.suspended = true;
            inner.queue.set_paused(false);
            inner.queue.clear()
        };
        // A probe command caught in the flush will never report.
        self.shared.probes.cancel();

        for token in cancelled {
            self.shared.events.publish(SessionEvent::TokenStateChanged {
                token,
                state: TokenState::Cancelled,
            });
        }
        tracing::info!("Motion stopped, queue cleared");
        Ok(())
    }

    /// Accept new sends again after a stop
    pub fn resume(&self) -> Result<()> {
        self.transport.write(&self.protocol.cycle_start())?;
        self.shared.inner.lock().suspended = false;
        self.shared.wakeup.notify_one();
        Ok(())
    }

    /// Receive entry point, called once per complete inbound line
    ///
    /// Malformed lines are logged and dropped; they never consume a
    /// pending-confirmation slot and never fail the session.
    pub fn on_line(&self, line: &str) {
        match self.protocol.decode(line) {
            DeviceResponse::Ack => self.handle_ack(),
            DeviceResponse::CommandError { code, message } => {
                // A rejected command still consumed a buffer slot on the
                // device, so it confirms like an ack.
                tracing::warn!("Device rejected command (error {code}): {message}");
                self.handle_ack();
            }
            DeviceResponse::QueueReport(available) => self.handle_queue_report(available),
            DeviceResponse::Status(update) => self.apply_status(update),
            DeviceResponse::ProbeReport {
                triggered,
                position,
            } => {
                self.shared.probes.resolve(ProbeOutcome {
                    triggered,
                    position,
                });
                self.shared.events.publish(SessionEvent::ProbeFinished {
                    triggered,
                    position,
                });
            }
            DeviceResponse::Info(message) => {
                tracing::debug!("Device message: {message}");
            }
            DeviceResponse::Unrecognized => {
                tracing::warn!("Dropping unrecognized device line: {line:?}");
            }
        }
    }

    /// Open a probe cycle through the probing bridge
    pub fn begin_probe(&self) -> Result<ProbeHandle> {
        self.shared.probes.begin()
    }

    /// Cancel the pending probe cycle, if any
    pub fn cancel_probe(&self) {
        self.shared.probes.cancel();
    }

    /// The session event surface
    pub fn events(&self) -> Arc<SessionEventBus> {
        self.shared.events.clone()
    }

    /// The machine value store
    pub fn values(&self) -> Arc<MachineValueStore> {
        self.shared.values.clone()
    }

    /// The coordinate offset table
    pub fn offsets(&self) -> Arc<CoordinateOffsetTable> {
        self.shared.offsets.clone()
    }

    /// Snapshot of the modal context
    pub fn context(&self) -> ModalContext {
        self.shared.context.lock().clone()
    }

    /// The RUNNING token, or `None`
    pub fn current_token(&self) -> Option<TokenId> {
        self.shared.inner.lock().queue.current_token_id()
    }

    /// Commands sent and not yet confirmed
    pub fn in_flight_count(&self) -> usize {
        self.shared.inner.lock().in_flight.len()
    }

    /// Remaining buffer credit
    pub fn credit(&self) -> usize {
        self.shared.inner.lock().credit
    }

    /// Number of tokens in the queue
    pub fn queued_tokens(&self) -> usize {
        self.shared.inner.lock().queue.len()
    }

    /// True exactly when the device is in a state that accepts a program
    pub fn ready_for_streaming(&self) -> bool {
        self.shared.values.ready_for_streaming()
    }

    fn spawn_sender(&self) -> JoinHandle<()> {
        let shared = self.shared.clone();
        let transport = self.transport.clone();
        let protocol = self.protocol.clone();

        tokio::spawn(async move {
            loop {
                if shared.shutdown.load(Ordering::SeqCst) {
                    break;
                }

                let mut pending_events = Vec::new();
                let next = {
                    let mut inner = shared.inner.lock();
                    Self::pick_next_command(&mut inner, &mut pending_events)
                };
                for event in pending_events {
                    shared.events.publish(event);
                }

                match next {
                    Some((token, index, command)) => {
                        if let Err(err) = transport.write(&protocol.encode(&command)) {
                            tracing::error!("Write failed for {token}: {err}");
                            Self::cancel_after_write_failure(&shared, token, index);
                        }
                    }
                    None => shared.wakeup.notified().await,
                }
            }
        })
    }

    /// Pick the next sendable command under the session lock
    ///
    /// Promotes the front token to RUNNING when it becomes current,
    /// decrements credit and records the in-flight entry before the write so
    /// a concurrent clear() always observes consistent bookkeeping.
    fn pick_next_command(
        inner: &mut SessionInner,
        events: &mut Vec<SessionEvent>,
    ) -> Option<(TokenId, usize, String)> {
        if inner.suspended || inner.queue.is_paused() || inner.credit == 0 {
            return None;
        }
        let token = inner.queue.current_mut()?;
        if token.state() == TokenState::Pending {
            token.run();
            events.push(SessionEvent::TokenStateChanged {
                token: token.id(),
                state: TokenState::Running,
            });
        }
        let command = token.next_unsent()?.to_string();
        let id = token.id();
        let index = token.cursor();
        token.mark_sent();
        inner.credit -= 1;
        inner.sends_since_report += 1;
        inner.in_flight.push_back(InFlight { token: id, index });
        Some((id, index, command))
    }

    fn cancel_after_write_failure(shared: &Arc<SessionShared>, token: TokenId, index: usize) {
        let cancelled = {
            let mut inner = shared.inner.lock();
            // The failed command never reached the device: take back its
            // credit and its in-flight entry.
            if let Some(&entry) = inner.in_flight.back() {
                if entry.token == token && entry.index == index {
                    inner.in_flight.pop_back();
                    inner.credit += 1;
                }
            }
            match inner.queue.current_mut() {
                Some(current) if current.id() == token => {
                    current.cancel();
                    true
                }
                _ => false,
            }
        };
        if cancelled {
            shared.events.publish(SessionEvent::TokenStateChanged {
                token,
                state: TokenState::Cancelled,
            });
        }
    }

    fn spawn_poller(&self) -> JoinHandle<()> {
        let shared = self.shared.clone();
        let transport = self.transport.clone();
        let protocol = self.protocol.clone();
        let interval = Duration::from_millis(self.config.poll_interval_ms.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so connect chatter
            // settles before the first poll.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if shared.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(err) = transport.write(&protocol.status_query()) {
                    tracing::warn!("Status poll failed: {err}");
                    continue;
                }
                if let Some(query) = protocol.queue_depth_query() {
                    if let Err(err) = transport.write(&query) {
                        tracing::warn!("Queue-depth poll failed: {err}");
                    }
                }
            }
        })
    }

    fn handle_ack(&self) {
        let mut events = Vec::new();
        {
            let mut inner = self.shared.inner.lock();
            let Some(entry) = inner.in_flight.pop_front() else {
                tracing::warn!("Acknowledgment with no in-flight command, dropping");
                return;
            };
            // The acknowledged command left the device buffer, capped so a
            // report never has to correct credit upward past the window.
            inner.credit = (inner.credit + 1).min(inner.credit_ceiling);
            inner.sends_since_report = inner.sends_since_report.saturating_sub(1);

            match inner.queue.current_mut() {
                Some(token) if token.id() == entry.token => {
                    if let Some(index) = token.confirm_next() {
                        events.push(SessionEvent::CommandConfirmed {
                            token: entry.token,
                            index,
                            confirmed: token.confirmed_count(),
                            total: token.command_count(),
                        });
                        if token.state() == TokenState::Completed {
                            events.push(SessionEvent::TokenStateChanged {
                                token: entry.token,
                                state: TokenState::Completed,
                            });
                        }
                    }
                }
                _ => {
                    // Confirmation for a token that is gone (cancelled or
                    // already failed); the credit was still real.
                    tracing::debug!("Dropping confirmation for inactive {}", entry.token);
                }
            }
        }
        for event in events {
            self.shared.events.publish(event);
        }
        self.shared.wakeup.notify_one();
    }

    fn handle_queue_report(&self, available: usize) {
        {
            let mut inner = self.shared.inner.lock();
            // The report's snapshot was taken before any command still
            // unacknowledged since the previous report reached the device;
            // subtract those so the overwrite cannot re-grant their credit.
            inner.credit = available.saturating_sub(inner.sends_since_report);
            inner.sends_since_report = 0;
            inner.credit_ceiling = self.config.buffer_capacity.max(available);
        }
        if let Err(err) = self
            .shared
            .values
            .set(MachineValueId::AvailableBuffer, MachineValue::Integer(available as i64))
        {
            tracing::warn!("Failed to record buffer depth: {err}");
        }
        self.shared.wakeup.notify_one();
    }

    fn apply_status(&self, update: StatusUpdate) {
        if let Some(state) = update.state {
            let _ = self
                .shared
                .values
                .set(MachineValueId::State, MachineValue::State(state));
        }
        if let Some(velocity) = update.velocity {
            let _ = self
                .shared
                .values
                .set(MachineValueId::Velocity, MachineValue::Decimal(velocity));
        }
        if let Some(spindle) = update.spindle {
            let _ = self
                .shared
                .values
                .set(MachineValueId::Spindle, MachineValue::Spindle(spindle));
        }
        if let Some((frame, offset)) = update.confirmed_offset {
            self.shared.offsets.confirm(frame, offset);
        }

        let mut context = self.shared.context.lock();
        context.apply(&update.modal);
        if let Some(work) = update.work_position {
            context.position = work;
        }
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("StreamingSession")
            .field("credit", &inner.credit)
            .field("in_flight", &inner.in_flight.len())
            .field("queued_tokens", &inner.queue.len())
            .field("suspended", &inner.suspended)
            .finish()
    }
}
