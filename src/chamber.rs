//! The chamber facade: one connected device, its workers, and the
//! presentation-layer boundary.
//!
//! [`Chamber::start`] performs the read-only startup handshake (seeding
//! the valve-control fields from the device), then spawns the acquisition
//! worker and the command writer. Everything the presentation layer may
//! touch goes through this type: state snapshots, history buffers,
//! session control, operator commands, and the event subscription.
//!
//! Shutdown is ordered: stop scheduling acquisition cycles, close any
//! active recording session, then release the device link. That order
//! prevents a truncated final log line and prevents an already-scheduled
//! poll from using a closed connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::acquisition::{self, AcquisitionHandle};
use crate::command::{Command, CommandChannel, ValveMode};
use crate::config::ChamberConfig;
use crate::error::{AppResult, ChamberError};
use crate::events::{ChamberEvent, EventBus};
use crate::history::ChartHistory;
use crate::logger::SessionLogger;
use crate::state::{ChamberState, StateHandle, DEFAULT_HUMIDITY_THRESHOLD};
use crate::transport::{share, SharedTransport, Transport};

/// Read-only handshake query for the current humidity threshold.
const QUERY_THRESHOLD: &str = "th?";
/// Read-only handshake query for the current valve-control mode.
const QUERY_VALVE_MODE: &str = "open when super humi?";

/// A connected environmental chamber and its acquisition pipeline.
pub struct Chamber {
    state: StateHandle,
    history: ChartHistory,
    logger: SessionLogger,
    events: EventBus,
    commands: CommandChannel,
    command_task: JoinHandle<()>,
    acquisition: AcquisitionHandle,
    connection_lost: Arc<AtomicBool>,
    transport: SharedTransport,
}

impl Chamber {
    /// Connect the acquisition core to a device behind `transport`.
    ///
    /// Seeds the valve-control fields with two read-only queries, then
    /// starts polling at the configured cadence. A failed handshake query
    /// keeps the default; the operator can still set the value later.
    pub async fn start<T: Transport + 'static>(
        config: ChamberConfig,
        transport: T,
    ) -> AppResult<Self> {
        config.validate()?;

        let transport = share(transport);
        let state = StateHandle::new();
        seed_control_state(&transport, &state).await;

        let events = EventBus::new();
        let history = ChartHistory::new(config.history_window(), config.poll_interval());
        let logger = SessionLogger::new(config.logging.output_dir.clone(), events.clone());

        let acquisition = acquisition::spawn(
            config.poll_interval(),
            config.acquisition.failure_threshold,
            Arc::clone(&transport),
            state.clone(),
            history.clone(),
            logger.clone(),
            events.clone(),
        );
        let connection_lost = acquisition.connection_lost_flag();
        let (commands, command_task) = CommandChannel::spawn(Arc::clone(&transport));

        tracing::info!(
            poll_interval_ms = config.acquisition.poll_interval_ms,
            failure_threshold = config.acquisition.failure_threshold,
            "Chamber acquisition started"
        );

        Ok(Self {
            state,
            history,
            logger,
            events,
            commands,
            command_task,
            acquisition,
            connection_lost,
            transport,
        })
    }

    /// Copy of the current state snapshot.
    pub fn state(&self) -> ChamberState {
        self.state.snapshot()
    }

    /// The charting history buffers.
    pub fn history(&self) -> &ChartHistory {
        &self.history
    }

    /// Subscribe to acquisition events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChamberEvent> {
        self.events.subscribe()
    }

    /// Start a recording session with the given operator comments.
    /// Idempotent while a session is active.
    pub fn start_session(&self, comments: &str) -> AppResult<()> {
        self.logger.start(comments)
    }

    /// Stop the active recording session, if any.
    pub fn stop_session(&self) {
        self.logger.stop();
    }

    /// Whether a recording session is active.
    pub fn is_recording(&self) -> bool {
        self.logger.is_recording()
    }

    /// The session logger, for richer presentation queries (current file,
    /// elapsed recording time).
    pub fn logger(&self) -> &SessionLogger {
        &self.logger
    }

    /// Set the humidity threshold: clamp, store in the snapshot, and send
    /// to the device. Returns the value actually stored.
    pub fn set_humidity_threshold(&self, value: f64) -> AppResult<f64> {
        let clamped = self.state.set_humidity_threshold(value);
        self.commands
            .send(Command::SetHumidityThreshold(clamped))?;
        Ok(clamped)
    }

    /// Set the humidity threshold from raw operator input. Non-numeric
    /// input falls back to the default rather than erroring.
    pub fn set_humidity_threshold_text(&self, input: &str) -> AppResult<f64> {
        let value = input
            .trim()
            .parse::<f64>()
            .unwrap_or(DEFAULT_HUMIDITY_THRESHOLD);
        self.set_humidity_threshold(value)
    }

    /// Select the valve-control mode: store in the snapshot and send to
    /// the device.
    pub fn set_valve_mode(&self, mode: ValveMode) -> AppResult<()> {
        self.state
            .set_valve_mode(mode == ValveMode::OpenWhenAbove);
        self.commands.send(Command::SetValveMode(mode))
    }

    /// Whether the connection-lost latch has tripped.
    pub fn is_connection_lost(&self) -> bool {
        self.connection_lost.load(Ordering::Acquire)
    }

    /// Confirm that polling is (still) scheduled.
    ///
    /// After a connection loss this returns [`ChamberError::ConnectionLost`]
    /// rather than silently succeeding: the device handshake is not
    /// re-negotiated, so recovery requires a fresh [`Chamber::start`].
    pub fn resume_polling(&self) -> AppResult<()> {
        if self.is_connection_lost() {
            return Err(ChamberError::ConnectionLost);
        }
        Ok(())
    }

    /// Orderly shutdown: stop acquisition, close any recording session,
    /// then release the device link.
    pub async fn shutdown(self) {
        self.acquisition.stop().await;
        self.logger.stop();
        self.command_task.abort();
        let _ = self.command_task.await;
        drop(self.transport);
        tracing::info!("Chamber acquisition shut down");
    }
}

/// Startup handshake: seed the control fields of the snapshot from the
/// device. Each query failure is tolerated and keeps the default.
async fn seed_control_state(transport: &SharedTransport, state: &StateHandle) {
    let mut guard = transport.lock().await;

    match guard.query(QUERY_THRESHOLD).await {
        Ok(reply) => match reply.trim().parse::<f64>() {
            Ok(value) => {
                state.set_humidity_threshold(value);
            }
            Err(_) => {
                tracing::warn!(reply = %reply, "Unparseable threshold in handshake; keeping default");
            }
        },
        Err(err) => {
            tracing::warn!(error = %err, "Threshold handshake query failed; keeping default");
        }
    }

    match guard.query(QUERY_VALVE_MODE).await {
        Ok(reply) => match reply.trim().parse::<f64>() {
            Ok(value) => state.set_valve_mode(value != 0.0),
            Err(_) => {
                tracing::warn!(reply = %reply, "Unparseable valve mode in handshake; keeping default");
            }
        },
        Err(err) => {
            tracing::warn!(error = %err, "Valve-mode handshake query failed; keeping default");
        }
    }
}
