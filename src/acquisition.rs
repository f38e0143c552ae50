//! The time-driven poll-parse-distribute worker.
//!
//! One dedicated task drives the chamber at a fixed cadence. Each tick it
//! issues a single poll over the shared transport, parses the reply, and
//! on success distributes the result in causal order: state snapshot
//! first, then history buffers, then the session logger, then the
//! cycle-completed event. A failed cycle (transport error or malformed
//! reply, treated identically) touches none of that state.
//!
//! Consecutive failures are counted; reaching the configured threshold
//! trips the connection-lost latch: the worker stops scheduling itself,
//! closes any active recording session, and emits exactly one
//! [`ChamberEvent::ConnectionLost`]. There is no auto-retry: the device
//! handshake that established the connection is not re-negotiated, so
//! recovery requires re-initialization.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::events::{ChamberEvent, EventBus};
use crate::history::ChartHistory;
use crate::logger::SessionLogger;
use crate::state::{Reading, StateHandle};
use crate::transport::SharedTransport;

/// Request line that polls the device for its full state.
pub(crate) const POLL_REQUEST: &str = "?";

/// One fully parsed poll reply, before the device clock is replaced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ParsedPoll {
    /// Device-reported uptime in milliseconds. Advisory only; the
    /// acquisition loop substitutes the local monotonic clock.
    pub device_time_ms: f64,
    pub temp_a: f64,
    pub temp_b: f64,
    pub humidity: f64,
    pub valve_open: bool,
}

/// Parse a poll reply of exactly five tab-separated numeric fields:
/// device time, temp A, temp B, humidity, valve flag.
///
/// Any deviation (wrong field count, non-numeric field) rejects the whole
/// reply; a partially valid reply never produces a partial reading.
pub(crate) fn parse_poll_reply(reply: &str) -> anyhow::Result<ParsedPoll> {
    let fields: Vec<&str> = reply.split('\t').collect();
    if fields.len() != 5 {
        anyhow::bail!(
            "Expected 5 tab-separated fields in poll reply, got {}",
            fields.len()
        );
    }
    let mut values = [0f64; 5];
    for (i, field) in fields.iter().enumerate() {
        values[i] = field
            .trim()
            .parse::<f64>()
            .map_err(|_| anyhow::anyhow!("Non-numeric field {:?} in poll reply", field))?;
    }
    Ok(ParsedPoll {
        device_time_ms: values[0],
        temp_a: values[1],
        temp_b: values[2],
        humidity: values[3],
        valve_open: values[4] != 0.0,
    })
}

/// Handle to a running acquisition worker.
pub struct AcquisitionHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    connection_lost: Arc<AtomicBool>,
}

impl AcquisitionHandle {
    /// Whether the connection-lost latch has tripped. Once set it stays
    /// set for the lifetime of this connection.
    pub fn is_connection_lost(&self) -> bool {
        self.connection_lost.load(Ordering::Acquire)
    }

    /// Shared view of the connection-lost latch.
    pub(crate) fn connection_lost_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.connection_lost)
    }

    /// Stop scheduling further cycles and wait for the worker to finish.
    /// An in-flight cycle completes before the worker exits.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(err) = self.task.await {
            tracing::warn!(error = %err, "Acquisition worker did not shut down cleanly");
        }
    }
}

struct Worker {
    transport: SharedTransport,
    state: StateHandle,
    history: ChartHistory,
    logger: SessionLogger,
    events: EventBus,
    /// Epoch of the local monotonic clock; snapshot and history timestamps
    /// are seconds since this instant.
    epoch: Instant,
}

impl Worker {
    /// Run one poll-parse-distribute cycle. Returns `true` on success;
    /// on failure no shared state was mutated.
    async fn cycle(&mut self) -> bool {
        let reply = {
            let mut transport = self.transport.lock().await;
            transport.query(POLL_REQUEST).await
        };
        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(error = %err, "Poll cycle failed: transport error");
                return false;
            }
        };

        let parsed = match parse_poll_reply(&reply) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(error = %err, reply = %reply, "Poll cycle failed: parse error");
                return false;
            }
        };

        // The device clock is advisory; stamp with the local monotonic one.
        let time_s = self.epoch.elapsed().as_secs_f64();
        tracing::trace!(
            device_time_ms = parsed.device_time_ms,
            time_s,
            "Poll reply accepted"
        );

        self.state.apply_reading(Reading {
            time_s,
            temp_a: parsed.temp_a,
            temp_b: parsed.temp_b,
            humidity: parsed.humidity,
            valve_open: parsed.valve_open,
        });
        self.history
            .append(time_s, parsed.temp_a, parsed.temp_b, parsed.humidity);
        self.logger.write_reading(&self.state.snapshot());
        self.events.emit(ChamberEvent::CycleCompleted);
        true
    }
}

/// Spawn the acquisition worker.
///
/// `poll_interval` sets the cadence; `failure_threshold` (>= 1) the number
/// of consecutive failed cycles that trips the connection-lost latch.
pub fn spawn(
    poll_interval: Duration,
    failure_threshold: u32,
    transport: SharedTransport,
    state: StateHandle,
    history: ChartHistory,
    logger: SessionLogger,
    events: EventBus,
) -> AcquisitionHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let connection_lost = Arc::new(AtomicBool::new(false));
    let lost_flag = Arc::clone(&connection_lost);

    let mut worker = Worker {
        transport,
        state,
        history,
        logger: logger.clone(),
        events: events.clone(),
        epoch: Instant::now(),
    };

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut failures: u32 = 0;

        loop {
            tokio::select! {
                _ = stop_rx.changed() => {
                    tracing::debug!("Acquisition worker stopping on request");
                    break;
                }
                _ = ticker.tick() => {
                    if worker.cycle().await {
                        failures = 0;
                    } else {
                        failures += 1;
                        if failures >= failure_threshold {
                            tracing::error!(
                                failures,
                                "Connection to chamber device lost; polling stopped"
                            );
                            lost_flag.store(true, Ordering::Release);
                            // Close the recording session before notifying,
                            // so subscribers observe a settled system.
                            logger.stop();
                            events.emit(ChamberEvent::ConnectionLost);
                            break;
                        }
                    }
                }
            }
        }
    });

    AcquisitionHandle {
        stop_tx,
        task,
        connection_lost,
    }
}
