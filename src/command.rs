//! Operator command path to the device.
//!
//! Commands are low-frequency, operator-triggered, and idempotent to
//! resend, so the contract is deliberately thin: enqueue without blocking,
//! deliver serialized with polling on the shared transport, log failures
//! instead of retrying. The command writer takes the transport mutex per
//! command, so a command is never interleaved mid-poll and never reordered
//! against the poll that precedes it.

use std::fmt;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{AppResult, ChamberError};
use crate::state::clamp_threshold;
use crate::transport::SharedTransport;

/// Wire string selecting open-above-threshold valve mode.
const MODE_ABOVE: &str = "open when super humi";
/// Wire string selecting open-below-threshold valve mode.
const MODE_BELOW: &str = "open when sub humi";

/// Depth of the command queue. Operator commands are rare; a full queue
/// means the link is wedged and dropping is better than blocking.
const COMMAND_QUEUE_DEPTH: usize = 16;

/// Valve-control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValveMode {
    /// Open the valve when humidity is above the threshold.
    OpenWhenAbove,
    /// Open the valve when humidity is below the threshold.
    OpenWhenBelow,
}

/// A single operator command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Set the automatic-valve humidity threshold in percent. Clamped to
    /// [0, 100] before formatting.
    SetHumidityThreshold(f64),
    /// Select the valve-control mode.
    SetValveMode(ValveMode),
}

impl Command {
    /// The exact line sent to the device for this command.
    pub fn wire_format(&self) -> String {
        match self {
            Command::SetHumidityThreshold(value) => {
                format!("th{:.0}", clamp_threshold(*value))
            }
            Command::SetValveMode(ValveMode::OpenWhenAbove) => MODE_ABOVE.to_string(),
            Command::SetValveMode(ValveMode::OpenWhenBelow) => MODE_BELOW.to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_format())
    }
}

/// Non-blocking sender for operator commands.
///
/// Cloning shares the queue; all clones feed the same writer task.
#[derive(Clone)]
pub struct CommandChannel {
    tx: mpsc::Sender<Command>,
}

impl CommandChannel {
    /// Spawn the command writer task on the shared transport.
    pub fn spawn(transport: SharedTransport) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Command>(COMMAND_QUEUE_DEPTH);

        let task = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                let line = command.wire_format();
                let result = {
                    let mut transport = transport.lock().await;
                    transport.write(&line).await
                };
                match result {
                    Ok(()) => tracing::debug!(command = %line, "Command sent"),
                    // No retry: commands are idempotent to resend and the
                    // operator will see the device state disagree.
                    Err(err) => {
                        tracing::warn!(command = %line, error = %err, "Command write failed")
                    }
                }
            }
            tracing::debug!("Command writer stopped");
        });

        (Self { tx }, task)
    }

    /// Enqueue a command without blocking.
    ///
    /// Fails if the queue is full or the writer task is gone; in both
    /// cases the command is dropped.
    pub fn send(&self, command: Command) -> AppResult<()> {
        self.tx.try_send(command).map_err(|err| match err {
            mpsc::error::TrySendError::Full(cmd) => {
                tracing::warn!(command = %cmd, "Command queue full; dropping command");
                ChamberError::WorkerGone("command queue full")
            }
            mpsc::error::TrySendError::Closed(_) => ChamberError::WorkerGone("command writer"),
        })
    }
}
