//! Session-scoped log files of accepted readings.
//!
//! A session spans from an operator's start request to the matching stop
//! (or shutdown/connection loss). Each session gets its own file named
//! from the start time in reverse notation (`yyMMdd_HHmmss.txt`), with a
//! header block written once and one tab-delimited data line per accepted
//! poll cycle.
//!
//! Logging is best-effort: a failed data write is logged, reported as a
//! [`ChamberEvent::LogWriteFailed`] event, and counted, but it neither
//! stops the session nor touches the acquisition loop. File format:
//!
//! ```text
//! [HEADER]
//! <free-text operator comments>
//!
//! [DATA]
//! time\ttemp A\ttemp B\thumidity\tvalve
//! [s]\t[±0.5 °C]\t[±0.5 °C]\t[±3 pct]\t[0/1]
//! 0.0\t21.5\t22.0\t45.3\t1
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::AppResult;
use crate::events::{ChamberEvent, EventBus};
use crate::state::ChamberState;

/// Column-name line of the `[DATA]` block.
pub const COLUMN_LINE: &str = "time\ttemp A\ttemp B\thumidity\tvalve";

/// Units line of the `[DATA]` block.
pub const UNITS_LINE: &str = "[s]\t[±0.5 °C]\t[±0.5 °C]\t[±3 pct]\t[0/1]";

struct ActiveSession {
    writer: BufWriter<Box<dyn Write + Send>>,
    path: PathBuf,
    /// Set when the first reading is written; the time axis of the data
    /// block starts at that moment, not at the operator's start request.
    started: Option<Instant>,
    write_errors: u32,
}

impl ActiveSession {
    fn new(sink: Box<dyn Write + Send>, path: PathBuf, comments: &str) -> std::io::Result<Self> {
        let mut writer = BufWriter::new(sink);
        writer.write_all(b"[HEADER]\n")?;
        writer.write_all(comments.as_bytes())?;
        writer.write_all(b"\n\n[DATA]\n")?;
        writeln!(writer, "{}", COLUMN_LINE)?;
        writeln!(writer, "{}", UNITS_LINE)?;
        Ok(Self {
            writer,
            path,
            started: None,
            write_errors: 0,
        })
    }
}

/// Start/stop-controlled logger writing one file per recording session.
///
/// Cloning shares the session state: the facade starts and stops sessions
/// while the acquisition worker feeds readings through the same handle.
#[derive(Clone)]
pub struct SessionLogger {
    output_dir: PathBuf,
    events: EventBus,
    inner: Arc<Mutex<Option<ActiveSession>>>,
}

impl SessionLogger {
    /// Create an inactive logger writing files under `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>, events: EventBus) -> Self {
        Self {
            output_dir: output_dir.into(),
            events,
            inner: Arc::new(Mutex::new(None)),
        }
    }

    /// Start a recording session.
    ///
    /// Opens a new file named from the current date-time and writes the
    /// header block (the free-text `comments`, then the column and units
    /// lines). No-op if a session is already active.
    pub fn start(&self, comments: &str) -> AppResult<()> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            return Ok(());
        }

        std::fs::create_dir_all(&self.output_dir)?;
        let path = unique_session_path(&self.output_dir);
        let sink: Box<dyn Write + Send> = Box::new(File::create(&path)?);
        let session = ActiveSession::new(sink, path.clone(), comments)?;

        tracing::info!(file = %path.display(), "Recording session started");
        self.events.emit(ChamberEvent::SessionStarted(path));

        *guard = Some(session);
        Ok(())
    }

    /// Start a session writing into an arbitrary sink, bypassing file
    /// creation. Lets tests drive the write-failure path.
    #[cfg(test)]
    fn start_with_sink(&self, comments: &str, sink: Box<dyn Write + Send>) -> AppResult<()> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            return Ok(());
        }
        let path = self.output_dir.join("sink.txt");
        let session = ActiveSession::new(sink, path.clone(), comments)?;
        self.events.emit(ChamberEvent::SessionStarted(path));
        *guard = Some(session);
        Ok(())
    }

    /// Stop the active session, flushing and closing its file. No-op when
    /// no session is active.
    pub fn stop(&self) {
        let session = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut session) = session {
            if let Err(err) = session.writer.flush() {
                tracing::warn!(file = %session.path.display(), error = %err,
                    "Failed to flush session log on close");
                self.events.emit(ChamberEvent::LogWriteFailed);
            }
            tracing::info!(file = %session.path.display(), "Recording session stopped");
            self.events.emit(ChamberEvent::SessionStopped);
        }
    }

    /// Append one data line for an accepted poll cycle. No-op when no
    /// session is active; write failures are best-effort (warned, counted,
    /// surfaced as an event, session stays open).
    pub fn write_reading(&self, state: &ChamberState) {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(session) = guard.as_mut() else {
            return;
        };

        // The time axis runs from the first accepted reading of the
        // session, so every file's data block starts at exactly 0.0 s.
        let started = *session.started.get_or_insert_with(Instant::now);
        let line = format!(
            "{:.1}\t{:.1}\t{:.1}\t{:.1}\t{}\n",
            started.elapsed().as_secs_f64(),
            state.temp_a,
            state.temp_b,
            state.humidity,
            u8::from(state.valve_open),
        );

        // Flushed per line so an error surfaces on the cycle that hit it.
        let result = session
            .writer
            .write_all(line.as_bytes())
            .and_then(|()| session.writer.flush());
        if let Err(err) = result {
            session.write_errors += 1;
            tracing::warn!(
                file = %session.path.display(),
                consecutive_errors = session.write_errors,
                error = %err,
                "Failed to write session log line"
            );
            self.events.emit(ChamberEvent::LogWriteFailed);
        } else {
            session.write_errors = 0;
        }
    }

    /// Whether a recording session is active.
    pub fn is_recording(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Path of the file the active session writes to, if any.
    pub fn current_file(&self) -> Option<PathBuf> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.path.clone())
    }

    /// Recording time of the active session, if any. Zero until the first
    /// reading is logged; after that, time since that reading.
    pub fn elapsed(&self) -> Option<Duration> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.started.map_or(Duration::ZERO, |t| t.elapsed()))
    }

    /// Elapsed recording time as `HH:MM:SS`, for display.
    pub fn pretty_elapsed(&self) -> Option<String> {
        self.elapsed().map(|d| {
            let secs = d.as_secs();
            format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
        })
    }
}

/// Build a session file path `<dir>/<yyMMdd_HHmmss>.txt`, suffixing a
/// counter in the rare case two sessions start within the same second.
fn unique_session_path(dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%y%m%d_%H%M%S").to_string();
    let mut candidate = dir.join(format!("{}.txt", stamp));
    let mut n = 0u32;
    while candidate.exists() {
        n += 1;
        candidate = dir.join(format!("{}_{}.txt", stamp, n));
    }
    candidate
}
