//! `chamber-daq`
//!
//! Acquisition core for a serial-attached environmental chamber that
//! reports two temperatures, relative humidity, and a valve flag.
//!
//! The crate owns everything below the presentation layer:
//!
//! - **Polling**: a background worker queries the device at a fixed
//!   cadence, parses each reply atomically, and distributes every sample
//!   to the state snapshot, the charting history, and the session log.
//! - **History**: bounded per-series buffers sized from the charting
//!   window and the poll interval, evicting the oldest point when full.
//! - **Recording**: plain-text session logs with a header/data layout,
//!   one file per session, named from the local start timestamp.
//! - **Control**: an operator command channel that shares the device
//!   link with the poller, so writes never interleave with a poll.
//! - **Failure handling**: consecutive poll failures trip a latched
//!   connection-lost condition that stops polling and closes the session.
//!
//! ## Entry point
//!
//! [`Chamber::start`] takes a validated [`ChamberConfig`] and a
//! [`Transport`] (a real serial port behind the `serial` feature, or
//! [`transport::mock::MockTransport`] in tests) and returns the facade
//! the presentation layer drives.
//!
//! ```rust,no_run
//! use chamber_daq::{Chamber, ChamberConfig};
//! # async fn example() -> chamber_daq::AppResult<()> {
//! let config = ChamberConfig::load_from("config/chamber.toml")?;
//! # let transport = chamber_daq::transport::mock::MockTransport::new();
//! let chamber = Chamber::start(config, transport).await?;
//! chamber.start_session("calibration run")?;
//! # chamber.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod acquisition;
pub mod chamber;
pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod logger;
pub mod scheduler;
pub mod state;
pub mod transport;

pub use chamber::Chamber;
pub use command::{Command, ValveMode};
pub use config::ChamberConfig;
pub use error::{AppResult, ChamberError};
pub use events::ChamberEvent;
pub use history::{ChartHistory, HistoryBuffer};
pub use logger::SessionLogger;
pub use scheduler::PeriodicTask;
pub use state::{ChamberState, StateHandle, DEFAULT_HUMIDITY_THRESHOLD};
pub use transport::{SharedTransport, Transport};
