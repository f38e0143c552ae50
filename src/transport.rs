//! Query/reply transport to the chamber microcontroller.
//!
//! The device speaks a line-oriented ASCII protocol: a request line goes
//! out, at most one reply line comes back. [`Transport`] captures exactly
//! that surface; wire framing is the transport's concern and nothing
//! above this module sees delimiters.
//!
//! Polling and operator commands share one physical link, so the
//! connection is held behind [`SharedTransport`] (an async mutex): whoever
//! holds the lock owns the link for one complete request, and a command
//! can never interleave mid-poll.
//!
//! [`SerialTransport`] talks to real hardware (feature `serial`);
//! [`mock::MockTransport`] is the scripted test double.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

/// One query/reply channel to the device.
///
/// Implementations must bound the time `query` can block: the acquisition
/// worker calls it on its critical path and relies on the timeout to turn
/// a dead link into a failed cycle instead of a hang.
#[async_trait]
pub trait Transport: Send {
    /// Send a request line and wait for one reply line (trimmed).
    async fn query(&mut self, request: &str) -> anyhow::Result<String>;

    /// Send a command line without waiting for a reply.
    async fn write(&mut self, command: &str) -> anyhow::Result<()>;
}

/// Exclusive, serialized handle to the device link shared between the
/// acquisition loop and the command channel.
pub type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Wrap a transport for shared use.
pub fn share<T: Transport + 'static>(transport: T) -> SharedTransport {
    Arc::new(Mutex::new(Box::new(transport)))
}

#[cfg(feature = "serial")]
pub use self::serial::SerialTransport;

#[cfg(feature = "serial")]
mod serial {
    use std::time::Duration;

    use anyhow::Context;
    use async_trait::async_trait;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio_serial::SerialStream;

    use super::Transport;
    use crate::config::SerialConfig;

    /// Line-oriented transport over a serial port.
    ///
    /// Queries write a `\n`-terminated request and read one reply line
    /// within the configured timeout.
    pub struct SerialTransport {
        reader: BufReader<SerialStream>,
        reply_timeout: Duration,
    }

    impl SerialTransport {
        /// Open the configured serial port (8N1, no flow control).
        ///
        /// Port opening is blocking in the underlying library, so it runs
        /// on the blocking pool.
        pub async fn open(config: &SerialConfig) -> anyhow::Result<Self> {
            use tokio::task::spawn_blocking;
            use tokio_serial::SerialPortBuilderExt;

            let port_path = config.port.clone();
            let baud_rate = config.baud_rate;

            let stream = spawn_blocking(move || {
                tokio_serial::new(&port_path, baud_rate)
                    .data_bits(tokio_serial::DataBits::Eight)
                    .parity(tokio_serial::Parity::None)
                    .stop_bits(tokio_serial::StopBits::One)
                    .flow_control(tokio_serial::FlowControl::None)
                    .open_native_async()
                    .with_context(|| format!("Failed to open serial port: {}", port_path))
            })
            .await
            .context("spawn_blocking for serial port opening failed")??;

            tracing::info!(port = %config.port, baud = config.baud_rate, "Serial port opened");

            Ok(Self {
                reader: BufReader::new(stream),
                reply_timeout: Duration::from_millis(config.reply_timeout_ms),
            })
        }
    }

    #[async_trait]
    impl Transport for SerialTransport {
        async fn query(&mut self, request: &str) -> anyhow::Result<String> {
            let io = async {
                self.reader
                    .get_mut()
                    .write_all(format!("{}\n", request).as_bytes())
                    .await
                    .context("Failed to write request")?;

                let mut line = String::new();
                let n = self
                    .reader
                    .read_line(&mut line)
                    .await
                    .context("Failed to read reply")?;
                if n == 0 {
                    anyhow::bail!("Serial port closed while waiting for reply");
                }
                Ok(line.trim().to_string())
            };

            tokio::time::timeout(self.reply_timeout, io)
                .await
                .map_err(|_| anyhow::anyhow!("Timed out waiting for reply to {:?}", request))?
        }

        async fn write(&mut self, command: &str) -> anyhow::Result<()> {
            self.reader
                .get_mut()
                .write_all(format!("{}\n", command).as_bytes())
                .await
                .context("Failed to write command")?;
            Ok(())
        }
    }
}

pub mod mock {
    //! Scripted transport double for tests and embedder simulation.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};

    use async_trait::async_trait;

    use super::Transport;

    enum Scripted {
        Reply(String),
        Failure(String),
    }

    /// A [`Transport`] that serves replies from a script and records what
    /// was sent to it.
    ///
    /// Cloning shares the script and the recorded traffic, so a test can
    /// keep a clone for inspection while the chamber owns the boxed
    /// original. An exhausted reply script behaves like a timeout.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        replies: Arc<Mutex<VecDeque<Scripted>>>,
        queries: Arc<Mutex<Vec<String>>>,
        writes: Arc<Mutex<Vec<String>>>,
        write_attempts: Arc<AtomicUsize>,
        fail_writes: Arc<Mutex<bool>>,
    }

    impl MockTransport {
        /// New transport with an empty script.
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a successful reply line.
        pub fn push_reply(&self, reply: &str) {
            self.replies
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(Scripted::Reply(reply.to_string()));
        }

        /// Queue a transport failure for the next query.
        pub fn push_failure(&self, message: &str) {
            self.replies
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(Scripted::Failure(message.to_string()));
        }

        /// Make subsequent `write` calls fail (or succeed again).
        pub fn set_fail_writes(&self, fail: bool) {
            *self
                .fail_writes
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = fail;
        }

        /// All request lines queried so far, in order.
        pub fn queries(&self) -> Vec<String> {
            self.queries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// All command lines written so far, in order.
        pub fn writes(&self) -> Vec<String> {
            self.writes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Number of `write` calls attempted, including failed ones.
        pub fn write_attempts(&self) -> usize {
            self.write_attempts.load(Ordering::Acquire)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn query(&mut self, request: &str) -> anyhow::Result<String> {
            self.queries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request.to_string());
            let next = self
                .replies
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            match next {
                Some(Scripted::Reply(reply)) => Ok(reply),
                Some(Scripted::Failure(message)) => Err(anyhow::anyhow!("{}", message)),
                None => Err(anyhow::anyhow!("Timed out waiting for reply to {:?}", request)),
            }
        }

        async fn write(&mut self, command: &str) -> anyhow::Result<()> {
            self.write_attempts.fetch_add(1, Ordering::AcqRel);
            if *self
                .fail_writes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
            {
                anyhow::bail!("Simulated write failure");
            }
            self.writes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(command.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;

    #[tokio::test]
    async fn mock_serves_scripted_replies_in_order() {
        let mock = MockTransport::new();
        mock.push_reply("first");
        mock.push_failure("link down");
        mock.push_reply("second");

        let mut t: Box<dyn Transport> = Box::new(mock.clone());
        assert_eq!(t.query("?").await.unwrap(), "first");
        assert!(t.query("?").await.is_err());
        assert_eq!(t.query("?").await.unwrap(), "second");
        // Exhausted script behaves like a timeout.
        assert!(t.query("?").await.is_err());

        assert_eq!(mock.queries().len(), 4);
    }

    #[tokio::test]
    async fn mock_records_writes_and_can_fail_them() {
        let mock = MockTransport::new();
        let mut t: Box<dyn Transport> = Box::new(mock.clone());

        t.write("th55").await.unwrap();
        assert_eq!(mock.writes(), vec!["th55".to_string()]);

        mock.set_fail_writes(true);
        assert!(t.write("th60").await.is_err());
        // Failed writes are not recorded as delivered.
        assert_eq!(mock.writes(), vec!["th55".to_string()]);
    }

    #[tokio::test]
    async fn shared_transport_serializes_access() {
        let mock = MockTransport::new();
        mock.push_reply("a");
        let shared = share(mock);

        let guard = shared.lock().await;
        // A second user cannot take the link while a request is in flight.
        assert!(shared.try_lock().is_err());
        drop(guard);
        assert!(shared.try_lock().is_ok());
    }
}
