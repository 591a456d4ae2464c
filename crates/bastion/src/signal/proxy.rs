//! Forwarding of host signals into a contained process.

#![allow(unsafe_code)]

use std::future::Future;
use std::io;

use bastion_common::{BastionError, BastionResult};
use futures::stream::{BoxStream, SelectAll, StreamExt, select_all};
use tokio::signal::unix::{SignalKind, signal};
use tokio_stream::wrappers::SignalStream;

use super::{SignalDecision, SignalPlatform, SignalTable};

/// Receiver of forwarded signals.
pub trait SignalTarget: Send + Sync {
    /// Deliver `signal` to the target.
    ///
    /// # Errors
    ///
    /// Returns the OS error if delivery failed.
    fn deliver(&self, signal: i32) -> io::Result<()>;
}

/// A process addressed by PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessTarget {
    pid: libc::pid_t,
}

impl ProcessTarget {
    /// Target the process `pid`.
    ///
    /// # Errors
    ///
    /// Returns [`BastionError::Config`] unless `pid` names a single process.
    pub fn new(pid: i32) -> BastionResult<Self> {
        if pid <= 0 {
            return Err(BastionError::Config {
                message: format!("Invalid process id {pid}"),
            });
        }
        Ok(Self { pid })
    }

    /// Process id.
    #[must_use]
    pub const fn pid(&self) -> i32 {
        self.pid
    }

    /// Whether the process still exists.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        // SAFETY: signal 0 only checks for existence; pid is positive.
        let rc = unsafe { libc::kill(self.pid, 0) };
        rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
}

impl SignalTarget for ProcessTarget {
    fn deliver(&self, signal: i32) -> io::Result<()> {
        // SAFETY: kill(2) takes plain integers; pid is positive.
        let rc = unsafe { libc::kill(self.pid, signal) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

/// Subscription to every forwardable signal of a table.
pub struct SignalProxy {
    table: &'static SignalTable,
    streams: SelectAll<BoxStream<'static, i32>>,
    registered: Vec<i32>,
}

impl SignalProxy {
    /// Install handlers for every forwardable signal in `table`.
    ///
    /// Signals the runtime refuses to handle, such as KILL and SEGV, are
    /// skipped. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BastionError::Internal`] if no handler could be installed.
    pub fn register(table: &'static SignalTable) -> BastionResult<Self> {
        let mut streams = Vec::new();
        let mut registered = Vec::new();

        for number in table.numbers() {
            if table.classify(number) == SignalDecision::Suppress {
                continue;
            }
            match signal(SignalKind::from_raw(number)) {
                Ok(stream) => {
                    streams.push(SignalStream::new(stream).map(move |()| number).boxed());
                    registered.push(number);
                }
                Err(e) => {
                    tracing::debug!(signal = number, error = %e, "Signal cannot be proxied");
                }
            }
        }

        if streams.is_empty() {
            return Err(BastionError::Internal {
                message: "no signal handler could be installed".to_string(),
            });
        }

        tracing::debug!(count = registered.len(), "Signal handlers installed");
        Ok(Self {
            table,
            streams: select_all(streams),
            registered,
        })
    }

    /// Signal numbers with an installed handler, ascending.
    #[must_use]
    pub fn registered(&self) -> &[i32] {
        &self.registered
    }

    /// Forward received signals to `target` until `shutdown` completes.
    ///
    /// Returns the number of signals delivered. Delivery failures are
    /// logged and do not stop the proxy.
    pub async fn run<F>(mut self, target: &dyn SignalTarget, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut forwarded = 0;

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                Some(number) = self.streams.next() => {
                    let name = self.table.name(number).unwrap_or("?");
                    if self.table.classify(number) == SignalDecision::Suppress {
                        tracing::debug!(signal = number, signal_name = name, "Signal suppressed");
                        continue;
                    }
                    match target.deliver(number) {
                        Ok(()) => {
                            forwarded += 1;
                            tracing::debug!(
                                signal = number,
                                signal_name = name,
                                "Signal forwarded"
                            );
                        }
                        Err(e) => {
                            tracing::warn!(
                                signal = number,
                                signal_name = name,
                                error = %e,
                                "Failed to forward signal"
                            );
                        }
                    }
                }
                else => break,
            }
        }

        forwarded
    }
}

/// Proxy host signals to `target` until `shutdown` completes.
///
/// # Errors
///
/// Returns an error if no signal handler could be installed.
pub async fn proxy_signals<F>(target: &dyn SignalTarget, shutdown: F) -> BastionResult<usize>
where
    F: Future<Output = ()>,
{
    let proxy = SignalProxy::register(SignalPlatform::host().table())?;
    Ok(proxy.run(target, shutdown).await)
}
