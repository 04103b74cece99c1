//! A concurrent application runner that manages long-running processes with graceful shutdown.
//!
//! The runner orchestrates multiple app processes and cleanup functions:
//! - Concurrent execution of named processes sharing one cancellation token
//! - Graceful shutdown on SIGTERM/SIGINT
//! - Closers executed afterwards under a configurable timeout
//!
//! # Example
//!
//! ```no_run
//! use sensorhub_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let runner = Runner::new()
//!         .with_app_process(|ctx| async move {
//!             ctx.cancelled().await;
//!             Ok(())
//!         })
//!         .with_closer(|| async move {
//!             tracing::info!("Cleaning up resources");
//!             Ok(())
//!         })
//!         .with_closer_timeout(Duration::from_secs(5));
//!
//!     runner.run().await;
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Boxed future returned by app processes and closers
pub type BoxedRunFuture = Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>;

/// Type alias for an app process function.
/// Takes a cancellation token and returns a future that resolves to Result<(), anyhow::Error>
pub type AppProcess = Box<dyn FnOnce(CancellationToken) -> BoxedRunFuture + Send>;

/// Type alias for a closer function.
pub type Closer = Box<dyn FnOnce() -> BoxedRunFuture + Send>;

struct NamedProcess {
    name: String,
    process: AppProcess,
}

/// A concurrent application runner that manages long-running processes with graceful shutdown.
///
/// - App processes run concurrently until one fails or a shutdown signal is received
/// - Closers execute afterward, regardless of process outcome
pub struct Runner {
    app_processes: Vec<NamedProcess>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Creates a new Runner with a 10 second closer timeout and no processes
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Adds an unnamed app process to the runner.
    pub fn with_app_process<F, Fut>(self, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        let index = self.app_processes.len();
        self.with_named_process(
            format!("app_process_{}", index),
            Box::new(|token| Box::pin(process(token))),
        )
    }

    /// Adds an app process identified by `name` in lifecycle logs.
    ///
    /// If any process returns an error, all processes are cancelled and
    /// closers are executed.
    pub fn with_named_process(mut self, name: impl Into<String>, process: AppProcess) -> Self {
        self.app_processes.push(NamedProcess {
            name: name.into(),
            process,
        });
        self
    }

    /// Adds a closer to the runner.
    ///
    /// Closers run concurrently after all app processes have stopped. All
    /// closers are attempted even if some fail.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Sets a custom cancellation token, allowing external control over shutdown.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Runs every process, then the closers, and exits the application
    /// with code 0 on a clean stop or 1 if a process failed.
    pub async fn run(self) {
        match self.run_until_stopped().await {
            Ok(()) => {
                info!("Application exiting normally");
                std::process::exit(0);
            }
            Err(err) => {
                error!("Application exiting with error: {:#}", err);
                std::process::exit(1);
            }
        }
    }

    /// Runs every process until the token is cancelled or one of them fails,
    /// then executes the closers.
    ///
    /// # Returns
    /// The first process error, if any
    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for NamedProcess { name, process } in self.app_processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                debug!(process = %name, "starting app process");
                let result = process(process_token).await;
                (name, result)
            });
        }

        spawn_signal_handlers(token.clone());

        let mut first_error = None;
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((name, Ok(()))) => {
                    debug!(process = %name, "app process completed");
                }
                Ok((name, Err(err))) => {
                    if !token.is_cancelled() {
                        error!(process = %name, "app process error: {:#}", err);
                        first_error = Some(err);
                        token.cancel();
                    } else {
                        debug!(process = %name, "app process error after shutdown: {:#}", err);
                    }
                }
                Err(err) => {
                    error!("app process panicked: {}", err);
                    if first_error.is_none() && !token.is_cancelled() {
                        first_error = Some(anyhow::anyhow!("app process panicked: {}", err));
                    }
                    token.cancel();
                }
            }

            if token.is_cancelled() {
                break;
            }
        }

        // give remaining processes a chance to observe cancellation
        while let Ok(Some(result)) =
            tokio::time::timeout(self.closer_timeout, join_set.join_next()).await
        {
            if let Ok((name, _)) = result {
                debug!(process = %name, "app process stopped");
            }
        }
        join_set.shutdown().await;

        if !self.closers.is_empty() {
            info!("Running closers with timeout of {:?}", self.closer_timeout);
            match tokio::time::timeout(self.closer_timeout, run_closers(self.closers)).await {
                Ok(()) => info!("All closers completed"),
                Err(_) => error!("Closers timed out after {:?}", self.closer_timeout),
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = ctrl_c_token.cancelled() => {}
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    info!("Received shutdown signal");
                    ctrl_c_token.cancel();
                }
                Err(err) => error!("Error setting up signal handler: {}", err),
            },
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                error!("Error setting up SIGTERM handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = token.cancelled() => {}
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
                token.cancel();
            }
        }
    });
}

async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();
    for closer in closers {
        closer_set.spawn(closer());
    }

    while let Some(result) = closer_set.join_next().await {
        match result {
            Ok(Ok(())) => debug!("Closer completed successfully"),
            Ok(Err(err)) => error!("Closer error: {:#}", err),
            Err(err) => error!("Closer panicked: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_cancellation_stops_processes_and_runs_closers() {
        let closer_called = Arc::new(AtomicBool::new(false));
        let closer_flag = closer_called.clone();
        let token = CancellationToken::new();

        let runner = Runner::new()
            .with_app_process(|ctx| async move {
                ctx.cancelled().await;
                Ok(())
            })
            .with_closer(move || async move {
                closer_flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .with_cancellation_token(token.clone())
            .with_closer_timeout(Duration::from_secs(5));

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let result = runner.run_until_stopped().await;
        assert!(result.is_ok());
        assert!(closer_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_process_error_cancels_siblings() {
        let sibling_stopped = Arc::new(AtomicBool::new(false));
        let sibling_flag = sibling_stopped.clone();

        let runner = Runner::new()
            .with_named_process(
                "failing",
                Box::new(|_ctx| Box::pin(async { Err(anyhow::anyhow!("boom")) })),
            )
            .with_app_process(move |ctx| async move {
                ctx.cancelled().await;
                sibling_flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .with_closer_timeout(Duration::from_secs(1));

        let err = runner.run_until_stopped().await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(sibling_stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_all_closers_run_even_if_one_fails() {
        let counter = Arc::new(AtomicUsize::new(0));
        let first = counter.clone();
        let second = counter.clone();

        let closers: Vec<Closer> = vec![
            Box::new(move || {
                Box::pin(async move {
                    first.fetch_add(1, Ordering::SeqCst);
                    Err(anyhow::anyhow!("closer failed"))
                })
            }),
            Box::new(move || {
                Box::pin(async move {
                    second.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        ];

        run_closers(closers).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_completed_processes_without_cancellation() {
        let token = CancellationToken::new();
        let runner = Runner::new()
            .with_app_process(|_ctx| async { Ok(()) })
            .with_cancellation_token(token.clone());

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        assert!(runner.run_until_stopped().await.is_ok());
    }
}
