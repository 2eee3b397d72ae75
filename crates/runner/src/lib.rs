//! Supervises the long-running processes of a service.
//!
//! Every named process runs as its own Tokio task with a shared
//! [`CancellationToken`]. The first process to fail, a SIGINT, or a SIGTERM
//! cancels the token; the runner then waits for the remaining processes,
//! runs all closers under a timeout and reports how the run ended.
//!
//! ```no_run
//! use kerbside_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     Runner::new()
//!         .with_process("heartbeat", |ctx| async move {
//!             ctx.cancelled().await;
//!             Ok(())
//!         })
//!         .with_closer(|| async move { Ok(()) })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run_and_exit()
//!         .await;
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub type BoxedResultFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A long-running process; receives the shared cancellation token
pub type Process = Box<dyn FnOnce(CancellationToken) -> BoxedResultFuture + Send>;

/// A cleanup step executed after every process has stopped
pub type Closer = Box<dyn FnOnce() -> BoxedResultFuture + Send>;

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    /// All processes stopped without error (normally after a shutdown signal)
    Clean,
    /// A process failed or panicked; carries the process name and error
    Failed { process: String, error: anyhow::Error },
}

pub struct Runner {
    processes: Vec<(String, Process)>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Runner with no processes and a 10 second closer timeout
    pub fn new() -> Self {
        Self {
            processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            token: CancellationToken::new(),
        }
    }

    pub fn with_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.processes
            .push((name.into(), Box::new(move |token| Box::pin(process(token)))));
        self
    }

    /// Add a process that is already boxed, as returned by `into_runner_process` helpers
    pub fn with_boxed_process(mut self, name: impl Into<String>, process: Process) -> Self {
        self.processes.push((name.into(), process));
        self
    }

    /// Closers run concurrently; a failing closer does not stop the others
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(move || Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Use an externally owned token, e.g. to stop the runner from a test
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Run to completion and exit the process with 0 on a clean stop, 1 otherwise
    pub async fn run_and_exit(self) {
        listen_for_shutdown_signals(self.token.clone());
        match self.run().await {
            RunOutcome::Clean => {
                info!("service exiting normally");
                std::process::exit(0);
            }
            RunOutcome::Failed { process, error } => {
                error!(process = %process, "service exiting with error: {:#}", error);
                std::process::exit(1);
            }
        }
    }

    /// Run every process until all have stopped, then run the closers
    pub async fn run(self) -> RunOutcome {
        let token = self.token;
        let mut join_set = JoinSet::new();

        for (name, process) in self.processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                let result = process(process_token).await;
                (name, result)
            });
        }

        let mut outcome = RunOutcome::Clean;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    debug!(process = %name, "process stopped");
                }
                Ok((name, Err(error))) => {
                    error!(process = %name, "process failed: {:#}", error);
                    if matches!(outcome, RunOutcome::Clean) {
                        outcome = RunOutcome::Failed { process: name, error };
                    }
                    token.cancel();
                }
                Err(join_error) => {
                    error!("process panicked: {}", join_error);
                    if matches!(outcome, RunOutcome::Clean) {
                        outcome = RunOutcome::Failed {
                            process: "unknown".to_string(),
                            error: anyhow::anyhow!("process panicked: {}", join_error),
                        };
                    }
                    token.cancel();
                }
            }
        }

        run_closers(self.closers, self.closer_timeout).await;
        outcome
    }
}

/// Cancel `token` on SIGINT or, on Unix, SIGTERM
fn listen_for_shutdown_signals(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received SIGINT, shutting down");
                ctrl_c_token.cancel();
            }
            Err(err) => error!("failed to listen for SIGINT: {}", err),
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("received SIGTERM, shutting down");
                token.cancel();
            }
            Err(err) => error!("failed to listen for SIGTERM: {}", err),
        }
    });
}

async fn run_closers(closers: Vec<Closer>, timeout: Duration) {
    if closers.is_empty() {
        return;
    }
    info!(timeout = ?timeout, "running closers");

    let mut closer_set = JoinSet::new();
    for closer in closers {
        closer_set.spawn(closer());
    }

    let drain = async {
        while let Some(result) = closer_set.join_next().await {
            match result {
                Ok(Ok(())) => debug!("closer completed"),
                Ok(Err(err)) => error!("closer failed: {:#}", err),
                Err(err) => error!("closer panicked: {}", err),
            }
        }
    };

    if tokio::time::timeout(timeout, drain).await.is_err() {
        warn!(timeout = ?timeout, "closers timed out");
    }
}
