//! Process signals that stop the sampler
//!
//! Handlers are installed by [`ShutdownSignals::register`], before any peripheral is acquired,
//! so a SIGINT or SIGTERM during startup is queued instead of killing the process with pins
//! still configured.

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug)]
pub struct ShutdownSignals {
    interrupt: Option<Signal>,
    terminate: Option<Signal>,
}

impl ShutdownSignals {
    /// Installs the SIGINT and SIGTERM handlers; must be called inside the runtime
    pub fn register() -> Self {
        Self {
            interrupt: listen(SignalKind::interrupt(), "SIGINT"),
            terminate: listen(SignalKind::terminate(), "SIGTERM"),
        }
    }

    /// Cancels `cancel` when the first signal arrives
    pub fn spawn(mut self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let name = self.recv().await;
            info!("{} received, stopping", name);
            cancel.cancel();
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = wait(&mut self.interrupt) => "SIGINT",
            _ = wait(&mut self.terminate) => "SIGTERM",
        }
    }
}

fn listen(kind: SignalKind, name: &str) -> Option<Signal> {
    match signal(kind) {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!("Unable to listen for {}: {}", name, e);
            None
        }
    }
}

// Never resolves for a missing handler or a closed stream
async fn wait(stream: &mut Option<Signal>) {
    match stream {
        Some(stream) => {
            if stream.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}
