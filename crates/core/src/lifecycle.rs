//! Single-run cancellable service host.
//!
//! A [`Service`] body runs on the tokio runtime under a cancellation token
//! linked to the caller's. The host sequences the hooks around it:
//! `on_starting`, the body, one of `on_completed` / `on_cancelled` /
//! `on_failed`, and finally `on_stopped`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Long-running body plus lifecycle hooks. Hooks default to no-ops.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// The body. Returning `Err(Error::Cancelled)` after `stopping` fired is
    /// the expected way to stop.
    async fn run(&self, stopping: CancellationToken) -> Result<()>;

    /// Before the body.
    async fn on_starting(&self) {}

    /// Body returned `Ok`.
    async fn on_completed(&self) {}

    /// Body was cancelled by something other than the stopping token.
    async fn on_cancelled(&self) {}

    /// Body returned an error or panicked.
    async fn on_failed(&self, _error: &Error) {}

    /// After every run, whatever the outcome.
    async fn on_stopped(&self) {}
}

struct Running {
    stopping: CancellationToken,
    stopped: CancellationToken,
    handle: JoinHandle<()>,
}

/// Runs at most one instance of a [`Service`] body at a time.
pub struct ServiceHost<S: Service> {
    service: Arc<S>,
    running: Mutex<Option<Running>>,
}

impl<S: Service> ServiceHost<S> {
    /// Host for `service`, not started.
    pub fn new(service: S) -> Self {
        Self::from_arc(Arc::new(service))
    }

    /// Host for an already shared service.
    pub fn from_arc(service: Arc<S>) -> Self {
        Self {
            service,
            running: Mutex::new(None),
        }
    }

    /// The hosted service.
    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// Spawns the body and returns immediately.
    ///
    /// Cancelling `caller` stops the body the same way [`stop`](Self::stop)
    /// does. Fails with [`Error::AlreadyRunning`] while a previous run is
    /// still executing.
    pub fn start(&self, caller: &CancellationToken) -> Result<()> {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Err(Error::AlreadyRunning);
        }

        let stopping = caller.child_token();
        let stopped = CancellationToken::new();
        let handle = tokio::spawn(execute(
            Arc::clone(&self.service),
            stopping.clone(),
            stopped.clone(),
        ));
        tracing::debug!(service = self.service.name(), "service spawned");

        *running = Some(Running {
            stopping,
            stopped,
            handle,
        });
        Ok(())
    }

    /// Whether a run is executing.
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Resolves once the current run has gone through `on_stopped`.
    /// Resolves immediately when nothing was started.
    pub async fn stopped(&self) {
        let stopped = self.running.lock().as_ref().map(|r| r.stopped.clone());
        if let Some(stopped) = stopped {
            stopped.cancelled().await;
        }
    }

    /// Signals cancellation and waits for the run to finish.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        running.stopping.cancel();
        match running.handle.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                tracing::error!(service = self.service.name(), error = %e, "service task aborted");
            }
        }
    }

    /// Stops the run and releases the service. Teardown errors are logged.
    pub async fn dispose(&self) {
        self.stop().await;
        tracing::debug!(service = self.service.name(), "service disposed");
    }
}

impl<S: Service> Drop for ServiceHost<S> {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.stopping.cancel();
        }
    }
}

async fn execute<S: Service>(service: Arc<S>, stopping: CancellationToken, stopped: CancellationToken) {
    let _stopped = stopped.drop_guard();

    service.on_starting().await;

    let outcome = AssertUnwindSafe(service.run(stopping.clone()))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(Error::Panicked(panic_message(payload.as_ref()))));

    match outcome {
        Ok(()) => service.on_completed().await,
        // Requested stop.
        Err(e) if e.is_cancelled() && stopping.is_cancelled() => {}
        Err(e) if e.is_cancelled() => service.on_cancelled().await,
        Err(e) => service.on_failed(&e).await,
    }

    service.on_stopped().await;
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
