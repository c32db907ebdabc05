use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::ScoreSubmitter;
use crate::error::{Error, Result};
use crate::model::PlayerGameProgress;

/// Lifecycle of one outbound stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// No session has been opened yet.
    Uninitialized = 0,
    /// Opened, waiting for the collector to accept the call.
    Opening = 1,
    /// Collector accepted the call.
    Alive = 2,
    /// Transport failed.
    Dead = 3,
    /// Stream ended normally; no more writes possible.
    Closed = 4,
}

impl SessionState {
    /// Whether the session can still carry writes.
    pub fn is_usable(self) -> bool {
        matches!(self, SessionState::Opening | SessionState::Alive)
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SessionState::Opening,
            2 => SessionState::Alive,
            3 => SessionState::Dead,
            4 => SessionState::Closed,
            _ => SessionState::Uninitialized,
        }
    }
}

/// One open outbound stream.
#[async_trait]
pub trait StreamSession: Send + Sync {
    /// Id used in logs.
    fn id(&self) -> &str;

    /// Current health, updated asynchronously by the transport.
    fn state(&self) -> SessionState;

    /// Writes one message.
    async fn send(&mut self, progress: &PlayerGameProgress) -> Result<()>;

    /// Half-closes the outbound direction.
    async fn close_send(&mut self) -> Result<()>;

    /// Tears the session down without waiting for it.
    fn shutdown(self: Box<Self>);
}

/// Opens stream sessions.
#[async_trait]
pub trait StreamConnector: Send + Sync + 'static {
    /// Opens a fresh session.
    async fn open(&self) -> Result<Box<dyn StreamSession>>;
}

/// [`ScoreSubmitter`] that owns one stream session and replaces it whenever it
/// is found unusable at submit time.
///
/// Send failures are logged and never returned; replacement on the next submit
/// is the only recovery.
pub struct ResilientSubmitter<C> {
    connector: C,
    session: Mutex<Option<Box<dyn StreamSession>>>,
    disposed: AtomicBool,
}

impl<C: StreamConnector> ResilientSubmitter<C> {
    /// Submitter that opens sessions through `connector` on demand.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            session: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// State of the current session.
    pub async fn state(&self) -> SessionState {
        self.session
            .lock()
            .await
            .as_ref()
            .map_or(SessionState::Uninitialized, |s| s.state())
    }

    fn check_disposed(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            Err(Error::Disposed)
        } else {
            Ok(())
        }
    }

    async fn ensure_session(&self, slot: &mut Option<Box<dyn StreamSession>>) -> Result<()> {
        if let Some(session) = slot.as_ref() {
            let state = session.state();
            if state.is_usable() {
                return Ok(());
            }
            tracing::info!(session_id = session.id(), ?state, "replacing stream session");
            if let Some(stale) = slot.take() {
                stale.shutdown();
            }
        }

        let session = self.connector.open().await?;
        tracing::info!(session_id = session.id(), "stream session opened");
        *slot = Some(session);
        Ok(())
    }

    async fn send(&self, slot: &mut Option<Box<dyn StreamSession>>, progress: &PlayerGameProgress) {
        if let Err(e) = self.ensure_session(slot).await {
            tracing::error!(error = %e, "failed to open stream session");
            return;
        }
        if let Some(session) = slot.as_mut() {
            if let Err(e) = session.send(progress).await {
                tracing::error!(session_id = session.id(), error = %e, "failed to send progress");
            }
        }
    }

    // A dispose that raced an in-flight submit leaves the teardown to it.
    fn finish_dispose(&self, slot: &mut Option<Box<dyn StreamSession>>) {
        if self.disposed.load(Ordering::Acquire) {
            if let Some(session) = slot.take() {
                session.shutdown();
            }
        }
    }
}

#[async_trait]
impl<C: StreamConnector> ScoreSubmitter for ResilientSubmitter<C> {
    async fn submit_score(&self, progress: &PlayerGameProgress) -> Result<()> {
        self.check_disposed()?;
        let mut slot = self.session.lock().await;
        self.send(&mut slot, progress).await;
        self.finish_dispose(&mut slot);
        Ok(())
    }

    async fn submit_finish_score(&self, progress: &PlayerGameProgress) -> Result<()> {
        self.check_disposed()?;
        let mut slot = self.session.lock().await;
        self.send(&mut slot, progress).await;
        if let Some(session) = slot.as_mut() {
            match session.close_send().await {
                Ok(()) => tracing::info!(session_id = session.id(), "stream half-closed"),
                Err(e) => {
                    tracing::error!(session_id = session.id(), error = %e, "failed to close stream")
                }
            }
        }
        self.finish_dispose(&mut slot);
        Ok(())
    }

    async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Never wait on an in-flight submit.
        if let Ok(mut slot) = self.session.try_lock() {
            if let Some(session) = slot.take() {
                tracing::debug!(session_id = session.id(), "disposing stream session");
                session.shutdown();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU8, AtomicUsize};
    use std::sync::Arc;

    #[derive(Default)]
    struct Stats {
        opened: AtomicUsize,
        sent: AtomicUsize,
        closed: AtomicUsize,
        shut_down: AtomicUsize,
        fail_open: AtomicBool,
        states: parking_lot::Mutex<Vec<Arc<AtomicU8>>>,
    }

    impl Stats {
        fn set_state(&self, index: usize, state: SessionState) {
            self.states.lock()[index].store(state as u8, Ordering::SeqCst);
        }
    }

    struct FakeSession {
        id: String,
        state: Arc<AtomicU8>,
        stats: Arc<Stats>,
    }

    #[async_trait]
    impl StreamSession for FakeSession {
        fn id(&self) -> &str {
            &self.id
        }

        fn state(&self) -> SessionState {
            SessionState::from_u8(self.state.load(Ordering::SeqCst))
        }

        async fn send(&mut self, _progress: &PlayerGameProgress) -> Result<()> {
            if !self.state().is_usable() {
                return Err(Error::StreamClosed(self.id.clone()));
            }
            self.stats.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close_send(&mut self) -> Result<()> {
            self.stats.closed.fetch_add(1, Ordering::SeqCst);
            self.state.store(SessionState::Closed as u8, Ordering::SeqCst);
            Ok(())
        }

        fn shutdown(self: Box<Self>) {
            self.stats.shut_down.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeConnector(Arc<Stats>);

    #[async_trait]
    impl StreamConnector for FakeConnector {
        async fn open(&self) -> Result<Box<dyn StreamSession>> {
            if self.0.fail_open.load(Ordering::SeqCst) {
                return Err(Error::StreamClosed("unreachable".into()));
            }
            let n = self.0.opened.fetch_add(1, Ordering::SeqCst);
            let state = Arc::new(AtomicU8::new(SessionState::Alive as u8));
            self.0.states.lock().push(Arc::clone(&state));
            Ok(Box::new(FakeSession {
                id: format!("s{n}"),
                state,
                stats: Arc::clone(&self.0),
            }))
        }
    }

    fn submitter() -> (Arc<Stats>, ResilientSubmitter<FakeConnector>) {
        let stats = Arc::new(Stats::default());
        (Arc::clone(&stats), ResilientSubmitter::new(FakeConnector(stats)))
    }

    #[tokio::test]
    async fn session_opens_lazily_and_is_reused() {
        let (stats, submitter) = submitter();
        assert_eq!(submitter.state().await, SessionState::Uninitialized);

        let progress = PlayerGameProgress::default();
        submitter.submit_score(&progress).await.unwrap();
        submitter.submit_score(&progress).await.unwrap();

        assert_eq!(stats.opened.load(Ordering::SeqCst), 1);
        assert_eq!(stats.sent.load(Ordering::SeqCst), 2);
        assert_eq!(submitter.state().await, SessionState::Alive);
    }

    #[tokio::test]
    async fn dead_session_is_replaced_once() {
        let (stats, submitter) = submitter();
        let progress = PlayerGameProgress::default();
        submitter.submit_score(&progress).await.unwrap();

        stats.set_state(0, SessionState::Dead);
        submitter.submit_score(&progress).await.unwrap();
        submitter.submit_score(&progress).await.unwrap();

        assert_eq!(stats.opened.load(Ordering::SeqCst), 2);
        assert_eq!(stats.shut_down.load(Ordering::SeqCst), 1);
        assert_eq!(stats.sent.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn finish_sends_then_half_closes() {
        let (stats, submitter) = submitter();
        submitter
            .submit_finish_score(&PlayerGameProgress::default())
            .await
            .unwrap();

        assert_eq!(stats.sent.load(Ordering::SeqCst), 1);
        assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
        assert_eq!(submitter.state().await, SessionState::Closed);
    }

    #[tokio::test]
    async fn open_failure_is_contained_and_retried() {
        let (stats, submitter) = submitter();
        let progress = PlayerGameProgress::default();

        stats.fail_open.store(true, Ordering::SeqCst);
        submitter.submit_score(&progress).await.unwrap();
        assert_eq!(stats.sent.load(Ordering::SeqCst), 0);

        stats.fail_open.store(false, Ordering::SeqCst);
        submitter.submit_score(&progress).await.unwrap();
        assert_eq!(stats.opened.load(Ordering::SeqCst), 1);
        assert_eq!(stats.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disposed_submitter_rejects_submits() {
        let (stats, submitter) = submitter();
        let progress = PlayerGameProgress::default();
        submitter.submit_score(&progress).await.unwrap();

        submitter.dispose().await;
        assert_eq!(stats.shut_down.load(Ordering::SeqCst), 1);
        assert!(matches!(
            submitter.submit_score(&progress).await,
            Err(Error::Disposed)
        ));
        assert!(matches!(
            submitter.submit_finish_score(&progress).await,
            Err(Error::Disposed)
        ));
        assert_eq!(stats.opened.load(Ordering::SeqCst), 1);
    }
}
