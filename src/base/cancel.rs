//! Cancellation and deadlines.
//!
//! Every suspension point of a request (pool acquisition, connect, handshake,
//! write, response head, body read) runs through [`Interrupt::run`], which
//! races the operation against the caller's [`CancellationToken`] and the
//! request deadline.

use crate::base::neterror::NetError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;

/// Caller-held handle used to stop in-flight requests.
///
/// Clones share state: cancelling any clone cancels every request the token
/// was attached to.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<watch::Sender<bool>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { inner: Arc::new(tx) }
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.subscribe();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // The sender lives in `self`, so this cannot close while we wait.
            std::future::pending::<()>().await;
        }
    }
}

/// The stop conditions attached to one request.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl Interrupt {
    pub fn new(token: Option<CancellationToken>, deadline: Option<Instant>) -> Self {
        Self { token, deadline }
    }

    /// An interrupt that never fires.
    pub fn never() -> Self {
        Self::default()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast if the request was already stopped.
    pub fn check(&self) -> Result<(), NetError> {
        if self.token.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(NetError::Aborted);
        }
        if self.deadline.is_some_and(|d| d <= Instant::now()) {
            return Err(NetError::TimedOut);
        }
        Ok(())
    }

    /// Run `fut` until it completes or the request is stopped.
    ///
    /// On cancellation the future is dropped at its current await point.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, NetError>
    where
        F: Future<Output = Result<T, NetError>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(NetError::Aborted),
            _ = self.expired() => Err(NetError::TimedOut),
            res = fut => res,
        }
    }

    async fn cancelled(&self) {
        match &self.token {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    }

    async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_token_cancels_pending_operation() {
        let token = CancellationToken::new();
        let interrupt = Interrupt::new(Some(token.clone()), None);

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let res: Result<(), NetError> = interrupt
            .run(async {
                std::future::pending::<()>().await;
                Ok(())
            })
            .await;
        assert_eq!(res, Err(NetError::Aborted));
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let interrupt = Interrupt::new(None, Some(Instant::now() + Duration::from_secs(5)));
        let res: Result<(), NetError> = interrupt
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert_eq!(res, Err(NetError::TimedOut));
    }

    #[tokio::test]
    async fn test_completed_operation_wins() {
        let interrupt = Interrupt::new(Some(CancellationToken::new()), None);
        let res = interrupt.run(async { Ok::<_, NetError>(7) }).await;
        assert_eq!(res, Ok(7));
    }

    #[test]
    fn test_check_after_cancel() {
        let token = CancellationToken::new();
        token.cancel();
        let interrupt = Interrupt::new(Some(token), None);
        assert_eq!(interrupt.check(), Err(NetError::Aborted));
        assert!(Interrupt::never().check().is_ok());
    }
}
