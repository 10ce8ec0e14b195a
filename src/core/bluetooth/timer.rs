//! Cancellable delayed actions

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// A one-shot action that runs after a delay unless cancelled first.
///
/// The action receives the task's token. Cancellation can race with the
/// timer firing, so an action that takes a lock must check
/// `token.is_cancelled()` again once it holds it. Dropping the task cancels it.
#[derive(Debug)]
pub struct ScheduledTask {
    token: CancellationToken,
}

impl ScheduledTask {
    pub fn spawn<F, Fut>(delay: Duration, action: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let token_for_task = token.clone();

        tokio::spawn(async move {
            let elapsed = tokio::select! {
                _ = token_for_task.cancelled() => false,
                _ = tokio::time::sleep(delay) => true,
            };
            if elapsed {
                action(token_for_task).await;
            }
        });

        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
