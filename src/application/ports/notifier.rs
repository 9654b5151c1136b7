use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::app_error::AppResult;

/// Message delivery to a user (the chat front-end owns the channel).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: i64, message: &str) -> AppResult<()>;
}

/// Fire-and-forget delivery. The caller never waits on the channel and a
/// failed delivery is only logged.
pub fn dispatch(notifier: &Arc<dyn Notifier>, user_id: i64, message: String) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(user_id, &message).await {
            warn!(user_id, error = %e, code = %e.code(), "Notification delivery failed");
        }
    });
}
