use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::{
    app_error::{AppResult, ErrorCode},
    application::{
        messages,
        ports::{
            notifier::{Notifier, dispatch},
            panel::VpnPanel,
        },
        use_cases::subscription::{SubscriptionProfile, SubscriptionRepoTrait},
    },
};

/// What a sweep did with one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryAction {
    NotDue,
    Warned,
    /// Inside the window but the warning was already claimed.
    AlreadyWarned,
    Revoked,
    /// Removed remotely, but a renewal landed before the revoke was recorded.
    /// The row is sent back to `pending_provision` so the client is recreated.
    RenewedDuringRevoke,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExpirySweepReport {
    pub scanned: usize,
    pub warned: usize,
    pub revoked: usize,
    pub failed: usize,
    pub interrupted: bool,
}

pub struct ExpiryUseCases {
    repo: Arc<dyn SubscriptionRepoTrait>,
    panel: Arc<dyn VpnPanel>,
    notifier: Arc<dyn Notifier>,
    warning_window: Duration,
}

impl ExpiryUseCases {
    pub fn new(
        repo: Arc<dyn SubscriptionRepoTrait>,
        panel: Arc<dyn VpnPanel>,
        notifier: Arc<dyn Notifier>,
        warning_window: Duration,
    ) -> Self {
        Self {
            repo,
            panel,
            notifier,
            warning_window,
        }
    }

    /// One pass over everything due at `now`.
    ///
    /// Records are independent: a failure is logged and the sweep moves on.
    /// A shutdown request stops the sweep between records.
    #[instrument(skip(self, shutdown))]
    pub async fn sweep(
        &self,
        now: DateTime<Utc>,
        shutdown: &watch::Receiver<bool>,
    ) -> AppResult<ExpirySweepReport> {
        let due = self
            .repo
            .list_due_for_expiry(now + self.warning_window)
            .await?;

        let mut report = ExpirySweepReport::default();
        for subscription in due {
            if *shutdown.borrow() {
                report.interrupted = true;
                break;
            }
            report.scanned += 1;

            match self.reconcile_subscription(&subscription, now).await {
                Ok(ExpiryAction::Warned) => report.warned += 1,
                Ok(ExpiryAction::Revoked) => report.revoked += 1,
                Ok(_) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        subscription_id = subscription.id,
                        email = %subscription.email,
                        error = %e,
                        code = %e.code(),
                        "Expiry reconciliation failed, retrying next sweep"
                    );
                }
            }
        }

        Ok(report)
    }

    pub async fn reconcile_subscription(
        &self,
        subscription: &SubscriptionProfile,
        now: DateTime<Utc>,
    ) -> AppResult<ExpiryAction> {
        if subscription.is_expired(now) {
            return self.revoke(subscription, now).await;
        }

        if now < subscription.expiry_date - self.warning_window {
            return Ok(ExpiryAction::NotDue);
        }

        if subscription.notified {
            return Ok(ExpiryAction::AlreadyWarned);
        }

        let claimed = self
            .repo
            .claim_warning(subscription.id, subscription.expiry_date)
            .await?;
        if !claimed {
            return Ok(ExpiryAction::AlreadyWarned);
        }

        dispatch(
            &self.notifier,
            subscription.user_id,
            messages::expiry_warning(&subscription.email, subscription.expiry_date, now),
        );
        Ok(ExpiryAction::Warned)
    }

    /// Remote removal first, local record second. A failed removal leaves
    /// the row untouched for the next sweep.
    ///
    /// A row without an inbound never reached the panel, so there is
    /// nothing to remove.
    async fn revoke(
        &self,
        subscription: &SubscriptionProfile,
        now: DateTime<Utc>,
    ) -> AppResult<ExpiryAction> {
        if let Some(inbound_id) = subscription.inbound_id {
            self.panel
                .remove_client(inbound_id, subscription.client_id)
                .await?;
        }

        let revoked = self
            .repo
            .mark_revoked(subscription.id, subscription.expiry_date, now)
            .await?;
        if !revoked {
            // The renewal may already be marked provisioned against the
            // client just removed.
            error!(
                subscription_id = subscription.id,
                email = %subscription.email,
                code = %ErrorCode::InvariantViolation,
                "Subscription renewed while being revoked, scheduling re-creation"
            );
            self.repo.reset_provisioning(subscription.id).await?;
            return Ok(ExpiryAction::RenewedDuringRevoke);
        }

        info!(
            subscription_id = subscription.id,
            email = %subscription.email,
            "Subscription revoked"
        );
        dispatch(
            &self.notifier,
            subscription.user_id,
            messages::subscription_expired(&subscription.email),
        );
        Ok(ExpiryAction::Revoked)
    }
}
