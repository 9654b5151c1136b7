use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::payment_gateway::PaymentGateway,
        use_cases::{
            billing::{InvoiceProfile, InvoiceRepoTrait},
            credit::CreditUseCases,
            subscription::SubscriptionRepoTrait,
        },
    },
    domain::entities::invoice_status::InvoiceStatus,
};

/// What a sweep did with one invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoiceOutcome {
    /// Still open at the gateway.
    Pending,
    Credited {
        subscription_id: i64,
        provisioned: bool,
    },
    /// Another reconcile already credited it.
    AlreadyCredited,
    /// Gateway reported a terminal non-paid status.
    Closed(InvoiceStatus),
    /// Past the abandonment age without a payment; expired locally.
    Abandoned,
    /// Status could not be interpreted; left for the next sweep.
    Skipped,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PaymentSweepReport {
    pub provisioned: usize,
    pub provision_failed: usize,
    pub invoices: usize,
    pub credited: usize,
    pub duplicates: usize,
    pub closed: usize,
    pub abandoned: usize,
    pub failed: usize,
    pub interrupted: bool,
}

pub struct PaymentUseCases {
    invoice_repo: Arc<dyn InvoiceRepoTrait>,
    subscription_repo: Arc<dyn SubscriptionRepoTrait>,
    gateway: Arc<dyn PaymentGateway>,
    credit: Arc<CreditUseCases>,
    abandon_after: Duration,
}

impl PaymentUseCases {
    pub fn new(
        invoice_repo: Arc<dyn InvoiceRepoTrait>,
        subscription_repo: Arc<dyn SubscriptionRepoTrait>,
        gateway: Arc<dyn PaymentGateway>,
        credit: Arc<CreditUseCases>,
        abandon_after: Duration,
    ) -> Self {
        Self {
            invoice_repo,
            subscription_repo,
            gateway,
            credit,
            abandon_after,
        }
    }

    /// Provisioning pass, then one poll per active invoice.
    #[instrument(skip(self, shutdown))]
    pub async fn sweep(
        &self,
        now: DateTime<Utc>,
        shutdown: &watch::Receiver<bool>,
    ) -> AppResult<PaymentSweepReport> {
        let mut report = PaymentSweepReport::default();

        self.provision_pending(now, shutdown, &mut report).await?;
        if report.interrupted {
            return Ok(report);
        }

        let invoices = self.invoice_repo.list_active().await?;
        for invoice in invoices {
            if *shutdown.borrow() {
                report.interrupted = true;
                break;
            }
            report.invoices += 1;

            match self.reconcile_invoice(&invoice, now).await {
                Ok(InvoiceOutcome::Credited { .. }) => report.credited += 1,
                Ok(InvoiceOutcome::AlreadyCredited) => report.duplicates += 1,
                Ok(InvoiceOutcome::Closed(_)) => report.closed += 1,
                Ok(InvoiceOutcome::Abandoned) => report.abandoned += 1,
                Ok(InvoiceOutcome::Pending) | Ok(InvoiceOutcome::Skipped) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        invoice_id = invoice.invoice_id,
                        error = %e,
                        code = %e.code(),
                        "Invoice reconciliation failed, retrying next sweep"
                    );
                }
            }
        }

        Ok(report)
    }

    /// Retry panel provisioning for committed credits the panel has not
    /// confirmed yet.
    async fn provision_pending(
        &self,
        now: DateTime<Utc>,
        shutdown: &watch::Receiver<bool>,
        report: &mut PaymentSweepReport,
    ) -> AppResult<()> {
        let pending = self.subscription_repo.list_pending_provision(now).await?;
        for subscription in pending {
            if *shutdown.borrow() {
                report.interrupted = true;
                break;
            }
            match self.credit.provision(&subscription, now).await {
                Ok(true) => {
                    report.provisioned += 1;
                    info!(subscription_id = subscription.id, "Pending subscription provisioned");
                }
                Ok(false) => {}
                Err(e) => {
                    report.provision_failed += 1;
                    warn!(
                        subscription_id = subscription.id,
                        error = %e,
                        code = %e.code(),
                        "Provisioning retry failed"
                    );
                }
            }
        }
        Ok(())
    }

    pub async fn reconcile_invoice(
        &self,
        invoice: &InvoiceProfile,
        now: DateTime<Utc>,
    ) -> AppResult<InvoiceOutcome> {
        let abandoned = invoice.age(now) >= self.abandon_after;

        match self.gateway.invoice_status(invoice.invoice_id).await {
            Ok(InvoiceStatus::Paid) => self.credit_invoice(invoice, now).await,
            Ok(InvoiceStatus::Active) if abandoned => self.abandon(invoice).await,
            Ok(InvoiceStatus::Active) => Ok(InvoiceOutcome::Pending),
            Ok(status) => self.close(invoice, status).await,
            Err(e) if abandoned => {
                warn!(
                    invoice_id = invoice.invoice_id,
                    error = %e,
                    "Gateway poll failed on an abandoned invoice"
                );
                self.abandon(invoice).await
            }
            Err(AppError::UnknownGatewayStatus(status)) => {
                warn!(
                    invoice_id = invoice.invoice_id,
                    status = %status,
                    "Gateway reported an unrecognized invoice status"
                );
                Ok(InvoiceOutcome::Skipped)
            }
            Err(AppError::NotFound) => {
                warn!(
                    invoice_id = invoice.invoice_id,
                    "Gateway does not know this invoice"
                );
                Ok(InvoiceOutcome::Skipped)
            }
            Err(e) => Err(e),
        }
    }

    async fn credit_invoice(
        &self,
        invoice: &InvoiceProfile,
        now: DateTime<Utc>,
    ) -> AppResult<InvoiceOutcome> {
        match self.credit.credit(invoice.credit_grant(), now).await {
            Ok(applied) => Ok(InvoiceOutcome::Credited {
                subscription_id: applied.outcome.subscription.id,
                provisioned: applied.provisioned,
            }),
            Err(AppError::DuplicateCredit(key)) => {
                info!(invoice_id = invoice.invoice_id, key = %key, "Invoice already credited");
                Ok(InvoiceOutcome::AlreadyCredited)
            }
            Err(e) => Err(e),
        }
    }

    async fn close(
        &self,
        invoice: &InvoiceProfile,
        status: InvoiceStatus,
    ) -> AppResult<InvoiceOutcome> {
        invoice.status.transition_to(status)?;
        let moved = self
            .invoice_repo
            .transition_status(invoice.invoice_id, InvoiceStatus::Active, status)
            .await?;
        if moved {
            info!(invoice_id = invoice.invoice_id, status = %status, "Invoice closed");
        }
        Ok(InvoiceOutcome::Closed(status))
    }

    async fn abandon(&self, invoice: &InvoiceProfile) -> AppResult<InvoiceOutcome> {
        let moved = self
            .invoice_repo
            .transition_status(
                invoice.invoice_id,
                InvoiceStatus::Active,
                InvoiceStatus::Expired,
            )
            .await?;
        if moved {
            info!(invoice_id = invoice.invoice_id, "Abandoned invoice expired");
        }
        Ok(InvoiceOutcome::Abandoned)
    }
}
