use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

use crate::application::use_cases::payment::PaymentUseCases;

/// Periodic payment poll: finishes pending provisioning, then reconciles
/// every active invoice against the gateway.
pub async fn run_payment_loop(
    payment_uc: Arc<PaymentUseCases>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(period_secs = period.as_secs(), "Payment worker started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_once(&payment_uc, &shutdown).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
        if *shutdown.borrow() {
            break;
        }
    }

    info!("Payment worker stopped");
}

async fn run_once(payment_uc: &PaymentUseCases, shutdown: &watch::Receiver<bool>) {
    match payment_uc.sweep(Utc::now(), shutdown).await {
        Ok(report) => {
            let touched = report.provisioned
                + report.provision_failed
                + report.credited
                + report.duplicates
                + report.closed
                + report.abandoned
                + report.failed;
            if touched > 0 {
                info!(
                    invoices = report.invoices,
                    credited = report.credited,
                    duplicates = report.duplicates,
                    closed = report.closed,
                    abandoned = report.abandoned,
                    provisioned = report.provisioned,
                    provision_failed = report.provision_failed,
                    failed = report.failed,
                    interrupted = report.interrupted,
                    "Payment sweep finished"
                );
            }
        }
        Err(e) => {
            error!(error = %e, code = %e.code(), "Payment sweep failed");
        }
    }
}
