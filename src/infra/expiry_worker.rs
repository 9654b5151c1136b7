use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

use crate::application::use_cases::expiry::ExpiryUseCases;

/// Periodic expiry sweep. Returns once `shutdown` flips to true; a sweep in
/// progress stops between subscriptions.
pub async fn run_expiry_loop(
    expiry_uc: Arc<ExpiryUseCases>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(period_secs = period.as_secs(), "Expiry worker started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_once(&expiry_uc, &shutdown).await;
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

    info!("Expiry worker stopped");
}

async fn run_once(expiry_uc: &ExpiryUseCases, shutdown: &watch::Receiver<bool>) {
    match expiry_uc.sweep(Utc::now(), shutdown).await {
        Ok(report) if report.warned + report.revoked + report.failed > 0 => {
            info!(
                scanned = report.scanned,
                warned = report.warned,
                revoked = report.revoked,
                failed = report.failed,
                interrupted = report.interrupted,
                "Expiry sweep finished"
            );
        }
        Ok(_) => {}
        Err(e) => {
            error!(error = %e, code = %e.code(), "Expiry sweep failed");
        }
    }
}
