use dotenvy::dotenv;
use tokio::sync::watch;
use tracing::{error, info};

use vpn_reconciler::infra::{
    config::AppConfig,
    expiry_worker::run_expiry_loop,
    payment_worker::run_payment_loop,
    setup::{init_app_state, init_tracing},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = AppConfig::from_env();
    init_tracing(&config.log_file)?;
    config.validate()?;

    let app_state = init_app_state(config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let expiry_task = tokio::spawn(run_expiry_loop(
        app_state.expiry_use_cases.clone(),
        app_state.config.expiry_sweep_interval,
        shutdown_rx.clone(),
    ));
    let payment_task = tokio::spawn(run_payment_loop(
        app_state.payment_use_cases.clone(),
        app_state.config.payment_poll_interval,
        shutdown_rx,
    ));

    info!("Reconciler running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, finishing in-flight records");
    shutdown_tx.send(true).ok();

    for (name, task) in [("expiry", expiry_task), ("payment", payment_task)] {
        if let Err(e) = task.await {
            error!(worker = name, error = %e, "Worker task panicked");
        }
    }

    info!("Reconciler stopped");
    Ok(())
}
