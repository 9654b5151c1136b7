use crate::{
    adapters::{
        cryptobot::CryptoBotClient,
        panel::{XuiPanelClient, XuiPanelConfig},
        telegram::{TELEGRAM_API_BASE, TelegramNotifier},
    },
    application::ports::{notifier::Notifier, panel::VpnPanel, payment_gateway::PaymentGateway},
    infra::{
        config::AppConfig,
        error::InfraError,
        http_client::{try_build_client, try_build_panel_client},
        postgres_persistence,
        retry::RetryPolicy,
    },
    use_cases::{
        billing::{BillingUseCases, InvoiceRepoTrait},
        credit::{CreditUseCases, LedgerRepoTrait},
        expiry::ExpiryUseCases,
        payment::PaymentUseCases,
        subscription::{SubscriptionRepoTrait, SubscriptionUseCases},
    },
};
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const GATEWAY_TIMEOUT: Duration = Duration::from_secs(15);
const NOTIFIER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub expiry_use_cases: Arc<ExpiryUseCases>,
    pub payment_use_cases: Arc<PaymentUseCases>,
    pub billing_use_cases: Arc<BillingUseCases>,
    pub subscription_use_cases: Arc<SubscriptionUseCases>,
}

pub async fn init_app_state(config: AppConfig) -> anyhow::Result<AppState> {
    let postgres_arc =
        Arc::new(postgres_persistence(&config.database_url, config.database_pool_size).await?);

    let subscription_repo_arc = postgres_arc.clone() as Arc<dyn SubscriptionRepoTrait>;
    let invoice_repo_arc = postgres_arc.clone() as Arc<dyn InvoiceRepoTrait>;
    let ledger_repo_arc = postgres_arc.clone() as Arc<dyn LedgerRepoTrait>;

    let panel_http = try_build_panel_client(config.xui_timeout, config.xui_ssl_verify)
        .map_err(InfraError::from)?;
    let panel = Arc::new(XuiPanelClient::new(
        panel_http,
        XuiPanelConfig {
            base_url: config.xui_base_url.clone(),
            username: config.xui_username.clone(),
            password: config.xui_password.clone(),
            subscription_domain: config.subscription_domain.clone(),
            retry: config.panel_retry_policy(),
            inbound_cache_ttl: config.xui_inbound_cache_ttl,
        },
    )) as Arc<dyn VpnPanel>;

    let gateway = Arc::new(CryptoBotClient::new(
        try_build_client(GATEWAY_TIMEOUT).map_err(InfraError::from)?,
        config.cryptobot_network.api_url()?,
        config.cryptobot_token.clone(),
        RetryPolicy::new(
            config.xui_retry_attempts,
            config.retry_base_delay,
            config.retry_max_delay,
        ),
    )) as Arc<dyn PaymentGateway>;

    let notifier = Arc::new(TelegramNotifier::new(
        try_build_client(NOTIFIER_TIMEOUT).map_err(InfraError::from)?,
        TELEGRAM_API_BASE,
        config.bot_token.clone(),
    )) as Arc<dyn Notifier>;

    let credit_use_cases = Arc::new(CreditUseCases::new(
        subscription_repo_arc.clone(),
        ledger_repo_arc,
        panel.clone(),
        notifier.clone(),
        config.xui_inbound_id,
    ));

    let expiry_use_cases = ExpiryUseCases::new(
        subscription_repo_arc.clone(),
        panel.clone(),
        notifier,
        config.expiry_warning_window,
    );

    let payment_use_cases = PaymentUseCases::new(
        invoice_repo_arc.clone(),
        subscription_repo_arc.clone(),
        gateway.clone(),
        credit_use_cases.clone(),
        config.invoice_abandon_after,
    );

    let billing_use_cases = BillingUseCases::new(
        invoice_repo_arc,
        subscription_repo_arc.clone(),
        gateway,
        credit_use_cases,
        config.invoice_abandon_after,
    );

    let subscription_use_cases = SubscriptionUseCases::new(subscription_repo_arc, panel);

    Ok(AppState {
        config: Arc::new(config),
        expiry_use_cases: Arc::new(expiry_use_cases),
        payment_use_cases: Arc::new(payment_use_cases),
        billing_use_cases: Arc::new(billing_use_cases),
        subscription_use_cases: Arc::new(subscription_use_cases),
    })
}

pub fn init_tracing(log_file: &str) -> Result<(), InfraError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "vpn_reconciler=info".into());

    // Console (pretty logs)
    let console_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .pretty();

    // File (structured JSON logs)
    if let Some(dir) = Path::new(log_file).parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(InfraError::LogFile)?;
    }
    let file = File::options()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(InfraError::LogFile)?;
    let json_layer = fmt::layer()
        .json()
        .with_writer(file)
        .with_current_span(true)
        .with_span_list(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();

    Ok(())
}
