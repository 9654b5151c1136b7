//! Crypto Pay (CryptoBot) gateway client.

use std::str::FromStr;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, error};
use url::Url;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{GatewayInvoice, NewGatewayInvoice, PaymentGateway},
    domain::entities::invoice_status::InvoiceStatus,
    infra::{
        http_client::{is_transient_status, transport_error, truncate_body},
        retry::{RetryPolicy, with_retry},
    },
};

const TOKEN_HEADER: &str = "Crypto-Pay-API-Token";
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoBotNetwork {
    Mainnet,
    Testnet,
}

impl CryptoBotNetwork {
    pub fn api_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(match self {
            CryptoBotNetwork::Mainnet => "https://pay.crypt.bot/api/",
            CryptoBotNetwork::Testnet => "https://testnet-pay.crypt.bot/api/",
        })
    }
}

impl FromStr for CryptoBotNetwork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(CryptoBotNetwork::Mainnet),
            "testnet" | "test" => Ok(CryptoBotNetwork::Testnet),
            other => Err(format!("unknown CryptoBot network: {other}")),
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct WireInvoice {
    invoice_id: i64,
    status: String,
    #[serde(default)]
    bot_invoice_url: Option<String>,
    #[serde(default)]
    pay_url: Option<String>,
}

impl WireInvoice {
    fn into_gateway(self) -> AppResult<GatewayInvoice> {
        Ok(GatewayInvoice {
            invoice_id: self.invoice_id,
            status: InvoiceStatus::from_gateway(&self.status)?,
            pay_url: self.bot_invoice_url.or(self.pay_url),
        })
    }
}

#[derive(Debug, Deserialize)]
struct InvoiceList {
    #[serde(default)]
    items: Vec<WireInvoice>,
}

// ============================================================================
// Client
// ============================================================================

pub struct CryptoBotClient {
    http: Client,
    base_url: Url,
    token: SecretString,
    retry: RetryPolicy,
}

impl CryptoBotClient {
    pub fn new(http: Client, base_url: Url, token: SecretString, retry: RetryPolicy) -> Self {
        Self {
            http,
            base_url,
            token,
            retry,
        }
    }

    fn endpoint(&self, method: &str) -> AppResult<Url> {
        self.base_url
            .join(method)
            .map_err(|e| AppError::Internal(format!("invalid gateway method {method}: {e}")))
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> AppResult<T> {
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if is_transient_status(status) {
            return Err(AppError::TransientNetwork(format!("gateway answered {status}")));
        }

        let parsed: ApiResponse<T> = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(status = %status, error = %e, "Failed to parse gateway response");
                return Err(AppError::GatewayRejected {
                    status: status.as_u16(),
                    message: truncate_body(&body, MAX_ERROR_BODY),
                });
            }
        };

        match (parsed.ok, parsed.result) {
            (true, Some(result)) => Ok(result),
            (_, _) => {
                let (code, name) = parsed
                    .error
                    .map(|e| (e.code, e.name))
                    .unwrap_or((status.as_u16(), "empty result".to_string()));
                if code == 401 || name.contains("UNAUTHORIZED") {
                    return Err(AppError::Auth(format!("gateway refused token: {name}")));
                }
                Err(AppError::GatewayRejected {
                    status: if code == 0 { status.as_u16() } else { code },
                    message: name,
                })
            }
        }
    }
}

/// Amounts travel as decimal strings; cents are formatted without float math.
fn format_amount(amount_cents: i64) -> String {
    format!("{}.{:02}", amount_cents / 100, amount_cents % 100)
}

#[async_trait]
impl PaymentGateway for CryptoBotClient {
    /// Not retried: a lost response would otherwise open a second invoice.
    async fn create_invoice(&self, request: &NewGatewayInvoice) -> AppResult<GatewayInvoice> {
        if request.amount_cents <= 0 {
            return Err(AppError::InvalidInput("amount must be positive".into()));
        }

        let mut body = json!({
            "currency_type": "crypto",
            "asset": request.asset,
            "amount": format_amount(request.amount_cents),
            "description": request.description,
            "payload": request.payload,
        });
        if let Some(expires_in) = request.expires_in_secs {
            body["expires_in"] = json!(expires_in);
        }

        let response = self
            .http
            .post(self.endpoint("createInvoice")?)
            .header(TOKEN_HEADER, self.token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let invoice: WireInvoice = self.handle_response(response).await?;
        debug!(invoice_id = invoice.invoice_id, "Gateway invoice created");
        invoice.into_gateway()
    }

    async fn invoice_status(&self, invoice_id: i64) -> AppResult<InvoiceStatus> {
        let url = self.endpoint("getInvoices")?;
        let ids = invoice_id.to_string();

        let list: InvoiceList = with_retry(&self.retry, "cryptobot.get_invoices", || async {
            let response = self
                .http
                .get(url.clone())
                .header(TOKEN_HEADER, self.token.expose_secret())
                .query(&[("invoice_ids", ids.as_str())])
                .send()
                .await
                .map_err(transport_error)?;
            self.handle_response(response).await
        })
        .await?;

        let invoice = list
            .items
            .into_iter()
            .find(|i| i.invoice_id == invoice_id)
            .ok_or(AppError::NotFound)?;

        InvoiceStatus::from_gateway(&invoice.status)
    }
}
