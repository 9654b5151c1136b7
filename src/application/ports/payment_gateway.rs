use async_trait::async_trait;
use serde::Serialize;

use crate::{app_error::AppResult, domain::entities::invoice_status::InvoiceStatus};

/// Request to open a new invoice at the gateway
#[derive(Debug, Clone, Serialize)]
pub struct NewGatewayInvoice {
    pub amount_cents: i64,
    pub asset: String,
    pub description: String,
    /// Opaque value echoed back by the gateway (we send the user id)
    pub payload: String,
    /// Seconds until the gateway itself expires the invoice
    pub expires_in_secs: Option<i64>,
}

/// Invoice as reported by the gateway
#[derive(Debug, Clone, Serialize)]
pub struct GatewayInvoice {
    pub invoice_id: i64,
    pub status: InvoiceStatus,
    pub pay_url: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_invoice(&self, request: &NewGatewayInvoice) -> AppResult<GatewayInvoice>;

    /// Current status of one invoice. Unrecognized status strings surface as
    /// `AppError::UnknownGatewayStatus`; an invoice the gateway does not know
    /// is `AppError::NotFound`.
    async fn invoice_status(&self, invoice_id: i64) -> AppResult<InvoiceStatus>;
}
