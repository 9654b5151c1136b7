use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        notifier::Notifier,
        payment_gateway::{GatewayInvoice, NewGatewayInvoice, PaymentGateway},
    },
    domain::entities::invoice_status::InvoiceStatus,
};

enum ScriptedStatus {
    Known(InvoiceStatus),
    Raw(String),
    Unreachable,
}

struct GatewayState {
    statuses: HashMap<i64, ScriptedStatus>,
    created: Vec<NewGatewayInvoice>,
    next_invoice_id: i64,
}

/// Payment gateway answering from a per-invoice script. Unscripted invoices
/// are unknown to it.
pub struct ScriptedGateway {
    state: Mutex<GatewayState>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GatewayState {
                statuses: HashMap::new(),
                created: Vec::new(),
                next_invoice_id: 5_000,
            }),
        }
    }

    pub fn set_status(&self, invoice_id: i64, status: InvoiceStatus) {
        self.script(invoice_id, ScriptedStatus::Known(status));
    }

    pub fn set_raw_status(&self, invoice_id: i64, raw: &str) {
        self.script(invoice_id, ScriptedStatus::Raw(raw.to_string()));
    }

    pub fn fail_status(&self, invoice_id: i64) {
        self.script(invoice_id, ScriptedStatus::Unreachable);
    }

    pub fn created(&self) -> Vec<NewGatewayInvoice> {
        self.state.lock().unwrap().created.clone()
    }

    fn script(&self, invoice_id: i64, status: ScriptedStatus) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(invoice_id, status);
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_invoice(&self, request: &NewGatewayInvoice) -> AppResult<GatewayInvoice> {
        let mut state = self.state.lock().unwrap();
        let invoice_id = state.next_invoice_id;
        state.next_invoice_id += 1;
        state.created.push(request.clone());
        state
            .statuses
            .insert(invoice_id, ScriptedStatus::Known(InvoiceStatus::Active));
        Ok(GatewayInvoice {
            invoice_id,
            status: InvoiceStatus::Active,
            pay_url: Some(format!("https://t.me/CryptoBot?start=IV{invoice_id}")),
        })
    }

    async fn invoice_status(&self, invoice_id: i64) -> AppResult<InvoiceStatus> {
        let state = self.state.lock().unwrap();
        match state.statuses.get(&invoice_id) {
            Some(ScriptedStatus::Known(status)) => Ok(*status),
            Some(ScriptedStatus::Raw(raw)) => InvoiceStatus::from_gateway(raw),
            Some(ScriptedStatus::Unreachable) => {
                Err(AppError::TransientNetwork("scripted gateway outage".into()))
            }
            None => Err(AppError::NotFound),
        }
    }
}

/// Notifier that keeps every message it was asked to deliver.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(i64, String)>>,
}

impl RecordingNotifier {
    pub fn all(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn messages_for(&self, user_id: i64) -> Vec<String> {
        self.all()
            .into_iter()
            .filter(|(id, _)| *id == user_id)
            .map(|(_, message)| message)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user_id: i64, message: &str) -> AppResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((user_id, message.to_string()));
        Ok(())
    }
}
