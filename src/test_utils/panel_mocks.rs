use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::panel::{ClientHandle, ClientSpec, Inbound, SessionToken, VpnPanel},
        use_cases::subscription::SubscriptionProfile,
    },
    test_utils::create_test_inbound,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelCall {
    Login,
    ListInbounds,
    Create,
    Update,
    Remove,
}

#[derive(Debug, Clone)]
struct RemoteClient {
    inbound_id: i64,
    email: String,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct PanelState {
    inbounds: Vec<Inbound>,
    clients: HashMap<Uuid, RemoteClient>,
    calls: Vec<PanelCall>,
    transient_failures: HashMap<PanelCall, u32>,
    broken_clients: HashSet<Uuid>,
}

/// In-memory panel holding clients the way the real panel does, with
/// injectable failures.
pub struct ScriptedPanel {
    state: Mutex<PanelState>,
    subscription_domain: String,
}

impl ScriptedPanel {
    pub fn new() -> Self {
        let state = PanelState {
            inbounds: vec![create_test_inbound(1, |_| {})],
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
            subscription_domain: "sub.example.com".to_string(),
        }
    }

    pub fn set_inbounds(&self, inbounds: Vec<Inbound>) {
        self.state.lock().unwrap().inbounds = inbounds;
    }

    pub fn calls(&self) -> Vec<PanelCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: PanelCall) -> usize {
        self.calls().into_iter().filter(|c| *c == call).count()
    }

    /// The next `times` calls of kind `call` fail with a transient error.
    pub fn fail_next(&self, call: PanelCall, times: u32) {
        self.state
            .lock()
            .unwrap()
            .transient_failures
            .insert(call, times);
    }

    /// Every call touching `client_id` is rejected.
    pub fn fail_client(&self, client_id: Uuid) {
        self.state.lock().unwrap().broken_clients.insert(client_id);
    }

    /// Drop a client behind the system's back.
    pub fn lose_client(&self, client_id: Uuid) {
        self.state.lock().unwrap().clients.remove(&client_id);
    }

    pub fn seed_client(&self, subscription: &SubscriptionProfile) {
        self.state.lock().unwrap().clients.insert(
            subscription.client_id,
            RemoteClient {
                inbound_id: subscription.inbound_id.unwrap_or(1),
                email: subscription.email.clone(),
                expires_at: subscription.expiry_date,
            },
        );
    }

    pub fn has_client(&self, client_id: Uuid) -> bool {
        self.state.lock().unwrap().clients.contains_key(&client_id)
    }

    pub fn remote_expiry(&self, client_id: Uuid) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .unwrap()
            .clients
            .get(&client_id)
            .map(|c| c.expires_at)
    }

    fn record(&self, call: PanelCall, client_id: Option<Uuid>) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if let Some(remaining) = state.transient_failures.get_mut(&call) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AppError::TransientNetwork("scripted panel outage".into()));
            }
        }
        if client_id.is_some_and(|id| state.broken_clients.contains(&id)) {
            return Err(AppError::PanelRejected {
                status: 400,
                message: "scripted rejection".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VpnPanel for ScriptedPanel {
    async fn login(&self) -> AppResult<SessionToken> {
        self.record(PanelCall::Login, None)?;
        Ok(SessionToken::new("3x-ui=scripted"))
    }

    async fn list_inbounds(&self, _use_cache: bool) -> AppResult<Vec<Inbound>> {
        self.record(PanelCall::ListInbounds, None)?;
        Ok(self.state.lock().unwrap().inbounds.clone())
    }

    async fn create_client(&self, inbound_id: i64, client: &ClientSpec) -> AppResult<ClientHandle> {
        self.record(PanelCall::Create, Some(client.client_id))?;
        self.state.lock().unwrap().clients.insert(
            client.client_id,
            RemoteClient {
                inbound_id,
                email: client.email.clone(),
                expires_at: client.expires_at,
            },
        );
        Ok(ClientHandle {
            client_id: client.client_id,
            email: client.email.clone(),
            inbound_id,
            expires_at: client.expires_at,
        })
    }

    async fn update_client_expiry(&self, inbound_id: i64, client: &ClientSpec) -> AppResult<()> {
        self.record(PanelCall::Update, Some(client.client_id))?;
        let mut state = self.state.lock().unwrap();
        match state.clients.get_mut(&client.client_id) {
            Some(remote) if remote.inbound_id == inbound_id && remote.email == client.email => {
                remote.expires_at = client.expires_at;
                Ok(())
            }
            _ => Err(AppError::InvariantViolation(format!(
                "client {} not found on inbound {inbound_id}",
                client.email
            ))),
        }
    }

    async fn remove_client(&self, _inbound_id: i64, client_id: Uuid) -> AppResult<()> {
        self.record(PanelCall::Remove, Some(client_id))?;
        self.state.lock().unwrap().clients.remove(&client_id);
        Ok(())
    }

    fn build_subscription_link(&self, email: &str) -> AppResult<Url> {
        Url::parse(&format!("https://{}/sub/{}", self.subscription_domain, email))
            .map_err(|e| AppError::Internal(e.to_string()))
    }
}
