//! 3x-ui panel client.
//!
//! The panel speaks JSON envelopes (`{success, msg, obj}`) behind a cookie
//! session. An expired session shows up as 401/403 or as a redirect to the
//! login page; both trigger one re-login and one replay of the request.

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use reqwest::{Client, RequestBuilder, StatusCode, header};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::panel::{ClientHandle, ClientSpec, Inbound, SessionToken, VpnPanel},
    infra::{
        http_client::{is_transient_status, transport_error, truncate_body},
        retry::{RetryPolicy, with_retry},
    },
};

const LOGIN_PATH: &str = "login";
const LIST_INBOUNDS_PATH: &str = "panel/api/inbounds/list";
const ADD_CLIENT_PATH: &str = "panel/api/inbounds/addClient";
const MAX_ERROR_BODY: usize = 200;

pub struct XuiPanelConfig {
    /// Panel root including any secret web base path.
    pub base_url: Url,
    pub username: String,
    pub password: SecretString,
    pub subscription_domain: String,
    pub retry: RetryPolicy,
    pub inbound_cache_ttl: Duration,
}

#[derive(Debug, Deserialize)]
struct XuiResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    obj: Option<Value>,
}

impl XuiResponse {
    fn rejected(self) -> AppError {
        AppError::PanelRejected {
            status: StatusCode::OK.as_u16(),
            message: self.msg,
        }
    }
}

struct Session {
    generation: u64,
    token: SessionToken,
}

pub struct XuiPanelClient {
    http: Client,
    base_url: Url,
    username: String,
    password: SecretString,
    subscription_domain: String,
    retry: RetryPolicy,
    session: RwLock<Option<Session>>,
    /// Serializes logins. Holds the generation of the last issued session.
    login_lock: Mutex<u64>,
    /// Single-entry inbound list; concurrent misses share one fetch.
    inbounds: Cache<(), Vec<Inbound>>,
}

impl XuiPanelClient {
    pub fn new(http: Client, config: XuiPanelConfig) -> Self {
        let mut base_url = config.base_url;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let subscription_domain = config
            .subscription_domain
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string();

        Self {
            http,
            base_url,
            username: config.username,
            password: config.password,
            subscription_domain,
            retry: config.retry,
            session: RwLock::new(None),
            login_lock: Mutex::new(0),
            inbounds: Cache::builder()
                .max_capacity(1)
                .time_to_live(config.inbound_cache_ttl)
                .build(),
        }
    }

    fn endpoint(&self, path: &str) -> AppResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::Internal(format!("invalid panel path {path}: {e}")))
    }

    async fn login_once(&self) -> AppResult<SessionToken> {
        let url = self.endpoint(LOGIN_PATH)?;
        let response = self
            .http
            .post(url)
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.expose_secret()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if is_transient_status(status) {
            return Err(AppError::TransientNetwork(format!(
                "panel login answered {status}"
            )));
        }
        if !status.is_success() {
            return Err(AppError::Auth(format!("panel login answered {status}")));
        }

        let cookie = session_cookie(response.headers());
        let body = parse_envelope(status, response).await?;
        if !body.success {
            return Err(AppError::Auth(format!(
                "panel refused credentials: {}",
                body.msg
            )));
        }

        cookie
            .map(SessionToken::new)
            .ok_or_else(|| AppError::Auth("panel login set no session cookie".into()))
    }

    /// Log in unless a session newer than `stale` already exists.
    ///
    /// Callers pass the generation they saw rejected; a caller that queued
    /// behind another login reuses its result.
    async fn refresh_session(&self, stale: Option<u64>) -> AppResult<(u64, SessionToken)> {
        let mut generation = self.login_lock.lock().await;

        if let Some(current) = self.session.read().await.as_ref() {
            if stale != Some(current.generation) {
                return Ok((current.generation, current.token.clone()));
            }
        }

        let token = with_retry(&self.retry, "xui.login", || self.login_once()).await?;
        *generation += 1;
        *self.session.write().await = Some(Session {
            generation: *generation,
            token: token.clone(),
        });

        info!(generation = *generation, "Logged in to panel");
        Ok((*generation, token))
    }

    async fn current_session(&self) -> AppResult<(u64, SessionToken)> {
        if let Some(current) = self.session.read().await.as_ref() {
            return Ok((current.generation, current.token.clone()));
        }
        self.refresh_session(None).await
    }

    async fn send_once<F>(&self, build: &F, token: &SessionToken) -> AppResult<XuiResponse>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = build(&self.http)
            .header(header::COOKIE, token.expose())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
            || status.is_redirection()
        {
            return Err(AppError::Auth(format!("panel answered {status}")));
        }
        if is_transient_status(status) {
            return Err(AppError::TransientNetwork(format!("panel answered {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.map_err(transport_error)?;
            return Err(AppError::PanelRejected {
                status: status.as_u16(),
                message: truncate_body(&body, MAX_ERROR_BODY),
            });
        }

        parse_envelope(status, response).await
    }

    /// Authenticated request with retry and a single re-login on rejection.
    async fn call<F>(&self, operation: &'static str, build: F) -> AppResult<XuiResponse>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let (generation, token) = self.current_session().await?;

        match with_retry(&self.retry, operation, || self.send_once(&build, &token)).await {
            Err(AppError::Auth(reason)) => {
                warn!(operation, reason = %reason, "Panel session rejected, logging in again");
                let (_, token) = self.refresh_session(Some(generation)).await?;
                match with_retry(&self.retry, operation, || self.send_once(&build, &token)).await
                {
                    Err(AppError::Auth(reason)) => Err(AppError::Auth(format!(
                        "{operation}: session rejected after re-login ({reason})"
                    ))),
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn fetch_inbounds(&self) -> AppResult<Vec<Inbound>> {
        let url = self.endpoint(LIST_INBOUNDS_PATH)?;
        let body = self
            .call("xui.list_inbounds", |http| http.get(url.clone()))
            .await?;
        if !body.success {
            return Err(body.rejected());
        }

        let inbounds: Vec<Inbound> = serde_json::from_value(body.obj.unwrap_or(json!([])))
            .map_err(|e| AppError::PanelRejected {
                status: StatusCode::OK.as_u16(),
                message: format!("unexpected inbound list: {e}"),
            })?;
        debug!(count = inbounds.len(), "Fetched inbounds");
        Ok(inbounds)
    }

    async fn post_client(
        &self,
        operation: &'static str,
        url: Url,
        inbound_id: i64,
        client: &ClientSpec,
    ) -> AppResult<XuiResponse> {
        let payload = client_payload(inbound_id, client);
        self.call(operation, |http| http.post(url.clone()).json(&payload))
            .await
    }
}

#[async_trait]
impl VpnPanel for XuiPanelClient {
    async fn login(&self) -> AppResult<SessionToken> {
        let seen = self.session.read().await.as_ref().map(|s| s.generation);
        let (_, token) = self.refresh_session(seen).await?;
        Ok(token)
    }

    async fn list_inbounds(&self, use_cache: bool) -> AppResult<Vec<Inbound>> {
        if use_cache {
            return self
                .inbounds
                .try_get_with((), self.fetch_inbounds())
                .await
                .map_err(|e| (*e).clone());
        }

        let inbounds = self.fetch_inbounds().await?;
        self.inbounds.insert((), inbounds.clone()).await;
        Ok(inbounds)
    }

    #[instrument(skip(self, client), fields(email = %client.email))]
    async fn create_client(&self, inbound_id: i64, client: &ClientSpec) -> AppResult<ClientHandle> {
        let url = self.endpoint(ADD_CLIENT_PATH)?;
        let body = self
            .post_client("xui.add_client", url, inbound_id, client)
            .await?;

        if !body.success {
            if !is_duplicate_email(&body.msg) {
                return Err(body.rejected());
            }
            info!("Client already on panel, aligning its expiry");
            self.update_client_expiry(inbound_id, client).await?;
        }

        Ok(ClientHandle {
            client_id: client.client_id,
            email: client.email.clone(),
            inbound_id,
            expires_at: client.expires_at,
        })
    }

    #[instrument(skip(self, client), fields(email = %client.email))]
    async fn update_client_expiry(&self, inbound_id: i64, client: &ClientSpec) -> AppResult<()> {
        let url = self.endpoint(&format!(
            "panel/api/inbounds/updateClient/{}",
            client.client_id
        ))?;
        let body = self
            .post_client("xui.update_client", url, inbound_id, client)
            .await?;

        if body.success {
            Ok(())
        } else if is_not_found(&body.msg) {
            Err(AppError::InvariantViolation(format!(
                "client {} missing on inbound {inbound_id}: {}",
                client.email, body.msg
            )))
        } else {
            Err(body.rejected())
        }
    }

    #[instrument(skip(self))]
    async fn remove_client(&self, inbound_id: i64, client_id: Uuid) -> AppResult<()> {
        let url = self.endpoint(&format!(
            "panel/api/inbounds/{inbound_id}/delClient/{client_id}"
        ))?;
        let body = self
            .call("xui.remove_client", |http| http.post(url.clone()))
            .await?;

        if body.success {
            Ok(())
        } else if is_not_found(&body.msg) {
            debug!("Client already absent from panel");
            Ok(())
        } else {
            Err(body.rejected())
        }
    }

    fn build_subscription_link(&self, email: &str) -> AppResult<Url> {
        Url::parse(&format!(
            "https://{}/sub/{}",
            self.subscription_domain, email
        ))
        .map_err(|e| AppError::Internal(format!("invalid subscription link: {e}")))
    }
}

async fn parse_envelope(status: StatusCode, response: reqwest::Response) -> AppResult<XuiResponse> {
    let text = response.text().await.map_err(transport_error)?;
    serde_json::from_str(&text).map_err(|_| AppError::PanelRejected {
        status: status.as_u16(),
        message: format!("unexpected response: {}", truncate_body(&text, MAX_ERROR_BODY)),
    })
}

/// Session cookie from the login response. The panel names it `3x-ui`
/// (older builds `session`); any other cookie is a fallback.
fn session_cookie(headers: &header::HeaderMap) -> Option<String> {
    let cookies: Vec<&str> = headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .map(str::trim)
        .filter(|c| c.contains('='))
        .collect();

    cookies
        .iter()
        .find(|c| c.starts_with("3x-ui=") || c.starts_with("session="))
        .or_else(|| cookies.first())
        .map(|c| c.to_string())
}

/// Body shared by addClient and updateClient. `settings` is a JSON document
/// embedded as a string.
fn client_payload(inbound_id: i64, client: &ClientSpec) -> Value {
    let settings = json!({
        "clients": [{
            "id": client.client_id.to_string(),
            "flow": "",
            "email": client.email,
            "limitIp": 0,
            "totalGB": 0,
            "expiryTime": client.expires_at.timestamp_millis(),
            "enable": true,
            "tgId": "",
            "subId": client.email,
            "reset": 0,
        }]
    });
    json!({
        "id": inbound_id,
        "settings": settings.to_string(),
    })
}

fn is_duplicate_email(msg: &str) -> bool {
    msg.to_lowercase().contains("duplicate email")
}

fn is_not_found(msg: &str) -> bool {
    msg.to_lowercase().contains("not found")
}
