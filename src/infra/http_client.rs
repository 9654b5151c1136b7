//! HTTP client factory with consistent timeout configuration.
//!
//! Every outbound client (panel, payment gateway, notifier) is built here so
//! that no call can hang a sweep indefinitely.

use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::app_error::AppError;

/// Default connect timeout (TCP handshake + TLS).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Build a client with the given total request timeout.
pub fn try_build_client(request_timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(request_timeout))
        .timeout(request_timeout)
        .build()
}

/// Build the panel client.
///
/// Redirects are not followed: the panel answers an expired session with a
/// redirect to its login page, which must surface as an authorization failure
/// rather than as a 200 HTML page. Self-hosted panels often run with
/// self-signed certificates, hence the verification switch.
pub fn try_build_panel_client(
    request_timeout: Duration,
    verify_tls: bool,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(request_timeout))
        .timeout(request_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(!verify_tls)
        .build()
}

/// Statuses worth retrying: server errors, rate limiting, request timeout.
pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

/// Map a transport failure (connect, TLS, timeout, truncated body).
///
/// The URL is stripped: some endpoints carry credentials in the path.
pub fn transport_error(err: reqwest::Error) -> AppError {
    if err.is_builder() {
        return AppError::Internal(err.without_url().to_string());
    }
    AppError::TransientNetwork(err.without_url().to_string())
}

/// Cut an upstream body down to something safe to put in an error.
pub fn truncate_body(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
