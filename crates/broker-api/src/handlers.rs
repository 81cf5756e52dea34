use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use broker_proto::AccountConfig;
use broker_registry::{ProvisionError, RegistryError};
use broker_store::StoreError;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::models::*;
use crate::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>, code: &str) -> ApiError {
    (status, Json(ErrorResponse::new(message, code)))
}

fn internal_error() -> ApiError {
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Failed to store account",
        "STORAGE_ERROR",
    )
}

/// Provision a new account
///
/// The account is written to the store before it becomes visible; a
/// success response means it will survive a restart.
#[utoipa::path(
    post,
    path = "/adduser",
    request_body = AccountConfig,
    params(
        ("Auth" = String, Header, description = "Operator secret")
    ),
    responses(
        (status = 201, description = "Account provisioned", body = ProvisionResponse),
        (status = 400, description = "Malformed or invalid account", body = ErrorResponse),
        (status = 401, description = "Missing or wrong operator secret", body = ErrorResponse),
        (status = 409, description = "Account id or subdomain already taken", body = ErrorResponse),
        (status = 500, description = "Account could not be stored", body = ErrorResponse)
    ),
    tag = "accounts"
)]
pub async fn provision_account(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<ProvisionResponse>), ApiError> {
    let config: AccountConfig = serde_json::from_slice(&body).map_err(|e| {
        debug!("Rejecting provisioning body: {}", e);
        api_error(
            StatusCode::BAD_REQUEST,
            format!("Invalid account JSON: {}", e),
            "INVALID_JSON",
        )
    })?;

    config
        .validate()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string(), "INVALID_ACCOUNT"))?;

    let account_id = config.account_id.clone();
    let controller = state.controller.clone();
    let task = tokio::task::spawn_blocking(move || controller.provision(config));

    let account = match tokio::time::timeout(state.store_timeout, task).await {
        Ok(Ok(Ok(account))) => account,
        Ok(Ok(Err(e))) => return Err(provision_error(&account_id, e)),
        Ok(Err(e)) => {
            error!(account_id = %account_id, "Provisioning task failed: {}", e);
            return Err(internal_error());
        }
        Err(_) => {
            error!(
                account_id = %account_id,
                timeout_ms = state.store_timeout.as_millis() as u64,
                "Provisioning timed out waiting for the store"
            );
            return Err(internal_error());
        }
    };

    info!(account_id = %account_id, "Account provisioned via admin API");

    Ok((
        StatusCode::CREATED,
        Json(ProvisionResponse {
            code: "ok".to_string(),
            account_id: account.account_id().to_string(),
            subdomains: account.subdomains().to_vec(),
        }),
    ))
}

fn provision_error(account_id: &str, err: ProvisionError) -> ApiError {
    match err {
        ProvisionError::Registry(RegistryError::AlreadyExists(_)) => {
            api_error(StatusCode::CONFLICT, err.to_string(), "ACCOUNT_EXISTS")
        }
        ProvisionError::Registry(RegistryError::SubdomainTaken(_)) => {
            api_error(StatusCode::CONFLICT, err.to_string(), "SUBDOMAIN_TAKEN")
        }
        ProvisionError::Registry(RegistryError::Invalid(_)) => {
            api_error(StatusCode::BAD_REQUEST, err.to_string(), "INVALID_ACCOUNT")
        }
        ProvisionError::Storage(StoreError::InvalidKey(_)) => {
            api_error(StatusCode::BAD_REQUEST, err.to_string(), "INVALID_ACCOUNT")
        }
        other => {
            error!(account_id, "Failed to provision account: {}", other);
            internal_error()
        }
    }
}

/// Dump every account with its traffic counters
///
/// One JSON object per line. Browsers (`Accept: text/html`) get the lines
/// joined with `<br>` instead.
#[utoipa::path(
    get,
    path = "/info",
    params(
        ("Auth" = String, Header, description = "Operator secret")
    ),
    responses(
        (status = 200, description = "One account snapshot per line", body = String),
        (status = 401, description = "Missing or wrong operator secret", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "accounts"
)]
pub async fn show_info(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let snapshots = state.controller.registry().snapshot_all();
    debug!("Dumping {} accounts", snapshots.len());

    let html = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"));

    let mut body = String::new();
    for snapshot in &snapshots {
        let line = serde_json::to_string(snapshot).map_err(|e| {
            error!("Failed to encode account snapshot: {}", e);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                "ENCODE_ERROR",
            )
        })?;
        if html {
            body.push_str(&escape_html(&line));
            body.push_str("<br>\n");
        } else {
            body.push_str(&line);
            body.push('\n');
        }
    }

    let content_type = if html {
        "text/html; charset=utf-8"
    } else {
        "text/plain; charset=utf-8"
    };
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        accounts: state.controller.registry().len(),
    })
}
