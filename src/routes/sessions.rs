//! Session recording
//!
//! POST /auth/sessions - record a login, return the caller's identity view.
//! Credential parsing itself is the identity verifier's job; this route only
//! appends to the login history and reports current memberships.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use super::{authenticate, error_from, json_response, resolve_caller};
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    user_id: String,
    email: String,
    role: crate::db::schemas::Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    learning_path: Option<crate::db::schemas::PathLevel>,
    group_ids: Vec<String>,
    logins: usize,
}

/// POST /auth/sessions
pub async fn record_session(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let caller = match authenticate(&state, &req).await {
        Ok(caller) => caller,
        Err(resp) => return resp,
    };

    let user = match resolve_caller(&state, &caller).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    if let Err(e) = state.membership.record_login(&user.user_id).await {
        // The login still happened; history is best-effort
        warn!(user = %user.user_id, error = %e, "Failed to record login timestamp");
    }

    let group_ids = match state.membership.groups_for_user(&user.user_id).await {
        Ok(groups) => groups.into_iter().map(|g| g.group_id).collect(),
        Err(e) => return error_from(&e),
    };

    json_response(
        StatusCode::OK,
        &SessionResponse {
            user_id: user.user_id,
            email: user.email,
            role: user.role,
            learning_path: user.learning_path,
            group_ids,
            logins: user.login_history.len() + 1,
        },
    )
}
