//! HTTP routes for Atrium
//!
//! Thin JSON handlers: authenticate the caller, call the core, broadcast on
//! success. Shared helpers keep response shapes and error mapping uniform.

pub mod broadcast;
pub mod groups;
pub mod health;
pub mod messages;
pub mod progress;
pub mod sessions;

pub use health::{health_check, readiness_check, version_info};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{header, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::{extract_token_from_header, CallerIdentity};
use crate::db::schemas::UserDoc;
use crate::server::AppState;
use crate::types::AtriumError;

/// Maximum accepted request body
const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let payload = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(payload)))
        .unwrap()
}

pub fn error_response(status: StatusCode, code: &str, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "error": message, "code": code }))
}

/// Map a core error to its HTTP rendering; every variant stays distinguishable
pub fn error_from(err: &AtriumError) -> Response<Full<Bytes>> {
    let status = match err {
        AtriumError::NotFound(_) => StatusCode::NOT_FOUND,
        AtriumError::AlreadyAssigned(_) | AtriumError::GroupFull(_) => StatusCode::CONFLICT,
        AtriumError::Progression(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AtriumError::InvalidCredential(_) | AtriumError::AuthenticationRequired => {
            StatusCode::UNAUTHORIZED
        }
        AtriumError::NotAuthorizedForRoom(_) => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.code(), &err.to_string())
}

pub fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    error_response(
        StatusCode::NOT_FOUND,
        "NOT_FOUND",
        &format!("no route for {path}"),
    )
}

/// Collect and parse a JSON request body into a closed type
pub async fn read_json<T: DeserializeOwned>(
    req: Request<Incoming>,
) -> Result<T, Response<Full<Bytes>>> {
    let bytes = match req.collect().await {
        Ok(body) => body.to_bytes(),
        Err(e) => {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                &format!("failed to read body: {e}"),
            ))
        }
    };

    if bytes.len() > MAX_BODY_BYTES {
        return Err(error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "BAD_REQUEST",
            "request body too large",
        ));
    }

    serde_json::from_slice(&bytes).map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            "BAD_REQUEST",
            &format!("invalid JSON body: {e}"),
        )
    })
}

/// Authenticate the caller from the Authorization header
pub async fn authenticate(
    state: &AppState,
    req: &Request<Incoming>,
) -> Result<CallerIdentity, Response<Full<Bytes>>> {
    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let Some(token) = extract_token_from_header(header_value) else {
        return Err(error_from(&AtriumError::AuthenticationRequired));
    };

    match state.verifier.verify(token).await {
        Ok(identity) => Ok(identity.caller()),
        Err(e) => Err(error_from(&e)),
    }
}

pub fn require_admin(caller: &CallerIdentity) -> Result<(), Response<Full<Bytes>>> {
    if caller.is_admin {
        Ok(())
    } else {
        Err(error_response(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "admin role required",
        ))
    }
}

/// Resolve the authenticated caller to their platform user record
pub async fn resolve_caller(
    state: &AppState,
    caller: &CallerIdentity,
) -> Result<UserDoc, Response<Full<Bytes>>> {
    match state.store.find_user_by_subject(&caller.subject_id).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(error_response(
            StatusCode::UNAUTHORIZED,
            "INVALID_CREDENTIAL",
            &format!("no account for subject {}", caller.subject_id),
        )),
        Err(e) => Err(error_from(&e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progression::ProgressionError;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (AtriumError::NotFound("user x".into()), StatusCode::NOT_FOUND),
            (
                AtriumError::AlreadyAssigned("s1".into()),
                StatusCode::CONFLICT,
            ),
            (AtriumError::GroupFull("g1".into()), StatusCode::CONFLICT),
            (
                AtriumError::Progression(ProgressionError::ModuleLocked { module: 3 }),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AtriumError::AuthenticationRequired,
                StatusCode::UNAUTHORIZED,
            ),
            (
                AtriumError::NotAuthorizedForRoom("group:g1".into()),
                StatusCode::FORBIDDEN,
            ),
            (
                AtriumError::Database("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(error_from(&err).status(), expected, "{err}");
        }
    }
}
