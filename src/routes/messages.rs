//! Group message posting
//!
//! POST /groups/{id}/messages - member-only; the message is fanned out to the
//! group's room and not persisted here (message storage is routine CRUD,
//! outside this core).

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::{authenticate, error_from, error_response, json_response, read_json, resolve_caller};
use crate::gateway::group_room;
use crate::server::AppState;
use crate::types::AtriumError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PostMessageRequest {
    text: String,
}

/// POST /groups/{id}/messages
pub async fn post_message(
    state: Arc<AppState>,
    req: Request<Incoming>,
    group_id: &str,
) -> Response<Full<Bytes>> {
    let caller = match authenticate(&state, &req).await {
        Ok(caller) => caller,
        Err(resp) => return resp,
    };
    let sender = match resolve_caller(&state, &caller).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    let body: PostMessageRequest = match read_json(req).await {
        Ok(body) => body,
        Err(resp) => return resp,
    };

    if body.text.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "BAD_REQUEST", "text must not be empty");
    }

    let allowed = caller.is_admin
        || match state.membership.is_member(&sender.user_id, group_id).await {
            Ok(is_member) => is_member,
            Err(e) => return error_from(&e),
        };

    if !allowed {
        return error_from(&AtriumError::NotAuthorizedForRoom(group_room(group_id)));
    }

    state.gateway.broadcast_to_group(
        group_id,
        "message_posted",
        json!({
            "groupId": group_id,
            "userId": sender.user_id,
            "text": body.text,
            "sentAt": chrono::Utc::now().to_rfc3339(),
        }),
    );

    json_response(StatusCode::ACCEPTED, &json!({ "status": "broadcast" }))
}
