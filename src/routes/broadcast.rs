//! Platform-wide announcement routes
//!
//! - POST /broadcast/news   (admin) news to every connection
//! - POST /broadcast/exam   (admin) exam notice to one group's room
//!
//! Delivery is best-effort; a broadcast with no listeners still succeeds.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::{authenticate, error_response, json_response, read_json, require_admin};
use crate::server::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct NewsRequest {
    title: String,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ExamRequest {
    group_id: String,
    exam_id: String,
    #[serde(default)]
    title: Option<String>,
}

/// POST /broadcast/news
pub async fn news(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let caller = match authenticate(&state, &req).await {
        Ok(caller) => caller,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_admin(&caller) {
        return resp;
    }

    let body: NewsRequest = match read_json(req).await {
        Ok(body) => body,
        Err(resp) => return resp,
    };

    if body.title.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "BAD_REQUEST", "title must not be empty");
    }

    state.gateway.broadcast_to_all(
        "news_broadcast",
        json!({
            "title": body.title,
            "body": body.body,
            "postedAt": chrono::Utc::now().to_rfc3339(),
        }),
    );

    json_response(StatusCode::ACCEPTED, &json!({ "status": "broadcast" }))
}

/// POST /broadcast/exam
pub async fn exam(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let caller = match authenticate(&state, &req).await {
        Ok(caller) => caller,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_admin(&caller) {
        return resp;
    }

    let body: ExamRequest = match read_json(req).await {
        Ok(body) => body,
        Err(resp) => return resp,
    };

    state.gateway.broadcast_to_group(
        &body.group_id,
        "exam_broadcast",
        json!({
            "groupId": body.group_id,
            "examId": body.exam_id,
            "title": body.title,
            "postedAt": chrono::Utc::now().to_rfc3339(),
        }),
    );

    json_response(StatusCode::ACCEPTED, &json!({ "status": "broadcast" }))
}
