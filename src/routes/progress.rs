//! Progression routes
//!
//! - GET  /users/{id}/progress              current snapshot
//! - PUT  /users/{id}/progress              composite update (validated whole)
//! - POST /users/{id}/progress/lessons      lesson completion
//! - POST /users/{id}/progress/quizzes      module quiz result
//! - POST /users/{id}/progress/final-quiz   final quiz result
//!
//! Every rejected update names each violated rule; the PUT path returns the
//! complete list in one response. Accepted changes broadcast
//! `progress_updated` to the user's personal room.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{
    authenticate, error_from, error_response, json_response, read_json, resolve_caller,
};
use crate::auth::CallerIdentity;
use crate::db::schemas::UserDoc;
use crate::progression::{
    self, ModuleScore, ProgressSnapshot, ProgressUpdate, ProgressionError,
};
use crate::server::AppState;
use crate::types::AtriumError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressView {
    user_id: String,
    #[serde(flatten)]
    snapshot: ProgressSnapshot,
    highest_unlocked: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_unlockable: Option<u32>,
}

impl ProgressView {
    fn of(user_id: &str, snapshot: ProgressSnapshot) -> Self {
        let highest_unlocked = progression::highest_unlocked(&snapshot);
        let next_unlockable = progression::next_unlockable(&snapshot);
        Self {
            user_id: user_id.to_string(),
            snapshot,
            highest_unlocked,
            next_unlockable,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct LessonRequest {
    module_id: u32,
    lesson_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct QuizRequest {
    module_id: u32,
    score: f64,
    max_score: f64,
    #[serde(default)]
    exam_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FinalQuizRequest {
    score: f64,
    max_score: f64,
}

fn violations_response(violations: &[ProgressionError]) -> Response<Full<Bytes>> {
    let rendered: Vec<serde_json::Value> = violations
        .iter()
        .map(|v| json!({ "code": v.code(), "message": v.to_string() }))
        .collect();

    json_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        &json!({
            "error": "progress update rejected",
            "code": "VALIDATION_FAILED",
            "violations": rendered,
        }),
    )
}

/// Authorize access to a target user's progress, then load the record
async fn load_target(
    state: &AppState,
    req: &Request<Incoming>,
    user_id: &str,
) -> Result<(CallerIdentity, UserDoc), Response<Full<Bytes>>> {
    let caller = authenticate(state, req).await?;
    let caller_user = resolve_caller(state, &caller).await?;

    if !caller.is_admin && caller_user.user_id != user_id {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "progress belongs to another user",
        ));
    }

    let target = if caller_user.user_id == user_id {
        caller_user
    } else {
        match state.store.find_user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                return Err(error_from(&AtriumError::NotFound(format!(
                    "user {user_id}"
                ))))
            }
            Err(e) => return Err(error_from(&e)),
        }
    };

    Ok((caller, target))
}

/// Apply a validated update, then broadcast the resulting snapshot
async fn apply_and_broadcast(
    state: &AppState,
    user: &UserDoc,
    update: &ProgressUpdate,
) -> Result<ProgressSnapshot, Response<Full<Bytes>>> {
    if let Err(e) = state
        .store
        .apply_progress_update(&user.user_id, update)
        .await
    {
        return Err(error_from(&e));
    }

    let mut snapshot = user.progress.clone();
    snapshot.apply(update);

    state.gateway.broadcast_to_user(
        &user.user_id,
        "progress_updated",
        json!({
            "userId": user.user_id,
            "progress": snapshot,
        }),
    );

    Ok(snapshot)
}

/// GET /users/{id}/progress
pub async fn get_progress(
    state: Arc<AppState>,
    req: Request<Incoming>,
    user_id: &str,
) -> Response<Full<Bytes>> {
    let (_, target) = match load_target(&state, &req, user_id).await {
        Ok(loaded) => loaded,
        Err(resp) => return resp,
    };

    json_response(StatusCode::OK, &ProgressView::of(user_id, target.progress))
}

/// PUT /users/{id}/progress
pub async fn put_progress(
    state: Arc<AppState>,
    req: Request<Incoming>,
    user_id: &str,
) -> Response<Full<Bytes>> {
    let (_, target) = match load_target(&state, &req, user_id).await {
        Ok(loaded) => loaded,
        Err(resp) => return resp,
    };

    let update: ProgressUpdate = match read_json(req).await {
        Ok(update) => update,
        Err(resp) => return resp,
    };

    if let Err(violations) = progression::validate_update(&target.progress, &update) {
        return violations_response(&violations);
    }

    match apply_and_broadcast(&state, &target, &update).await {
        Ok(snapshot) => json_response(StatusCode::OK, &ProgressView::of(user_id, snapshot)),
        Err(resp) => resp,
    }
}

/// POST /users/{id}/progress/lessons
pub async fn complete_lesson(
    state: Arc<AppState>,
    req: Request<Incoming>,
    user_id: &str,
) -> Response<Full<Bytes>> {
    let (_, target) = match load_target(&state, &req, user_id).await {
        Ok(loaded) => loaded,
        Err(resp) => return resp,
    };

    let body: LessonRequest = match read_json(req).await {
        Ok(body) => body,
        Err(resp) => return resp,
    };

    if let Err(e) = progression::can_complete_lesson(&target.progress, body.module_id) {
        return error_from(&e.into());
    }

    state.gateway.broadcast_to_user(
        user_id,
        "progress_updated",
        json!({
            "userId": user_id,
            "moduleId": body.module_id,
            "lessonId": body.lesson_id,
            "action": "lesson_completed",
        }),
    );

    json_response(
        StatusCode::OK,
        &json!({
            "moduleId": body.module_id,
            "lessonId": body.lesson_id,
            "completed": true,
        }),
    )
}

/// POST /users/{id}/progress/quizzes
pub async fn complete_quiz(
    state: Arc<AppState>,
    req: Request<Incoming>,
    user_id: &str,
) -> Response<Full<Bytes>> {
    let (_, target) = match load_target(&state, &req, user_id).await {
        Ok(loaded) => loaded,
        Err(resp) => return resp,
    };

    let body: QuizRequest = match read_json(req).await {
        Ok(body) => body,
        Err(resp) => return resp,
    };

    if let Err(e) = progression::can_complete_quiz(body.score, body.max_score) {
        return error_from(&e.into());
    }

    // Scores may only be recorded against unlocked modules
    if !target.progress.unlocked_modules.contains(&body.module_id) {
        return error_from(&ProgressionError::ModuleLocked {
            module: body.module_id,
        }
        .into());
    }

    let entry = ModuleScore::from_result(body.score, body.max_score, body.exam_id);
    let passed = entry.is_passing();
    let percentage = entry.percentage;

    let update = ProgressUpdate {
        module_scores: Some(BTreeMap::from([(body.module_id, entry)])),
        ..Default::default()
    };

    match apply_and_broadcast(&state, &target, &update).await {
        Ok(snapshot) => json_response(
            StatusCode::OK,
            &json!({
                "moduleId": body.module_id,
                "percentage": percentage,
                "passed": passed,
                "nextUnlockable": progression::next_unlockable(&snapshot),
            }),
        ),
        Err(resp) => resp,
    }
}

/// POST /users/{id}/progress/final-quiz
pub async fn complete_final_quiz(
    state: Arc<AppState>,
    req: Request<Incoming>,
    user_id: &str,
) -> Response<Full<Bytes>> {
    let (_, target) = match load_target(&state, &req, user_id).await {
        Ok(loaded) => loaded,
        Err(resp) => return resp,
    };

    let body: FinalQuizRequest = match read_json(req).await {
        Ok(body) => body,
        Err(resp) => return resp,
    };

    if let Err(e) = progression::can_complete_final_quiz(body.score, body.max_score) {
        return error_from(&e.into());
    }

    let update = ProgressUpdate {
        final_quiz_passed: Some(true),
        ..Default::default()
    };

    match apply_and_broadcast(&state, &target, &update).await {
        Ok(_) => json_response(
            StatusCode::OK,
            &json!({ "finalQuizPassed": true }),
        ),
        Err(resp) => resp,
    }
}
