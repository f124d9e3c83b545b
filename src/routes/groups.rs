//! Group and membership routes
//!
//! - POST   /groups                        (admin) create an empty group
//! - GET    /users/{id}/groups             list a user's groups
//! - GET    /groups/{id}/members/{uid}     membership test
//! - POST   /groups/{id}/members           assign a member
//! - DELETE /groups/{id}/members/{uid}     remove a member
//!
//! Successful membership mutations broadcast `group_updated` to the group's
//! room and to the affected user's personal room.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use super::{
    authenticate, error_from, error_response, json_response, read_json, require_admin,
    resolve_caller,
};
use crate::db::schemas::{GroupDoc, GroupType, PathLevel};
use crate::server::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CreateGroupRequest {
    name: String,
    group_type: GroupType,
    #[serde(default)]
    level: Option<PathLevel>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AssignRequest {
    user_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GroupView {
    group_id: String,
    name: String,
    group_type: GroupType,
    #[serde(skip_serializing_if = "Option::is_none")]
    level: Option<PathLevel>,
    created_by: String,
    members: Vec<String>,
}

impl From<GroupDoc> for GroupView {
    fn from(group: GroupDoc) -> Self {
        Self {
            group_id: group.group_id,
            name: group.name,
            group_type: group.group_type,
            level: group.level,
            created_by: group.created_by,
            members: group.members,
        }
    }
}

/// POST /groups
pub async fn create_group(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let caller = match authenticate(&state, &req).await {
        Ok(caller) => caller,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_admin(&caller) {
        return resp;
    }
    let creator = match resolve_caller(&state, &caller).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    let body: CreateGroupRequest = match read_json(req).await {
        Ok(body) => body,
        Err(resp) => return resp,
    };

    if body.name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "BAD_REQUEST", "name must not be empty");
    }

    match state
        .membership
        .create_group(body.name, body.group_type, body.level, creator.user_id)
        .await
    {
        Ok(group) => json_response(StatusCode::CREATED, &GroupView::from(group)),
        Err(e) => error_from(&e),
    }
}

/// GET /users/{id}/groups
pub async fn list_user_groups(
    state: Arc<AppState>,
    req: Request<Incoming>,
    user_id: &str,
) -> Response<Full<Bytes>> {
    if let Err(resp) = authenticate(&state, &req).await {
        return resp;
    }

    match state.membership.groups_for_user(user_id).await {
        Ok(groups) => {
            let views: Vec<GroupView> = groups.into_iter().map(GroupView::from).collect();
            json_response(StatusCode::OK, &views)
        }
        Err(e) => error_from(&e),
    }
}

/// GET /groups/{id}/members/{uid}
pub async fn membership_check(
    state: Arc<AppState>,
    req: Request<Incoming>,
    group_id: &str,
    user_id: &str,
) -> Response<Full<Bytes>> {
    if let Err(resp) = authenticate(&state, &req).await {
        return resp;
    }

    match state.membership.is_member(user_id, group_id).await {
        Ok(is_member) => json_response(
            StatusCode::OK,
            &json!({ "groupId": group_id, "userId": user_id, "isMember": is_member }),
        ),
        Err(e) => error_from(&e),
    }
}

/// POST /groups/{id}/members
pub async fn assign_member(
    state: Arc<AppState>,
    req: Request<Incoming>,
    group_id: &str,
) -> Response<Full<Bytes>> {
    let caller = match authenticate(&state, &req).await {
        Ok(caller) => caller,
        Err(resp) => return resp,
    };
    let caller_user = match resolve_caller(&state, &caller).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    let body: AssignRequest = match read_json(req).await {
        Ok(body) => body,
        Err(resp) => return resp,
    };

    // Admins may assign anyone; everyone else may only join themselves
    if !caller.is_admin && caller_user.user_id != body.user_id {
        return error_response(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "only admins may assign other users",
        );
    }

    if let Err(e) = state
        .membership
        .assign(&body.user_id, group_id, caller.is_admin)
        .await
    {
        return error_from(&e);
    }

    let payload = json!({
        "groupId": group_id,
        "userId": body.user_id,
        "action": "member_added",
    });
    state
        .gateway
        .broadcast_to_group(group_id, "group_updated", payload.clone());
    state
        .gateway
        .broadcast_to_user(&body.user_id, "group_updated", payload);

    json_response(
        StatusCode::OK,
        &json!({ "groupId": group_id, "userId": body.user_id, "assigned": true }),
    )
}

/// DELETE /groups/{id}/members/{uid}
pub async fn remove_member(
    state: Arc<AppState>,
    req: Request<Incoming>,
    group_id: &str,
    user_id: &str,
) -> Response<Full<Bytes>> {
    let caller = match authenticate(&state, &req).await {
        Ok(caller) => caller,
        Err(resp) => return resp,
    };
    let caller_user = match resolve_caller(&state, &caller).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    if !caller.is_admin && caller_user.user_id != user_id {
        return error_response(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "only admins may remove other users",
        );
    }

    if let Err(e) = state.membership.remove(user_id, group_id).await {
        return error_from(&e);
    }

    let payload = json!({
        "groupId": group_id,
        "userId": user_id,
        "action": "member_removed",
    });
    state
        .gateway
        .broadcast_to_group(group_id, "group_updated", payload.clone());
    state
        .gateway
        .broadcast_to_user(user_id, "group_updated", payload);

    json_response(
        StatusCode::OK,
        &json!({ "groupId": group_id, "userId": user_id, "removed": true }),
    )
}
