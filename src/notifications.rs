use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::{Notification, NotificationKind};
use crate::core::shared::state::AppState;

/// Record a notification. Failures are logged and never fail the caller.
pub async fn notify(
    state: &AppState,
    user_id: Uuid,
    workspace_id: Option<Uuid>,
    kind: NotificationKind,
    message: String,
) {
    let notification = Notification {
        id: Uuid::new_v4(),
        user_id,
        workspace_id,
        kind,
        message,
        read: false,
        created_at: Utc::now(),
    };
    if let Err(e) = state.store.create_notification(notification).await {
        log::warn!("Failed to record {} notification for {}: {}", kind.as_str(), user_id, e);
    }
}

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
) -> ApiResult<Json<serde_json::Value>> {
    let notifications = state.store.list_notifications(user.id).await?;
    let unread = notifications.iter().filter(|n| !n.read).count();
    Ok(Json(serde_json::json!({
        "notifications": notifications,
        "unread": unread,
    })))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.store.mark_notification_read(user.id, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("Notification"))
    }
}

pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
) -> ApiResult<Json<serde_json::Value>> {
    let updated = state.store.mark_all_notifications_read(user.id).await?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/{id}/read", post(mark_read))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AppConfig;

    #[tokio::test]
    async fn test_notify_then_mark_read() {
        let state = AppState::in_memory(AppConfig::default());
        let user = Uuid::new_v4();
        notify(&state, user, None, NotificationKind::PostPublished, "Hello".into()).await;
        notify(&state, user, None, NotificationKind::RoleChanged, "Again".into()).await;

        let list = state.store.list_notifications(user).await.unwrap();
        assert_eq!(list.len(), 2);
        assert!(state.store.mark_notification_read(user, list[0].id).await.unwrap());
        assert!(!state.store.mark_notification_read(Uuid::new_v4(), list[1].id).await.unwrap());
        assert_eq!(state.store.mark_all_notifications_read(user).await.unwrap(), 1);
    }
}
