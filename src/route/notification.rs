use std::sync::Arc;

use chrono::Utc;
use rocket::{Route, State};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::notification::{NotificationCounts, NotificationResponse, NotificationType};
use crate::data::{NotificationQuery, Store};
use crate::middleware::paging::PageState;
use crate::resp::envelope::{Envelope, Reply};
use crate::resp::jwt::Principal;
use crate::resp::problem::Problem;
use crate::role::Role;

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;

    #[inline]
    pub fn not_found() -> Problem {
        Problem::new(Status::NotFound, "Notification not found")
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationList {
    pub notifications: Vec<NotificationResponse>,
    #[serde(flatten)]
    pub counts: NotificationCounts,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationData {
    pub notification: NotificationResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkedAll {
    pub modified: u64,
}

/// The caller's notifications with read, priority and weekly counts
///
/// Admins see every supervisor request notification instead of their own.
/// Counts cover every matching notification, not just the requested page.
#[utoipa::path(
    get,
    path = "/notification",
    params(
        ("page" = Option<u32>, Query, description = "Zero based page, listing is unpaged when omitted"),
        ("len" = Option<u32>, Query, description = "Page length"),
    ),
    responses((status = 200, description = "Notifications newest first", body = NotificationList)),
    security(("jwt" = []))
)]
#[get("/")]
#[tracing::instrument(skip(store))]
pub async fn list(
    principal: Principal,
    paging: PageState,
    store: &State<Arc<dyn Store>>,
) -> Reply<NotificationList> {
    let query = match principal.role() {
        Role::Admin => NotificationQuery {
            kind: Some(NotificationType::Request),
            ..Default::default()
        },
        _ => NotificationQuery {
            user: Some(principal.id()),
            ..Default::default()
        },
    };

    let notifications = store.list_notifications(&query, None).await?;
    let counts = NotificationCounts::tally(&notifications, Utc::now());
    let notifications = match paging.to_page() {
        Some(page) => page.window(notifications),
        None => notifications,
    };

    Ok(Envelope::ok(NotificationList {
        notifications: notifications
            .into_iter()
            .map(NotificationResponse::from)
            .collect(),
        counts,
    })
    .message("Notifications fetched successfully"))
}

/// Mark one of the caller's notifications as read
#[utoipa::path(
    put,
    path = "/notification/mark-as-read/{id}",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Notification marked as read", body = NotificationData),
        (status = 404, description = "No such notification for the caller", body = Problem),
    ),
    security(("jwt" = []))
)]
#[put("/mark-as-read/<id>")]
#[tracing::instrument(skip(store))]
pub async fn mark_as_read(
    principal: Principal,
    id: Uuid,
    store: &State<Arc<dyn Store>>,
) -> Reply<NotificationData> {
    let notification = store
        .mark_notification_read(id, principal.id())
        .await?
        .ok_or_else(problem::not_found)?;

    Ok(Envelope::ok(NotificationData {
        notification: notification.into(),
    })
    .message("Notification marked as read"))
}

/// Mark all of the caller's notifications as read
#[utoipa::path(
    put,
    path = "/notification/mark-all-as-read",
    responses((status = 200, description = "Number of notifications changed", body = MarkedAll)),
    security(("jwt" = []))
)]
#[put("/mark-all-as-read")]
#[tracing::instrument(skip(store))]
pub async fn mark_all_as_read(
    principal: Principal,
    store: &State<Arc<dyn Store>>,
) -> Reply<MarkedAll> {
    let modified = store.mark_all_notifications_read(principal.id()).await?;
    tracing::debug!("Marked {} notifications of {} as read", modified, principal.id());

    Ok(Envelope::ok(MarkedAll { modified }).message("All notifications marked as read"))
}

/// Delete one of the caller's notifications
#[utoipa::path(
    delete,
    path = "/notification/{id}/delete",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Notification deleted"),
        (status = 404, description = "No such notification for the caller", body = Problem),
    ),
    security(("jwt" = []))
)]
#[delete("/<id>/delete")]
#[tracing::instrument(skip(store))]
pub async fn delete(
    principal: Principal,
    id: Uuid,
    store: &State<Arc<dyn Store>>,
) -> Result<Envelope<()>, Problem> {
    store
        .delete_notification(id, principal.id())
        .await?
        .ok_or_else(problem::not_found)?;

    Ok(Envelope::ok(()).message("Notification deleted successfully"))
}

pub fn routes() -> Vec<Route> {
    routes![list, mark_as_read, mark_all_as_read, delete]
}
