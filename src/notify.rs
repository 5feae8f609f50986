use uuid::Uuid;

use crate::data::notification::{Notification, NotificationType, Priority};
use crate::data::Store;

/// Appends a notification for `user`. Failures are logged and swallowed so the
/// state change that triggered the notification still succeeds.
pub async fn notify_user(
    store: &dyn Store,
    user: Uuid,
    message: impl AsRef<str>,
    kind: NotificationType,
    priority: Priority,
    link: Option<&str>,
) {
    let notification = Notification::new(user, message, kind, priority, link);
    if let Err(e) = store.insert_notification(&notification).await {
        tracing::warn!("Unable to notify user {}: {}", user, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::MemoryStore;
    use crate::data::NotificationQuery;

    #[rocket::async_test]
    async fn notifications_are_stored_unread() {
        let store = MemoryStore::default();
        let user = Uuid::new_v4();
        notify_user(
            &store,
            user,
            "hello",
            NotificationType::Request,
            Priority::Medium,
            Some("/teacher/requests"),
        )
        .await;

        let stored = store
            .list_notifications(
                &NotificationQuery {
                    user: Some(user),
                    ..Default::default()
                },
                None,
            )
            .await
            .expect("store works");
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].is_read);
        assert_eq!(stored[0].link.as_deref(), Some("/teacher/requests"));
    }
}
