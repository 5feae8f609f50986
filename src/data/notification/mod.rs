use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub static NOTIFICATION_COLLECTION_NAME: &str = "notification";

pub const MESSAGE_MAX_LEN: usize = 1000;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
pub enum NotificationType {
    Info,
    Warning,
    Alert,
    Success,
    Request,
    Feedback,
    Deadline,
    Meeting,
    System,
    Approval,
    Rejection,
    Comment,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::Info => "Info",
            NotificationType::Warning => "Warning",
            NotificationType::Alert => "Alert",
            NotificationType::Success => "Success",
            NotificationType::Request => "Request",
            NotificationType::Feedback => "Feedback",
            NotificationType::Deadline => "Deadline",
            NotificationType::Meeting => "Meeting",
            NotificationType::System => "System",
            NotificationType::Approval => "Approval",
            NotificationType::Rejection => "Rejection",
            NotificationType::Comment => "Comment",
        }
    }
}

impl Default for NotificationType {
    fn default() -> Self {
        NotificationType::Info
    }
}

#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize, ToSchema,
)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub user: Uuid,
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: NotificationType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Builds an unread notification. Messages longer than the stored limit are cut.
    pub fn new(
        user: Uuid,
        message: impl AsRef<str>,
        kind: NotificationType,
        priority: Priority,
        link: Option<&str>,
    ) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user,
            message: message.as_ref().chars().take(MESSAGE_MAX_LEN).collect(),
            is_read: false,
            link: link.map(str::to_string),
            kind,
            priority,
            created_at: crate::util::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub id: Uuid,
    pub user: Uuid,
    pub message: String,
    pub is_read: bool,
    pub link: Option<String>,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        NotificationResponse {
            id: n.id,
            user: n.user,
            message: n.message,
            is_read: n.is_read,
            link: n.link,
            kind: n.kind,
            priority: n.priority,
            created_at: n.created_at,
        }
    }
}

/// Start (Sunday 00:00) and end (Saturday 23:59:59.999) of the UTC week containing `now`.
pub fn week_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let days_from_sunday = now.weekday().num_days_from_sunday() as i64;
    let date = now.date_naive() - Duration::days(days_from_sunday);
    let start = date
        .and_hms_opt(0, 0, 0)
        .map(|it| Utc.from_utc_datetime(&it))
        .unwrap_or(now);
    let end = start + Duration::days(7) - Duration::milliseconds(1);
    (start, end)
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationCounts {
    pub unread: u64,
    pub read: u64,
    pub high_priority: u64,
    pub this_week: u64,
}

impl NotificationCounts {
    pub fn tally(notifications: &[Notification], now: DateTime<Utc>) -> NotificationCounts {
        let (start, end) = week_bounds(now);
        notifications
            .iter()
            .fold(NotificationCounts::default(), |mut counts, n| {
                if n.is_read {
                    counts.read += 1;
                } else {
                    counts.unread += 1;
                }
                if n.priority == Priority::High {
                    counts.high_priority += 1;
                }
                if n.created_at >= start && n.created_at <= end {
                    counts.this_week += 1;
                }
                counts
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    #[test]
    fn week_runs_sunday_to_saturday() {
        // 2024-05-01 was a Wednesday.
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 15, 30, 0).unwrap();
        let (start, end) = week_bounds(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 4, 28, 0, 0, 0).unwrap());
        assert_eq!(start.weekday(), Weekday::Sun);
        assert_eq!(end.weekday(), Weekday::Sat);
        assert_eq!(
            end,
            Utc.with_ymd_and_hms(2024, 5, 4, 23, 59, 59).unwrap() + Duration::milliseconds(999)
        );
    }

    #[test]
    fn sunday_starts_its_own_week() {
        let now = Utc.with_ymd_and_hms(2024, 4, 28, 0, 0, 0).unwrap();
        assert_eq!(week_bounds(now).0, now);
    }

    #[test]
    fn counts_cover_read_state_priority_and_week() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let user = Uuid::new_v4();
        let mut old = Notification::new(user, "old", NotificationType::Info, Priority::Low, None);
        old.created_at = now - Duration::days(10);
        old.is_read = true;
        let mut fresh =
            Notification::new(user, "new", NotificationType::Request, Priority::High, None);
        fresh.created_at = now;

        let counts = NotificationCounts::tally(&[old, fresh], now);
        assert_eq!(
            counts,
            NotificationCounts {
                unread: 1,
                read: 1,
                high_priority: 1,
                this_week: 1
            }
        );
    }

    #[test]
    fn long_messages_are_cut() {
        let n = Notification::new(
            Uuid::new_v4(),
            "x".repeat(1200),
            NotificationType::System,
            Priority::Low,
            Some("/x"),
        );
        assert_eq!(n.message.len(), MESSAGE_MAX_LEN);
        assert!(!n.is_read);
    }
}
