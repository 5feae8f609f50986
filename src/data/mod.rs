use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::role::Role;
use deadline::Deadline;
use notification::{Notification, NotificationType};
use project::{Feedback, Project, ProjectFile, ProjectStatus};
use request::{RequestStatus, SupervisorRequest};
use user::User;

pub mod deadline;
pub mod memory;
pub mod mongo;
pub mod notification;
pub mod project;
pub mod request;
pub mod serde_helpers;
pub mod user;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
    #[error(transparent)]
    BsonSer(#[from] bson::ser::Error),
    #[error(transparent)]
    BsonDe(#[from] bson::de::Error),
    #[error("duplicate {0}")]
    Duplicate(String),
}

/// Window of a listing.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Page {
    pub skip: u64,
    pub limit: u64,
}

impl Page {
    pub fn first(limit: u64) -> Page {
        Page { skip: 0, limit }
    }

    pub(crate) fn window<T>(self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.skip as usize)
            .take(self.limit as usize)
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    pub role: Option<Role>,
    pub exclude_role: Option<Role>,
    pub supervisor: Option<Uuid>,
}

impl UserQuery {
    pub fn role(role: Role) -> UserQuery {
        UserQuery {
            role: Some(role),
            ..Default::default()
        }
    }

    pub fn matches(&self, user: &User) -> bool {
        self.role.map_or(true, |it| user.role == it)
            && self.exclude_role.map_or(true, |it| user.role != it)
            && self.supervisor.map_or(true, |it| user.supervisor == Some(it))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProjectQuery {
    pub student: Option<Uuid>,
    pub supervisor: Option<Uuid>,
    pub status: Option<ProjectStatus>,
}

impl ProjectQuery {
    pub fn matches(&self, project: &Project) -> bool {
        self.student.map_or(true, |it| project.student == it)
            && self.supervisor.map_or(true, |it| project.supervisor == Some(it))
            && self.status.map_or(true, |it| project.status == it)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestQuery {
    pub student: Option<Uuid>,
    pub supervisor: Option<Uuid>,
    pub status: Option<RequestStatus>,
}

impl RequestQuery {
    pub fn matches(&self, request: &SupervisorRequest) -> bool {
        self.student.map_or(true, |it| request.student == it)
            && self.supervisor.map_or(true, |it| request.supervisor == it)
            && self.status.map_or(true, |it| request.status == it)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotificationQuery {
    pub user: Option<Uuid>,
    pub kind: Option<NotificationType>,
}

impl NotificationQuery {
    pub fn matches(&self, notification: &Notification) -> bool {
        self.user.map_or(true, |it| notification.user == it)
            && self.kind.map_or(true, |it| notification.kind == it)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeadlineQuery {
    pub project: Option<Uuid>,
    pub due_after: Option<DateTime<Utc>>,
}

impl DeadlineQuery {
    pub fn matches(&self, deadline: &Deadline) -> bool {
        self.project.map_or(true, |it| deadline.project == Some(it))
            && self.due_after.map_or(true, |it| deadline.due_date >= it)
    }
}

/// Outcome of [`Store::assign_supervisor`].
#[derive(Debug, Clone)]
pub enum Assignment {
    Assigned {
        student: User,
        supervisor: User,
        project: Project,
    },
    /// The project gained a supervisor or left the Approved state.
    ProjectUnavailable,
    CapacityReached,
    NotFound,
}

/// Persistence port shared by the MongoDB database and the in-memory store.
///
/// Lookups return `Ok(None)` when nothing matches; listings are ordered newest
/// first except deadlines, which are ordered by due date.
#[rocket::async_trait]
pub trait Store: Send + Sync {
    /// Prepares collections and indexes.
    async fn setup(&self) -> Result<(), StoreError>;

    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    /// Finds the user holding an unexpired reset token with the given digest.
    async fn find_user_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError>;
    async fn save_user(&self, user: &User) -> Result<(), StoreError>;
    async fn set_user_project(
        &self,
        student: Uuid,
        project: Option<Uuid>,
    ) -> Result<(), StoreError>;
    async fn delete_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn list_users(
        &self,
        query: &UserQuery,
        page: Option<Page>,
    ) -> Result<Vec<User>, StoreError>;
    async fn count_users(&self, query: &UserQuery) -> Result<u64, StoreError>;

    async fn insert_project(&self, project: &Project) -> Result<(), StoreError>;
    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, StoreError>;
    async fn latest_project_for(&self, student: Uuid) -> Result<Option<Project>, StoreError>;
    async fn delete_project(&self, id: Uuid) -> Result<Option<Project>, StoreError>;
    async fn list_projects(
        &self,
        query: &ProjectQuery,
        page: Option<Page>,
    ) -> Result<Vec<Project>, StoreError>;
    async fn count_projects(&self, query: &ProjectQuery) -> Result<u64, StoreError>;
    async fn push_project_files(
        &self,
        id: Uuid,
        files: &[ProjectFile],
    ) -> Result<Option<Project>, StoreError>;
    async fn push_project_feedback(
        &self,
        id: Uuid,
        feedback: &Feedback,
    ) -> Result<Option<Project>, StoreError>;
    async fn set_project_status(
        &self,
        id: Uuid,
        status: ProjectStatus,
    ) -> Result<Option<Project>, StoreError>;
    async fn set_project_deadline(
        &self,
        id: Uuid,
        deadline: DateTime<Utc>,
    ) -> Result<Option<Project>, StoreError>;

    /// Fails with [`StoreError::Duplicate`] when the pair already has a pending request.
    async fn insert_request(&self, request: &SupervisorRequest) -> Result<(), StoreError>;
    async fn get_request(&self, id: Uuid) -> Result<Option<SupervisorRequest>, StoreError>;
    async fn list_requests(
        &self,
        query: &RequestQuery,
        page: Option<Page>,
    ) -> Result<Vec<SupervisorRequest>, StoreError>;
    async fn count_requests(&self, query: &RequestQuery) -> Result<u64, StoreError>;
    /// Moves a pending request addressed to `supervisor` into `status`.
    ///
    /// Returns `None` when no such pending request exists.
    async fn transition_request(
        &self,
        id: Uuid,
        supervisor: Uuid,
        status: RequestStatus,
    ) -> Result<Option<SupervisorRequest>, StoreError>;

    async fn insert_notification(&self, notification: &Notification) -> Result<(), StoreError>;
    async fn list_notifications(
        &self,
        query: &NotificationQuery,
        page: Option<Page>,
    ) -> Result<Vec<Notification>, StoreError>;
    async fn mark_notification_read(
        &self,
        id: Uuid,
        user: Uuid,
    ) -> Result<Option<Notification>, StoreError>;
    async fn mark_all_notifications_read(&self, user: Uuid) -> Result<u64, StoreError>;
    async fn delete_notification(
        &self,
        id: Uuid,
        user: Uuid,
    ) -> Result<Option<Notification>, StoreError>;

    async fn insert_deadline(&self, deadline: &Deadline) -> Result<(), StoreError>;
    async fn list_deadlines(
        &self,
        query: &DeadlineQuery,
        page: Option<Page>,
    ) -> Result<Vec<Deadline>, StoreError>;

    /// Links `student`, `supervisor` and `project` if the project is still approved
    /// and unsupervised and the supervisor has spare capacity.
    async fn assign_supervisor(
        &self,
        student: Uuid,
        supervisor: Uuid,
        project: Uuid,
    ) -> Result<Assignment, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_window_listings() {
        let page = Page { skip: 2, limit: 2 };
        assert_eq!(page.window(vec![1, 2, 3, 4, 5]), vec![3, 4]);
        assert_eq!(Page::first(10).window(vec![1, 2]), vec![1, 2]);
    }

    #[test]
    fn empty_queries_match_everything() {
        let project = Project::new(Uuid::new_v4(), "X", "Y");
        assert!(ProjectQuery::default().matches(&project));
        assert!(!ProjectQuery {
            supervisor: Some(Uuid::new_v4()),
            ..Default::default()
        }
        .matches(&project));
    }
}
