use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::deadline::Deadline;
use super::notification::Notification;
use super::project::{Feedback, Project, ProjectFile, ProjectStatus};
use super::request::{RequestStatus, SupervisorRequest};
use super::user::User;
use super::{
    Assignment, DeadlineQuery, NotificationQuery, Page, ProjectQuery, RequestQuery, Store,
    StoreError, UserQuery,
};

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    projects: Vec<Project>,
    requests: Vec<SupervisorRequest>,
    notifications: Vec<Notification>,
    deadlines: Vec<Deadline>,
}

/// Process local [`Store`] used for development and tests.
///
/// Every operation runs under one lock, so compound writes are atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Newest first, then windowed.
fn newest_first<T: Clone>(
    items: impl Iterator<Item = T>,
    created_at: impl Fn(&T) -> DateTime<Utc>,
    page: Option<Page>,
) -> Vec<T> {
    let mut items: Vec<T> = items.collect();
    // stable sort keeps insertion order for equal timestamps, reversed below
    items.reverse();
    items.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    match page {
        Some(page) => page.window(items),
        None => items,
    }
}

#[rocket::async_trait]
impl Store for MemoryStore {
    async fn setup(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut tables = self.lock();
        if tables.users.iter().any(|it| it.email == user.email) {
            return Err(StoreError::Duplicate("email".to_string()));
        }
        tables.users.push(user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.lock().users.iter().find(|it| it.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|it| it.email == email)
            .cloned())
    }

    async fn find_user_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|it| {
                it.reset_token_hash.as_deref() == Some(token_hash)
                    && it.reset_token_expires.map_or(false, |expires| expires > now)
            })
            .cloned())
    }

    async fn save_user(&self, user: &User) -> Result<(), StoreError> {
        let mut tables = self.lock();
        if tables
            .users
            .iter()
            .any(|it| it.id != user.id && it.email == user.email)
        {
            return Err(StoreError::Duplicate("email".to_string()));
        }
        if let Some(existing) = tables.users.iter_mut().find(|it| it.id == user.id) {
            *existing = user.clone();
        }
        Ok(())
    }

    async fn set_user_project(
        &self,
        student: Uuid,
        project: Option<Uuid>,
    ) -> Result<(), StoreError> {
        if let Some(user) = self.lock().users.iter_mut().find(|it| it.id == student) {
            user.project = project;
            user.updated_at = crate::util::now();
        }
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let mut tables = self.lock();
        let index = tables.users.iter().position(|it| it.id == id);
        Ok(index.map(|i| tables.users.remove(i)))
    }

    async fn list_users(
        &self,
        query: &UserQuery,
        page: Option<Page>,
    ) -> Result<Vec<User>, StoreError> {
        let tables = self.lock();
        Ok(newest_first(
            tables.users.iter().filter(|it| query.matches(it)).cloned(),
            |it| it.created_at,
            page,
        ))
    }

    async fn count_users(&self, query: &UserQuery) -> Result<u64, StoreError> {
        Ok(self.lock().users.iter().filter(|it| query.matches(it)).count() as u64)
    }

    async fn insert_project(&self, project: &Project) -> Result<(), StoreError> {
        self.lock().projects.push(project.clone());
        Ok(())
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        Ok(self.lock().projects.iter().find(|it| it.id == id).cloned())
    }

    async fn latest_project_for(&self, student: Uuid) -> Result<Option<Project>, StoreError> {
        let tables = self.lock();
        Ok(newest_first(
            tables
                .projects
                .iter()
                .filter(|it| it.student == student)
                .cloned(),
            |it| it.created_at,
            Some(Page::first(1)),
        )
        .pop())
    }

    async fn delete_project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        let mut tables = self.lock();
        let index = tables.projects.iter().position(|it| it.id == id);
        Ok(index.map(|i| tables.projects.remove(i)))
    }

    async fn list_projects(
        &self,
        query: &ProjectQuery,
        page: Option<Page>,
    ) -> Result<Vec<Project>, StoreError> {
        let tables = self.lock();
        Ok(newest_first(
            tables.projects.iter().filter(|it| query.matches(it)).cloned(),
            |it| it.created_at,
            page,
        ))
    }

    async fn count_projects(&self, query: &ProjectQuery) -> Result<u64, StoreError> {
        Ok(self
            .lock()
            .projects
            .iter()
            .filter(|it| query.matches(it))
            .count() as u64)
    }

    async fn push_project_files(
        &self,
        id: Uuid,
        files: &[ProjectFile],
    ) -> Result<Option<Project>, StoreError> {
        Ok(self.update_project(id, |project| {
            project.files.extend_from_slice(files);
        }))
    }

    async fn push_project_feedback(
        &self,
        id: Uuid,
        feedback: &Feedback,
    ) -> Result<Option<Project>, StoreError> {
        Ok(self.update_project(id, |project| {
            project.feedback.push(feedback.clone());
        }))
    }

    async fn set_project_status(
        &self,
        id: Uuid,
        status: ProjectStatus,
    ) -> Result<Option<Project>, StoreError> {
        Ok(self.update_project(id, |project| project.status = status))
    }

    async fn set_project_deadline(
        &self,
        id: Uuid,
        deadline: DateTime<Utc>,
    ) -> Result<Option<Project>, StoreError> {
        Ok(self.update_project(id, |project| project.deadline = Some(deadline)))
    }

    async fn insert_request(&self, request: &SupervisorRequest) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let pending_exists = request.status == RequestStatus::Pending
            && tables.requests.iter().any(|it| {
                it.student == request.student
                    && it.supervisor == request.supervisor
                    && it.status == RequestStatus::Pending
            });
        if pending_exists {
            return Err(StoreError::Duplicate("request".to_string()));
        }
        tables.requests.push(request.clone());
        Ok(())
    }

    async fn get_request(&self, id: Uuid) -> Result<Option<SupervisorRequest>, StoreError> {
        Ok(self.lock().requests.iter().find(|it| it.id == id).cloned())
    }

    async fn list_requests(
        &self,
        query: &RequestQuery,
        page: Option<Page>,
    ) -> Result<Vec<SupervisorRequest>, StoreError> {
        let tables = self.lock();
        Ok(newest_first(
            tables.requests.iter().filter(|it| query.matches(it)).cloned(),
            |it| it.created_at,
            page,
        ))
    }

    async fn count_requests(&self, query: &RequestQuery) -> Result<u64, StoreError> {
        Ok(self
            .lock()
            .requests
            .iter()
            .filter(|it| query.matches(it))
            .count() as u64)
    }

    async fn transition_request(
        &self,
        id: Uuid,
        supervisor: Uuid,
        status: RequestStatus,
    ) -> Result<Option<SupervisorRequest>, StoreError> {
        let mut tables = self.lock();
        let request = tables.requests.iter_mut().find(|it| {
            it.id == id && it.supervisor == supervisor && it.status == RequestStatus::Pending
        });
        Ok(request.map(|it| {
            it.status = status;
            it.updated_at = crate::util::now();
            it.clone()
        }))
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<(), StoreError> {
        self.lock().notifications.push(notification.clone());
        Ok(())
    }

    async fn list_notifications(
        &self,
        query: &NotificationQuery,
        page: Option<Page>,
    ) -> Result<Vec<Notification>, StoreError> {
        let tables = self.lock();
        Ok(newest_first(
            tables
                .notifications
                .iter()
                .filter(|it| query.matches(it))
                .cloned(),
            |it| it.created_at,
            page,
        ))
    }

    async fn mark_notification_read(
        &self,
        id: Uuid,
        user: Uuid,
    ) -> Result<Option<Notification>, StoreError> {
        let mut tables = self.lock();
        let notification = tables
            .notifications
            .iter_mut()
            .find(|it| it.id == id && it.user == user);
        Ok(notification.map(|it| {
            it.is_read = true;
            it.clone()
        }))
    }

    async fn mark_all_notifications_read(&self, user: Uuid) -> Result<u64, StoreError> {
        let mut tables = self.lock();
        let mut modified = 0;
        for it in tables
            .notifications
            .iter_mut()
            .filter(|it| it.user == user && !it.is_read)
        {
            it.is_read = true;
            modified += 1;
        }
        Ok(modified)
    }

    async fn delete_notification(
        &self,
        id: Uuid,
        user: Uuid,
    ) -> Result<Option<Notification>, StoreError> {
        let mut tables = self.lock();
        let index = tables
            .notifications
            .iter()
            .position(|it| it.id == id && it.user == user);
        Ok(index.map(|i| tables.notifications.remove(i)))
    }

    async fn insert_deadline(&self, deadline: &Deadline) -> Result<(), StoreError> {
        self.lock().deadlines.push(deadline.clone());
        Ok(())
    }

    async fn list_deadlines(
        &self,
        query: &DeadlineQuery,
        page: Option<Page>,
    ) -> Result<Vec<Deadline>, StoreError> {
        let tables = self.lock();
        let mut deadlines: Vec<Deadline> = tables
            .deadlines
            .iter()
            .filter(|it| query.matches(it))
            .cloned()
            .collect();
        deadlines.sort_by_key(|it| it.due_date);
        Ok(match page {
            Some(page) => page.window(deadlines),
            None => deadlines,
        })
    }

    async fn assign_supervisor(
        &self,
        student: Uuid,
        supervisor: Uuid,
        project: Uuid,
    ) -> Result<Assignment, StoreError> {
        let mut tables = self.lock();
        let Tables {
            users, projects, ..
        } = &mut *tables;

        let project = match projects.iter_mut().find(|it| it.id == project) {
            Some(it) if it.student == student => it,
            _ => return Ok(Assignment::NotFound),
        };
        if project.supervisor.is_some() || project.status != ProjectStatus::Approved {
            return Ok(Assignment::ProjectUnavailable);
        }

        let (teacher_index, student_index) = match (
            users.iter().position(|it| it.id == supervisor),
            users.iter().position(|it| it.id == student),
        ) {
            (Some(t), Some(s)) => (t, s),
            _ => return Ok(Assignment::NotFound),
        };
        if !users[teacher_index].has_capacity() {
            return Ok(Assignment::CapacityReached);
        }

        let now = crate::util::now();
        project.supervisor = Some(supervisor);
        project.updated_at = now;

        let teacher = &mut users[teacher_index];
        if !teacher.assigned_students.contains(&student) {
            teacher.assigned_students.push(student);
        }
        teacher.updated_at = now;
        let teacher = teacher.clone();

        let pupil = &mut users[student_index];
        pupil.supervisor = Some(supervisor);
        pupil.updated_at = now;

        Ok(Assignment::Assigned {
            student: pupil.clone(),
            supervisor: teacher,
            project: project.clone(),
        })
    }
}

impl MemoryStore {
    fn update_project(&self, id: Uuid, change: impl FnOnce(&mut Project)) -> Option<Project> {
        let mut tables = self.lock();
        tables.projects.iter_mut().find(|it| it.id == id).map(|it| {
            change(it);
            it.updated_at = crate::util::now();
            it.clone()
        })
    }
}
