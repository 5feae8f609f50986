use bson::{doc, Bson, Document};
use chrono::{DateTime, Utc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{
    FindOneAndUpdateOptions, FindOneOptions, FindOptions, IndexOptions, ReturnDocument,
};
use mongodb::{Collection, Database, IndexModel};
use rocket::futures::TryStreamExt;
use uuid::Uuid;

use super::deadline::{Deadline, DEADLINE_COLLECTION_NAME};
use super::notification::{Notification, NOTIFICATION_COLLECTION_NAME};
use super::project::{Feedback, Project, ProjectFile, ProjectStatus, PROJECT_COLLECTION_NAME};
use super::request::{RequestStatus, SupervisorRequest, REQUEST_COLLECTION_NAME};
use super::user::{User, USER_COLLECTION_NAME};
use super::{
    Assignment, DeadlineQuery, NotificationQuery, Page, ProjectQuery, RequestQuery, Store,
    StoreError, UserQuery,
};
use crate::role::Role;

const DUPLICATE_KEY: i32 = 11000;

pub mod filter {
    use bson::{doc, Bson, Document};
    use uuid::Uuid;

    use crate::data::{DeadlineQuery, NotificationQuery, ProjectQuery, RequestQuery, UserQuery};

    #[inline]
    pub fn uuid(id: Uuid) -> Bson {
        Bson::from(bson::Uuid::from_uuid_1(id))
    }

    #[inline]
    pub fn by_id(id: Uuid) -> Document {
        doc! { "_id": uuid(id) }
    }

    #[inline]
    pub fn by_email(email: &str) -> Document {
        doc! { "email": email }
    }

    pub fn users(query: &UserQuery) -> Document {
        let mut filter = Document::new();
        match (query.role, query.exclude_role) {
            (Some(role), _) => {
                filter.insert("role", role.as_str());
            }
            (None, Some(excluded)) => {
                filter.insert("role", doc! { "$ne": excluded.as_str() });
            }
            (None, None) => {}
        }
        if let Some(supervisor) = query.supervisor {
            filter.insert("supervisor", uuid(supervisor));
        }
        filter
    }

    pub fn projects(query: &ProjectQuery) -> Document {
        let mut filter = Document::new();
        if let Some(student) = query.student {
            filter.insert("student", uuid(student));
        }
        if let Some(supervisor) = query.supervisor {
            filter.insert("supervisor", uuid(supervisor));
        }
        if let Some(status) = query.status {
            filter.insert("status", status.as_str());
        }
        filter
    }

    pub fn requests(query: &RequestQuery) -> Document {
        let mut filter = Document::new();
        if let Some(student) = query.student {
            filter.insert("student", uuid(student));
        }
        if let Some(supervisor) = query.supervisor {
            filter.insert("supervisor", uuid(supervisor));
        }
        if let Some(status) = query.status {
            filter.insert("status", status.as_str());
        }
        filter
    }

    pub fn notifications(query: &NotificationQuery) -> Document {
        let mut filter = Document::new();
        if let Some(user) = query.user {
            filter.insert("user", uuid(user));
        }
        if let Some(kind) = query.kind {
            filter.insert("type", kind.as_str());
        }
        filter
    }

    pub fn deadlines(query: &DeadlineQuery) -> Document {
        let mut filter = Document::new();
        if let Some(project) = query.project {
            filter.insert("project", uuid(project));
        }
        if let Some(after) = query.due_after {
            filter.insert(
                "due_date",
                doc! { "$gte": bson::DateTime::from_chrono(after) },
            );
        }
        filter
    }
}

use filter::uuid;

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) => we.code == DUPLICATE_KEY,
        ErrorKind::Command(ce) => ce.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn duplicate_as(what: &str) -> impl FnOnce(mongodb::error::Error) -> StoreError + '_ {
    move |e| {
        if is_duplicate_key(&e) {
            StoreError::Duplicate(what.to_string())
        } else {
            StoreError::Database(e)
        }
    }
}

fn newest_first(page: Option<Page>) -> FindOptions {
    sorted(doc! { "created_at": -1 }, page)
}

fn sorted(sort: Document, page: Option<Page>) -> FindOptions {
    let mut options = FindOptions::builder().sort(sort).build();
    if let Some(page) = page {
        options.skip = Some(page.skip);
        options.limit = Some(page.limit as i64);
    }
    options
}

fn after_update() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

fn touched(set: Document) -> Document {
    let mut set = set;
    set.insert("updated_at", bson::DateTime::now());
    set
}

async fn collect<T>(
    collection: Collection<T>,
    filter: Document,
    options: FindOptions,
) -> Result<Vec<T>, StoreError>
where
    T: serde::de::DeserializeOwned + Unpin + Send + Sync,
{
    Ok(collection
        .find(filter, options)
        .await?
        .try_collect::<Vec<T>>()
        .await?)
}

trait Collections {
    fn users(&self) -> Collection<User>;
    fn projects(&self) -> Collection<Project>;
    fn requests(&self) -> Collection<SupervisorRequest>;
    fn notifications(&self) -> Collection<Notification>;
    fn deadlines(&self) -> Collection<Deadline>;
}

impl Collections for Database {
    fn users(&self) -> Collection<User> {
        self.collection(USER_COLLECTION_NAME)
    }
    fn projects(&self) -> Collection<Project> {
        self.collection(PROJECT_COLLECTION_NAME)
    }
    fn requests(&self) -> Collection<SupervisorRequest> {
        self.collection(REQUEST_COLLECTION_NAME)
    }
    fn notifications(&self) -> Collection<Notification> {
        self.collection(NOTIFICATION_COLLECTION_NAME)
    }
    fn deadlines(&self) -> Collection<Deadline> {
        self.collection(DEADLINE_COLLECTION_NAME)
    }
}

#[rocket::async_trait]
impl Store for Database {
    async fn setup(&self) -> Result<(), StoreError> {
        tracing::info!("Creating MongoDB indexes...");

        self.users()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
                None,
            )
            .await?;

        self.requests()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "student": 1, "supervisor": 1 })
                    .options(
                        IndexOptions::builder()
                            .unique(true)
                            .partial_filter_expression(
                                doc! { "status": RequestStatus::Pending.as_str() },
                            )
                            .name("pending_pair".to_string())
                            .build(),
                    )
                    .build(),
                None,
            )
            .await?;

        self.projects()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "student": 1, "created_at": -1 })
                    .build(),
                None,
            )
            .await?;

        self.notifications()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user": 1, "is_read": 1 })
                    .build(),
                None,
            )
            .await?;

        self.deadlines()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "project": 1, "due_date": 1 })
                    .build(),
                None,
            )
            .await?;

        tracing::info!("MongoDB indexes ready.");
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.users()
            .insert_one(user, None)
            .await
            .map_err(duplicate_as("email"))?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users().find_one(filter::by_id(id), None).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users().find_one(filter::by_email(email), None).await?)
    }

    async fn find_user_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        Ok(self
            .users()
            .find_one(
                doc! {
                    "reset_token_hash": token_hash,
                    "reset_token_expires": { "$gt": bson::DateTime::from_chrono(now) },
                },
                None,
            )
            .await?)
    }

    async fn save_user(&self, user: &User) -> Result<(), StoreError> {
        self.users()
            .replace_one(filter::by_id(user.id), user, None)
            .await
            .map_err(duplicate_as("email"))?;
        Ok(())
    }

    async fn set_user_project(
        &self,
        student: Uuid,
        project: Option<Uuid>,
    ) -> Result<(), StoreError> {
        let value = project.map(uuid).unwrap_or(Bson::Null);
        self.users()
            .update_one(
                filter::by_id(student),
                doc! { "$set": touched(doc! { "project": value }) },
                None,
            )
            .await?;
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self
            .users()
            .find_one_and_delete(filter::by_id(id), None)
            .await?)
    }

    async fn list_users(
        &self,
        query: &UserQuery,
        page: Option<Page>,
    ) -> Result<Vec<User>, StoreError> {
        collect(self.users(), filter::users(query), newest_first(page)).await
    }

    async fn count_users(&self, query: &UserQuery) -> Result<u64, StoreError> {
        Ok(self
            .users()
            .count_documents(filter::users(query), None)
            .await?)
    }

    async fn insert_project(&self, project: &Project) -> Result<(), StoreError> {
        self.projects().insert_one(project, None).await?;
        Ok(())
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        Ok(self.projects().find_one(filter::by_id(id), None).await?)
    }

    async fn latest_project_for(&self, student: Uuid) -> Result<Option<Project>, StoreError> {
        let options = FindOneOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        Ok(self
            .projects()
            .find_one(doc! { "student": uuid(student) }, options)
            .await?)
    }

    async fn delete_project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        Ok(self
            .projects()
            .find_one_and_delete(filter::by_id(id), None)
            .await?)
    }

    async fn list_projects(
        &self,
        query: &ProjectQuery,
        page: Option<Page>,
    ) -> Result<Vec<Project>, StoreError> {
        collect(self.projects(), filter::projects(query), newest_first(page)).await
    }

    async fn count_projects(&self, query: &ProjectQuery) -> Result<u64, StoreError> {
        Ok(self
            .projects()
            .count_documents(filter::projects(query), None)
            .await?)
    }

    async fn push_project_files(
        &self,
        id: Uuid,
        files: &[ProjectFile],
    ) -> Result<Option<Project>, StoreError> {
        let files = bson::to_bson(files)?;
        Ok(self
            .projects()
            .find_one_and_update(
                filter::by_id(id),
                doc! {
                    "$push": { "files": { "$each": files } },
                    "$set": touched(Document::new()),
                },
                after_update(),
            )
            .await?)
    }

    async fn push_project_feedback(
        &self,
        id: Uuid,
        feedback: &Feedback,
    ) -> Result<Option<Project>, StoreError> {
        let feedback = bson::to_bson(feedback)?;
        Ok(self
            .projects()
            .find_one_and_update(
                filter::by_id(id),
                doc! {
                    "$push": { "feedback": feedback },
                    "$set": touched(Document::new()),
                },
                after_update(),
            )
            .await?)
    }

    async fn set_project_status(
        &self,
        id: Uuid,
        status: ProjectStatus,
    ) -> Result<Option<Project>, StoreError> {
        Ok(self
            .projects()
            .find_one_and_update(
                filter::by_id(id),
                doc! { "$set": touched(doc! { "status": status.as_str() }) },
                after_update(),
            )
            .await?)
    }

    async fn set_project_deadline(
        &self,
        id: Uuid,
        deadline: DateTime<Utc>,
    ) -> Result<Option<Project>, StoreError> {
        Ok(self
            .projects()
            .find_one_and_update(
                filter::by_id(id),
                doc! {
                    "$set": touched(doc! { "deadline": bson::DateTime::from_chrono(deadline) })
                },
                after_update(),
            )
            .await?)
    }

    async fn insert_request(&self, request: &SupervisorRequest) -> Result<(), StoreError> {
        self.requests()
            .insert_one(request, None)
            .await
            .map_err(duplicate_as("request"))?;
        Ok(())
    }

    async fn get_request(&self, id: Uuid) -> Result<Option<SupervisorRequest>, StoreError> {
        Ok(self.requests().find_one(filter::by_id(id), None).await?)
    }

    async fn list_requests(
        &self,
        query: &RequestQuery,
        page: Option<Page>,
    ) -> Result<Vec<SupervisorRequest>, StoreError> {
        collect(self.requests(), filter::requests(query), newest_first(page)).await
    }

    async fn count_requests(&self, query: &RequestQuery) -> Result<u64, StoreError> {
        Ok(self
            .requests()
            .count_documents(filter::requests(query), None)
            .await?)
    }

    async fn transition_request(
        &self,
        id: Uuid,
        supervisor: Uuid,
        status: RequestStatus,
    ) -> Result<Option<SupervisorRequest>, StoreError> {
        Ok(self
            .requests()
            .find_one_and_update(
                doc! {
                    "_id": uuid(id),
                    "supervisor": uuid(supervisor),
                    "status": RequestStatus::Pending.as_str(),
                },
                doc! { "$set": touched(doc! { "status": status.as_str() }) },
                after_update(),
            )
            .await?)
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<(), StoreError> {
        self.notifications().insert_one(notification, None).await?;
        Ok(())
    }

    async fn list_notifications(
        &self,
        query: &NotificationQuery,
        page: Option<Page>,
    ) -> Result<Vec<Notification>, StoreError> {
        collect(
            self.notifications(),
            filter::notifications(query),
            newest_first(page),
        )
        .await
    }

    async fn mark_notification_read(
        &self,
        id: Uuid,
        user: Uuid,
    ) -> Result<Option<Notification>, StoreError> {
        Ok(self
            .notifications()
            .find_one_and_update(
                doc! { "_id": uuid(id), "user": uuid(user) },
                doc! { "$set": { "is_read": true } },
                after_update(),
            )
            .await?)
    }

    async fn mark_all_notifications_read(&self, user: Uuid) -> Result<u64, StoreError> {
        let result = self
            .notifications()
            .update_many(
                doc! { "user": uuid(user), "is_read": false },
                doc! { "$set": { "is_read": true } },
                None,
            )
            .await?;
        Ok(result.modified_count)
    }

    async fn delete_notification(
        &self,
        id: Uuid,
        user: Uuid,
    ) -> Result<Option<Notification>, StoreError> {
        Ok(self
            .notifications()
            .find_one_and_delete(doc! { "_id": uuid(id), "user": uuid(user) }, None)
            .await?)
    }

    async fn insert_deadline(&self, deadline: &Deadline) -> Result<(), StoreError> {
        self.deadlines().insert_one(deadline, None).await?;
        Ok(())
    }

    async fn list_deadlines(
        &self,
        query: &DeadlineQuery,
        page: Option<Page>,
    ) -> Result<Vec<Deadline>, StoreError> {
        collect(
            self.deadlines(),
            filter::deadlines(query),
            sorted(doc! { "due_date": 1 }, page),
        )
        .await
    }

    /// Runs as three conditional writes. The teacher's capacity is claimed first and
    /// released again if the project or student step does not match.
    async fn assign_supervisor(
        &self,
        student: Uuid,
        supervisor: Uuid,
        project: Uuid,
    ) -> Result<Assignment, StoreError> {
        let claimed = self
            .users()
            .find_one_and_update(
                doc! {
                    "_id": uuid(supervisor),
                    "role": Role::Teacher.as_str(),
                    "$expr": { "$lt": [{ "$size": "$assigned_students" }, "$max_students"] },
                },
                doc! {
                    "$addToSet": { "assigned_students": uuid(student) },
                    "$set": touched(Document::new()),
                },
                FindOneAndUpdateOptions::builder()
                    .return_document(ReturnDocument::Before)
                    .build(),
            )
            .await?;

        let mut teacher = match claimed {
            Some(it) => it,
            None => {
                return Ok(match self.get_user(supervisor).await? {
                    Some(it) if it.role == Role::Teacher => Assignment::CapacityReached,
                    _ => Assignment::NotFound,
                });
            }
        };
        let newly_claimed = !teacher.assigned_students.contains(&student);
        if newly_claimed {
            teacher.assigned_students.push(student);
        }

        let updated_project = self
            .projects()
            .find_one_and_update(
                doc! {
                    "_id": uuid(project),
                    "student": uuid(student),
                    "supervisor": Bson::Null,
                    "status": ProjectStatus::Approved.as_str(),
                },
                doc! { "$set": touched(doc! { "supervisor": uuid(supervisor) }) },
                after_update(),
            )
            .await;

        let updated_project = match updated_project {
            Ok(Some(it)) => it,
            Ok(None) => {
                if newly_claimed {
                    release_claim(self, supervisor, student).await;
                }
                return Ok(Assignment::ProjectUnavailable);
            }
            Err(e) => {
                if newly_claimed {
                    release_claim(self, supervisor, student).await;
                }
                return Err(e.into());
            }
        };

        let updated_student = self
            .users()
            .find_one_and_update(
                doc! { "_id": uuid(student), "role": Role::Student.as_str() },
                doc! { "$set": touched(doc! { "supervisor": uuid(supervisor) }) },
                after_update(),
            )
            .await;

        match updated_student {
            Ok(Some(student)) => Ok(Assignment::Assigned {
                student,
                supervisor: teacher,
                project: updated_project,
            }),
            other => {
                if let Err(e) = self
                    .projects()
                    .update_one(
                        filter::by_id(project),
                        doc! { "$set": touched(doc! { "supervisor": Bson::Null }) },
                        None,
                    )
                    .await
                {
                    tracing::warn!("Unable to roll back supervisor of project {}: {}", project, e);
                }
                if newly_claimed {
                    release_claim(self, supervisor, student).await;
                }
                match other {
                    Err(e) => Err(e.into()),
                    _ => Ok(Assignment::NotFound),
                }
            }
        }
    }
}

async fn release_claim(db: &Database, supervisor: Uuid, student: Uuid) {
    let result = db
        .users()
        .update_one(
            filter::by_id(supervisor),
            doc! { "$pull": { "assigned_students": uuid(student) } },
            None,
        )
        .await;
    if let Err(e) = result {
        tracing::warn!(
            "Unable to release capacity of supervisor {} for student {}: {}",
            supervisor,
            student,
            e
        );
    }
}
