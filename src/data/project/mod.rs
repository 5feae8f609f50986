use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::serde_helpers::{datetime_option_as_bson, uuid_option_as_binary};
use crate::data::user::UserSummary;

pub mod db;

pub static PROJECT_COLLECTION_NAME: &str = "project";

pub const TITLE_MAX_LEN: usize = 200;
pub const DESCRIPTION_MAX_LEN: usize = 2000;
pub const FEEDBACK_MAX_LEN: usize = 1000;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ProjectStatus {
    Pending,
    Approved,
    Rejected,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Pending => "Pending",
            ProjectStatus::Approved => "Approved",
            ProjectStatus::Rejected => "Rejected",
            ProjectStatus::InProgress => "In Progress",
            ProjectStatus::Completed => "Completed",
        }
    }
}

impl Default for ProjectStatus {
    fn default() -> Self {
        ProjectStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
pub enum FeedbackType {
    Comment,
    #[serde(rename = "Revision Request")]
    RevisionRequest,
    Approval,
}

impl Default for FeedbackType {
    fn default() -> Self {
        FeedbackType::Comment
    }
}

/// Metadata of a deliverable stored on local disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    pub file_type: String,
    pub path: String,
    pub original_name: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub supervisor_id: Uuid,
    #[serde(default, rename = "type")]
    pub kind: FeedbackType,
    pub title: String,
    pub message: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub student: Uuid,
    #[serde(default, with = "uuid_option_as_binary")]
    pub supervisor: Option<Uuid>,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub files: Vec<ProjectFile>,
    #[serde(default)]
    pub feedback: Vec<Feedback>,
    #[serde(default, with = "datetime_option_as_bson")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(student: Uuid, title: impl ToString, description: impl ToString) -> Project {
        let now = crate::util::now();
        Project {
            id: Uuid::new_v4(),
            student,
            supervisor: None,
            title: title.to_string(),
            description: description.to_string(),
            status: ProjectStatus::Pending,
            files: vec![],
            feedback: vec![],
            deadline: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn file(&self, id: Uuid) -> Option<&ProjectFile> {
        self.files.iter().find(|it| it.id == id)
    }

    /// Feedback entries, newest first.
    pub fn latest_feedback(&self) -> Vec<&Feedback> {
        let mut entries: Vec<&Feedback> = self.feedback.iter().collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFileResponse {
    pub id: Uuid,
    pub file_type: String,
    pub original_name: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<&ProjectFile> for ProjectFileResponse {
    fn from(file: &ProjectFile) -> Self {
        ProjectFileResponse {
            id: file.id,
            file_type: file.file_type.clone(),
            original_name: file.original_name.clone(),
            uploaded_at: file.uploaded_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
    pub id: Uuid,
    pub supervisor_id: Uuid,
    #[serde(rename = "type")]
    pub kind: FeedbackType,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub supervisor_name: Option<String>,
    pub supervisor_email: Option<String>,
}

impl FeedbackResponse {
    pub fn new(feedback: &Feedback, supervisor: Option<&UserSummary>) -> FeedbackResponse {
        FeedbackResponse {
            id: feedback.id,
            supervisor_id: feedback.supervisor_id,
            kind: feedback.kind,
            title: feedback.title.clone(),
            message: feedback.message.clone(),
            created_at: feedback.created_at,
            supervisor_name: supervisor.map(|it| it.name.clone()),
            supervisor_email: supervisor.map(|it| it.email.clone()),
        }
    }
}

impl From<&Feedback> for FeedbackResponse {
    fn from(feedback: &Feedback) -> Self {
        FeedbackResponse::new(feedback, None)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectResponse {
    pub id: Uuid,
    pub student: Uuid,
    pub supervisor: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub status: ProjectStatus,
    pub files: Vec<ProjectFileResponse>,
    pub feedback: Vec<FeedbackResponse>,
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Project> for ProjectResponse {
    fn from(project: Project) -> Self {
        ProjectResponse {
            id: project.id,
            student: project.student,
            supervisor: project.supervisor,
            files: project.files.iter().map(ProjectFileResponse::from).collect(),
            feedback: project.feedback.iter().map(FeedbackResponse::from).collect(),
            title: project.title,
            description: project.description,
            status: project.status,
            deadline: project.deadline,
            created_at: project.created_at,
            updated_at: project.updated_at,
        }
    }
}

/// Project listing entry with the student and supervisor resolved.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectOverview {
    #[serde(flatten)]
    pub project: ProjectResponse,
    pub student_info: Option<UserSummary>,
    pub supervisor_info: Option<UserSummary>,
}
