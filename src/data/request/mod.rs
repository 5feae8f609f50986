use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::project::ProjectResponse;
use crate::data::user::UserSummary;
use crate::resp::problem::Problem;

pub static REQUEST_COLLECTION_NAME: &str = "supervisor.request";

pub const MESSAGE_MAX_LEN: usize = 250;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
pub enum RequestStatus {
    Pending,
    #[serde(alias = "Approved")]
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "Pending",
            RequestStatus::Accepted => "Accepted",
            RequestStatus::Rejected => "Rejected",
        }
    }
}

impl Default for RequestStatus {
    fn default() -> Self {
        RequestStatus::Pending
    }
}

/// A student's request for a teacher to supervise their project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorRequest {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub student: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub supervisor: Uuid,
    pub message: String,
    #[serde(default)]
    pub status: RequestStatus,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl SupervisorRequest {
    pub fn new(student: Uuid, supervisor: Uuid, message: impl ToString) -> SupervisorRequest {
        let now = crate::util::now();
        SupervisorRequest {
            id: Uuid::new_v4(),
            student,
            supervisor,
            message: message.to_string(),
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;

    #[inline]
    pub fn bad_message(detail: impl ToString) -> Problem {
        Problem::new(Status::BadRequest, "Bad request message.")
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn already_supervised() -> Problem {
        Problem::new(Status::BadRequest, "You already have a supervisor assigned.")
    }

    #[inline]
    pub fn duplicate_pending() -> Problem {
        Problem::new(
            Status::BadRequest,
            "A pending request already exists between this student and supervisor.",
        )
    }

    #[inline]
    pub fn not_found() -> Problem {
        Problem::new(Status::NotFound, "Request not found or already processed.")
    }

    #[inline]
    pub fn already_processed() -> Problem {
        Problem::new(Status::BadRequest, "Request has already been processed.")
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestSupervisorData {
    #[serde(alias = "supervisorId")]
    pub teacher_id: Option<Uuid>,
    #[serde(default)]
    pub message: String,
}

/// Trims the message and checks its length.
pub fn validate_message(message: &str) -> Result<String, Problem> {
    let message = message.trim();
    if message.is_empty() {
        return Err(problem::bad_message("Message is required"));
    }
    if message.chars().count() > MESSAGE_MAX_LEN {
        return Err(problem::bad_message("Message cannot exceed 250 characters"));
    }
    Ok(message.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub id: Uuid,
    pub student: Uuid,
    pub supervisor: Uuid,
    pub message: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SupervisorRequest> for RequestResponse {
    fn from(request: SupervisorRequest) -> Self {
        RequestResponse {
            id: request.id,
            student: request.student,
            supervisor: request.supervisor,
            message: request.message,
            status: request.status,
            created_at: request.created_at,
            updated_at: request.updated_at,
        }
    }
}

/// Request as shown to its teacher, with the student's latest project.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestOverview {
    #[serde(flatten)]
    pub request: RequestResponse,
    pub student_info: Option<UserSummary>,
    pub project: Option<ProjectResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approved_reads_as_accepted() {
        let status: RequestStatus = serde_json::from_str("\"Approved\"").expect("alias parses");
        assert_eq!(status, RequestStatus::Accepted);
        assert_eq!(
            serde_json::to_value(status).expect("serializable"),
            "Accepted"
        );
    }

    #[test]
    fn messages_are_required_and_bounded() {
        assert_eq!(validate_message("  please ").ok(), Some("please".to_string()));
        assert!(validate_message("   ").is_err());
        assert!(validate_message(&"m".repeat(250)).is_ok());
        assert!(validate_message(&"m".repeat(251)).is_err());
    }

    #[test]
    fn teacher_id_accepts_supervisor_id_alias() {
        let id = Uuid::new_v4();
        let data: RequestSupervisorData =
            serde_json::from_str(&format!(r#"{{"supervisorId": "{}", "message": "hi"}}"#, id))
                .expect("valid payload");
        assert_eq!(data.teacher_id, Some(id));
    }

    #[test]
    fn new_requests_are_pending() {
        let request = SupervisorRequest::new(Uuid::new_v4(), Uuid::new_v4(), "hi");
        assert_eq!(request.status, RequestStatus::Pending);
        let document = bson::to_document(&request).expect("serializable");
        assert_eq!(document.get_str("status"), Ok("Pending"));
    }
}
