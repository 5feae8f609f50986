use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::serde_helpers::uuid_option_as_binary;
use crate::resp::problem::Problem;
use crate::util::non_blank;

pub static DEADLINE_COLLECTION_NAME: &str = "deadline";

pub const NAME_MAX_LEN: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deadline {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    pub name: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub due_date: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub created_by: Uuid,
    #[serde(default, with = "uuid_option_as_binary")]
    pub project: Option<Uuid>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;

    #[inline]
    pub fn missing_fields() -> Problem {
        Problem::new(Status::BadRequest, "Name and due date are required")
    }

    #[inline]
    pub fn name_too_long() -> Problem {
        Problem::new(
            Status::BadRequest,
            "Deadline name cannot exceed 100 characters",
        )
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeadlineData {
    #[serde(default)]
    pub name: String,
    pub due_date: Option<DateTime<Utc>>,
}

impl DeadlineData {
    pub fn into_deadline(self, created_by: Uuid, project: Uuid) -> Result<Deadline, Problem> {
        let (name, due_date) = match (non_blank(Some(self.name.as_str())), self.due_date) {
            (Some(name), Some(due_date)) => (name, due_date.trunc_subsecs(3)),
            _ => return Err(problem::missing_fields()),
        };
        if name.chars().count() > NAME_MAX_LEN {
            return Err(problem::name_too_long());
        }

        Ok(Deadline {
            id: Uuid::new_v4(),
            name,
            due_date,
            created_by,
            project: Some(project),
            created_at: crate::util::now(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeadlineResponse {
    pub id: Uuid,
    pub name: String,
    pub due_date: DateTime<Utc>,
    pub created_by: Uuid,
    pub project: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<Deadline> for DeadlineResponse {
    fn from(d: Deadline) -> Self {
        DeadlineResponse {
            id: d.id,
            name: d.name,
            due_date: d.due_date,
            created_by: d.created_by,
            project: d.project,
            created_at: d.created_at,
        }
    }
}
