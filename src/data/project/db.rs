use utoipa::ToSchema;
use uuid::Uuid;

use super::{Feedback, FeedbackType, DESCRIPTION_MAX_LEN, FEEDBACK_MAX_LEN, TITLE_MAX_LEN};
use crate::resp::problem::Problem;
use crate::util::non_blank;

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;
    use uuid::Uuid;

    #[inline]
    pub fn missing_proposal() -> Problem {
        Problem::new(
            Status::BadRequest,
            "Please provide both title and description",
        )
    }

    #[inline]
    pub fn too_long(field: &str, max: usize) -> Problem {
        Problem::new(
            Status::BadRequest,
            format!("{} cannot exceed {} characters", field, max),
        )
        .insert_str("field", field)
        .to_owned()
    }

    #[inline]
    pub fn already_submitted() -> Problem {
        Problem::new(
            Status::BadRequest,
            "You have already submitted a project proposal. You cannot submit another one unless it is rejected.",
        )
    }

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::new(Status::NotFound, "Project not found")
            .insert("id", id.to_string())
            .to_owned()
    }

    #[inline]
    pub fn not_owned(id: Uuid) -> Problem {
        Problem::new(
            Status::NotFound,
            "Project not found or you do not have permission to access it",
        )
        .insert("id", id.to_string())
        .to_owned()
    }

    #[inline]
    pub fn not_supervised(action: &str) -> Problem {
        Problem::new(
            Status::Forbidden,
            format!("You are not authorized to {} this project", action),
        )
    }

    #[inline]
    pub fn missing_feedback() -> Problem {
        Problem::new(Status::BadRequest, "Title and message are required")
    }

    #[inline]
    pub fn file_not_found() -> Problem {
        Problem::new(Status::NotFound, "File not found")
    }

    #[inline]
    pub fn download_forbidden() -> Problem {
        Problem::new(
            Status::Forbidden,
            "You do not have permission to download files from this project",
        )
    }
}

fn bounded(field: &str, value: &str, max: usize) -> Result<(), Problem> {
    if value.chars().count() > max {
        return Err(problem::too_long(field, max));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProposalData {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl ProposalData {
    /// Returns the trimmed title and description.
    pub fn validate(&self) -> Result<(String, String), Problem> {
        let (title, description) = match (
            non_blank(Some(self.title.as_str())),
            non_blank(Some(self.description.as_str())),
        ) {
            (Some(title), Some(description)) => (title, description),
            _ => return Err(problem::missing_proposal()),
        };
        bounded("Title", &title, TITLE_MAX_LEN)?;
        bounded("Description", &description, DESCRIPTION_MAX_LEN)?;
        Ok((title, description))
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct FeedbackData {
    #[serde(default, rename = "type")]
    pub kind: Option<FeedbackType>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
}

impl FeedbackData {
    pub fn into_feedback(self, supervisor_id: Uuid) -> Result<Feedback, Problem> {
        let (title, message) = match (
            non_blank(Some(self.title.as_str())),
            non_blank(Some(self.message.as_str())),
        ) {
            (Some(title), Some(message)) => (title, message),
            _ => return Err(problem::missing_feedback()),
        };
        bounded("Message", &message, FEEDBACK_MAX_LEN)?;

        Ok(Feedback {
            id: Uuid::new_v4(),
            supervisor_id,
            kind: self.kind.unwrap_or_default(),
            title,
            message,
            created_at: crate::util::now(),
        })
    }
}
