use std::fmt::{Display, Formatter};
use std::io::Cursor;

use rocket::http::{ContentType, Status};
use rocket::outcome::Outcome;
use rocket::request;
use rocket::response::Responder;
use rocket::{response, Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::data::StoreError;

/// Error response: `{"success": false, "message": ..., "detail"?: ..., ...body}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Problem {
    #[serde(skip)]
    pub status: Status,
    pub message: String,

    pub detail: Option<String>,

    #[schema(value_type = Object)]
    pub body: Map<String, Value>,
}

impl Default for Problem {
    fn default() -> Self {
        Problem {
            status: Status::InternalServerError,
            message: "Internal Server Error".to_string(),
            detail: None,
            body: Map::new(),
        }
    }
}

impl Problem {
    pub fn new(status: Status, message: impl ToString) -> Problem {
        Problem {
            status,
            message: message.to_string(),
            ..Default::default()
        }
    }

    pub fn detail(&mut self, value: impl ToString) -> &mut Problem {
        self.detail = Some(value.to_string());
        self
    }

    pub fn insert<V: Serialize>(&mut self, key: impl ToString, value: V) -> &mut Problem {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.body.insert(key.to_string(), value);
            }
            Err(e) => tracing::warn!("Dropping problem field that isn't serializable: {}", e),
        }
        self
    }

    pub fn insert_str(&mut self, key: impl ToString, value: impl ToString) -> &mut Problem {
        self.body
            .insert(key.to_string(), Value::String(value.to_string()));
        self
    }

    /// Builds the JSON body sent to clients.
    pub fn to_json(&self) -> Value {
        let mut body = self.body.clone();

        body.insert("success".to_string(), Value::Bool(false));
        body.insert("message".to_string(), Value::from(self.message.clone()));
        if let Some(detail) = &self.detail {
            body.insert("detail".to_string(), Value::from(detail.clone()));
        }

        Value::Object(body)
    }

    /// Fails a request guard and keeps the problem around for the error catchers.
    pub fn fail_guard<T>(self, req: &Request<'_>, status: Status) -> request::Outcome<T, Problem> {
        let kept = self.clone();
        req.local_cache(move || GuardFailure(Some(kept)));
        Outcome::Error((status, self))
    }

    /// Problem a request guard failed with, if any.
    pub fn from_guard(req: &Request<'_>) -> Option<Problem> {
        req.local_cache(|| GuardFailure(None)).0.clone()
    }
}

#[derive(Debug, Clone)]
struct GuardFailure(Option<Problem>);

impl Display for Problem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for Problem {}

impl<'r> Responder<'r, 'static> for Problem {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        if self.status.code >= 500 {
            tracing::error!("Responding with {}", self);
        }

        let body_string = self.to_json().to_string();

        Response::build()
            .status(self.status)
            .header(ContentType::JSON)
            .raw_header("Content-Language", "en")
            .sized_body(body_string.len(), Cursor::new(body_string))
            .ok()
    }
}

pub mod problems {
    use crate::resp::problem::Problem;
    use rocket::http::Status;

    #[inline]
    pub fn parse_problem() -> Problem {
        Problem::new(
            Status::BadRequest,
            "There was a problem parsing part of the request.",
        )
    }

    #[inline]
    pub fn unauthenticated() -> Problem {
        Problem::new(Status::Unauthorized, "Not authorized to access this route")
    }

    #[inline]
    pub fn forbidden_role(role: impl ToString) -> Problem {
        Problem::new(
            Status::Forbidden,
            format!(
                "Role ({}) is not authorized to access this resource",
                role.to_string()
            ),
        )
    }

    #[inline]
    pub fn not_found() -> Problem {
        Problem::new(Status::NotFound, "Resource not found")
    }

    #[inline]
    pub fn server_error() -> Problem {
        Problem::new(Status::InternalServerError, "Internal Server Error")
    }
}

impl From<StoreError> for Problem {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(what) => {
                Problem::new(Status::BadRequest, format!("Duplicate {} entered", what))
            }
            StoreError::Database(e) => Problem::from(e),
            StoreError::BsonSer(e) => {
                tracing::error!("Unable to serialize BSON: {}", e);
                Problem::new(
                    Status::InternalServerError,
                    "An error occurred while processing BSON data.",
                )
            }
            StoreError::BsonDe(e) => {
                tracing::error!("Unable to deserialize BSON: {}", e);
                Problem::new(
                    Status::InternalServerError,
                    "An error occurred while processing BSON data.",
                )
            }
        }
    }
}

impl From<mongodb::error::Error> for Problem {
    fn from(e: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        tracing::error!("MongoDB error: {}", e);

        fn mongodb_problem() -> Problem {
            Problem::new(
                Status::InternalServerError,
                "MongoDB failed while processing request.",
            )
        }

        fn access_problem() -> Problem {
            Problem::new(
                Status::InternalServerError,
                "Server was unable to access MongoDB.",
            )
        }

        match e.kind.as_ref() {
            ErrorKind::Authentication { .. } => access_problem(),
            ErrorKind::DnsResolve { .. } => access_problem(),
            ErrorKind::ServerSelection { .. } => access_problem(),
            ErrorKind::InvalidTlsConfig { .. } => access_problem(),
            ErrorKind::IncompatibleServer { .. } => access_problem(),
            ErrorKind::BsonDeserialization(_) | ErrorKind::BsonSerialization(_) => Problem::new(
                Status::InternalServerError,
                "There was a problem with handling MongoDB bson.",
            ),
            ErrorKind::Io(_) => mongodb_problem()
                .detail("An IO error occurred. Submitted data might not be properly stored.")
                .to_owned(),
            ErrorKind::Write(_) => mongodb_problem()
                .detail("A write error occurred. Submitted data might not be properly stored.")
                .to_owned(),
            _ => mongodb_problem(),
        }
    }
}

impl From<serde_json::Error> for Problem {
    fn from(_: serde_json::Error) -> Self {
        Problem::new(
            Status::InternalServerError,
            "An error occurred while processing JSON data.",
        )
    }
}

impl From<jsonwebtoken::errors::Error> for Problem {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match e.into_kind() {
            ErrorKind::ExpiredSignature => {
                Problem::new(Status::BadRequest, "JSON Web Token is expired, try again")
            }
            _ => Problem::new(Status::BadRequest, "JSON Web Token is invalid, try again"),
        }
    }
}

impl From<std::io::Error> for Problem {
    fn from(e: std::io::Error) -> Self {
        tracing::error!("IO error: {}", e);
        Problem::new(Status::InternalServerError, "Server IO error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_carries_envelope_fields() {
        let problem = Problem::new(Status::BadRequest, "Bad name.")
            .detail("Name is required")
            .insert_str("field", "name")
            .to_owned();

        let json = problem.to_json();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Bad name.");
        assert_eq!(json["detail"], "Name is required");
        assert_eq!(json["field"], "name");
    }

    #[test]
    fn duplicates_map_to_bad_request() {
        let problem = Problem::from(StoreError::Duplicate("email".to_string()));
        assert_eq!(problem.status, Status::BadRequest);
        assert_eq!(problem.message, "Duplicate email entered");
    }

    #[test]
    fn wrong_roles_are_named() {
        let problem = problems::forbidden_role("Student");
        assert_eq!(problem.status, Status::Forbidden);
        assert_eq!(
            problem.message,
            "Role (Student) is not authorized to access this resource"
        );
    }
}
