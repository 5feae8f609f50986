use std::io::Cursor;

use rocket::http::{ContentType, Status};
use rocket::response::Responder;
use rocket::{response, Request, Response};
use serde::Serialize;

use crate::resp::problem::Problem;

/// Success response: `{"success": true, "message"?: ..., "data": ...}`.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    #[serde(skip)]
    pub status: Status,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Envelope<T> {
        Envelope {
            status: Status::Ok,
            success: true,
            message: None,
            data,
        }
    }

    pub fn created(data: T) -> Envelope<T> {
        Envelope {
            status: Status::Created,
            ..Envelope::ok(data)
        }
    }

    pub fn message(mut self, message: impl ToString) -> Envelope<T> {
        self.message = Some(message.to_string());
        self
    }
}

/// Handler result type.
pub type Reply<T> = Result<Envelope<T>, Problem>;

impl<'r, T: Serialize> Responder<'r, 'static> for Envelope<T> {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let body = match serde_json::to_string(&self) {
            Ok(it) => it,
            Err(e) => {
                tracing::error!("Unable to serialize response: {}", e);
                return Err(Status::InternalServerError);
            }
        };

        Response::build()
            .status(self.status)
            .header(ContentType::JSON)
            .raw_header("Content-Language", "en")
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}
