use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::deadline::{DeadlineData, DeadlineResponse};
use crate::data::project::db::problem as project_problem;
use crate::data::user::{UserDirectory, UserSummary};
use crate::data::Store;
use crate::resp::envelope::{Envelope, Reply};
use crate::resp::jwt::Principal;
use crate::role::Role;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatedDeadline {
    pub deadline: DeadlineResponse,
    pub created_by_info: Option<UserSummary>,
}

/// Set a deadline on a project
#[utoipa::path(
    post,
    path = "/deadline/create-deadline/{project_id}",
    params(("project_id" = Uuid, Path, description = "Project id")),
    request_body = DeadlineData,
    responses(
        (status = 201, description = "Deadline created and mirrored onto the project", body = CreatedDeadline),
        (status = 400, description = "Missing name or due date", body = Problem),
        (status = 404, description = "Unknown project", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/create-deadline/<project_id>", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn create_deadline(
    principal: Principal,
    project_id: Uuid,
    data: Json<DeadlineData>,
    store: &State<Arc<dyn Store>>,
) -> Reply<CreatedDeadline> {
    principal.require(&[Role::Admin, Role::Teacher])?;

    let store = store.inner().as_ref();
    let deadline = data.into_inner().into_deadline(principal.id(), project_id)?;
    let project = store
        .get_project(project_id)
        .await?
        .ok_or_else(|| project_problem::not_found(project_id))?;

    store.insert_deadline(&deadline).await?;
    store
        .set_project_deadline(project.id, deadline.due_date)
        .await?;
    tracing::info!(
        "Deadline {} set on project {} by {}",
        deadline.id,
        project.id,
        principal.id()
    );

    let created_by_info = UserDirectory::new(store)
        .summary(deadline.created_by)
        .await?;
    Ok(Envelope::created(CreatedDeadline {
        deadline: deadline.into(),
        created_by_info,
    })
    .message("Deadline created successfully"))
}

pub fn routes() -> Vec<Route> {
    routes![create_deadline]
}
