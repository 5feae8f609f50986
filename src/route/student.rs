use std::sync::Arc;

use chrono::Utc;
use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::deadline::DeadlineResponse;
use crate::data::notification::NotificationResponse;
use crate::data::project::db::{problem as project_problem, ProposalData};
use crate::data::project::{FeedbackResponse, Project, ProjectResponse};
use crate::data::request::{RequestResponse, RequestSupervisorData};
use crate::data::user::{SupervisorInfo, User, UserDirectory};
use crate::data::{DeadlineQuery, NotificationQuery, Page, Store, UserQuery};
use crate::files::FileStorage;
use crate::resp::download::Attachment;
use crate::resp::envelope::{Envelope, Reply};
use crate::resp::jwt::Principal;
use crate::resp::problem::Problem;
use crate::role::Role;
use crate::route::project::send_file;
use crate::supervision;

const DASHBOARD_DEADLINES: u64 = 3;
const DASHBOARD_NOTIFICATIONS: u64 = 3;
const DASHBOARD_FEEDBACK: usize = 2;

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectData {
    pub project: Option<ProjectResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SupervisorList {
    pub supervisors: Vec<SupervisorInfo>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SupervisorData {
    pub supervisor: SupervisorInfo,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RequestData {
    pub request: RequestResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FeedbackList {
    pub feedback: Vec<FeedbackResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentDashboard {
    pub project: Option<ProjectResponse>,
    pub upcoming_deadlines: Vec<DeadlineResponse>,
    pub top_notifications: Vec<NotificationResponse>,
    pub feedback_notifications: Vec<FeedbackResponse>,
    pub supervisor_name: Option<String>,
}

#[derive(FromForm)]
pub struct UploadForm<'r> {
    pub files: Vec<TempFile<'r>>,
}

/// Project of `student` with the given id.
async fn owned_project(
    store: &dyn Store,
    student: &User,
    project_id: Uuid,
) -> Result<Project, Problem> {
    match store.get_project(project_id).await? {
        Some(project) if project.student == student.id => Ok(project),
        _ => Err(project_problem::not_owned(project_id)),
    }
}

/// The caller's latest project
#[utoipa::path(
    get,
    path = "/student/projects",
    responses((status = 200, description = "Latest project or null", body = ProjectData)),
    security(("jwt" = []))
)]
#[get("/projects")]
#[tracing::instrument(skip(store))]
pub async fn project(principal: Principal, store: &State<Arc<dyn Store>>) -> Reply<ProjectData> {
    principal.require(&[Role::Student])?;

    match store.latest_project_for(principal.id()).await? {
        Some(project) => Ok(Envelope::ok(ProjectData {
            project: Some(project.into()),
        })),
        None => Ok(Envelope::ok(ProjectData { project: None })
            .message("No project found for this Student")),
    }
}

/// Submit a project proposal
#[utoipa::path(
    post,
    path = "/student/submit-proposal",
    request_body = ProposalData,
    responses(
        (status = 201, description = "Proposal stored as Pending", body = ProjectData),
        (status = 400, description = "Invalid proposal or one already active", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/submit-proposal", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn submit_proposal(
    principal: Principal,
    data: Json<ProposalData>,
    store: &State<Arc<dyn Store>>,
) -> Reply<ProjectData> {
    principal.require(&[Role::Student])?;

    let project =
        supervision::submit_proposal(store.inner().as_ref(), &principal.user, data.into_inner())
            .await?;
    tracing::info!("Student {} submitted project {}", principal.id(), project.id);

    Ok(Envelope::created(ProjectData {
        project: Some(project.into()),
    })
    .message("Project proposal submitted successfully"))
}

/// Upload deliverables to the caller's project
#[utoipa::path(
    post,
    path = "/student/projects/upload-files/{project_id}",
    params(("project_id" = Uuid, Path, description = "Project id")),
    request_body(content = String, content_type = "multipart/form-data", description = "Up to 10 `files` parts"),
    responses(
        (status = 200, description = "Files stored", body = ProjectData),
        (status = 400, description = "No files, too many, too large or wrong type", body = Problem),
        (status = 404, description = "Not the caller's project", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/projects/upload-files/<project_id>", data = "<form>")]
#[tracing::instrument(skip(form, store, storage))]
pub async fn upload_files(
    principal: Principal,
    project_id: Uuid,
    mut form: Form<UploadForm<'_>>,
    store: &State<Arc<dyn Store>>,
    storage: &State<FileStorage>,
) -> Reply<ProjectData> {
    principal.require(&[Role::Student])?;

    let store = store.inner().as_ref();
    let project = owned_project(store, &principal.user, project_id).await?;

    let stored = storage.store_all(project.id, &mut form.files).await?;
    let project = store
        .push_project_files(project.id, &stored)
        .await?
        .ok_or_else(|| project_problem::not_found(project_id))?;

    Ok(Envelope::ok(ProjectData {
        project: Some(project.into()),
    })
    .message("Files uploaded successfully"))
}

/// Teachers with their remaining capacity
#[utoipa::path(
    get,
    path = "/student/available-supervisors",
    responses((status = 200, description = "Teachers", body = SupervisorList)),
    security(("jwt" = []))
)]
#[get("/available-supervisors")]
#[tracing::instrument(skip(store))]
pub async fn available_supervisors(
    principal: Principal,
    store: &State<Arc<dyn Store>>,
) -> Reply<SupervisorList> {
    principal.require(&[Role::Student])?;

    let teachers = store
        .list_users(&UserQuery::role(Role::Teacher), None)
        .await?;

    Ok(Envelope::ok(SupervisorList {
        supervisors: teachers.into_iter().map(SupervisorInfo::from).collect(),
    })
    .message("Available supervisors fetched successfully"))
}

/// The caller's assigned supervisor
#[utoipa::path(
    get,
    path = "/student/supervisor",
    responses(
        (status = 200, description = "Supervisor", body = SupervisorData),
        (status = 404, description = "No supervisor assigned", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/supervisor")]
#[tracing::instrument(skip(store))]
pub async fn supervisor(
    principal: Principal,
    store: &State<Arc<dyn Store>>,
) -> Reply<SupervisorData> {
    principal.require(&[Role::Student])?;

    let not_assigned = || Problem::new(Status::NotFound, "No supervisor assigned to this student");
    let supervisor_id = principal.user.supervisor.ok_or_else(not_assigned)?;
    let supervisor = store
        .get_user(supervisor_id)
        .await?
        .ok_or_else(not_assigned)?;

    Ok(Envelope::ok(SupervisorData {
        supervisor: supervisor.into(),
    })
    .message("Supervisor details fetched successfully"))
}

/// Ask a teacher for supervision
#[utoipa::path(
    post,
    path = "/student/request-supervisor",
    request_body = RequestSupervisorData,
    responses(
        (status = 201, description = "Request stored as Pending", body = RequestData),
        (status = 400, description = "Invalid message, duplicate or teacher full", body = Problem),
        (status = 404, description = "Unknown teacher", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/request-supervisor", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn request_supervisor(
    principal: Principal,
    data: Json<RequestSupervisorData>,
    store: &State<Arc<dyn Store>>,
) -> Reply<RequestData> {
    principal.require(&[Role::Student])?;

    let request = supervision::request_supervisor(
        store.inner().as_ref(),
        &principal.user,
        data.teacher_id,
        &data.message,
    )
    .await?;

    Ok(Envelope::created(RequestData {
        request: request.into(),
    })
    .message("Supervisor request submitted successfully"))
}

/// Feedback on the caller's project, newest first
#[utoipa::path(
    get,
    path = "/student/feedback/{project_id}",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Feedback entries", body = FeedbackList),
        (status = 404, description = "Not the caller's project", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/feedback/<project_id>")]
#[tracing::instrument(skip(store))]
pub async fn feedback(
    principal: Principal,
    project_id: Uuid,
    store: &State<Arc<dyn Store>>,
) -> Reply<FeedbackList> {
    principal.require(&[Role::Student])?;

    let store = store.inner().as_ref();
    let project = owned_project(store, &principal.user, project_id).await?;

    let mut directory = UserDirectory::new(store);
    let mut feedback = Vec::with_capacity(project.feedback.len());
    for entry in project.latest_feedback() {
        let supervisor = directory.summary(entry.supervisor_id).await?;
        feedback.push(FeedbackResponse::new(entry, supervisor.as_ref()));
    }

    Ok(Envelope::ok(FeedbackList { feedback }).message("Feedback fetched successfully"))
}

/// Project, deadlines, notifications and feedback for the student dashboard
#[utoipa::path(
    get,
    path = "/student/fetch-dashboard-stats",
    responses((status = 200, description = "Dashboard", body = StudentDashboard)),
    security(("jwt" = []))
)]
#[get("/fetch-dashboard-stats")]
#[tracing::instrument(skip(store))]
pub async fn dashboard_stats(
    principal: Principal,
    store: &State<Arc<dyn Store>>,
) -> Reply<StudentDashboard> {
    principal.require(&[Role::Student])?;

    let store = store.inner().as_ref();
    let project = store.latest_project_for(principal.id()).await?;

    let upcoming_deadlines = match &project {
        Some(project) => store
            .list_deadlines(
                &DeadlineQuery {
                    project: Some(project.id),
                    due_after: Some(Utc::now()),
                },
                Some(Page::first(DASHBOARD_DEADLINES)),
            )
            .await?
            .into_iter()
            .map(DeadlineResponse::from)
            .collect(),
        None => vec![],
    };

    let top_notifications = store
        .list_notifications(
            &NotificationQuery {
                user: Some(principal.id()),
                ..Default::default()
            },
            Some(Page::first(DASHBOARD_NOTIFICATIONS)),
        )
        .await?
        .into_iter()
        .map(NotificationResponse::from)
        .collect();

    let mut directory = UserDirectory::new(store);
    let mut feedback_notifications = vec![];
    let mut supervisor_name = None;
    if let Some(project) = &project {
        for entry in project.latest_feedback().into_iter().take(DASHBOARD_FEEDBACK) {
            let supervisor = directory.summary(entry.supervisor_id).await?;
            feedback_notifications.push(FeedbackResponse::new(entry, supervisor.as_ref()));
        }
        supervisor_name = directory.maybe(project.supervisor).await?.map(|it| it.name);
    }

    Ok(Envelope::ok(StudentDashboard {
        project: project.map(ProjectResponse::from),
        upcoming_deadlines,
        top_notifications,
        feedback_notifications,
        supervisor_name,
    })
    .message("Dashboard stats fetched successfully"))
}

/// Download a file of the caller's project
#[utoipa::path(
    get,
    path = "/student/projects/download/{project_id}/{file_id}",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("file_id" = Uuid, Path, description = "File id"),
    ),
    responses(
        (status = 200, description = "File contents", content_type = "application/octet-stream"),
        (status = 404, description = "Not the caller's project or no such file", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/projects/download/<project_id>/<file_id>")]
#[tracing::instrument(skip(store, storage))]
pub async fn download(
    principal: Principal,
    project_id: Uuid,
    file_id: Uuid,
    store: &State<Arc<dyn Store>>,
    storage: &State<FileStorage>,
) -> Result<Attachment, Problem> {
    principal.require(&[Role::Student])?;

    let project = owned_project(store.inner().as_ref(), &principal.user, project_id).await?;
    send_file(storage, &project, file_id).await
}

pub fn routes() -> Vec<Route> {
    routes![
        project,
        submit_proposal,
        upload_files,
        available_supervisors,
        supervisor,
        request_supervisor,
        feedback,
        dashboard_stats,
        download
    ]
}
