use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::notification::NotificationResponse;
use crate::data::project::db::{problem as project_problem, FeedbackData};
use crate::data::project::{FeedbackResponse, ProjectFileResponse, ProjectResponse, ProjectStatus};
use crate::data::request::{RequestOverview, RequestResponse, RequestStatus};
use crate::data::user::{UserDirectory, UserResponse};
use crate::data::{NotificationQuery, Page, ProjectQuery, RequestQuery, Store, UserQuery};
use crate::files::FileStorage;
use crate::mail::Mailer;
use crate::resp::download::Attachment;
use crate::resp::envelope::{Envelope, Reply};
use crate::resp::jwt::Principal;
use crate::resp::problem::Problem;
use crate::role::Role;
use crate::route::project::send_file;
use crate::supervision;

const DASHBOARD_NOTIFICATIONS: u64 = 5;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeacherStats {
    pub total_pending_requests: u64,
    pub completed_projects: u64,
    pub recent_notifications: Vec<NotificationResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeacherDashboard {
    pub dashboard_stats: TeacherStats,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RequestList {
    pub requests: Vec<RequestOverview>,
    pub total: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DecidedRequest {
    pub request: RequestResponse,
}

/// Supervised student with their current project.
#[derive(Debug, Serialize, ToSchema)]
pub struct AssignedStudent {
    pub student: UserResponse,
    pub project: Option<ProjectResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StudentList {
    pub students: Vec<AssignedStudent>,
    pub total: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CompletedProject {
    pub project: ProjectResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FeedbackAdded {
    pub project: ProjectResponse,
    pub feedback: FeedbackResponse,
}

/// Deliverable of a supervised project.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SupervisedFile {
    #[serde(flatten)]
    pub file: ProjectFileResponse,
    pub project_id: Uuid,
    pub project_title: String,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FileList {
    pub files: Vec<SupervisedFile>,
}

/// Pending requests, completed projects and recent notifications
#[utoipa::path(
    get,
    path = "/teacher/fetch-dashboard-stats",
    responses((status = 200, description = "Dashboard", body = TeacherDashboard)),
    security(("jwt" = []))
)]
#[get("/fetch-dashboard-stats")]
#[tracing::instrument(skip(store))]
pub async fn dashboard_stats(
    principal: Principal,
    store: &State<Arc<dyn Store>>,
) -> Reply<TeacherDashboard> {
    principal.require(&[Role::Teacher])?;

    let me = principal.id();
    let total_pending_requests = store
        .count_requests(&RequestQuery {
            supervisor: Some(me),
            status: Some(RequestStatus::Pending),
            ..Default::default()
        })
        .await?;
    let completed_projects = store
        .count_projects(&ProjectQuery {
            supervisor: Some(me),
            status: Some(ProjectStatus::Completed),
            ..Default::default()
        })
        .await?;
    let recent_notifications = store
        .list_notifications(
            &NotificationQuery {
                user: Some(me),
                ..Default::default()
            },
            Some(Page::first(DASHBOARD_NOTIFICATIONS)),
        )
        .await?
        .into_iter()
        .map(NotificationResponse::from)
        .collect();

    Ok(Envelope::ok(TeacherDashboard {
        dashboard_stats: TeacherStats {
            total_pending_requests,
            completed_projects,
            recent_notifications,
        },
    })
    .message("Teacher dashboard stats fetched successfully"))
}

/// Requests addressed to the caller
#[utoipa::path(
    get,
    path = "/teacher/requests",
    responses((status = 200, description = "Requests with the student's latest project", body = RequestList)),
    security(("jwt" = []))
)]
#[get("/requests")]
#[tracing::instrument(skip(store))]
pub async fn requests(principal: Principal, store: &State<Arc<dyn Store>>) -> Reply<RequestList> {
    principal.require(&[Role::Teacher])?;

    let store = store.inner().as_ref();
    let query = RequestQuery {
        supervisor: Some(principal.id()),
        ..Default::default()
    };
    let found = store.list_requests(&query, None).await?;
    let total = store.count_requests(&query).await?;

    let mut directory = UserDirectory::new(store);
    let mut requests = Vec::with_capacity(found.len());
    for request in found {
        let student_info = directory.summary(request.student).await?;
        let project = store.latest_project_for(request.student).await?;
        requests.push(RequestOverview {
            request: request.into(),
            student_info,
            project: project.map(ProjectResponse::from),
        });
    }

    Ok(Envelope::ok(RequestList { requests, total }).message("Requests fetched successfully"))
}

/// Accept a pending request
#[utoipa::path(
    post,
    path = "/teacher/requests/accept/{request_id}",
    params(("request_id" = Uuid, Path, description = "Request id")),
    responses(
        (status = 200, description = "Request accepted", body = DecidedRequest),
        (status = 400, description = "Request already processed", body = Problem),
        (status = 404, description = "No such request for the caller", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/requests/accept/<request_id>")]
#[tracing::instrument(skip(store, mailer))]
pub async fn accept_request(
    principal: Principal,
    request_id: Uuid,
    store: &State<Arc<dyn Store>>,
    mailer: &State<Arc<dyn Mailer>>,
) -> Reply<DecidedRequest> {
    principal.require(&[Role::Teacher])?;

    let request = supervision::accept_request(
        store.inner().as_ref(),
        mailer.inner().as_ref(),
        &principal.user,
        request_id,
    )
    .await?;

    Ok(Envelope::ok(DecidedRequest {
        request: request.into(),
    })
    .message("Request accepted successfully"))
}

/// Reject a pending request
#[utoipa::path(
    post,
    path = "/teacher/requests/reject/{request_id}",
    params(("request_id" = Uuid, Path, description = "Request id")),
    responses(
        (status = 200, description = "Request rejected", body = DecidedRequest),
        (status = 400, description = "Request already processed", body = Problem),
        (status = 404, description = "No such request for the caller", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/requests/reject/<request_id>")]
#[tracing::instrument(skip(store, mailer))]
pub async fn reject_request(
    principal: Principal,
    request_id: Uuid,
    store: &State<Arc<dyn Store>>,
    mailer: &State<Arc<dyn Mailer>>,
) -> Reply<DecidedRequest> {
    principal.require(&[Role::Teacher])?;

    let request = supervision::reject_request(
        store.inner().as_ref(),
        mailer.inner().as_ref(),
        &principal.user,
        request_id,
    )
    .await?;

    Ok(Envelope::ok(DecidedRequest {
        request: request.into(),
    })
    .message("Request rejected successfully"))
}

/// Students supervised by the caller
#[utoipa::path(
    get,
    path = "/teacher/assigned-students",
    responses((status = 200, description = "Students with their projects", body = StudentList)),
    security(("jwt" = []))
)]
#[get("/assigned-students")]
#[tracing::instrument(skip(store))]
pub async fn assigned_students(
    principal: Principal,
    store: &State<Arc<dyn Store>>,
) -> Reply<StudentList> {
    principal.require(&[Role::Teacher])?;

    let store = store.inner().as_ref();
    let query = UserQuery {
        supervisor: Some(principal.id()),
        ..Default::default()
    };
    let found = store.list_users(&query, None).await?;
    let total = store.count_users(&query).await?;

    let mut students = Vec::with_capacity(found.len());
    for student in found {
        let project = match student.project {
            Some(id) => store.get_project(id).await?,
            None => None,
        };
        students.push(AssignedStudent {
            student: student.into(),
            project: project.map(ProjectResponse::from),
        });
    }

    Ok(Envelope::ok(StudentList { students, total })
        .message("Assigned students fetched successfully"))
}

/// Mark a supervised project as completed
#[utoipa::path(
    post,
    path = "/teacher/mark-project-completed/{project_id}",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project completed", body = CompletedProject),
        (status = 403, description = "Caller does not supervise the project", body = Problem),
        (status = 404, description = "Unknown project", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/mark-project-completed/<project_id>")]
#[tracing::instrument(skip(store))]
pub async fn mark_completed(
    principal: Principal,
    project_id: Uuid,
    store: &State<Arc<dyn Store>>,
) -> Reply<CompletedProject> {
    principal.require(&[Role::Teacher])?;

    let project =
        supervision::mark_completed(store.inner().as_ref(), &principal.user, project_id).await?;

    Ok(Envelope::ok(CompletedProject {
        project: project.into(),
    })
    .message("Project marked as completed"))
}

/// Add feedback to a supervised project
#[utoipa::path(
    post,
    path = "/teacher/feedback/{project_id}",
    params(("project_id" = Uuid, Path, description = "Project id")),
    request_body = FeedbackData,
    responses(
        (status = 200, description = "Feedback stored", body = FeedbackAdded),
        (status = 400, description = "Missing title or message", body = Problem),
        (status = 403, description = "Caller does not supervise the project", body = Problem),
        (status = 404, description = "Unknown project", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/feedback/<project_id>", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn add_feedback(
    principal: Principal,
    project_id: Uuid,
    data: Json<FeedbackData>,
    store: &State<Arc<dyn Store>>,
) -> Reply<FeedbackAdded> {
    principal.require(&[Role::Teacher])?;

    let (project, feedback) = supervision::add_feedback(
        store.inner().as_ref(),
        &principal.user,
        project_id,
        data.into_inner(),
    )
    .await?;

    Ok(Envelope::ok(FeedbackAdded {
        project: project.into(),
        feedback: (&feedback).into(),
    })
    .message("Feedback added to project successfully"))
}

/// Files of every project the caller supervises
#[utoipa::path(
    get,
    path = "/teacher/project/files",
    responses((status = 200, description = "Files with project and student info", body = FileList)),
    security(("jwt" = []))
)]
#[get("/project/files")]
#[tracing::instrument(skip(store))]
pub async fn project_files(principal: Principal, store: &State<Arc<dyn Store>>) -> Reply<FileList> {
    principal.require(&[Role::Teacher])?;

    let store = store.inner().as_ref();
    let projects = store
        .list_projects(
            &ProjectQuery {
                supervisor: Some(principal.id()),
                ..Default::default()
            },
            None,
        )
        .await?;

    let mut directory = UserDirectory::new(store);
    let mut files = vec![];
    for project in projects {
        let student = directory.summary(project.student).await?;
        for file in &project.files {
            files.push(SupervisedFile {
                file: file.into(),
                project_id: project.id,
                project_title: project.title.clone(),
                student_name: student.as_ref().map(|it| it.name.clone()),
                student_email: student.as_ref().map(|it| it.email.clone()),
            });
        }
    }

    Ok(Envelope::ok(FileList { files }).message("Project files fetched successfully"))
}

/// Download a file of a supervised project
#[utoipa::path(
    get,
    path = "/teacher/projects/download/{project_id}/{file_id}",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("file_id" = Uuid, Path, description = "File id"),
    ),
    responses(
        (status = 200, description = "File contents", content_type = "application/octet-stream"),
        (status = 404, description = "Not supervised by the caller or no such file", body = Problem),
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
    principal.require(&[Role::Teacher])?;

    let project = match store.get_project(project_id).await? {
        Some(project) if project.supervisor == Some(principal.id()) => project,
        _ => return Err(project_problem::not_owned(project_id)),
    };
    send_file(storage, &project, file_id).await
}

pub fn routes() -> Vec<Route> {
    routes![
        dashboard_stats,
        requests,
        accept_request,
        reject_request,
        assigned_students,
        mark_completed,
        add_feedback,
        project_files,
        download
    ]
}
