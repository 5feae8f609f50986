use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::project::{ProjectOverview, ProjectResponse, ProjectStatus};
use crate::data::request::RequestStatus;
use crate::data::user::db::{
    create_user, problem as user_problem, validate_email, UserSignupData, UserUpdateData,
};
use crate::data::user::{User, UserDirectory, UserResponse};
use crate::data::{ProjectQuery, RequestQuery, Store, UserQuery};
use crate::middleware::paging::PageState;
use crate::resp::envelope::{Envelope, Reply};
use crate::resp::jwt::Principal;
use crate::resp::problem::Problem;
use crate::role::Role;
use crate::route::auth::UserData;
use crate::security::Security;
use crate::supervision;

pub mod problem {
    use crate::resp::problem::Problem;
    use crate::role::Role;
    use rocket::http::Status;

    #[inline]
    pub fn wrong_role(expected: Role) -> Problem {
        Problem::new(
            Status::BadRequest,
            format!("Cannot delete non-{} users", expected.as_str().to_lowercase()),
        )
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserList {
    pub users: Vec<UserResponse>,
    pub total: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectList {
    pub projects: Vec<ProjectOverview>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignSupervisorData {
    pub student_id: Option<Uuid>,
    pub supervisor_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssignedData {
    pub student: UserResponse,
    pub supervisor: UserResponse,
}

#[derive(Debug, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_students: u64,
    pub total_teachers: u64,
    pub total_projects: u64,
    pub pending_requests: u64,
    pub completed_projects: u64,
    pub pending_projects: u64,
}

/// Non-admin accounts, newest first
#[utoipa::path(
    get,
    path = "/admin/users",
    params(
        ("page" = Option<u32>, Query, description = "Page number, starting at 0"),
        ("len" = Option<u32>, Query, description = "Page length"),
    ),
    responses((status = 200, description = "Users", body = UserList)),
    security(("jwt" = []))
)]
#[get("/users")]
#[tracing::instrument(skip(store))]
pub async fn users(
    principal: Principal,
    paging: PageState,
    store: &State<Arc<dyn Store>>,
) -> Reply<UserList> {
    principal.require(&[Role::Admin])?;

    let query = UserQuery {
        exclude_role: Some(Role::Admin),
        ..Default::default()
    };
    let users = store.list_users(&query, paging.to_page()).await?;
    let total = store.count_users(&query).await?;

    Ok(Envelope::ok(UserList {
        users: users.into_iter().map(UserResponse::from).collect(),
        total,
    })
    .message("Users retrieved successfully"))
}

async fn create_with_role(
    store: &dyn Store,
    security: &Security,
    data: UserSignupData,
    role: Role,
) -> Result<User, Problem> {
    data.require_fields(true, role == Role::Teacher)?;
    create_user(store, security, data, role).await
}

async fn update_with_role(
    store: &dyn Store,
    id: Uuid,
    data: UserUpdateData,
    role: Role,
) -> Result<User, Problem> {
    let mut user = match store.get_user(id).await? {
        Some(user) if user.role == role => user,
        _ => return Err(user_problem::not_found(role.as_str(), id)),
    };

    if let Some(email) = &data.email {
        let email = validate_email(email)?;
        if let Some(other) = store.find_user_by_email(&email).await? {
            if other.id != user.id {
                return Err(user_problem::email_taken());
            }
        }
    }

    data.apply(&mut user)?;
    store.save_user(&user).await?;
    Ok(user)
}

async fn delete_with_role(store: &dyn Store, id: Uuid, role: Role) -> Result<User, Problem> {
    let user = store
        .get_user(id)
        .await?
        .ok_or_else(|| user_problem::not_found(role.as_str(), id))?;
    if user.role != role {
        return Err(problem::wrong_role(role));
    }

    store
        .delete_user(id)
        .await?
        .ok_or_else(|| user_problem::not_found(role.as_str(), id))
}

/// Create a student account
#[utoipa::path(
    post,
    path = "/admin/create-student",
    request_body = UserSignupData,
    responses(
        (status = 201, description = "Student created", body = UserData),
        (status = 400, description = "Missing or invalid fields", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/create-student", data = "<data>")]
#[tracing::instrument(skip(store, security))]
pub async fn create_student(
    principal: Principal,
    data: Json<UserSignupData>,
    store: &State<Arc<dyn Store>>,
    security: &State<Security>,
) -> Reply<UserData> {
    principal.require(&[Role::Admin])?;
    let user =
        create_with_role(store.inner().as_ref(), security, data.into_inner(), Role::Student)
            .await?;
    Ok(Envelope::created(UserData { user: user.into() }).message("Student created successfully"))
}

/// Edit a student account
#[utoipa::path(
    put,
    path = "/admin/update-student/{id}",
    params(("id" = Uuid, Path, description = "Student id")),
    request_body = UserUpdateData,
    responses(
        (status = 200, description = "Student updated", body = UserData),
        (status = 404, description = "No such student", body = Problem),
    ),
    security(("jwt" = []))
)]
#[put("/update-student/<id>", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn update_student(
    principal: Principal,
    id: Uuid,
    data: Json<UserUpdateData>,
    store: &State<Arc<dyn Store>>,
) -> Reply<UserData> {
    principal.require(&[Role::Admin])?;
    let user = update_with_role(store.inner().as_ref(), id, data.into_inner(), Role::Student).await?;
    Ok(Envelope::ok(UserData { user: user.into() }).message("Student updated successfully"))
}

/// Delete a student account
#[utoipa::path(
    delete,
    path = "/admin/delete-student/{id}",
    params(("id" = Uuid, Path, description = "Student id")),
    responses(
        (status = 200, description = "Student deleted"),
        (status = 400, description = "User is not a student", body = Problem),
        (status = 404, description = "No such user", body = Problem),
    ),
    security(("jwt" = []))
)]
#[delete("/delete-student/<id>")]
#[tracing::instrument(skip(store))]
pub async fn delete_student(
    principal: Principal,
    id: Uuid,
    store: &State<Arc<dyn Store>>,
) -> Reply<()> {
    principal.require(&[Role::Admin])?;
    let removed = delete_with_role(store.inner().as_ref(), id, Role::Student).await?;
    tracing::info!("Admin {} deleted student {}", principal.id(), removed.id);
    Ok(Envelope::ok(()).message("Student deleted successfully"))
}

/// Create a teacher account
#[utoipa::path(
    post,
    path = "/admin/create-teacher",
    request_body = UserSignupData,
    responses(
        (status = 201, description = "Teacher created", body = UserData),
        (status = 400, description = "Missing or invalid fields", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/create-teacher", data = "<data>")]
#[tracing::instrument(skip(store, security))]
pub async fn create_teacher(
    principal: Principal,
    data: Json<UserSignupData>,
    store: &State<Arc<dyn Store>>,
    security: &State<Security>,
) -> Reply<UserData> {
    principal.require(&[Role::Admin])?;
    let user =
        create_with_role(store.inner().as_ref(), security, data.into_inner(), Role::Teacher)
            .await?;
    Ok(Envelope::created(UserData { user: user.into() }).message("Teacher created successfully"))
}

/// Edit a teacher account
#[utoipa::path(
    put,
    path = "/admin/update-teacher/{id}",
    params(("id" = Uuid, Path, description = "Teacher id")),
    request_body = UserUpdateData,
    responses(
        (status = 200, description = "Teacher updated", body = UserData),
        (status = 404, description = "No such teacher", body = Problem),
    ),
    security(("jwt" = []))
)]
#[put("/update-teacher/<id>", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn update_teacher(
    principal: Principal,
    id: Uuid,
    data: Json<UserUpdateData>,
    store: &State<Arc<dyn Store>>,
) -> Reply<UserData> {
    principal.require(&[Role::Admin])?;
    let user = update_with_role(store.inner().as_ref(), id, data.into_inner(), Role::Teacher).await?;
    Ok(Envelope::ok(UserData { user: user.into() }).message("Teacher updated successfully"))
}

/// Delete a teacher account
#[utoipa::path(
    delete,
    path = "/admin/delete-teacher/{id}",
    params(("id" = Uuid, Path, description = "Teacher id")),
    responses(
        (status = 200, description = "Teacher deleted"),
        (status = 400, description = "User is not a teacher", body = Problem),
        (status = 404, description = "No such user", body = Problem),
    ),
    security(("jwt" = []))
)]
#[delete("/delete-teacher/<id>")]
#[tracing::instrument(skip(store))]
pub async fn delete_teacher(
    principal: Principal,
    id: Uuid,
    store: &State<Arc<dyn Store>>,
) -> Reply<()> {
    principal.require(&[Role::Admin])?;
    let removed = delete_with_role(store.inner().as_ref(), id, Role::Teacher).await?;
    tracing::info!("Admin {} deleted teacher {}", principal.id(), removed.id);
    Ok(Envelope::ok(()).message("Teacher deleted successfully"))
}

/// Every project with its student and supervisor
#[utoipa::path(
    get,
    path = "/admin/projects",
    params(
        ("page" = Option<u32>, Query, description = "Page number, starting at 0"),
        ("len" = Option<u32>, Query, description = "Page length"),
    ),
    responses((status = 200, description = "Projects", body = ProjectList)),
    security(("jwt" = []))
)]
#[get("/projects")]
#[tracing::instrument(skip(store))]
pub async fn projects(
    principal: Principal,
    paging: PageState,
    store: &State<Arc<dyn Store>>,
) -> Reply<ProjectList> {
    principal.require(&[Role::Admin])?;

    let store = store.inner().as_ref();
    let projects = store
        .list_projects(&ProjectQuery::default(), paging.to_page())
        .await?;

    let mut directory = UserDirectory::new(store);
    let mut overviews = Vec::with_capacity(projects.len());
    for project in projects {
        let student_info = directory.summary(project.student).await?;
        let supervisor_info = directory.maybe(project.supervisor).await?;
        overviews.push(ProjectOverview {
            project: ProjectResponse::from(project),
            student_info,
            supervisor_info,
        });
    }

    Ok(Envelope::ok(ProjectList {
        projects: overviews,
    })
    .message("Projects retrieved successfully"))
}

/// Link a student with an approved project to a teacher
#[utoipa::path(
    post,
    path = "/admin/assign-supervisor",
    request_body = AssignSupervisorData,
    responses(
        (status = 200, description = "Supervisor assigned", body = AssignedData),
        (status = 400, description = "Project or teacher unavailable", body = Problem),
        (status = 404, description = "Unknown student, project or teacher", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/assign-supervisor", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn assign_supervisor(
    principal: Principal,
    data: Json<AssignSupervisorData>,
    store: &State<Arc<dyn Store>>,
) -> Reply<AssignedData> {
    principal.require(&[Role::Admin])?;

    let pair = supervision::assign_supervisor(
        store.inner().as_ref(),
        data.student_id,
        data.supervisor_id,
    )
    .await?;

    Ok(Envelope::ok(AssignedData {
        student: pair.student.into(),
        supervisor: pair.supervisor.into(),
    })
    .message("Supervisor assigned successfully"))
}

/// Totals for the admin dashboard
#[utoipa::path(
    get,
    path = "/admin/fetch-dashboard-stats",
    responses((status = 200, description = "Dashboard totals", body = AdminStats)),
    security(("jwt" = []))
)]
#[get("/fetch-dashboard-stats")]
#[tracing::instrument(skip(store))]
pub async fn dashboard_stats(
    principal: Principal,
    store: &State<Arc<dyn Store>>,
) -> Reply<AdminStats> {
    principal.require(&[Role::Admin])?;

    let projects_with = |status| ProjectQuery {
        status: Some(status),
        ..Default::default()
    };

    let stats = AdminStats {
        total_students: store.count_users(&UserQuery::role(Role::Student)).await?,
        total_teachers: store.count_users(&UserQuery::role(Role::Teacher)).await?,
        total_projects: store.count_projects(&ProjectQuery::default()).await?,
        pending_requests: store
            .count_requests(&RequestQuery {
                status: Some(RequestStatus::Pending),
                ..Default::default()
            })
            .await?,
        completed_projects: store
            .count_projects(&projects_with(ProjectStatus::Completed))
            .await?,
        pending_projects: store
            .count_projects(&projects_with(ProjectStatus::Pending))
            .await?,
    };

    Ok(Envelope::ok(stats).message("Admin Dashboard stats retrieved successfully"))
}

pub fn routes() -> Vec<Route> {
    routes![
        users,
        create_student,
        update_student,
        delete_student,
        create_teacher,
        update_teacher,
        delete_teacher,
        projects,
        assign_supervisor,
        dashboard_stats
    ]
}

#[cfg(test)]
mod tests {
    use rocket::http::Status;
    use serde_json::{json, Value};

    use crate::data::project::ProjectStatus;
    use crate::role::Role;
    use crate::route::testing::TestApp;

    #[rocket::async_test]
    async fn students_and_teachers_are_managed_by_admins() {
        let app = TestApp::new().await;
        let admin = app.user("Ada", Role::Admin).await;

        let missing = app
            .client
            .post("/api/v1/admin/create-teacher")
            .cookie(app.cookie(&admin))
            .json(&json!({
                "name": "Tess",
                "email": "tess@example.com",
                "password": "long enough",
                "department": "CS"
            }))
            .dispatch()
            .await;
        assert_eq!(missing.status(), Status::BadRequest);

        let created = app
            .client
            .post("/api/v1/admin/create-teacher")
            .cookie(app.cookie(&admin))
            .json(&json!({
                "name": "Tess",
                "email": "tess@example.com",
                "password": "long enough",
                "department": "CS",
                "maxStudents": 2,
                "expertise": "ml, compilers"
            }))
            .dispatch()
            .await;
        assert_eq!(created.status(), Status::Created);
        let body: Value = created.into_json().await.expect("json body");
        assert_eq!(body["message"], "Teacher created successfully");
        assert_eq!(body["data"]["user"]["expertise"], json!(["ml", "compilers"]));
        let teacher_id = body["data"]["user"]["id"]
            .as_str()
            .expect("id is a string")
            .to_string();

        let updated = app
            .client
            .put(format!("/api/v1/admin/update-teacher/{}", teacher_id))
            .cookie(app.cookie(&admin))
            .json(&json!({"maxStudents": 4, "role": "Admin"}))
            .dispatch()
            .await;
        assert_eq!(updated.status(), Status::Ok);
        let body: Value = updated.into_json().await.expect("json body");
        assert_eq!(body["data"]["user"]["maxStudents"], 4);
        assert_eq!(body["data"]["user"]["role"], "Teacher");

        let wrong_kind = app
            .client
            .delete(format!("/api/v1/admin/delete-student/{}", teacher_id))
            .cookie(app.cookie(&admin))
            .dispatch()
            .await;
        assert_eq!(wrong_kind.status(), Status::BadRequest);
        let body: Value = wrong_kind.into_json().await.expect("json body");
        assert_eq!(body["message"], "Cannot delete non-student users");

        let deleted = app
            .client
            .delete(format!("/api/v1/admin/delete-teacher/{}", teacher_id))
            .cookie(app.cookie(&admin))
            .dispatch()
            .await;
        assert_eq!(deleted.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn user_listing_hides_admins() {
        let app = TestApp::new().await;
        let admin = app.user("Ada", Role::Admin).await;
        app.user("Sam", Role::Student).await;
        app.user("Tess", Role::Teacher).await;

        let response = app
            .client
            .get("/api/v1/admin/users?page=0&len=1")
            .cookie(app.cookie(&admin))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().await.expect("json body");
        assert_eq!(body["data"]["total"], 2);
        assert_eq!(body["data"]["users"].as_array().map(Vec::len), Some(1));
    }

    #[rocket::async_test]
    async fn assignment_follows_project_approval() {
        let app = TestApp::new().await;
        let admin = app.user("Ada", Role::Admin).await;
        let student = app.user("Sam", Role::Student).await;
        let teacher = app.teacher("Tess", 1).await;
        let project = app.project(&student, ProjectStatus::Pending).await;
        let payload = json!({"studentId": student.id, "supervisorId": teacher.id});

        let pending = app
            .client
            .post("/api/v1/admin/assign-supervisor")
            .cookie(app.cookie(&admin))
            .json(&payload)
            .dispatch()
            .await;
        assert_eq!(pending.status(), Status::BadRequest);
        let body: Value = pending.into_json().await.expect("json body");
        assert_eq!(
            body["message"],
            "Cannot assign supervisor to a project that is not approved."
        );

        app.set_status(project.id, ProjectStatus::Approved).await;
        let assigned = app
            .client
            .post("/api/v1/admin/assign-supervisor")
            .cookie(app.cookie(&admin))
            .json(&payload)
            .dispatch()
            .await;
        assert_eq!(assigned.status(), Status::Ok);
        let body: Value = assigned.into_json().await.expect("json body");
        assert_eq!(body["message"], "Supervisor assigned successfully");
        assert_eq!(body["data"]["student"]["supervisor"], teacher.id.to_string());

        let missing = app
            .client
            .post("/api/v1/admin/assign-supervisor")
            .cookie(app.cookie(&admin))
            .json(&json!({"studentId": student.id}))
            .dispatch()
            .await;
        assert_eq!(missing.status(), Status::BadRequest);
    }

    #[rocket::async_test]
    async fn dashboard_counts_everything() {
        let app = TestApp::new().await;
        let admin = app.user("Ada", Role::Admin).await;
        let student = app.user("Sam", Role::Student).await;
        app.user("Tess", Role::Teacher).await;
        app.project(&student, ProjectStatus::Pending).await;

        let response = app
            .client
            .get("/api/v1/admin/fetch-dashboard-stats")
            .cookie(app.cookie(&admin))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().await.expect("json body");
        assert_eq!(body["data"]["totalStudents"], 1);
        assert_eq!(body["data"]["totalTeachers"], 1);
        assert_eq!(body["data"]["totalProjects"], 1);
        assert_eq!(body["data"]["pendingProjects"], 1);
        assert_eq!(body["data"]["completedProjects"], 0);
    }

    #[rocket::async_test]
    async fn teachers_cannot_use_admin_routes() {
        let app = TestApp::new().await;
        let teacher = app.teacher("Tess", 1).await;
        let response = app
            .client
            .get("/api/v1/admin/projects")
            .cookie(app.cookie(&teacher))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
    }
}
