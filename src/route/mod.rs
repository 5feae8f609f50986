use std::collections::BTreeMap;

use rocket::{Build, Catcher, Request, Rocket, Route};
use utoipa::OpenApi;

pub mod admin;
pub mod auth;
pub mod deadline;
pub mod notification;
pub mod project;
pub mod student;
pub mod teacher;

use crate::data::deadline::{DeadlineData, DeadlineResponse};
use crate::data::notification::{
    NotificationCounts, NotificationResponse, NotificationType, Priority,
};
use crate::data::project::db::{FeedbackData, ProposalData};
use crate::data::project::{
    FeedbackResponse, FeedbackType, ProjectFileResponse, ProjectOverview, ProjectResponse,
    ProjectStatus,
};
use crate::data::request::{RequestOverview, RequestResponse, RequestStatus, RequestSupervisorData};
use crate::data::user::db::{UserLoginData, UserSignupData, UserUpdateData};
use crate::data::user::{SupervisorInfo, UserResponse, UserSummary};
use crate::files;
use crate::resp::jwt::doc::JWTAuth;
use crate::resp::problem::{problems, Problem};
use crate::role::Role;

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register,
        auth::login,
        auth::logout,
        auth::me,
        auth::forgot_password,
        auth::reset_password,
        admin::users,
        admin::create_student,
        admin::update_student,
        admin::delete_student,
        admin::create_teacher,
        admin::update_teacher,
        admin::delete_teacher,
        admin::projects,
        admin::assign_supervisor,
        admin::dashboard_stats,
        student::project,
        student::submit_proposal,
        student::upload_files,
        student::available_supervisors,
        student::supervisor,
        student::request_supervisor,
        student::feedback,
        student::dashboard_stats,
        student::download,
        teacher::dashboard_stats,
        teacher::requests,
        teacher::accept_request,
        teacher::reject_request,
        teacher::assigned_students,
        teacher::mark_completed,
        teacher::add_feedback,
        teacher::project_files,
        teacher::download,
        notification::list,
        notification::mark_as_read,
        notification::mark_all_as_read,
        notification::delete,
        project::download,
        deadline::create_deadline
    ),
    components(schemas(
        Role,
        Problem,
        UserResponse,
        UserSummary,
        UserLoginData,
        UserSignupData,
        UserUpdateData,
        SupervisorInfo,
        ProjectStatus,
        FeedbackType,
        ProposalData,
        FeedbackData,
        ProjectResponse,
        ProjectFileResponse,
        FeedbackResponse,
        ProjectOverview,
        RequestStatus,
        RequestSupervisorData,
        RequestResponse,
        RequestOverview,
        NotificationType,
        Priority,
        NotificationResponse,
        NotificationCounts,
        DeadlineData,
        DeadlineResponse,
        auth::UserData,
        auth::ForgotPasswordData,
        auth::ResetPasswordData,
        admin::UserList,
        admin::ProjectList,
        admin::AssignSupervisorData,
        admin::AssignedData,
        admin::AdminStats,
        student::ProjectData,
        student::SupervisorList,
        student::SupervisorData,
        student::RequestData,
        student::FeedbackList,
        student::StudentDashboard,
        teacher::TeacherStats,
        teacher::TeacherDashboard,
        teacher::RequestList,
        teacher::DecidedRequest,
        teacher::AssignedStudent,
        teacher::StudentList,
        teacher::CompletedProject,
        teacher::FeedbackAdded,
        teacher::SupervisedFile,
        teacher::FileList,
        notification::NotificationList,
        notification::NotificationData,
        notification::MarkedAll,
        deadline::CreatedDeadline
    )),
    modifiers(&JWTAuth, &V1_PREFIX)
)]
pub struct ApiDocV1;

pub struct PathPrefix(pub &'static str);
static V1_PREFIX: PathPrefix = PathPrefix("/api/v1");

impl utoipa::Modify for PathPrefix {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let mut new_paths = BTreeMap::new();

        for (path, item) in std::mem::take(&mut openapi.paths.paths) {
            new_paths.insert(self.0.to_string() + path.as_ref(), item);
        }

        openapi.paths.paths = new_paths;
    }
}

#[cfg(not(feature = "swagger-ui"))]
#[get("/openapi.json")]
fn openapi_json() -> rocket::serde::json::Json<utoipa::openapi::OpenApi> {
    rocket::serde::json::Json(ApiDocV1::openapi())
}

/// Route groups of the v1 API with their mount points.
pub fn api_v1() -> Vec<(&'static str, Vec<Route>)> {
    vec![
        ("/api/v1/auth", auth::routes()),
        ("/api/v1/admin", admin::routes()),
        ("/api/v1/student", student::routes()),
        ("/api/v1/teacher", teacher::routes()),
        ("/api/v1/notification", notification::routes()),
        ("/api/v1/project", project::routes()),
        ("/api/v1/deadline", deadline::routes()),
    ]
}

pub fn mount_api(rocket: Rocket<Build>) -> Rocket<Build> {
    let rocket = api_v1()
        .into_iter()
        .fold(rocket, |rocket, (base, routes)| rocket.mount(base, routes));

    #[cfg(feature = "swagger-ui")]
    let rocket = rocket.mount(
        "/",
        utoipa_swagger_ui::SwaggerUi::new("/swagger/<_..>")
            .url("/api/v1/openapi.json", ApiDocV1::openapi()),
    );
    #[cfg(not(feature = "swagger-ui"))]
    let rocket = rocket.mount("/api/v1", routes![openapi_json]);

    rocket.register("/", catchers())
}

#[catch(400)]
fn bad_request(req: &Request<'_>) -> Problem {
    Problem::from_guard(req).unwrap_or_else(problems::parse_problem)
}

#[catch(401)]
fn unauthorized(req: &Request<'_>) -> Problem {
    Problem::from_guard(req).unwrap_or_else(problems::unauthenticated)
}

#[catch(403)]
fn forbidden(req: &Request<'_>) -> Problem {
    Problem::from_guard(req).unwrap_or_else(|| {
        Problem::new(
            rocket::http::Status::Forbidden,
            "Not authorized to access this resource",
        )
    })
}

#[catch(404)]
fn not_found(req: &Request<'_>) -> Problem {
    tracing::debug!("No route for {} {}", req.method(), req.uri());
    problems::not_found()
}

#[catch(413)]
fn payload_too_large() -> Problem {
    files::problem::too_large()
}

// Malformed JSON bodies and ids that fail to parse.
#[catch(422)]
fn unprocessable(req: &Request<'_>) -> Problem {
    Problem::from_guard(req).unwrap_or_else(problems::parse_problem)
}

#[catch(500)]
fn server_error(req: &Request<'_>) -> Problem {
    Problem::from_guard(req).unwrap_or_else(problems::server_error)
}

pub fn catchers() -> Vec<Catcher> {
    catchers![
        bad_request,
        unauthorized,
        forbidden,
        not_found,
        payload_too_large,
        unprocessable,
        server_error
    ]
}

#[cfg(test)]
pub mod testing {
    use std::sync::Arc;

    use rocket::http::Cookie;
    use rocket::local::asynchronous::Client;
    use uuid::Uuid;

    use crate::config::Config;
    use crate::data::memory::MemoryStore;
    use crate::data::project::db::ProposalData;
    use crate::data::project::{Project, ProjectFile, ProjectStatus};
    use crate::data::user::{PasswordHash, User};
    use crate::data::Store;
    use crate::files::FileStorage;
    use crate::mail::testing::RecordingMailer;
    use crate::mail::Mailer;
    use crate::resp::jwt::testing::auth_cookie;
    use crate::role::Role;
    use crate::security::testing::SECURITY;
    use crate::supervision;

    pub const PASSWORD: &str = "password123";
    pub const BOUNDARY: &str = "captrak-test-boundary";

    /// Multipart body with one `files` part per `(name, content type, contents)`.
    pub fn multipart(files: &[(&str, &str, &str)]) -> String {
        let mut body = String::new();
        for (name, content_type, contents) in files {
            body.push_str(&format!(
                "--{}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n{}\r\n",
                BOUNDARY, name, content_type, contents
            ));
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));
        body
    }

    /// Rocket instance over an in-memory store with a recording mailer.
    pub struct TestApp {
        pub client: Client,
        pub store: Arc<dyn Store>,
        pub mailer: Arc<RecordingMailer>,
        pub storage: FileStorage,
    }

    impl TestApp {
        pub async fn new() -> TestApp {
            let config = Config::for_tests();
            let storage = FileStorage::new(&config.upload_dir);
            let store: Arc<dyn Store> = Arc::new(MemoryStore::default());
            let recording = Arc::new(RecordingMailer::default());
            let mailer: Arc<dyn Mailer> = recording.clone();

            let rocket = crate::build(config, SECURITY.clone(), store.clone(), mailer);
            let client = Client::tracked(rocket)
                .await
                .expect("valid rocket instance");

            TestApp {
                client,
                store,
                mailer: recording,
                storage,
            }
        }

        /// Stores a user whose password is [`PASSWORD`].
        pub async fn user(&self, name: &str, role: Role) -> User {
            let hash = PasswordHash::new(PASSWORD, &SECURITY).expect("hashable password");
            let email = format!("{}@example.com", name.to_lowercase());
            let user = User::new(name, email, hash, role);
            self.store.insert_user(&user).await.expect("user stored");
            user
        }

        pub async fn teacher(&self, name: &str, max_students: u32) -> User {
            let mut teacher = self.user(name, Role::Teacher).await;
            teacher.max_students = max_students;
            self.store.save_user(&teacher).await.expect("teacher saved");
            teacher
        }

        /// Submits a proposal for `student` and moves it into `status`.
        pub async fn project(&self, student: &User, status: ProjectStatus) -> Project {
            let data = ProposalData {
                title: format!("{}'s project", student.name),
                description: "A capstone project".to_string(),
            };
            let project = supervision::submit_proposal(self.store.as_ref(), student, data)
                .await
                .expect("proposal accepted");
            if status == ProjectStatus::Pending {
                return project;
            }
            self.set_status(project.id, status).await
        }

        pub async fn set_status(&self, id: Uuid, status: ProjectStatus) -> Project {
            self.store
                .set_project_status(id, status)
                .await
                .expect("store works")
                .expect("project exists")
        }

        pub async fn reload_project(&self, id: Uuid) -> Project {
            self.store
                .get_project(id)
                .await
                .expect("store works")
                .expect("project exists")
        }

        /// Writes `contents` into the project's upload directory and records it.
        pub async fn attach_file(&self, project: Uuid, name: &str, contents: &str) -> ProjectFile {
            let dir = self.storage.project_dir(project);
            tokio::fs::create_dir_all(&dir).await.expect("upload dir");
            let path = dir.join(format!("{}-{}", Uuid::new_v4(), name));
            tokio::fs::write(&path, contents).await.expect("file written");

            let file = ProjectFile {
                id: Uuid::new_v4(),
                file_type: "text/plain".to_string(),
                path: path.to_string_lossy().into_owned(),
                original_name: name.to_string(),
                uploaded_at: crate::util::now(),
            };
            self.store
                .push_project_files(project, &[file.clone()])
                .await
                .expect("store works");
            file
        }

        pub fn cookie(&self, user: &User) -> Cookie<'static> {
            auth_cookie(user)
        }
    }
}
