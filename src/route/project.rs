use std::sync::Arc;

use rocket::fs::NamedFile;
use rocket::{Route, State};
use uuid::Uuid;

use crate::data::project::db::problem as project_problem;
use crate::data::project::Project;
use crate::data::Store;
use crate::files::FileStorage;
use crate::resp::download::Attachment;
use crate::resp::jwt::Principal;
use crate::resp::problem::Problem;
use crate::supervision;

/// Streams the file `file_id` of `project` from disk.
pub async fn send_file(
    storage: &FileStorage,
    project: &Project,
    file_id: Uuid,
) -> Result<Attachment, Problem> {
    let file = project
        .file(file_id)
        .ok_or_else(project_problem::file_not_found)?;
    let path = storage.locate(file).await?;
    tracing::debug!("Sending {} of project {}", file.original_name, project.id);

    let named = NamedFile::open(&path).await?;
    Ok(Attachment::new(named, &file.original_name))
}

/// Download a project file
///
/// Admins may download any file, teachers those of projects they supervise
/// and students those of their own project.
#[utoipa::path(
    get,
    path = "/project/{project_id}/files/{file_id}/download",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("file_id" = Uuid, Path, description = "File id"),
    ),
    responses(
        (status = 200, description = "File contents", content_type = "application/octet-stream"),
        (status = 403, description = "Caller may not download from this project", body = Problem),
        (status = 404, description = "Unknown project or file", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/<project_id>/files/<file_id>/download")]
#[tracing::instrument(skip(store, storage))]
pub async fn download(
    principal: Principal,
    project_id: Uuid,
    file_id: Uuid,
    store: &State<Arc<dyn Store>>,
    storage: &State<FileStorage>,
) -> Result<Attachment, Problem> {
    let project = store
        .get_project(project_id)
        .await?
        .ok_or_else(|| project_problem::not_found(project_id))?;
    supervision::check_download(&principal.user, &project)?;

    send_file(storage, &project, file_id).await
}

pub fn routes() -> Vec<Route> {
    routes![download]
}

#[cfg(test)]
mod tests {
    use rocket::http::Status;
    use serde_json::Value;
    use uuid::Uuid;

    use crate::data::project::{ProjectFile, ProjectStatus};
    use crate::role::Role;
    use crate::route::testing::TestApp;

    #[rocket::async_test]
    async fn owners_and_admins_download_others_are_forbidden() {
        let app = TestApp::new().await;
        let student = app.user("Sam", Role::Student).await;
        let stranger = app.user("Sid", Role::Student).await;
        let teacher = app.teacher("Tess", 2).await;
        let admin = app.user("Ada", Role::Admin).await;
        let project = app.project(&student, ProjectStatus::Pending).await;
        let file = app.attach_file(project.id, "plan.txt", "the plan").await;
        let uri = format!("/api/v1/project/{}/files/{}/download", project.id, file.id);

        for user in [&student, &admin] {
            let response = app
                .client
                .get(uri.clone())
                .cookie(app.cookie(user))
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Ok);
            assert_eq!(response.into_string().await.as_deref(), Some("the plan"));
        }

        for user in [&stranger, &teacher] {
            let response = app
                .client
                .get(uri.clone())
                .cookie(app.cookie(user))
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Forbidden);
            let body: Value = response.into_json().await.expect("json body");
            assert_eq!(
                body["message"],
                "You do not have permission to download files from this project"
            );
        }
    }

    #[rocket::async_test]
    async fn unknown_files_are_not_found() {
        let app = TestApp::new().await;
        let student = app.user("Sam", Role::Student).await;
        let project = app.project(&student, ProjectStatus::Pending).await;

        let unknown_file = app
            .client
            .get(format!(
                "/api/v1/project/{}/files/{}/download",
                project.id,
                Uuid::new_v4()
            ))
            .cookie(app.cookie(&student))
            .dispatch()
            .await;
        assert_eq!(unknown_file.status(), Status::NotFound);

        let unknown_project = app
            .client
            .get(format!(
                "/api/v1/project/{}/files/{}/download",
                Uuid::new_v4(),
                Uuid::new_v4()
            ))
            .cookie(app.cookie(&student))
            .dispatch()
            .await;
        assert_eq!(unknown_project.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn files_missing_on_disk_are_not_found() {
        let app = TestApp::new().await;
        let student = app.user("Sam", Role::Student).await;
        let project = app.project(&student, ProjectStatus::Pending).await;
        let ghost = ProjectFile {
            id: Uuid::new_v4(),
            file_type: "text/plain".to_string(),
            path: "/nonexistent/captrak/ghost.txt".to_string(),
            original_name: "ghost.txt".to_string(),
            uploaded_at: chrono::Utc::now(),
        };
        app.store
            .push_project_files(project.id, &[ghost.clone()])
            .await
            .expect("stored");

        let response = app
            .client
            .get(format!(
                "/api/v1/project/{}/files/{}/download",
                project.id, ghost.id
            ))
            .cookie(app.cookie(&student))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }
}
