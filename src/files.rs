use std::path::{Path, PathBuf};

use chrono::Utc;
use rocket::fs::TempFile;
use rocket::http::Status;
use uuid::Uuid;

use crate::data::project::ProjectFile;
use crate::resp::problem::Problem;

pub const MAX_FILES: usize = 10;
pub const MAX_FILE_SIZE: u64 = 25 * 1024 * 1024;

pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/zip",
    "application/x-zip-compressed",
    "application/x-rar-compressed",
    "application/t-rar",
    "application/vnd.rar",
    "application/octet-stream",
    "image/jpeg",
    "image/png",
    "image/gif",
    "text/plain",
    "application/javascript",
    "text/css",
    "text/html",
    "application/json",
];

pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "ppt", "pptx", "zip", "rar", "jpg", "jpeg", "png", "gif", "txt", "js",
    "css", "html", "json",
];

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;

    #[inline]
    pub fn no_files() -> Problem {
        Problem::new(Status::BadRequest, "No files uploaded")
    }

    #[inline]
    pub fn too_many_files() -> Problem {
        Problem::new(Status::BadRequest, "File count exceeds the 10 files limit.")
    }

    #[inline]
    pub fn too_large() -> Problem {
        Problem::new(Status::BadRequest, "File size exceeds the 25MB limit.")
    }

    #[inline]
    pub fn invalid_type(name: impl ToString) -> Problem {
        Problem::new(
            Status::BadRequest,
            "Invalid file type. Only PDF, DOC, DOCX, PPT, PPTX, ZIP, RAR, images, text, js, CSS, HTML, and JSON files are allowed.",
        )
        .insert_str("file", name)
        .to_owned()
    }

    #[inline]
    pub fn missing_on_disk() -> Problem {
        Problem::new(Status::NotFound, "File not found")
    }
}

/// Final path component of a client supplied file name.
pub fn base_name(raw: &str) -> String {
    raw.rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Lowercased extension of `name` if it is on the allow list.
pub fn allowed_extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

pub fn allowed_mime_type(mime: &str) -> bool {
    let essence = mime.split(';').next().unwrap_or_default().trim();
    ALLOWED_MIME_TYPES
        .iter()
        .any(|it| it.eq_ignore_ascii_case(essence))
}

/// Checks one upload and returns its extension.
pub fn check_upload(name: &str, mime: Option<&str>, size: u64) -> Result<String, Problem> {
    if size > MAX_FILE_SIZE {
        return Err(problem::too_large());
    }
    match (allowed_extension(name), mime) {
        (Some(ext), Some(mime)) if allowed_mime_type(mime) => Ok(ext),
        _ => Err(problem::invalid_type(name)),
    }
}

/// Per-project deliverable storage on local disk.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(upload_dir: impl AsRef<Path>) -> FileStorage {
        FileStorage {
            root: upload_dir.as_ref().to_path_buf(),
        }
    }

    pub fn project_dir(&self, project: Uuid) -> PathBuf {
        self.root.join("projects").join(project.to_string())
    }

    fn stored_name(ext: &str) -> String {
        format!(
            "files-{}-{}.{}",
            Utc::now().timestamp_millis(),
            rand::random::<u32>() % 1_000_000_000,
            ext
        )
    }

    /// Validates every upload, then moves them into the project's directory.
    ///
    /// Nothing is written unless all files pass validation.
    pub async fn store_all(
        &self,
        project: Uuid,
        files: &mut [TempFile<'_>],
    ) -> Result<Vec<ProjectFile>, Problem> {
        if files.is_empty() {
            return Err(problem::no_files());
        }
        if files.len() > MAX_FILES {
            return Err(problem::too_many_files());
        }

        let mut checked = Vec::with_capacity(files.len());
        for file in files.iter() {
            let original_name = file
                .raw_name()
                .map(|it| base_name(it.dangerous_unsafe_unsanitized_raw().as_str()))
                .unwrap_or_default();
            let mime = file
                .content_type()
                .map(|it| format!("{}/{}", it.top(), it.sub()));
            let ext = check_upload(&original_name, mime.as_deref(), file.len())?;
            checked.push((original_name, mime.unwrap_or_default(), ext));
        }

        let dir = self.project_dir(project);
        tokio::fs::create_dir_all(&dir).await?;

        let mut stored = Vec::with_capacity(files.len());
        for (file, (original_name, mime, ext)) in files.iter_mut().zip(checked) {
            let path = dir.join(FileStorage::stored_name(&ext));
            file.move_copy_to(&path).await.map_err(|e| {
                tracing::error!("Unable to store upload {}: {}", original_name, e);
                Problem::new(Status::InternalServerError, "Unable to store uploaded file")
            })?;
            tracing::info!("Stored {} for project {} at {}", original_name, project, path.display());

            stored.push(ProjectFile {
                id: Uuid::new_v4(),
                file_type: mime,
                path: path.to_string_lossy().into_owned(),
                original_name,
                uploaded_at: crate::util::now(),
            });
        }

        Ok(stored)
    }

    /// Location of a stored file, if it still exists on disk.
    pub async fn locate(&self, file: &ProjectFile) -> Result<PathBuf, Problem> {
        let path = PathBuf::from(&file.path);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => Err(problem::missing_on_disk()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_reduced_to_their_last_component() {
        assert_eq!(base_name("C:\\Users\\me\\report.pdf"), "report.pdf");
        assert_eq!(base_name("../../etc/passwd"), "passwd");
        assert_eq!(base_name("plain.txt"), "plain.txt");
    }

    #[test]
    fn extensions_are_checked_case_insensitively() {
        assert_eq!(allowed_extension("Report.PDF"), Some("pdf".to_string()));
        assert_eq!(allowed_extension("archive.tar.gz"), None);
        assert_eq!(allowed_extension("noext"), None);
        assert_eq!(allowed_extension("script.exe"), None);
    }

    #[test]
    fn mime_types_ignore_parameters() {
        assert!(allowed_mime_type("text/plain; charset=utf-8"));
        assert!(allowed_mime_type("application/PDF"));
        assert!(!allowed_mime_type("application/x-msdownload"));
    }

    #[test]
    fn uploads_need_matching_type_and_size() {
        assert_eq!(
            check_upload("a.pdf", Some("application/pdf"), 10).ok(),
            Some("pdf".to_string())
        );
        assert!(check_upload("a.pdf", None, 10).is_err());
        assert!(check_upload("a.exe", Some("application/pdf"), 10).is_err());
        let too_big = check_upload("a.pdf", Some("application/pdf"), MAX_FILE_SIZE + 1);
        assert_eq!(
            too_big.map_err(|p| p.message),
            Err("File size exceeds the 25MB limit.".to_string())
        );
    }

    #[test]
    fn stored_names_follow_the_upload_pattern() {
        let name = FileStorage::stored_name("pdf");
        assert!(name.starts_with("files-"));
        assert!(name.ends_with(".pdf"));
        assert_eq!(name.matches('-').count(), 2);
    }

    #[rocket::async_test]
    async fn missing_files_are_reported() {
        let storage = FileStorage::new(std::env::temp_dir().join("captrak-missing"));
        let file = ProjectFile {
            id: Uuid::new_v4(),
            file_type: "text/plain".to_string(),
            path: storage
                .project_dir(Uuid::new_v4())
                .join("gone.txt")
                .to_string_lossy()
                .into_owned(),
            original_name: "gone.txt".to_string(),
            uploaded_at: Utc::now(),
        };
        let problem = storage.locate(&file).await.expect_err("file is missing");
        assert_eq!(problem.status, Status::NotFound);
    }
}
