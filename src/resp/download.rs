use rocket::fs::NamedFile;
use rocket::http::Header;

/// Streams a stored file as an attachment under its original name.
#[derive(Responder)]
pub struct Attachment {
    pub file: NamedFile,
    pub disposition: Header<'static>,
}

impl Attachment {
    pub fn new(file: NamedFile, original_name: &str) -> Attachment {
        Attachment {
            file,
            disposition: Header::new("Content-Disposition", disposition(original_name)),
        }
    }
}

/// `attachment; filename="<name>"` with quotes and control characters removed.
pub fn disposition(original_name: &str) -> String {
    let name: String = original_name
        .chars()
        .filter(|c| *c != '"' && *c != '\\' && !c.is_control())
        .collect();
    format!("attachment; filename=\"{}\"", name)
}
