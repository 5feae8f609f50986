use utoipa::ToSchema;

use super::{PasswordHash, User, MAX_STUDENTS_LIMIT};
use crate::data::Store;
use crate::resp::problem::Problem;
use crate::role::Role;
use crate::security::Security;
use crate::util::non_blank;

pub const NAME_MAX_LEN: usize = 50;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 1024;

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;
    use uuid::Uuid;

    #[inline]
    pub fn missing_fields() -> Problem {
        Problem::new(Status::BadRequest, "Please provide all required fields")
    }

    #[inline]
    pub fn bad_email(email: impl ToString, detail: impl ToString) -> Problem {
        Problem::new(Status::BadRequest, "Please add a valid email address")
            .insert_str("email", email)
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn bad_name(detail: impl ToString) -> Problem {
        Problem::new(Status::BadRequest, "Bad name.")
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn bad_password(detail: impl ToString) -> Problem {
        Problem::new(Status::BadRequest, "Bad password.")
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn bad_capacity(value: u32) -> Problem {
        Problem::new(
            Status::BadRequest,
            "Max students must be between 1 and 5",
        )
        .insert("maxStudents", value)
        .to_owned()
    }

    #[inline]
    pub fn email_taken() -> Problem {
        Problem::new(Status::BadRequest, "User already exists with this email")
    }

    #[inline]
    pub fn not_found(role: &str, id: Uuid) -> Problem {
        Problem::new(Status::NotFound, format!("{} not found", role))
            .insert("id", id.to_string())
            .to_owned()
    }

    #[inline]
    pub fn bad_login() -> Problem {
        Problem::new(Status::Unauthorized, "Invalid email or password")
    }
}

#[cfg(feature = "validation-regex")]
fn is_valid_email(email: &str) -> bool {
    use regex::Regex;

    lazy_static! {
        static ref EMAIL: Regex =
            Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,})+$").expect("valid email regex");
    }

    EMAIL.is_match(email)
}

#[cfg(not(feature = "validation-regex"))]
fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((user, domain)) => !user.is_empty() && domain.contains('.'),
        None => false,
    }
}

pub fn validate_email(email: &str) -> Result<String, Problem> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(problem::bad_email(&email, "Not a valid e-mail address."));
    }
    Ok(email)
}

pub fn validate_name(name: &str) -> Result<String, Problem> {
    let name = name.trim();
    if name.is_empty() {
        return Err(problem::bad_name("Name is required"));
    }
    if name.chars().count() > NAME_MAX_LEN {
        return Err(problem::bad_name("Name cannot exceed 50 characters"));
    }
    Ok(name.to_string())
}

pub fn validate_password(password: &str) -> Result<(), Problem> {
    if password.len() < PASSWORD_MIN_LEN {
        return Err(problem::bad_password(
            "Password must be at least 8 characters long",
        ));
    }
    if password.len() > PASSWORD_MAX_LEN {
        return Err(problem::bad_password(
            "Passwords longer than 1024 characters aren't supported.",
        ));
    }
    Ok(())
}

pub fn validate_capacity(max_students: u32) -> Result<u32, Problem> {
    if max_students < 1 || max_students > MAX_STUDENTS_LIMIT {
        return Err(problem::bad_capacity(max_students));
    }
    Ok(max_students)
}

/// Expertise is accepted either as a list or as a comma separated string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Expertise {
    List(Vec<String>),
    Joined(String),
}

impl Expertise {
    pub fn into_list(self) -> Vec<String> {
        let items = match self {
            Expertise::List(list) => list,
            Expertise::Joined(joined) => joined.split(',').map(str::to_string).collect(),
        };
        items
            .iter()
            .filter_map(|it| non_blank(Some(it.as_str())))
            .collect()
    }
}

/// Registration payload shared by every account creation route.
#[derive(Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSignupData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    #[schema(format = "email")]
    pub email: String,
    #[serde(default)]
    #[schema(format = "password")]
    pub password: String,
    pub role: Option<Role>,
    pub department: Option<String>,
    #[schema(value_type = Option<Vec<String>>)]
    pub expertise: Option<Expertise>,
    pub max_students: Option<u32>,
}

impl std::fmt::Debug for UserSignupData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserSignupData:{}", self.email)
    }
}

impl UserSignupData {
    pub fn require_fields(&self, department: bool, teacher: bool) -> Result<(), Problem> {
        let missing = self.name.trim().is_empty()
            || self.email.trim().is_empty()
            || self.password.is_empty()
            || (department && non_blank(self.department.as_deref()).is_none())
            || (teacher && (self.max_students.is_none() || self.expertise.is_none()));

        if missing {
            return Err(problem::missing_fields());
        }
        Ok(())
    }
}

#[derive(Clone, Deserialize, ToSchema)]
pub struct UserLoginData {
    #[serde(default)]
    #[schema(format = "email")]
    pub email: String,
    #[serde(default)]
    #[schema(format = "password")]
    pub password: String,
    pub role: Option<Role>,
}

impl std::fmt::Debug for UserLoginData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserLoginData:{}", self.email)
    }
}

/// Admin edits of an account. The role is deliberately absent.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdateData {
    pub name: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
    #[schema(value_type = Option<Vec<String>>)]
    pub expertise: Option<Expertise>,
    pub max_students: Option<u32>,
}

impl UserUpdateData {
    pub fn apply(self, user: &mut User) -> Result<(), Problem> {
        if let Some(name) = self.name {
            user.name = validate_name(&name)?;
        }
        if let Some(email) = self.email {
            user.email = validate_email(&email)?;
        }
        if let Some(department) = self.department {
            user.department = non_blank(Some(department.as_str()));
        }
        if let Some(expertise) = self.expertise {
            user.expertise = expertise.into_list();
        }
        if let Some(max_students) = self.max_students {
            user.max_students = validate_capacity(max_students)?;
        }
        user.updated_at = crate::util::now();
        Ok(())
    }
}

/// Validates and stores a new account with the given role.
pub async fn create_user(
    store: &dyn Store,
    security: &Security,
    data: UserSignupData,
    role: Role,
) -> Result<User, Problem> {
    let name = validate_name(&data.name)?;
    let email = validate_email(&data.email)?;
    validate_password(&data.password)?;

    if store.find_user_by_email(&email).await?.is_some() {
        return Err(problem::email_taken());
    }

    let mut user = User::new(name, email, PasswordHash::new(&data.password, security)?, role);
    user.department = non_blank(data.department.as_deref());

    if role == Role::Teacher {
        user.expertise = data.expertise.map(Expertise::into_list).unwrap_or_default();
        if let Some(max_students) = data.max_students {
            user.max_students = validate_capacity(max_students)?;
        }
    }

    store.insert_user(&user).await?;

    Ok(user)
}
