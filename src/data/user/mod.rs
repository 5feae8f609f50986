use argon2::password_hash::{
    PasswordHash as PhcString, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Duration, Utc};
use rocket::http::Status;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::serde_helpers::{
    datetime_option_as_bson, uuid_option_as_binary, uuid_vec_as_binary,
};
use crate::data::Store;
use crate::resp::problem::Problem;
use crate::role::Role;
use crate::security::Security;
use crate::util::{base64_engine, hex};

pub mod db;

pub static USER_COLLECTION_NAME: &str = "user";

pub const DEFAULT_MAX_STUDENTS: u32 = 3;
pub const MAX_STUDENTS_LIMIT: u32 = 5;

pub const RESET_TOKEN_MINUTES: i64 = 10;

fn default_max_students() -> u32 {
    DEFAULT_MAX_STUDENTS
}

/// PHC formatted Argon2id hash, peppered with the installation secret.
#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PasswordHash(String);

impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordHash(..)")
    }
}

fn hasher(security: &Security) -> Result<Argon2<'_>, argon2::Error> {
    Argon2::new_with_secret(
        &security.secret,
        Algorithm::Argon2id,
        Version::V0x13,
        Params::default(),
    )
}

fn hashing_problem() -> Problem {
    Problem::new(Status::InternalServerError, "Unable to process password.")
}

impl PasswordHash {
    pub fn new(password: impl AsRef<str>, security: &Security) -> Result<PasswordHash, Problem> {
        let salt_bytes: [u8; 16] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|_| hashing_problem())?;

        let hash = hasher(security)
            .map_err(|_| hashing_problem())?
            .hash_password(password.as_ref().as_bytes(), &salt)
            .map_err(|_| hashing_problem())?
            .to_string();

        Ok(PasswordHash(hash))
    }

    pub fn verify(&self, password: impl AsRef<str>, security: &Security) -> bool {
        let parsed = match PhcString::new(&self.0) {
            Ok(it) => it,
            Err(_) => {
                tracing::warn!("stored password hash is not a valid PHC string");
                return false;
            }
        };

        hasher(security)
            .map(|argon| {
                argon
                    .verify_password(password.as_ref().as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }

    #[cfg(test)]
    pub fn new_unchecked(hash: impl ToString) -> PasswordHash {
        PasswordHash(hash.to_string())
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: PasswordHash,
    pub role: Role,

    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub expertise: Vec<String>,
    #[serde(default = "default_max_students")]
    pub max_students: u32,
    #[serde(default, with = "uuid_vec_as_binary")]
    pub assigned_students: Vec<Uuid>,

    #[serde(default, with = "uuid_option_as_binary")]
    pub supervisor: Option<Uuid>,
    #[serde(default, with = "uuid_option_as_binary")]
    pub project: Option<Uuid>,

    #[serde(default)]
    pub reset_token_hash: Option<String>,
    #[serde(default, with = "datetime_option_as_bson")]
    pub reset_token_expires: Option<DateTime<Utc>>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "User:{}:{}", self.role, self.id)
    }
}

impl User {
    pub fn new(
        name: impl ToString,
        email: impl ToString,
        password_hash: PasswordHash,
        role: Role,
    ) -> User {
        let id = Uuid::new_v4();
        tracing::info!("Creating a new {} with UUID: {}", role, id);

        let now = crate::util::now();
        User {
            id,
            name: name.to_string(),
            email: email.to_string(),
            password_hash,
            role,
            department: None,
            expertise: vec![],
            max_students: DEFAULT_MAX_STUDENTS,
            assigned_students: vec![],
            supervisor: None,
            project: None,
            reset_token_hash: None,
            reset_token_expires: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a teacher can take on another student.
    pub fn has_capacity(&self) -> bool {
        self.role.can_supervise() && (self.assigned_students.len() as u32) < self.max_students
    }

    pub fn remaining_capacity(&self) -> u32 {
        if !self.role.can_supervise() {
            return 0;
        }
        self.max_students
            .saturating_sub(self.assigned_students.len() as u32)
    }

    /// Creates a password reset token valid for ten minutes and returns it.
    ///
    /// Only the token's digest is kept on the user.
    pub fn issue_reset_token(&mut self, now: DateTime<Utc>) -> String {
        let bytes: [u8; 20] = rand::random();
        let token = base64_engine().encode(bytes);
        self.reset_token_hash = Some(reset_token_digest(&token));
        self.reset_token_expires = Some(now + Duration::minutes(RESET_TOKEN_MINUTES));
        token
    }

    pub fn clear_reset_token(&mut self) {
        self.reset_token_hash = None;
        self.reset_token_expires = None;
    }
}

/// SHA-256 hex digest under which a reset token is stored.
pub fn reset_token_digest(token: &str) -> String {
    hex(Sha256::digest(token.as_bytes()))
}

/// Public view of a [`User`]; never exposes credentials.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department: Option<String>,
    pub expertise: Vec<String>,
    pub max_students: u32,
    pub assigned_students: Vec<Uuid>,
    pub supervisor: Option<Uuid>,
    pub project: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            department: user.department,
            expertise: user.expertise,
            max_students: user.max_students,
            assigned_students: user.assigned_students,
            supervisor: user.supervisor,
            project: user.project,
            created_at: user.created_at,
        }
    }
}

/// Name and email of a referenced user, used wherever the original document
/// would have been populated.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

/// Teacher as listed to students choosing a supervisor.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorInfo {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub department: Option<String>,
    pub expertise: Vec<String>,
    pub max_students: u32,
    pub assigned_count: u32,
    pub remaining_capacity: u32,
}

impl From<User> for SupervisorInfo {
    fn from(user: User) -> Self {
        SupervisorInfo {
            id: user.id,
            assigned_count: user.assigned_students.len() as u32,
            remaining_capacity: user.remaining_capacity(),
            name: user.name,
            email: user.email,
            department: user.department,
            expertise: user.expertise,
            max_students: user.max_students,
        }
    }
}

/// Resolves user ids to summaries, asking the store once per id.
pub struct UserDirectory<'a> {
    store: &'a dyn Store,
    known: HashMap<Uuid, Option<UserSummary>>,
}

impl<'a> UserDirectory<'a> {
    pub fn new(store: &'a dyn Store) -> UserDirectory<'a> {
        UserDirectory {
            store,
            known: HashMap::new(),
        }
    }

    pub async fn summary(&mut self, id: Uuid) -> Result<Option<UserSummary>, Problem> {
        if let Some(known) = self.known.get(&id) {
            return Ok(known.clone());
        }
        let summary = self.store.get_user(id).await?.as_ref().map(UserSummary::from);
        self.known.insert(id, summary.clone());
        Ok(summary)
    }

    pub async fn maybe(&mut self, id: Option<Uuid>) -> Result<Option<UserSummary>, Problem> {
        match id {
            Some(id) => self.summary(id).await,
            None => Ok(None),
        }
    }
}
