use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize, ToSchema,
)]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    /// Indicates whether the role carries supervision capacity.
    pub fn can_supervise(self) -> bool {
        self == Role::Teacher
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "Student",
            Role::Teacher => "Teacher",
            Role::Admin => "Admin",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Student
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "teacher" | "supervisor" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!("student".parse::<Role>(), Ok(Role::Student));
        assert_eq!("ADMIN".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("Supervisor".parse::<Role>(), Ok(Role::Teacher));
        assert!("janitor".parse::<Role>().is_err());
    }

    #[test]
    fn only_teachers_supervise() {
        assert!(Role::Teacher.can_supervise());
        assert!(!Role::Student.can_supervise());
        assert!(!Role::Admin.can_supervise());
    }
}
