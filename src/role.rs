use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Kind of participant in a conversation.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Tutor,
    Admin,
}

impl Role {
    /// Collection holding accounts of this role, if they are managed here.
    pub fn account_collection(self) -> Option<&'static str> {
        match self {
            Role::Student => Some(crate::data::account::STUDENT_COLLECTION_NAME),
            Role::Tutor => Some(crate::data::account::TUTOR_COLLECTION_NAME),
            Role::Admin => None,
        }
    }

    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Student => write!(f, "student"),
            Role::Tutor => write!(f, "tutor"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "tutor" => Ok(Role::Tutor),
            "admin" => Ok(Role::Admin),
            _ => Err(()),
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
    use super::Role;

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!("Student".parse::<Role>(), Ok(Role::Student));
        assert_eq!("TUTOR".parse::<Role>(), Ok(Role::Tutor));
        assert!("parent".parse::<Role>().is_err());
        assert_eq!(Role::Admin.to_string(), "admin");
    }
}
