//! Caller roles.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// The role a verified identity acts under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    EndUser,
    Drone,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::EndUser => "enduser",
            Role::Drone => "drone",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "enduser" => Ok(Role::EndUser),
            "drone" => Ok(Role::Drone),
            other => Err(DomainError::UnknownRole(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_roles() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("enduser".parse::<Role>().unwrap(), Role::EndUser);
        assert_eq!("drone".parse::<Role>().unwrap(), Role::Drone);
    }

    #[test]
    fn rejects_unknown_role() {
        assert_eq!(
            "pilot".parse::<Role>(),
            Err(DomainError::UnknownRole("pilot".to_string()))
        );
        assert!("Admin".parse::<Role>().is_err());
    }

    #[test]
    fn display_matches_wire_name() {
        assert_eq!(Role::EndUser.to_string(), "enduser");
        assert_eq!(serde_json::to_string(&Role::EndUser).unwrap(), "\"enduser\"");
    }
}
