use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Moderator,
    User,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Moderator => "moderator",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub role: Role,
}

impl Identity {
    #[must_use]
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }

    /// The built-in identity used by the local CLI operator.
    #[must_use]
    pub fn system() -> Self {
        Self::new("system", Role::Admin)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("caller '{name}' with role {role} is not allowed")]
    Forbidden { name: String, role: Role },
}

/// Admit `caller` only if it is present and holds one of `allowed`.
///
/// # Errors
///
/// Returns [`AuthError::Unauthenticated`] without a caller and
/// [`AuthError::Forbidden`] for any other role.
pub fn require_role<'a>(
    caller: Option<&'a Identity>,
    allowed: &[Role],
) -> Result<&'a Identity, AuthError> {
    let identity = caller.ok_or(AuthError::Unauthenticated)?;
    if allowed.contains(&identity.role) {
        Ok(identity)
    } else {
        Err(AuthError::Forbidden {
            name: identity.name.clone(),
            role: identity.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_is_admitted() {
        let admin = Identity::new("ops", Role::Admin);
        let admitted = require_role(Some(&admin), &[Role::Admin]).unwrap();
        assert_eq!(admitted.name, "ops");
    }

    #[test]
    fn missing_caller_is_unauthenticated() {
        assert_eq!(
            require_role(None, &[Role::Admin]),
            Err(AuthError::Unauthenticated)
        );
    }

    #[test]
    fn other_roles_are_forbidden() {
        for role in [Role::Moderator, Role::User] {
            let caller = Identity::new("someone", role);
            assert!(matches!(
                require_role(Some(&caller), &[Role::Admin]),
                Err(AuthError::Forbidden { .. })
            ));
        }
    }

    #[test]
    fn system_identity_is_admin() {
        let system = Identity::system();
        assert_eq!(system.role, Role::Admin);
        assert!(require_role(Some(&system), &[Role::Admin]).is_ok());
    }

    #[test]
    fn roles_deserialize_lowercase() {
        let role: Role = serde_json::from_str("\"moderator\"").unwrap();
        assert_eq!(role, Role::Moderator);
        assert_eq!(Role::Admin.to_string(), "admin");
    }
}
