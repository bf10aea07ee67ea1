use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Donor,
    Receiver,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Donor => "donor",
            Role::Receiver => "receiver",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "donor" => Ok(Role::Donor),
            "receiver" => Ok(Role::Receiver),
            other => Err(format!("unknown role {other:?}")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verified `(user id, role)` pair. Everything past the HTTP edge trusts it as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }
}

/// Fails with `Authorization` unless there is an identity holding `role`.
pub fn require_role<'a>(
    identity: Option<&'a Identity>,
    role: Role,
    msg: &str,
) -> CoreResult<&'a Identity> {
    match identity {
        Some(identity) if identity.role == role => Ok(identity),
        _ => Err(CoreError::authorization(msg)),
    }
}

pub fn require_identity(identity: Option<&Identity>) -> CoreResult<&Identity> {
    identity.ok_or_else(|| CoreError::authorization("No identity, authorization denied"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_its_own_rendering() {
        for role in [Role::Donor, Role::Receiver] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn require_role_checks_presence_and_role() {
        let donor = Identity::new(Uuid::now_v7(), Role::Donor);
        assert!(require_role(Some(&donor), Role::Donor, "nope").is_ok());
        assert!(matches!(
            require_role(Some(&donor), Role::Receiver, "nope"),
            Err(CoreError::Authorization(_))
        ));
        assert!(matches!(
            require_role(None, Role::Donor, "nope"),
            Err(CoreError::Authorization(_))
        ));
    }
}
