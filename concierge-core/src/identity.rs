//! Signed-in user identity and the shared session slot.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

/// Opaque identifier of a signed-in user.
///
/// Cache keys embed this value verbatim, so it is kept as the string the
/// backend hands out rather than parsed into a narrower type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Admin panel role, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    GeneralUser,
    Admin,
    SuperUser,
}

impl Role {
    /// Admins and super users form the privileged tier.
    pub fn is_privileged(self) -> bool {
        self >= Role::Admin
    }

    /// True only for the top of the hierarchy.
    pub fn is_highest(self) -> bool {
        self == Role::SuperUser
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::GeneralUser => "general_user",
            Role::Admin => "admin",
            Role::SuperUser => "super_user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general_user" => Ok(Role::GeneralUser),
            "admin" => Ok(Role::Admin),
            "super_user" => Ok(Role::SuperUser),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// The user currently signed in to the panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: UserId,
    pub role: Role,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId::new(id),
            role,
        }
    }
}

/// Shared slot holding the signed-in identity, if any.
///
/// Components hold an `Arc<Session>` and read it on every operation, so a
/// sign-out or user switch takes effect without rebuilding them.
#[derive(Debug, Default)]
pub struct Session {
    current: RwLock<Option<UserIdentity>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(identity: UserIdentity) -> Self {
        Self {
            current: RwLock::new(Some(identity)),
        }
    }

    /// Replace the current identity. Returns the previous one.
    pub fn sign_in(&self, identity: UserIdentity) -> Option<UserIdentity> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        guard.replace(identity)
    }

    pub fn sign_out(&self) -> Option<UserIdentity> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        guard.take()
    }

    pub fn current(&self) -> Option<UserIdentity> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.current().map(|identity| identity.id)
    }

    pub fn role(&self) -> Option<Role> {
        self.current().map(|identity| identity.role)
    }
}
