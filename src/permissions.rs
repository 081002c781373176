//! Permission bits and role presets
//!
//! The service grants users a bit mask of capabilities. This module only
//! names the bits so clients can display or build masks; the service makes
//! every authorization decision.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// A set of permission bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(u8);

impl Permissions {
    /// Create, edit and remove users
    pub const MANAGE_USERS: Permissions = Permissions(1);
    /// Grant and revoke permissions
    pub const MANAGE_PERMISSIONS: Permissions = Permissions(1 << 1);
    /// Modify or delete any event
    pub const MANAGE_EVENTS: Permissions = Permissions(1 << 2);
    /// Publish new events
    pub const CREATE_EVENTS: Permissions = Permissions(1 << 3);
    /// Read events authored by oneself
    pub const READ_OWN_EVENTS: Permissions = Permissions(1 << 4);
    /// Read public events
    pub const READ_PUBLIC_EVENTS: Permissions = Permissions(1 << 5);
    /// Upload file attachments
    pub const UPLOAD_FILES: Permissions = Permissions(1 << 6);

    /// No permissions
    pub const NONE: Permissions = Permissions(0);

    /// Every permission
    pub const ADMIN: Permissions = Permissions(0b0111_1111);
    /// Regular account
    pub const USER: Permissions = Permissions(
        Self::CREATE_EVENTS.0
            | Self::READ_OWN_EVENTS.0
            | Self::UPLOAD_FILES.0
            | Self::READ_PUBLIC_EVENTS.0,
    );
    /// Anonymous reader
    pub const GUEST: Permissions = Self::READ_PUBLIC_EVENTS;

    /// Raw mask
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Build from a raw mask, ignoring unknown bits
    pub const fn from_bits(bits: u8) -> Self {
        Permissions(bits & Self::ADMIN.0)
    }

    /// Whether every bit in `other` is set
    pub const fn contains(self, other: Permissions) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the bits in `other`
    pub fn insert(&mut self, other: Permissions) {
        self.0 |= other.0;
    }

    /// Clear the bits in `other`
    pub fn remove(&mut self, other: Permissions) {
        self.0 &= !other.0;
    }

    /// Whether no bit is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Permissions) -> Permissions {
        Permissions(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permissions {
    fn bitor_assign(&mut self, rhs: Permissions) {
        self.insert(rhs);
    }
}

/// Named role presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Every permission
    Admin,
    /// Create, read own, read public, upload
    User,
    /// Read public only
    Guest,
}

impl Role {
    /// Permission mask for this role
    pub fn permissions(self) -> Permissions {
        match self {
            Role::Admin => Permissions::ADMIN,
            Role::User => Permissions::USER,
            Role::Guest => Permissions::GUEST,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::User => write!(f, "user"),
            Role::Guest => write!(f, "guest"),
        }
    }
}
