//! Domain types shared by every grouplink crate.
//!
//! Registry A is the CRM side (groups, contacts, group contacts) and
//! Registry B is the web-platform side (groups, users, memberships). Their
//! identifiers are distinct newtypes so an id can never be handed to the
//! wrong registry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

id_newtype!(
    /// Group identifier in Registry A.
    CrmGroupId
);
id_newtype!(
    /// Contact identifier in Registry A.
    ContactId
);
id_newtype!(
    /// Group identifier in Registry B.
    PlatformGroupId
);
id_newtype!(
    /// Login account identifier in Registry B.
    UserId
);

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// One of the two registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Crm,
    Platform,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Crm => Side::Platform,
            Side::Platform => Side::Crm,
        }
    }

    /// Human label for a member identifier on this side.
    pub fn member_label(self) -> &'static str {
        match self {
            Side::Crm => "Contact ID",
            Side::Platform => "User ID",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Crm => write!(f, "crm"),
            Side::Platform => write!(f, "platform"),
        }
    }
}

/// Direction of a reconciliation job: which side is the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    #[default]
    CrmToPlatform,
    PlatformToCrm,
}

impl Direction {
    pub fn source(self) -> Side {
        match self {
            Direction::CrmToPlatform => Side::Crm,
            Direction::PlatformToCrm => Side::Platform,
        }
    }

    pub fn target(self) -> Side {
        self.source().other()
    }

    /// Filename-safe token used inside job identifiers.
    pub fn slug(self) -> &'static str {
        match self {
            Direction::CrmToPlatform => "crm_to_platform",
            Direction::PlatformToCrm => "platform_to_crm",
        }
    }

    pub fn all() -> [Direction; 2] {
        [Direction::CrmToPlatform, Direction::PlatformToCrm]
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::CrmToPlatform => write!(f, "crm-to-platform"),
            Direction::PlatformToCrm => write!(f, "platform-to-crm"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "crm-to-platform" | "to-platform" => Ok(Direction::CrmToPlatform),
            "platform-to-crm" | "to-crm" => Ok(Direction::PlatformToCrm),
            other => Err(format!(
                "unknown direction '{other}'; expected: crm-to-platform, platform-to-crm"
            )),
        }
    }
}

/// Which side's group served as the template when a pair was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Authority {
    #[default]
    Crm,
    Platform,
}

/// Status of a group contact in Registry A. Only `Added` counts as an
/// active membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MembershipStatus {
    #[default]
    Added,
    Removed,
    Pending,
}

impl MembershipStatus {
    pub fn is_active(self) -> bool {
        matches!(self, MembershipStatus::Added)
    }
}

/// Registry A group types. Synced groups always carry `AccessControl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrmGroupType {
    AccessControl,
    MailingList,
}

// ---------------------------------------------------------------------------
// Registry A records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmGroup {
    pub id: CrmGroupId,
    pub name: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-text source field carrying the sync marker.
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub group_types: Vec<CrmGroupType>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Parameters for creating a Registry A group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewCrmGroup {
    pub name: String,
    pub title: String,
    pub description: Option<String>,
    pub source: String,
    pub group_types: Vec<CrmGroupType>,
}

/// Field changes for a Registry A group; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrmGroupUpdate {
    pub name: Option<String>,
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub source: Option<String>,
    pub group_types: Option<Vec<CrmGroupType>>,
}

// ---------------------------------------------------------------------------
// Registry B records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformGroup {
    pub id: PlatformGroupId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Parameters for creating a Registry B group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewPlatformGroup {
    pub name: String,
    pub description: Option<String>,
    /// Ask the live bridge to create and link a Registry A counterpart.
    pub sync: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformGroupUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
}

// ---------------------------------------------------------------------------
// Derived records
// ---------------------------------------------------------------------------

/// "Member `member` is an active member of group `group`" on one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MembershipEdge<G, M> {
    pub group: G,
    pub member: M,
}

/// Two linked groups, one per registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedGroupPair {
    pub crm_group: CrmGroupId,
    pub platform_group: PlatformGroupId,
    pub authority: Authority,
}

fn default_true() -> bool {
    true
}
