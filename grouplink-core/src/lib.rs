//! grouplink core library: domain types, the group marker contract, registry
//! interfaces, event hubs, file-backed registries, settings and errors.
//!
//! - [`types`]: newtypes and records for both registries
//! - [`marker`]: the `synced-group-<N>` convention
//! - [`registry`]: [`CrmRegistry`] / [`PlatformRegistry`] traits
//! - [`events`]: change notifications and scoped handler suppression
//! - [`store`]: YAML file-backed registries
//! - [`settings`]: schedule and batch configuration
//! - [`paths`]: `~/.grouplink/` layout and atomic writes

pub mod error;
pub mod events;
pub mod marker;
pub mod paths;
pub mod registry;
pub mod settings;
pub mod store;
pub mod types;

pub use error::{RegistryError, RegistryResult};
pub use events::{CrmEvent, EventHub, HandlerId, PlatformEvent, Suppression};
pub use marker::{GroupMarker, MarkerError};
pub use registry::{CrmRegistry, PlatformRegistry};
pub use settings::{Interval, Settings};
pub use store::{CrmStore, PlatformStore};
pub use types::{
    Authority, ContactId, CrmGroup, CrmGroupId, CrmGroupType, CrmGroupUpdate, Direction,
    MembershipEdge, MembershipStatus, NewCrmGroup, NewPlatformGroup, PlatformGroup,
    PlatformGroupId, PlatformGroupUpdate, Side, SyncedGroupPair, UserId,
};
