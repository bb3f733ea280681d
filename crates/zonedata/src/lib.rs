//! The zone data model and zone store.
//!
//! This crate is deliberately free of I/O and of any notion of "engines":
//! it owns the in-memory representation of authoritative zone data (owner
//! names, RRsets, delegation points) and the lookups the query engine and
//! update pipeline need. Everything above this crate (refresh, signing,
//! dynamic update, delegation sync) treats it as the single source of
//! truth for "what does this zone currently say".

pub mod delegation;
pub mod name;
pub mod owner;
pub mod policy;
pub mod rrdata;
pub mod rrset;
pub mod store;
pub mod zone;

pub use delegation::DelegationData;
pub use name::{fold, in_bailiwick, label_count, StoredName};
pub use owner::OwnerName;
pub use rrdata::RrData;
pub use rrset::Rrset;
pub use store::{FindZoneResult, ZoneStore};
pub use zone::{Zone, ZoneKind, ZoneOptions, ZoneStoreKind};
