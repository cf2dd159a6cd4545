//! Domain layer types and invariants.

pub mod error;
pub mod page;
pub mod record_map;
pub mod search;
pub mod site;
pub mod slug;
