//! Site model services built on the cache engine.

pub mod base_data;
pub mod blocks;
pub mod catalog;
pub mod config_page;
pub mod error;
pub mod fetch;
pub mod search;
pub mod site;
pub mod slug_index;
pub mod upstream;

pub use error::{AppError, SiteError};
pub use site::{SiteOptions, SiteServices, WarmReport};
pub use upstream::SubtreeSource;
