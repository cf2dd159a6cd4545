//! siteweave: a cached, queryable site model over a remote block/database
//! content service.
//!
//! Every upstream read goes through the layered [`cache::CacheEngine`]
//! (memory tier, durable key-value tier, in-flight coalescing). On top of it,
//! [`application::SiteServices`] derives the site catalog, the slug index and
//! the search index.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
