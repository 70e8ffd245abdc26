//! Client-side data loading and caching for paginated remote feeds.

pub mod cache;
pub mod config;
pub mod logging;
pub mod remote;
