//! HTTP adapter for a paginated feed API.

mod cached_client;
mod client;
mod cursor;
mod types;

pub use cached_client::CachedApiClient;
pub use client::ApiClient;
pub use cursor::Cursor;
pub use types::{FeedEntry, FeedInfo, FeedItem};
