//! Backend REST client and the tracker's domain types.

mod api_types;
mod cache;
mod cached_client;
mod client;
mod remote;
pub mod types;

pub use cached_client::CachedClient;
pub use client::ApiClient;
