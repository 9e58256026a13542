//! Access to the remote relational data service.
//!
//! - `RemoteService` is the boundary every cache operation goes through
//! - `RestClient` speaks the service's PostgREST dialect over HTTP
//! - `ReadQuery`/`Embed` describe filtered reads with joined sub-objects

pub mod api_types;
pub mod client;
#[cfg(test)]
pub mod memory;
pub mod query;
mod service;

pub use client::{AccessToken, RestClient};
pub use query::{Columns, Embed, Filter, Order, ReadQuery, Table};
pub use service::RemoteService;
