//! HTTP step library
//!
//! Five fixed GET endpoints of the live API, executed through one shared,
//! connection-pooling client. Each request is reduced to a success/failure
//! outcome.

mod client;
mod endpoints;

pub use client::{HttpClientError, build_client, http_get};
pub use endpoints::HttpEndpoint;
