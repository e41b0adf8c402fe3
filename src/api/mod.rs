//! HTTP Facade
//!
//! A thin HTTP face over the same callback table the RPC server uses. One
//! endpoint, `POST /call`, accepts a [`Call`](crate::types::Call) JSON
//! body and answers with a [`CallResult`](crate::types::CallResult) JSON
//! body. Handler failures ride inside the body; the endpoint answers 200
//! unless the request itself is malformed.

/// Request handlers.
pub mod handlers;
/// Router construction.
pub mod routes;
/// Server lifecycle.
pub mod server;

/// A `reqwest` wrapper around `POST /call`.
pub mod client;

pub use client::HttpClient;
pub use routes::create_router;
pub use server::HttpServer;
