//! RPC Fabric
//!
//! A broker-mediated message router for identity-addressed peers, plus the
//! server and client that speak over it.
//!
//! - [`wire`](crate::rpc::wire) - The envelope frame format and the
//!   correlated request/reply payloads
//! - [`broker`](crate::rpc::broker) - The star-topology router: every
//!   envelope `[from, to, body]` is forwarded to `to` with `from` intact,
//!   and the body is never inspected
//! - [`server`](crate::rpc::server) - Dispatches validated requests onto a
//!   bounded pool and replies to the captured sender
//! - [`client`](crate::rpc::client) - Sync and async calls with
//!   correlation ids and timeouts
//!
//! Peers connect to the broker over TCP and identify themselves with a
//! `Hello` frame; afterwards any peer can address any other by identity.
//! The broker is non-durable: envelopes for absent peers are dropped, not
//! buffered.

/// The star-topology message router.
pub mod broker;
/// The RPC client.
pub mod client;
/// The callback server.
pub mod server;
/// Frame format and codec helpers.
pub mod wire;

pub use broker::RpcBroker;
pub use client::{PendingRpcCall, RpcClient};
pub use server::{handler, CallbackTable, Handler, RpcServer};
pub use wire::{Envelope, Frame, Reply, Request};
