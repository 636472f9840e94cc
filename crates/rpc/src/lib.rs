//! RPC gateway to the push-routing backend.
//!
//! [`RpcGateway`] is the seam the subscription engine talks through. The
//! crate ships a TCP JSON-lines client, a connector that builds it from a
//! [`ConnectionConfig`](pushsub_config::ConnectionConfig), an in-memory
//! backend for tests and offline development, and a small frame server that
//! exposes any gateway over TCP.

pub mod gateway;
pub mod memory;
pub mod server;
pub mod tcp;

pub use {
    gateway::{GatewayConnector, RpcGateway},
    memory::MemoryBackend,
    server::{handle_request, serve, serve_until},
    tcp::{TcpConnector, TcpRpcGateway},
};
