//! JSON-RPC client for the Transmission daemon.
//!
//! The daemon guards its RPC endpoint with a CSRF-style session token: the
//! first request of a session is answered with `409 Conflict` and a fresh
//! `X-Transmission-Session-Id` header. [`RpcClient`] captures that token,
//! stores it in a shared [`SessionTokens`] slot and retries the call once.

pub mod client;
pub mod endpoint;
pub mod error;
pub mod session;
pub mod transport;

pub use client::{DEFAULT_TIMEOUT, RpcClient, RpcRequest, RpcResponse};
pub use endpoint::{Credentials, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_RPC_PATH, Endpoint};
pub use error::{ClientError, EndpointError};
pub use session::{SESSION_ID_HEADER, SessionTokens};
pub use transport::{HttpTransport, PostRequest, PostResponse, Transport};
