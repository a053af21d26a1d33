//! Tenant edge: transport layer.
//!
//! Gateway HTTP server, backend forwarding, identity provider client, and
//! the authenticated real-time stream session.

pub mod identity;
pub mod proxy;
pub mod server;
pub mod stream;

pub use identity::{HttpIdentityProvider, IdentityConfig, RefreshingTokenSource, TokenPair};
pub use proxy::{BackendProxy, ForwardRequest, ProxyConfig};
pub use server::{GatewayConfig, GatewayServer};
pub use stream::{StaticTokenSource, StreamConfig, StreamEvent, StreamSession, StreamState, TokenSource, stream_url};
