pub mod auth;
pub mod http_transport;

pub use auth::{AnonymousProvider, BearerTokenProvider, StaticHeadersProvider};
pub use http_transport::{HttpTransport, HttpTransportBuilder};
pub use spchain_core::protocol::{AuthProvider, Transport, TransportError, WireRequest, WireResponse};
