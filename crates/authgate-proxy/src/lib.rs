//! Reverse proxy engine that fronts the identity provider.
//!
//! Requests arriving under the gateway's proxy prefix are forwarded to the
//! upstream IdP origin, and responses are rewritten so every upstream-origin
//! reference the browser could see (Location headers, HTML attributes, JSON
//! string values) points back at the gateway instead. The engine never
//! follows redirects itself and never lets a crafted path escape the
//! upstream's configured base path.

pub mod content;
pub mod engine;
pub mod error;
pub mod headers;
pub mod path;

pub use engine::{ProxyEngine, ProxyEngineConfig};
pub use error::ProxyError;
pub use headers::ForwardedHeaderPolicy;
