//! The Authgate HTTP server: configuration, routing and request handlers
//! that tie the auth flow and the IdP proxy together behind one origin.

pub mod config;
pub mod cookies;
pub mod cors;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::GatewayConfig;
pub use routes::router;
pub use state::AppState;
