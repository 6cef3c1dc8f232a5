//! Rewriting web proxy library.
//!
//! Lets a browser reach any origin through this one, rewriting in-page
//! references so navigation and asset loads keep flowing through the proxy.

pub mod codec;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;
pub mod rewrite;
pub mod session;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
