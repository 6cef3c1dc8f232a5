//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, programmatic-request detection)
//!     → home.rs         for `/`
//!     → ServeDir        for `/assets/*`
//!     → proxy module    for everything else
//!     → headers.rs (sanitation in both directions)
//!     → response.rs (token redirects, cookies)
//! ```

pub mod headers;
pub mod home;
pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::{build_router, AppState, HttpServer};
