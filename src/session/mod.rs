//! Per-browser session affinity.
//!
//! # Data Flow
//! ```text
//! Cookie: gopee=<id>
//!     → store.rs (resolve: live id → existing client, else create)
//!     → client.rs (UpstreamClient: private cookie jar, redirect following)
//!
//! Background:
//!     RecencyUpdater  ← queued touches from lookups
//!     SessionSweeper  → periodic expiry from the least recent end
//! ```

pub mod client;
pub mod recency;
pub mod store;

pub use client::{RequestBody, UpstreamClient, UpstreamError, UpstreamRequest, UpstreamResponse};
pub use store::{RecencyUpdater, ResolvedSession, Session, SessionError, SessionStore, SessionSweeper};
