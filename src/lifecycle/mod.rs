//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     broadcast → stop accepting, drain in-flight requests
//!               → recency updater and session sweeper exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
