//! Request handler module
//!
//! Routing dispatch, header injection, and the static file server the
//! router delegates to.

pub mod router;
pub mod static_files;

// Re-export main entry point
pub use router::{handle_request, Router};
