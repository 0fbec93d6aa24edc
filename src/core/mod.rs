/*!
 * Core Module
 * Execution context, parking primitives and error handling
 */

pub mod context;
pub mod errors;
pub mod limits;
pub mod sync;

// Re-export for convenience
pub use context::{current_id, interrupted, ContextId, ThreadHandle};
pub use errors::*;
