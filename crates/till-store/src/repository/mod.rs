//! # Repository Implementations
//!
//! One repository per aggregate. Repositories own the SQL; callers see typed
//! domain values from till-core.

pub mod cache;
pub mod queue;
pub mod sale;
pub mod session;
