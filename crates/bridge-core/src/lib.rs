//! Shared primitives for the bridge gateway
//!
//! Holds the pieces every other crate agrees on: the per-request context
//! carrying the caller's credential, the trait that turns domain errors
//! into HTTP responses, and the response id helper.

#![allow(clippy::must_use_candidate)]

mod context;
mod error;
mod id;

pub use context::{RequestContext, bearer_token};
pub use error::HttpError;
pub use id::new_id;
