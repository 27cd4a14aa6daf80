//! Translation engine of the bridge gateway
//!
//! Accepts `OpenAI` chat-completion, embedding and model-listing requests,
//! re-expresses them as Gemini generative-content calls, and translates the
//! responses (including streamed ones) back into the `OpenAI` wire format.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod convert;
pub mod discovery;
pub mod error;
pub mod image;
pub mod protocol;
pub mod provider;
pub mod router;
pub mod routing;
pub mod stream;

pub use discovery::ModelCatalog;
pub use error::{LlmError, map_error};
pub use provider::{Backend, BackendStream};
pub use router::{LlmState, llm_router};
pub use routing::ModelRouter;
pub use stream::{StreamFrame, StreamTranslator};
