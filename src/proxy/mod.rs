//! HTTP server module.
//!
//! This module provides the OpenAI-compatible HTTP API that accepts requests,
//! routes them to a provider and exposes analytics over the routing core.

mod handlers;
mod server;
pub mod types;

pub use server::{create_router, run_server, AppState, RequestId, LIAISON_REQUEST_ID_HEADER};
pub use types::{
    AnalyzeRequest, AnalyzeResponse, ChatCompletionRequest, ChatCompletionResponse, Message,
};
