//! Model gateway: typed turns, the [`ModelGateway`] trait and the Gemini
//! REST implementation.

pub mod error;
pub mod gemini;
pub mod model;

pub use {
    error::GatewayError,
    gemini::{GeminiGateway, GeminiModelInfo, list_models},
    model::{GenerateRequest, ModelGateway, Role, Turn},
};
