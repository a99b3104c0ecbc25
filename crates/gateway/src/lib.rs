//! HTTP surface of the support chat backend.
//!
//! Routes:
//! - `GET /`, `GET /health`
//! - `POST /chat/message`
//! - `GET /chat/history`
//! - `GET /chat/history/{conversation_id}`
//! - `GET /chat/conversations`

pub mod chat_routes;
pub mod conversation_id;
pub mod error;
pub mod request_throttle;
pub mod server;

pub use server::{AppState, GatewayState, build_gateway_app, start_gateway};
