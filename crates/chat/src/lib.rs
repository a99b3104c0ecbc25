//! Conversation handling: history windowing, budget trimming and the
//! per-message service that ties the store to the model gateway.

pub mod budget;
pub mod error;
pub mod history;
pub mod service;
pub mod window;

pub use {
    budget::{
        ApproxTokenEstimator, BudgetTrimmer, CharCountEstimator, CostEstimator, trim_to_budget,
    },
    error::{Error, Result},
    history::{ConversationSummary, HistoryPage, HistoryReader},
    service::{ChatOutcome, ConversationService},
    window::HistoryWindower,
};
