//! Per-message orchestration: persist, window, trim, generate, persist.

use std::sync::Arc;

use {
    helpdesk_config::ChatConfig,
    helpdesk_providers::{GenerateRequest, ModelGateway},
    helpdesk_sessions::{HistoryStore, Sender, StoredMessage},
    tracing::{debug, info, warn},
};

use crate::{
    budget::BudgetTrimmer,
    error::{Error, Result},
    window::{HistoryWindower, turn_from_message},
};

/// The result of one successfully answered user message.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub conversation_id: String,
    pub reply: String,
    pub user_message: StoredMessage,
    pub assistant_message: StoredMessage,
}

#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn HistoryStore>,
    gateway: Arc<dyn ModelGateway>,
    windower: HistoryWindower,
    trimmer: BudgetTrimmer,
    system_instruction: String,
    max_output_tokens: u32,
    max_message_chars: usize,
}

impl ConversationService {
    /// Service using the approximate token estimator for the budget.
    pub fn new(
        store: Arc<dyn HistoryStore>,
        gateway: Arc<dyn ModelGateway>,
        config: &ChatConfig,
    ) -> Self {
        Self::with_trimmer(
            store,
            gateway,
            config,
            BudgetTrimmer::approx_tokens(config.token_budget),
        )
    }

    pub fn with_trimmer(
        store: Arc<dyn HistoryStore>,
        gateway: Arc<dyn ModelGateway>,
        config: &ChatConfig,
        trimmer: BudgetTrimmer,
    ) -> Self {
        Self {
            windower: HistoryWindower::new(Arc::clone(&store), config.history_limit),
            store,
            gateway,
            trimmer,
            system_instruction: config.system_instruction.clone(),
            max_output_tokens: config.max_output_tokens,
            max_message_chars: config.max_message_chars,
        }
    }

    pub fn gateway(&self) -> &Arc<dyn ModelGateway> {
        &self.gateway
    }

    /// Trim `raw` and check its length in characters.
    pub fn validate_message(&self, raw: &str) -> Result<String> {
        let trimmed = raw.trim();
        let len = trimmed.chars().count();
        if len == 0 || len > self.max_message_chars {
            return Err(Error::invalid_input(format!(
                "Message must be 1-{} characters.",
                self.max_message_chars
            )));
        }
        Ok(trimmed.to_string())
    }

    /// Answer one user message in `conversation_id`.
    ///
    /// The user message is persisted before the model is called. When the
    /// model call fails nothing further is written and the error is returned.
    pub async fn send_message(&self, conversation_id: &str, raw: &str) -> Result<ChatOutcome> {
        let text = self.validate_message(raw)?;

        self.store.create_conversation(conversation_id).await?;
        let user_message = self
            .store
            .append_message(
                conversation_id,
                Sender::User,
                &text,
                helpdesk_common::time::now(),
            )
            .await?;

        let mut window = self.windower.load_messages(conversation_id).await?;
        // The new message goes out as `new_message`, not as history. Messages
        // appended by concurrent requests after ours are not our context.
        window.retain(|m| m.id < user_message.id);
        let windowed = window.len();
        let history = self
            .trimmer
            .trim(window.iter().map(turn_from_message).collect());

        debug!(
            conversation_id,
            windowed,
            turns = history.len(),
            cost = self.trimmer.cost(&history),
            budget = self.trimmer.budget(),
            "calling model"
        );

        let request = GenerateRequest {
            system_instruction: self.system_instruction.clone(),
            history,
            new_message: text,
            max_output_tokens: self.max_output_tokens,
        };

        let reply = match self.gateway.generate(request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    conversation_id,
                    provider = self.gateway.name(),
                    model = self.gateway.model(),
                    error = %e,
                    "model call failed"
                );
                return Err(e.into());
            },
        };

        let assistant_message = self
            .store
            .append_message(
                conversation_id,
                Sender::Assistant,
                &reply,
                helpdesk_common::time::now(),
            )
            .await?;

        info!(
            conversation_id,
            reply_chars = reply.chars().count(),
            "answered message"
        );

        Ok(ChatOutcome {
            conversation_id: conversation_id.to_string(),
            reply,
            user_message,
            assistant_message,
        })
    }
}
