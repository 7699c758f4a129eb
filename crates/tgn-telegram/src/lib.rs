//! Telegram adapter (teloxide).
//!
//! This crate implements the `tgn-core` delivery port over the Telegram Bot API.

use std::sync::Arc;

use async_trait::async_trait;

use teloxide::{prelude::*, types::ParseMode};

use tokio::time::{timeout_at, Instant};
use tracing::info;

use tgn_core::{
    config::ValidatedConfig,
    domain::ChatId,
    errors::Error,
    formatting::render_notification_html,
    messaging::port::{Connector, DeliveryPort},
    Result,
};

/// Telegram's limit on visible message length.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Delivers notifications to a fixed list of Telegram chats.
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
    recipients: Vec<ChatId>,
}

impl TelegramMessenger {
    pub fn new(bot: Bot, recipients: Vec<ChatId>) -> Self {
        Self { bot, recipients }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(chat_id: ChatId, e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error (chat {chat_id}): {e}"))
    }
}

#[async_trait]
impl DeliveryPort for TelegramMessenger {
    /// Send to every recipient in order, stopping at the first failure.
    async fn deliver(&self, title: &str, text: &str, deadline: Instant) -> Result<()> {
        let html = render_notification_html(title, text, TELEGRAM_MESSAGE_LIMIT);
        for &chat_id in &self.recipients {
            let send = self
                .bot
                .send_message(Self::tg_chat(chat_id), html.clone())
                .parse_mode(ParseMode::Html)
                .send();
            match timeout_at(deadline, send).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(Self::map_err(chat_id, e)),
                Err(_) => {
                    return Err(Error::External(format!(
                        "telegram error (chat {chat_id}): deadline exceeded"
                    )))
                }
            }
        }
        Ok(())
    }
}

/// Builds a [`TelegramMessenger`], checking the bot token with `getMe` first.
#[derive(Clone, Debug, Default)]
pub struct TelegramConnector;

impl TelegramConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for TelegramConnector {
    async fn connect(&self, cfg: &ValidatedConfig) -> Result<Arc<dyn DeliveryPort>> {
        let bot = Bot::new(cfg.token.clone());
        let me = bot
            .get_me()
            .await
            .map_err(|e| Error::External(format!("telegram bot rejected: {e}")))?;
        info!(
            bot = %me.username(),
            recipients = cfg.recipients.len(),
            "telegram bot connected"
        );
        Ok(Arc::new(TelegramMessenger::new(bot, cfg.recipients.clone())))
    }
}
