//! Telegram transport wiring via teloxide.
//!
//! Classifies inbound messages at the boundary and renders the flow's
//! outbound replies as Telegram API calls: plain text, the tone reply
//! keyboard, keyboard removal, and voice messages.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, KeyboardButton, KeyboardMarkup, KeyboardRemove};
use teloxide::utils::command::BotCommands;
use tracing::{error, info};

use crate::flow::{ConversationFlow, Inbound, Outbound, ReplySink, Tone};

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
enum Command {
    /// Reset the session and show the welcome message.
    Start,
}

/// Renders flow replies into one chat.
struct TelegramSink {
    bot: Bot,
    chat_id: ChatId,
}

#[async_trait]
impl ReplySink for TelegramSink {
    async fn send(&self, reply: Outbound) -> Result<()> {
        match reply {
            Outbound::Text(text) => {
                self.bot.send_message(self.chat_id, text).await?;
            }
            Outbound::AskTone(text) => {
                self.bot
                    .send_message(self.chat_id, text)
                    .reply_markup(tone_keyboard())
                    .await?;
            }
            Outbound::Welcome(text) => {
                self.bot
                    .send_message(self.chat_id, text)
                    .reply_markup(KeyboardRemove::new())
                    .await?;
            }
            Outbound::Voice { audio, caption } => {
                self.bot
                    .send_voice(
                        self.chat_id,
                        InputFile::memory(audio).file_name("voice.mp3"),
                    )
                    .caption(caption)
                    .await?;
            }
        }
        Ok(())
    }
}

/// Two rows of two, matching the original keyboard layout.
fn tone_keyboard() -> KeyboardMarkup {
    let [neutral, friendly, empathetic, humorous] =
        Tone::ALL.map(|tone| KeyboardButton::new(tone.label()));
    KeyboardMarkup::new([vec![neutral, friendly], vec![empathetic, humorous]]).resize_keyboard()
}

/// Run the dispatcher until the process is stopped.
pub async fn run(bot: Bot, flow: Arc<ConversationFlow>) {
    let handler = Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(on_command),
        )
        .branch(dptree::endpoint(on_message));

    info!("Telegram dispatcher starting");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![flow])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn on_command(
    bot: Bot,
    msg: Message,
    _cmd: Command,
    flow: Arc<ConversationFlow>,
) -> ResponseResult<()> {
    dispatch(bot, &msg, Inbound::SessionStart, flow).await;
    Ok(())
}

async fn on_message(bot: Bot, msg: Message, flow: Arc<ConversationFlow>) -> ResponseResult<()> {
    // non-text messages are ignored
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let inbound = Inbound::classify(text);
    dispatch(bot, &msg, inbound, flow).await;
    Ok(())
}

async fn dispatch(bot: Bot, msg: &Message, inbound: Inbound, flow: Arc<ConversationFlow>) {
    let Some(user) = msg.from.as_ref() else {
        return;
    };
    let user_id = user.id.0 as i64;
    let sink = TelegramSink {
        bot,
        chat_id: msg.chat.id,
    };
    if let Err(e) = flow.handle(user_id, inbound, &sink).await {
        error!("Turn aborted for user {user_id}: {e:#}");
    }
}
