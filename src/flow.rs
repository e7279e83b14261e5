//! Conversation flow state machine.
//!
//! Idle → AwaitingTone → Idle, per user. A free-text message becomes the
//! pending submission and prompts for a tone; a tone selection spends a
//! quota unit, rewrites the pending text and replies with the result plus
//! an optional voice clip. The flow owns all per-user transient state and
//! is the only place provider outcomes are mapped to user-facing strings.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::quota::QuotaStore;
use crate::rewriter::{Rewrite, RewriteOutcome};
use crate::synthesizer::Synthesize;

pub const MSG_WELCOME: &str =
    "👋 Привет! Я — ИИ-переводчик эмоций. Пришли текст, а потом выбери стиль.";
pub const MSG_CHOOSE_TONE: &str = "Выбери стиль, в котором переписать это сообщение:";
pub const MSG_QUOTA_EXCEEDED: &str =
    "😔 Лимит 3 сообщений в день исчерпан. Приходи завтра или оформи подписку!";
pub const MSG_NEED_TEXT: &str = "Сначала пришли текст, который нужно переформулировать.";
pub const MSG_THINKING: &str = "🧠 Думаю над ответом...";
pub const MSG_ANSWER_PREFIX: &str = "Вот вариант:\n\n";
pub const MSG_VOICE_CAPTION: &str = "🎙️ Озвучка твоего сообщения";
pub const MSG_TIMED_OUT: &str = "Извини, запрос занял слишком много времени. Попробуй позже.";
pub const MSG_FAILED: &str = "Произошла ошибка при генерации ответа. Попробуй ещё раз.";

/// The four rewrite styles offered on the reply keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Neutral,
    Friendly,
    Empathetic,
    Humorous,
}

impl Tone {
    pub const ALL: [Tone; 4] = [
        Tone::Neutral,
        Tone::Friendly,
        Tone::Empathetic,
        Tone::Humorous,
    ];

    /// Keyboard label, exactly as shown to the user.
    pub fn label(self) -> &'static str {
        match self {
            Tone::Neutral => "Нейтрально",
            Tone::Friendly => "Дружелюбно",
            Tone::Empathetic => "Эмпатично",
            Tone::Humorous => "С юмором",
        }
    }

    /// Only an exact label match counts as a tone; anything else is a new
    /// submission.
    pub fn from_label(text: &str) -> Option<Tone> {
        Tone::ALL.into_iter().find(|tone| tone.label() == text)
    }
}

/// Inbound message, classified at the transport boundary before it enters
/// the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    SessionStart,
    ToneSelection(Tone),
    FreeText(String),
}

impl Inbound {
    pub fn classify(text: &str) -> Inbound {
        match Tone::from_label(text) {
            Some(tone) => Inbound::ToneSelection(tone),
            None => Inbound::FreeText(text.to_string()),
        }
    }
}

/// Outbound reply emitted by the flow; the transport decides how each
/// variant maps onto chat-platform calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Plain text reply.
    Text(String),
    /// Text reply presenting the tone keyboard.
    AskTone(String),
    /// Text reply removing any custom keyboard.
    Welcome(String),
    /// Voice clip with a caption.
    Voice { audio: Vec<u8>, caption: String },
}

/// Delivery seam. Replies are sent one by one, in order, so the interim
/// acknowledgment reaches the user before the rewrite call starts.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, reply: Outbound) -> Result<()>;
}

pub struct ConversationFlow {
    quota: QuotaStore,
    rewriter: Arc<dyn Rewrite>,
    synthesizer: Arc<dyn Synthesize>,
    pending: Mutex<HashMap<i64, String>>,
    charge_without_text: bool,
}

impl ConversationFlow {
    pub fn new(
        quota: QuotaStore,
        rewriter: Arc<dyn Rewrite>,
        synthesizer: Arc<dyn Synthesize>,
        charge_without_text: bool,
    ) -> Self {
        Self {
            quota,
            rewriter,
            synthesizer,
            pending: Mutex::new(HashMap::new()),
            charge_without_text,
        }
    }

    /// Handle one classified inbound message for `user_id`, emitting
    /// replies through `sink` in order. A quota-store error aborts the
    /// turn without any reply.
    pub async fn handle(&self, user_id: i64, inbound: Inbound, sink: &dyn ReplySink) -> Result<()> {
        match inbound {
            Inbound::SessionStart => self.on_session_start(user_id, sink).await,
            Inbound::FreeText(text) => self.on_free_text(user_id, text, sink).await,
            Inbound::ToneSelection(tone) => self.on_tone(user_id, tone, sink).await,
        }
    }

    async fn on_session_start(&self, user_id: i64, sink: &dyn ReplySink) -> Result<()> {
        self.quota.ensure_user(user_id, Utc::now())?;
        self.pending_lock()?.remove(&user_id);
        info!("User {user_id} started a session");
        sink.send(Outbound::Welcome(MSG_WELCOME.to_string())).await
    }

    async fn on_free_text(&self, user_id: i64, text: String, sink: &dyn ReplySink) -> Result<()> {
        // a new submission silently overwrites any previous one
        self.pending_lock()?.insert(user_id, text);
        sink.send(Outbound::AskTone(MSG_CHOOSE_TONE.to_string()))
            .await
    }

    async fn on_tone(&self, user_id: i64, tone: Tone, sink: &dyn ReplySink) -> Result<()> {
        if self.charge_without_text {
            // Historical order: the quota unit is spent before we look for
            // pending text, so a stray tone tap still costs an attempt.
            if !self.quota.check_and_consume(user_id, Utc::now())? {
                return sink.send(Outbound::Text(MSG_QUOTA_EXCEEDED.to_string())).await;
            }
            let Some(text) = self.pending_text(user_id)? else {
                return sink.send(Outbound::Text(MSG_NEED_TEXT.to_string())).await;
            };
            self.rewrite_and_reply(user_id, &text, tone, sink).await
        } else {
            let Some(text) = self.pending_text(user_id)? else {
                return sink.send(Outbound::Text(MSG_NEED_TEXT.to_string())).await;
            };
            if !self.quota.check_and_consume(user_id, Utc::now())? {
                return sink.send(Outbound::Text(MSG_QUOTA_EXCEEDED.to_string())).await;
            }
            self.rewrite_and_reply(user_id, &text, tone, sink).await
        }
    }

    async fn rewrite_and_reply(
        &self,
        user_id: i64,
        text: &str,
        tone: Tone,
        sink: &dyn ReplySink,
    ) -> Result<()> {
        sink.send(Outbound::Text(MSG_THINKING.to_string())).await?;

        match self.rewriter.rewrite(text, tone).await {
            RewriteOutcome::Rewritten(rewritten) => {
                info!("Rewrote {} chars for user {user_id} as {tone:?}", text.len());
                sink.send(Outbound::Text(format!("{MSG_ANSWER_PREFIX}{rewritten}")))
                    .await?;

                // only genuine rewrites get a voice; a missing clip is silent
                if let Some(audio) = self.synthesizer.synthesize(&rewritten).await {
                    sink.send(Outbound::Voice {
                        audio,
                        caption: MSG_VOICE_CAPTION.to_string(),
                    })
                    .await?;
                }
                Ok(())
            }
            RewriteOutcome::TimedOut => {
                sink.send(Outbound::Text(MSG_TIMED_OUT.to_string())).await
            }
            RewriteOutcome::Failed(reason) => {
                warn!("Rewrite failed for user {user_id}: {reason}");
                sink.send(Outbound::Text(MSG_FAILED.to_string())).await
            }
        }
    }

    /// Pending text is consumed by read: it stays in place so the state is
    /// lost only on restart or a new submission.
    fn pending_text(&self, user_id: i64) -> Result<Option<String>> {
        Ok(self.pending_lock()?.get(&user_id).cloned())
    }

    fn pending_lock(&self) -> Result<MutexGuard<'_, HashMap<i64, String>>> {
        self.pending
            .lock()
            .map_err(|e| anyhow::anyhow!("pending map lock poisoned: {e}"))
    }
}
