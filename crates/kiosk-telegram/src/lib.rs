// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram transport: long polling in, orchestrated replies out.
//!
//! Each inbound direct message is handed to the orchestrator; per-chat
//! ordering is the orchestrator's concern, so distinct chats process in
//! parallel here. Re-engagement prompts queued by the inactivity monitor
//! drain through the same bot.

use std::sync::Arc;

use kiosk_agent::orchestrator::SenderProfile;
use kiosk_agent::{Orchestrator, OutboundMessage};
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Long-polling Telegram channel.
pub struct TelegramChannel {
    bot: Bot,
    orchestrator: Arc<Orchestrator>,
}

impl TelegramChannel {
    pub fn new(bot_token: &str, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            bot: Bot::new(bot_token),
            orchestrator,
        }
    }

    /// Run the polling loop plus the outbound queue consumer until
    /// cancellation. In-flight turns finish; new updates stop arriving.
    pub async fn run(
        self,
        mut outbound_rx: mpsc::Receiver<OutboundMessage>,
        cancel: CancellationToken,
    ) {
        let bot = self.bot.clone();
        let orchestrator = self.orchestrator.clone();

        // Outbound consumer: monitor-scheduled prompts.
        let outbound_bot = self.bot.clone();
        let outbound_cancel = cancel.clone();
        let outbound_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    message = outbound_rx.recv() => {
                        match message {
                            Some(outbound) => send_outbound(&outbound_bot, outbound).await,
                            None => break,
                        }
                    }
                    _ = outbound_cancel.cancelled() => break,
                }
            }
        });

        let handler = Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
            let orchestrator = orchestrator.clone();
            async move {
                if !msg.chat.is_private() {
                    debug!(chat_id = msg.chat.id.0, "ignoring non-DM message");
                    return respond(());
                }
                let Some(text) = msg.text().map(str::to_string) else {
                    debug!(chat_id = msg.chat.id.0, "ignoring non-text message");
                    return respond(());
                };

                let chat_id = msg.chat.id;
                let profile = sender_profile(&msg);
                let reply = orchestrator
                    .handle_turn(&chat_id.0.to_string(), "telegram", &text, &profile)
                    .await;

                match reply {
                    Ok(reply) => {
                        let mut request = bot.send_message(chat_id, reply.text);
                        if let Some(keyboard) = action_keyboard(&reply.suggested_actions) {
                            request = request.reply_markup(keyboard);
                        }
                        if let Err(e) = request.await {
                            error!(chat_id = chat_id.0, error = %e, "failed to send reply");
                        }
                    }
                    Err(e) => {
                        // The orchestrator supervises its own failures; an
                        // error here means the turn never started.
                        error!(chat_id = chat_id.0, error = %e, "turn failed before processing");
                    }
                }
                respond(())
            }
        });

        info!("telegram long polling started");
        let mut dispatcher = Dispatcher::builder(bot, handler)
            .default_handler(|_| async {}) // Silently ignore non-message updates.
            .build();

        tokio::select! {
            _ = dispatcher.dispatch() => {}
            _ = cancel.cancelled() => {
                info!("telegram polling stopping");
            }
        }

        let _ = outbound_task.await;
        info!("telegram channel stopped");
    }
}

async fn send_outbound(bot: &Bot, outbound: OutboundMessage) {
    let Ok(chat_id) = outbound.chat_id.parse::<i64>() else {
        warn!(chat_id = outbound.chat_id.as_str(), "outbound chat id is not numeric");
        return;
    };
    if let Err(e) = bot.send_message(ChatId(chat_id), outbound.text).await {
        warn!(chat_id, error = %e, "failed to send outbound message");
    }
}

fn sender_profile(msg: &Message) -> SenderProfile {
    match msg.from.as_ref() {
        Some(user) => SenderProfile {
            first_name: Some(user.first_name.clone()),
            last_name: user.last_name.clone(),
            username: user.username.clone(),
        },
        None => SenderProfile::default(),
    }
}

/// Render suggested actions as an inline keyboard. Unknown action tags are
/// skipped rather than shown raw.
fn action_keyboard(actions: &[String]) -> Option<InlineKeyboardMarkup> {
    let buttons: Vec<InlineKeyboardButton> = actions
        .iter()
        .filter_map(|action| {
            let label = match action.as_str() {
                "contact_manager" => "Связаться с менеджером",
                "search_more" => "Искать ещё",
                "refine_search" => "Уточнить запрос",
                "learn_more" | "learn_services" => "Об услугах",
                "search_products" => "Поиск товаров",
                "provide_contacts" => "Оставить контакты",
                _ => return None,
            };
            Some(InlineKeyboardButton::callback(label, action.clone()))
        })
        .collect();
    if buttons.is_empty() {
        None
    } else {
        Some(InlineKeyboardMarkup::new(vec![buttons]))
    }
}
