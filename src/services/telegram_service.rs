use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

use crate::dto::telegram_dto::Update;
use crate::error::{Error, Result};

/// Update kinds the bot consumes, both for polling and for the webhook registration.
pub const ALLOWED_UPDATES: [&str; 3] = ["message", "callback_query", "chat_member"];

/// A chat as the Bot API accepts it: numeric id or `@username`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChatTarget {
    Id(i64),
    Username(String),
}

impl std::fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatTarget::Id(id) => write!(f, "{}", id),
            ChatTarget::Username(name) => f.write_str(name),
        }
    }
}

/// Outbound side of the Telegram Bot API used by the bot and the group controller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Returns the id of the sent message.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<JsonValue>,
        protect_content: bool,
    ) -> Result<i64>;

    async fn send_photo(
        &self,
        chat_id: i64,
        photo_url: &str,
        caption: Option<String>,
        protect_content: bool,
    ) -> Result<i64>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()>;

    async fn answer_callback_query(&self, callback_query_id: &str, text: Option<String>, show_alert: bool) -> Result<()>;

    /// Creates an invite link and returns its URL. `expire_date` is a unix timestamp.
    async fn create_invite_link(
        &self,
        chat: &ChatTarget,
        name: &str,
        member_limit: u32,
        expire_date: i64,
    ) -> Result<String>;

    async fn ban_chat_member(&self, chat: &ChatTarget, user_id: i64) -> Result<()>;

    async fn unban_chat_member(&self, chat: &ChatTarget, user_id: i64, only_if_banned: bool) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct InviteLink {
    invite_link: String,
}

#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(bot_token: &str) -> Self {
        Self::with_base_url(format!("https://api.telegram.org/bot{}", bot_token))
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            base_url,
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: JsonValue) -> Result<T> {
        let url = format!("{}/{}", self.base_url, method);
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let payload: ApiResponse<T> = response.json().await?;

        if !payload.ok {
            let description = payload.description.unwrap_or_else(|| status.to_string());
            tracing::warn!(method, %status, %description, "telegram api call failed");
            return Err(Error::Telegram(format!("{}: {}", method, description)));
        }
        payload
            .result
            .ok_or_else(|| Error::Telegram(format!("{}: empty result", method)))
    }

    /// Long-polls for updates. `timeout_secs` is passed through to Telegram.
    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ALLOWED_UPDATES,
            }),
        )
        .await
    }

    pub async fn set_webhook(&self, url: &str, secret_token: &str) -> Result<()> {
        let _: bool = self
            .call(
                "setWebhook",
                json!({
                    "url": url,
                    "secret_token": secret_token,
                    "allowed_updates": ALLOWED_UPDATES,
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn delete_webhook(&self) -> Result<()> {
        let _: bool = self.call("deleteWebhook", json!({})).await?;
        Ok(())
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<JsonValue>,
        protect_content: bool,
    ) -> Result<i64> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "protect_content": protect_content,
        });
        if let Some(markup) = reply_markup {
            body["reply_markup"] = markup;
        }
        let sent: SentMessage = self.call("sendMessage", body).await?;
        Ok(sent.message_id)
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo_url: &str,
        caption: Option<String>,
        protect_content: bool,
    ) -> Result<i64> {
        let mut body = json!({
            "chat_id": chat_id,
            "photo": photo_url,
            "protect_content": protect_content,
        });
        if let Some(caption) = caption {
            body["caption"] = JsonValue::String(caption);
        }
        let sent: SentMessage = self.call("sendPhoto", body).await?;
        Ok(sent.message_id)
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        let _: bool = self
            .call("deleteMessage", json!({ "chat_id": chat_id, "message_id": message_id }))
            .await?;
        Ok(())
    }

    async fn answer_callback_query(&self, callback_query_id: &str, text: Option<String>, show_alert: bool) -> Result<()> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                json!({
                    "callback_query_id": callback_query_id,
                    "text": text,
                    "show_alert": show_alert,
                }),
            )
            .await?;
        Ok(())
    }

    async fn create_invite_link(
        &self,
        chat: &ChatTarget,
        name: &str,
        member_limit: u32,
        expire_date: i64,
    ) -> Result<String> {
        let link: InviteLink = self
            .call(
                "createChatInviteLink",
                json!({
                    "chat_id": chat,
                    "name": name,
                    "member_limit": member_limit,
                    "expire_date": expire_date,
                }),
            )
            .await?;
        Ok(link.invite_link)
    }

    async fn ban_chat_member(&self, chat: &ChatTarget, user_id: i64) -> Result<()> {
        let _: bool = self
            .call("banChatMember", json!({ "chat_id": chat, "user_id": user_id }))
            .await?;
        Ok(())
    }

    async fn unban_chat_member(&self, chat: &ChatTarget, user_id: i64, only_if_banned: bool) -> Result<()> {
        let _: bool = self
            .call(
                "unbanChatMember",
                json!({ "chat_id": chat, "user_id": user_id, "only_if_banned": only_if_banned }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_targets_serialize_as_bot_api_chat_ids() {
        assert_eq!(serde_json::to_value(ChatTarget::Id(-100123)).unwrap(), json!(-100123));
        assert_eq!(
            serde_json::to_value(ChatTarget::Username("@medgroup".into())).unwrap(),
            json!("@medgroup")
        );
    }
}
