use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

use super::{
    error::TelegramError,
    types::{
        ApiResponse, BotIdentity, ChatInfo, ChatTarget, ParseMode, RawUpdate,
        SendMessageRequest, SentMessage,
    },
};

#[derive(Debug, Serialize)]
struct GetUpdatesQuery {
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
}

#[derive(Debug, Serialize)]
struct GetChatQuery<'a> {
    chat_id: &'a ChatTarget,
}

/// Thin typed wrapper over the four Bot API methods the service uses.
#[derive(Clone)]
pub struct TelegramClient {
    http: Client,
    bot_url: String,
    request_timeout: Duration,
}

impl TelegramClient {
    pub fn new(http: Client, api_base: &Url, token: &str, request_timeout: Duration) -> Self {
        let base = api_base.as_str().trim_end_matches('/');
        Self {
            http,
            bot_url: format!("{base}/bot{token}"),
            request_timeout,
        }
    }

    pub async fn get_me(&self) -> Result<BotIdentity, TelegramError> {
        let request = self
            .http
            .get(self.method_url("getMe"))
            .timeout(self.request_timeout);
        self.execute("getMe", request).await
    }

    pub async fn get_chat(&self, chat: &ChatTarget) -> Result<ChatInfo, TelegramError> {
        let request = self
            .http
            .get(self.method_url("getChat"))
            .query(&GetChatQuery { chat_id: chat })
            .timeout(self.request_timeout);
        self.execute("getChat", request).await
    }

    /// Long-polls for updates starting at `offset`. `wait` is the server-side
    /// hold time and `client_timeout` the local deadline for the whole request.
    /// Only the envelope is validated here; each update is decoded by the
    /// caller so one bad element does not fail the batch.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        wait: Duration,
        client_timeout: Duration,
    ) -> Result<Vec<RawUpdate>, TelegramError> {
        let request = self
            .http
            .get(self.method_url("getUpdates"))
            .query(&GetUpdatesQuery {
                timeout: wait.as_secs(),
                offset,
            })
            .timeout(client_timeout);
        self.execute("getUpdates", request).await
    }

    pub async fn send_message(
        &self,
        chat: &ChatTarget,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<SentMessage, TelegramError> {
        let request = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&SendMessageRequest {
                chat_id: chat,
                text,
                parse_mode,
            })
            .timeout(self.request_timeout);
        self.execute("sendMessage", request).await
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.bot_url)
    }

    async fn execute<T>(
        &self,
        method: &'static str,
        request: RequestBuilder,
    ) -> Result<T, TelegramError>
    where
        T: DeserializeOwned,
    {
        // The request URL embeds the bot token; keep it out of error messages.
        let transport = |source: reqwest::Error| TelegramError::Transport {
            method,
            source: source.without_url(),
        };

        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport)?;

        if !status.is_success() {
            let envelope = serde_json::from_slice::<ApiResponse<serde_json::Value>>(&body).ok();
            return Err(TelegramError::Rejected {
                method,
                status: status.as_u16(),
                error_code: envelope.as_ref().and_then(|e| e.error_code),
                description: envelope.and_then(|e| e.description),
            });
        }

        let envelope: ApiResponse<T> = serde_json::from_slice(&body)
            .map_err(|source| TelegramError::Decode { method, source })?;
        if !envelope.ok {
            return Err(TelegramError::Rejected {
                method,
                status: status.as_u16(),
                error_code: envelope.error_code,
                description: envelope.description,
            });
        }
        envelope.result.ok_or_else(|| TelegramError::Decode {
            method,
            source: serde::de::Error::custom("response is missing `result`"),
        })
    }
}
