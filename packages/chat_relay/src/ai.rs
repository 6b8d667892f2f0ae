//! Outbound AI service client.
//!
//! The AI service is a black box reached over HTTP: the relay POSTs the
//! user message plus conversation history together with a callback URL,
//! and the service reports progress by POSTing chunks back to that URL.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AiConfig;

/// One prior turn of the conversation, in the AI service's wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    message: &'a str,
    conversation_history: &'a [HistoryEntry],
    callback_url: &'a str,
}

pub struct AiClient {
    http: reqwest::Client,
    service_url: String,
    api_key: String,
    public_base_url: String,
}

impl AiClient {
    pub fn new(config: &AiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build AI service HTTP client")?;
        Ok(Self {
            http,
            service_url: config.service_url.clone(),
            api_key: config.api_key.clone(),
            public_base_url: config.public_base_url.clone(),
        })
    }

    /// Callback URL the AI service POSTs progress to for one message.
    pub fn callback_url(&self, chat_id: Uuid, message_id: Uuid) -> String {
        format!(
            "{}/api/chats/{}/messages/{}/callback",
            self.public_base_url, chat_id, message_id
        )
    }

    /// Submit a message for asynchronous processing. A non-2xx reply or a
    /// transport error means the service never accepted the work and the
    /// message should be failed.
    pub async fn submit(
        &self,
        message: &str,
        conversation_history: &[HistoryEntry],
        callback_url: &str,
    ) -> Result<()> {
        let response = self
            .http
            .post(&self.service_url)
            .header("X-API-Key", &self.api_key)
            .json(&SubmitRequest {
                message,
                conversation_history,
                callback_url,
            })
            .send()
            .await
            .context("AI service request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("AI service rejected message: {status} - {body}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> AiConfig {
        AiConfig {
            service_url: "http://ai.internal/generate".into(),
            api_key: "key".into(),
            public_base_url: "http://relay.internal:8000".into(),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn callback_url_embeds_chat_and_message() {
        let client = AiClient::new(&config()).unwrap();
        let chat = Uuid::new_v4();
        let msg = Uuid::new_v4();
        assert_eq!(
            client.callback_url(chat, msg),
            format!("http://relay.internal:8000/api/chats/{chat}/messages/{msg}/callback")
        );
    }

    #[test]
    fn submit_request_wire_shape() {
        let history = vec![HistoryEntry {
            role: "user".into(),
            content: "hi".into(),
        }];
        let req = SubmitRequest {
            message: "hello",
            conversation_history: &history,
            callback_url: "http://relay/cb",
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["message"], "hello");
        assert_eq!(json["conversation_history"][0]["role"], "user");
        assert_eq!(json["callback_url"], "http://relay/cb");
    }
}
