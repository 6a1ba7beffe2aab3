#[cfg(test)]
#[path = "rest_test.rs"]
mod tests;

use crate::api::{ArcChatApi, ChatApi};
use crate::cache::MessagePage;
use crate::config::{ServerConfig, user_agent};
use crate::models::{Conversation, ConversationSettings, Message};
use async_trait::async_trait;
use eyre::{Context, Result};
use reqwest::{Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::{fmt::Display, time};
use thiserror::Error;

pub struct RestClient {
    endpoint: String,
    api_token: Option<String>,
    timeout: Option<time::Duration>,
    client: reqwest::Client,
}

#[async_trait]
impl ChatApi for RestClient {
    async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation> {
        let res = self
            .request(Method::GET, &format!("/conversations/{}", conversation_id))
            .send()
            .await
            .wrap_err("fetching conversation")?;

        let res = check_status(res).await?;
        res.json::<Conversation>()
            .await
            .wrap_err("parsing conversation response")
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<MessagePage> {
        let res = self
            .request(
                Method::GET,
                &format!("/conversations/{}/messages", conversation_id),
            )
            .send()
            .await
            .wrap_err("listing messages")?;

        let res = check_status(res).await?;
        res.json::<MessagePage>()
            .await
            .wrap_err("parsing message list response")
    }

    async fn send_message(&self, conversation_id: &str, content: &str) -> Result<Message> {
        let req = SendMessageRequest {
            content: content.to_string(),
        };
        log::trace!("Sending message request: {:?}", req);

        let res = self
            .request(
                Method::POST,
                &format!("/conversations/{}/messages", conversation_id),
            )
            .json(&req)
            .send()
            .await
            .wrap_err("sending message")?;

        let res = check_status(res).await?;
        res.json::<Message>()
            .await
            .wrap_err("parsing send message response")
    }

    async fn delete_message(&self, conversation_id: &str, message_id: &str) -> Result<()> {
        let res = self
            .request(
                Method::DELETE,
                &format!("/conversations/{}/messages/{}", conversation_id, message_id),
            )
            .send()
            .await
            .wrap_err("deleting message")?;

        check_status(res).await?;
        Ok(())
    }

    async fn generate_ai_response(
        &self,
        conversation_id: &str,
        participant_id: &str,
    ) -> Result<Message> {
        let req = GenerateRequest {
            participant_id: participant_id.to_string(),
        };

        let res = self
            .request(
                Method::POST,
                &format!("/conversations/{}/generate", conversation_id),
            )
            .json(&req)
            .send()
            .await
            .wrap_err("generating response")?;

        let res = check_status(res).await?;
        res.json::<Message>()
            .await
            .wrap_err("parsing generated message")
    }

    async fn add_participant(
        &self,
        conversation_id: &str,
        acting_character_id: &str,
    ) -> Result<()> {
        let req = AddParticipantRequest {
            acting_character_id: acting_character_id.to_string(),
        };

        let res = self
            .request(
                Method::POST,
                &format!("/conversations/{}/participants", conversation_id),
            )
            .json(&req)
            .send()
            .await
            .wrap_err("adding participant")?;

        check_status(res).await?;
        Ok(())
    }

    async fn remove_participant(&self, conversation_id: &str, participant_id: &str) -> Result<()> {
        let res = self
            .request(
                Method::DELETE,
                &format!(
                    "/conversations/{}/participants/{}",
                    conversation_id, participant_id
                ),
            )
            .send()
            .await
            .wrap_err("removing participant")?;

        check_status(res).await?;
        Ok(())
    }

    async fn update_conversation_settings(
        &self,
        conversation_id: &str,
        settings: ConversationSettings,
    ) -> Result<Conversation> {
        let res = self
            .request(
                Method::PATCH,
                &format!("/conversations/{}/settings", conversation_id),
            )
            .json(&settings)
            .send()
            .await
            .wrap_err("updating conversation settings")?;

        let res = check_status(res).await?;
        res.json::<Conversation>()
            .await
            .wrap_err("parsing conversation response")
    }
}

impl From<RestClient> for ArcChatApi {
    fn from(value: RestClient) -> Self {
        Arc::new(value)
    }
}

impl From<&ServerConfig> for RestClient {
    fn from(value: &ServerConfig) -> Self {
        let mut client = RestClient::default().with_endpoint(&value.api_url);
        client.api_token = value.api_token.clone();
        client.timeout = value.timeout();
        client
    }
}

impl RestClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_token(mut self, api_token: &str) -> Self {
        self.api_token = Some(api_token.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref()
    }

    pub fn timeout(&self) -> Option<time::Duration> {
        self.timeout
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self
            .client
            .request(method, format!("{}{}", self.endpoint, path))
            .header("User-Agent", user_agent());

        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }

        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token);
        }
        req
    }
}

impl Default for RestClient {
    fn default() -> Self {
        Self {
            endpoint: crate::config::constants::API_URL.to_string(),
            api_token: None,
            timeout: None,
            client: reqwest::Client::new(),
        }
    }
}

async fn check_status(res: Response) -> Result<Response> {
    if res.status().is_success() {
        return Ok(res);
    }

    let http_code = res.status().as_u16();
    let body = res.text().await.wrap_err("reading error response")?;
    log::error!("Error response ({}): {}", http_code, body);
    let mut err = serde_json::from_str::<ApiError>(&body).unwrap_or_else(|_| ApiError {
        message: body.trim().to_string(),
        ..Default::default()
    });
    err.http_code = http_code;
    if err.message.is_empty() {
        err.message = "request failed".to_string();
    }
    Err(err.into())
}

#[derive(Serialize, Debug)]
struct SendMessageRequest {
    content: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    participant_id: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AddParticipantRequest {
    acting_character_id: String,
}

#[derive(Default, Error, Debug, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(skip)]
    pub http_code: u16,
    #[serde(default, alias = "error")]
    pub message: String,
}

impl Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "API error ({}): {}", self.http_code, self.message)
    }
}
