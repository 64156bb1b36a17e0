//! Graph API client over reqwest.

use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::notify::OutboundMessage;
use crate::types::{Channel, ChannelId, PostId, SenderId};

use super::error::PlatformError;
use super::{FeedPost, ManagedPage, Platform};

/// A Graph API client.
///
/// Message sends and profile updates authenticate with the bot's page token;
/// feed and comment calls use the target channel's token; OAuth calls use
/// the app credentials.
#[derive(Clone)]
pub struct GraphClient {
    client: Client,
    base_url: String,
    app_id: String,
    app_secret: String,
    page_access_token: String,
}

impl GraphClient {
    /// Builds a client with the configured base URL, credentials and timeout.
    pub fn new(config: &Config) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(PlatformError::from_reqwest)?;
        Ok(GraphClient {
            client,
            base_url: config.graph_base_url.clone(),
            app_id: config.app_id.clone(),
            app_secret: config.app_secret.clone(),
            page_access_token: config.page_access_token.clone(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, PlatformError> {
        let response = self
            .client
            .get(self.url(endpoint))
            .query(query)
            .send()
            .await
            .map_err(PlatformError::from_reqwest)?;
        read(endpoint, response).await
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        form: &[(&str, &str)],
    ) -> Result<T, PlatformError> {
        let response = self
            .client
            .post(self.url(endpoint))
            .form(form)
            .send()
            .await
            .map_err(PlatformError::from_reqwest)?;
        read(endpoint, response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<T, PlatformError> {
        let response = self
            .client
            .post(self.url(endpoint))
            .query(&[("access_token", self.page_access_token.as_str())])
            .json(body)
            .send()
            .await
            .map_err(PlatformError::from_reqwest)?;
        read(endpoint, response).await
    }
}

/// Checks the status and decodes the body of a Graph API response.
async fn read<T: DeserializeOwned>(endpoint: &str, response: Response) -> Result<T, PlatformError> {
    let status = response.status();
    let body = response.text().await.map_err(PlatformError::from_reqwest)?;
    if !status.is_success() {
        warn!(endpoint, status = status.as_u16(), body = %body, "Graph API request failed");
        return Err(PlatformError::from_response(status.as_u16(), &body));
    }
    debug!(endpoint, "Graph API request succeeded");
    serde_json::from_str(&body).map_err(|e| {
        PlatformError::unexpected_response(format!("invalid response from {}: {}", endpoint, e))
    })
}

// ─── Response Shapes ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DataList<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct RawPost {
    id: String,
    message: Option<String>,
}

impl From<RawPost> for FeedPost {
    fn from(raw: RawPost) -> Self {
        FeedPost {
            id: PostId::new(raw.id),
            message: raw.message,
        }
    }
}

/// Publish responses carry the new id at the top level; some API versions
/// nest it under `data`.
#[derive(Debug, Deserialize)]
struct Created {
    id: Option<String>,
    data: Option<CreatedData>,
}

#[derive(Debug, Deserialize)]
struct CreatedData {
    id: Option<String>,
}

impl Created {
    fn into_post_id(self) -> Result<PostId, PlatformError> {
        self.id
            .or_else(|| self.data.and_then(|d| d.id))
            .map(PostId::new)
            .ok_or_else(|| PlatformError::unexpected_response("publish response has no id"))
    }
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPage {
    id: String,
    name: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Picture {
    data: Option<PictureData>,
}

#[derive(Debug, Deserialize)]
struct PictureData {
    url: Option<String>,
}

// ─── Platform Implementation ──────────────────────────────────────────────────

impl Platform for GraphClient {
    #[instrument(skip_all, fields(recipient = %recipient))]
    async fn send_message(
        &self,
        recipient: &SenderId,
        message: &OutboundMessage,
    ) -> Result<(), PlatformError> {
        let body = json!({
            "recipient": { "id": recipient.as_str() },
            "message": message.to_json(),
        });
        let _: serde_json::Value = self.post_json("me/messages", &body).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(channel = %channel.id))]
    async fn recent_posts(
        &self,
        channel: &Channel,
        limit: usize,
    ) -> Result<Vec<FeedPost>, PlatformError> {
        let limit = limit.to_string();
        let list: DataList<RawPost> = self
            .get_json(
                &format!("{}/feed", channel.id),
                &[
                    ("access_token", channel.token.as_str()),
                    ("fields", "id,message"),
                    ("limit", limit.as_str()),
                ],
            )
            .await?;
        Ok(list.data.into_iter().map(FeedPost::from).collect())
    }

    #[instrument(skip_all, fields(channel = %channel.id, post = %post))]
    async fn fetch_post(&self, channel: &Channel, post: &PostId) -> Result<FeedPost, PlatformError> {
        let raw: RawPost = self
            .get_json(
                post.as_str(),
                &[
                    ("access_token", channel.token.as_str()),
                    ("fields", "id,message"),
                ],
            )
            .await?;
        Ok(raw.into())
    }

    #[instrument(skip_all, fields(channel = %channel.id))]
    async fn publish_post(&self, channel: &Channel, message: &str) -> Result<PostId, PlatformError> {
        let created: Created = self
            .post_form(
                &format!("{}/feed", channel.id),
                &[("access_token", channel.token.as_str()), ("message", message)],
            )
            .await?;
        created.into_post_id()
    }

    #[instrument(skip_all, fields(channel = %channel.id, parent = %parent))]
    async fn publish_comment(
        &self,
        channel: &Channel,
        parent: &PostId,
        message: &str,
    ) -> Result<PostId, PlatformError> {
        let created: Created = self
            .post_form(
                &format!("{}/comments", parent),
                &[("access_token", channel.token.as_str()), ("message", message)],
            )
            .await?;
        created.into_post_id()
    }

    #[instrument(skip_all)]
    async fn exchange_code(&self, redirect_uri: &str, code: &str) -> Result<String, PlatformError> {
        let token: AccessToken = self
            .get_json(
                "oauth/access_token",
                &[
                    ("client_id", self.app_id.as_str()),
                    ("redirect_uri", redirect_uri),
                    ("client_secret", self.app_secret.as_str()),
                    ("code", code),
                ],
            )
            .await?;
        token
            .access_token
            .ok_or_else(|| PlatformError::unexpected_response("token response has no access_token"))
    }

    #[instrument(skip_all)]
    async fn managed_pages(&self, user_token: &str) -> Result<Vec<ManagedPage>, PlatformError> {
        let list: DataList<RawPage> = self
            .get_json(
                "me/accounts",
                &[
                    ("access_token", user_token),
                    ("fields", "access_token,name,id"),
                ],
            )
            .await?;
        Ok(list
            .data
            .into_iter()
            .map(|p| ManagedPage {
                id: ChannelId::new(p.id),
                name: p.name,
                access_token: p.access_token,
            })
            .collect())
    }

    #[instrument(skip_all, fields(page = %page))]
    async fn page_picture_url(
        &self,
        page: &ChannelId,
        user_token: &str,
    ) -> Result<Option<String>, PlatformError> {
        let picture: Picture = self
            .get_json(
                &format!("{}/picture", page),
                &[("access_token", user_token), ("redirect", "false")],
            )
            .await?;
        Ok(picture.data.and_then(|d| d.url))
    }

    #[instrument(skip_all)]
    async fn set_messenger_profile(&self, profile: &serde_json::Value) -> Result<(), PlatformError> {
        let _: serde_json::Value = self.post_json("me/messenger_profile", profile).await?;
        Ok(())
    }
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}
