use async_trait::async_trait;
use log::*;
use reqwest::{Client, Method, RequestBuilder, Response};

use super::{PollService, RemoteError};
use crate::api_models::{Ballot, PollDefinition, ResultsReport, StatusReport};
use crate::models::Identity;

pub const STATUS_PATH: &str = "/api/v1/poll/status";
pub const RESULTS_PATH: &str = "/api/v1/poll/results";
pub const VOTE_PATH: &str = "/api/v1/poll/vote";
pub const POLL_PATH: &str = "/api/v1/poll";

/**
 * Poll service reached over the JSON gateway.
 *
 * The identity travels as a bearer token on every request.
 */
#[derive(Clone, Debug)]
pub struct HttpPollService {
    client: Client,
    base_url: String,
    identity: Identity,
}

impl HttpPollService {
    pub fn new(base_url: &str, identity: Identity) -> Result<Self, RemoteError> {
        let client = Client::builder().build()?;

        Ok(HttpPollService {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            identity,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));

        match self.identity.principal() {
            Some(principal) => builder.bearer_auth(principal),
            None => builder,
        }
    }

    /**
     * Send the request; 4xx answers are refusals carrying the service's text,
     * 5xx answers are treated like a failed connection
     */
    async fn send(builder: RequestBuilder) -> Result<Response, RemoteError> {
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            status.to_string()
        } else {
            body
        };
        debug!("Poll service answered {}: {}", status, message);

        if status.is_server_error() {
            Err(RemoteError::Transport(message))
        } else {
            Err(RemoteError::Rejected(message))
        }
    }
}

#[async_trait]
impl PollService for HttpPollService {
    async fn get_poll_status(&self) -> Result<StatusReport, RemoteError> {
        let response = Self::send(self.request(Method::GET, STATUS_PATH)).await?;
        Ok(response.json().await?)
    }

    async fn get_poll_results(&self) -> Result<ResultsReport, RemoteError> {
        let response = Self::send(self.request(Method::GET, RESULTS_PATH)).await?;
        Ok(response.json().await?)
    }

    async fn vote(&self, candidate: &str) -> Result<String, RemoteError> {
        let ballot = Ballot {
            candidate: candidate.to_string(),
        };
        let response = Self::send(self.request(Method::POST, VOTE_PATH).json(&ballot)).await?;
        Ok(response.text().await?)
    }

    async fn create_or_update_poll(&self, definition: PollDefinition) -> Result<(), RemoteError> {
        Self::send(self.request(Method::PUT, POLL_PATH).json(&definition)).await?;
        Ok(())
    }

    async fn reset_poll(&self) -> Result<(), RemoteError> {
        Self::send(self.request(Method::DELETE, POLL_PATH)).await?;
        Ok(())
    }
}
