//! The poll service as seen from the client.
//!
//! Every call crosses a trust boundary and may fail. Nothing in here retries;
//! that is the synchronizers' job.
use async_trait::async_trait;
use thiserror::Error;

use crate::api_models::{PollDefinition, ResultsReport, StatusReport};
use crate::normalize::{classify, PollErrorKind};

pub mod http;

/**
 * Text the service returns when a ballot has been recorded
 */
pub const VOTE_SUCCESS: &str = "Vote successful";

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RemoteError {
    /**
     * The service answered and refused; the message is its own wording
     */
    #[error("{0}")]
    Rejected(String),
    /**
     * The service could not be reached or answered with garbage
     */
    #[error("Transport failure: {0}")]
    Transport(String),
}

impl RemoteError {
    pub fn is_transport(&self) -> bool {
        matches!(self, RemoteError::Transport(_))
    }

    /**
     * Voter-facing category. Only the service's own wording is classified;
     * transport text comes from the network stack and says nothing about the
     * poll.
     */
    pub fn kind(&self) -> PollErrorKind {
        match self {
            RemoteError::Rejected(message) => classify(message),
            RemoteError::Transport(_) => PollErrorKind::Unknown,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteError::Transport(err.to_string())
    }
}

/**
 * Operations the poll service offers. The caller's identity is bound into the
 * implementation, the same way an authenticated transport carries it.
 */
#[async_trait]
pub trait PollService: Send + Sync {
    async fn get_poll_status(&self) -> Result<StatusReport, RemoteError>;

    async fn get_poll_results(&self) -> Result<ResultsReport, RemoteError>;

    /**
     * Returns the service's success marker, see [`VOTE_SUCCESS`]
     */
    async fn vote(&self, candidate: &str) -> Result<String, RemoteError>;

    async fn create_or_update_poll(&self, definition: PollDefinition) -> Result<(), RemoteError>;

    async fn reset_poll(&self) -> Result<(), RemoteError>;
}
