use serde::{Deserialize, Serialize};

use crate::models::{Candidate, Poll, PollStatus, Timestamp};

/**
 * Response to `GET /api/v1/poll/status`
 */
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: PollStatus,
    #[serde(default)]
    pub poll: Option<Poll>,
}

/**
 * Response to `GET /api/v1/poll/results`
 *
 * The status is repeated here so the results feed can pick its own cadence.
 */
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsReport {
    pub status: PollStatus,
    #[serde(default)]
    pub candidates: Option<Vec<Candidate>>,
}

/**
 * User-provided ballot for a single candidate
 */
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ballot {
    pub candidate: String,
}

/**
 * Admin-provided definition that replaces the active poll
 */
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollDefinition {
    /**
     * Just the names of each candidate
     */
    pub candidates: Vec<String>,
    pub end_time: Option<Timestamp>,
}
