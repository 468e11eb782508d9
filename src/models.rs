use serde::{Deserialize, Serialize};
use std::fmt;

/**
 * A point in time as the poll service represents it: nanoseconds since the
 * Unix epoch, as a fixed-point integer.
 */
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn nanos(&self) -> i64 {
        self.0
    }
}

impl From<i64> for Timestamp {
    fn from(nanos: i64) -> Self {
        Timestamp(nanos)
    }
}

/**
 * Lifecycle classification of the poll as reported by the poll service
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    Absent,
    Ongoing,
    Expired,
}

impl PollStatus {
    pub fn is_ongoing(&self) -> bool {
        *self == PollStatus::Ongoing
    }

    /**
     * Classify a poll against the given wall-clock time in milliseconds.
     *
     * This is what the service does authoritatively; clients only use it for
     * the display-side projection.
     */
    pub fn classify(poll: Option<&Poll>, now_millis: i64) -> Self {
        match poll {
            None => PollStatus::Absent,
            Some(poll) => match poll.end_time {
                Some(end) if crate::time::nanos_to_millis(end) <= now_millis => PollStatus::Expired,
                _ => PollStatus::Ongoing,
            },
        }
    }
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PollStatus::Absent => write!(f, "absent"),
            PollStatus::Ongoing => write!(f, "ongoing"),
            PollStatus::Expired => write!(f, "expired"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub votes: u64,
}

impl Candidate {
    pub fn new(name: impl Into<String>) -> Self {
        Candidate {
            name: name.into(),
            votes: 0,
        }
    }
}

/**
 * The single active election
 */
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub candidates: Vec<Candidate>,
    /**
     * Absent means the poll runs until it is reset
     */
    #[serde(default)]
    pub end_time: Option<Timestamp>,
}

impl Poll {
    pub fn candidate(&self, name: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.name == name)
    }

    pub fn total_votes(&self) -> u64 {
        self.candidates.iter().map(|c| c.votes).sum()
    }
}

/**
 * Who is making calls against the poll service.
 *
 * Beyond "authenticated or not" the principal is opaque to the client.
 */
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Identity {
    Anonymous,
    Principal(String),
}

impl Identity {
    pub fn from_principal(principal: Option<String>) -> Self {
        match principal {
            Some(p) if !p.trim().is_empty() => Identity::Principal(p.trim().to_string()),
            _ => Identity::Anonymous,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::Principal(_))
    }

    pub fn principal(&self) -> Option<&str> {
        match self {
            Identity::Anonymous => None,
            Identity::Principal(p) => Some(p),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Identity::Anonymous => write!(f, "anonymous"),
            Identity::Principal(p) => write!(f, "{}", p),
        }
    }
}
