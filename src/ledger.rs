//! In-memory stand-in for the poll service.
//!
//! Holds one poll, the set of identities that have voted and the set of admin
//! principals. Used by the development gateway and by tests; it answers with
//! the same refusal texts the real service uses so the normalizer sees
//! realistic input.
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use log::*;

use crate::api_models::{PollDefinition, ResultsReport, StatusReport};
use crate::models::{Candidate, Identity, Poll, PollStatus};
use crate::remote::{PollService, RemoteError, VOTE_SUCCESS};
use crate::time::Clock;

#[derive(Debug, Default)]
struct LedgerState {
    poll: Option<Poll>,
    voters: HashSet<String>,
}

#[derive(Clone)]
pub struct PollLedger {
    state: Arc<Mutex<LedgerState>>,
    admins: Arc<HashSet<String>>,
    clock: Arc<dyn Clock>,
}

fn rejected(message: &str) -> RemoteError {
    RemoteError::Rejected(message.to_string())
}

impl PollLedger {
    pub fn new<I, S>(clock: Arc<dyn Clock>, admins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PollLedger {
            state: Arc::new(Mutex::new(LedgerState::default())),
            admins: Arc::new(admins.into_iter().map(Into::into).collect()),
            clock,
        }
    }

    /**
     * A service handle that acts as the given identity
     */
    pub fn caller(&self, identity: Identity) -> LedgerClient {
        LedgerClient {
            ledger: self.clone(),
            identity,
        }
    }

    pub fn is_admin(&self, identity: &Identity) -> bool {
        identity
            .principal()
            .map(|p| self.admins.contains(p))
            .unwrap_or(false)
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn classify(&self, poll: Option<&Poll>) -> PollStatus {
        PollStatus::classify(poll, self.clock.now_millis())
    }

    pub fn status(&self) -> StatusReport {
        let state = self.lock();
        StatusReport {
            status: self.classify(state.poll.as_ref()),
            poll: state.poll.clone(),
        }
    }

    pub fn results(&self) -> ResultsReport {
        let state = self.lock();
        match self.classify(state.poll.as_ref()) {
            PollStatus::Absent => ResultsReport {
                status: PollStatus::Expired,
                candidates: None,
            },
            status => ResultsReport {
                status,
                candidates: state.poll.as_ref().map(|p| p.candidates.clone()),
            },
        }
    }

    pub fn vote(&self, identity: &Identity, candidate: &str) -> Result<String, RemoteError> {
        let voter = identity
            .principal()
            .ok_or_else(|| rejected("Unauthorized: Only authenticated users can vote"))?
            .to_string();

        let mut state = self.lock();
        let status = self.classify(state.poll.as_ref());
        let LedgerState { poll, voters } = &mut *state;

        let poll = poll.as_mut().ok_or_else(|| rejected("Poll not available"))?;
        if status == PollStatus::Expired {
            return Err(rejected("Poll has ended"));
        }
        if voters.contains(&voter) {
            return Err(rejected("You have already voted in this poll"));
        }

        let entry = poll
            .candidates
            .iter_mut()
            .find(|c| c.name == candidate)
            .ok_or_else(|| rejected("Candidate not found"))?;
        entry.votes += 1;
        voters.insert(voter);

        debug!("Ballot recorded for {}", candidate);
        Ok(VOTE_SUCCESS.to_string())
    }

    fn require_admin(&self, identity: &Identity) -> Result<(), RemoteError> {
        if self.is_admin(identity) {
            Ok(())
        } else {
            Err(rejected("Unauthorized: Only admins can manage the poll"))
        }
    }

    /**
     * Replace the poll definition. Candidates that survive the update keep
     * their counts and identities that already voted stay recorded.
     */
    pub fn create_or_update(
        &self,
        identity: &Identity,
        definition: PollDefinition,
    ) -> Result<(), RemoteError> {
        self.require_admin(identity)?;

        if definition.candidates.is_empty() {
            return Err(rejected("Poll must have at least one candidate"));
        }
        if definition.candidates.iter().any(|c| c.trim().is_empty()) {
            return Err(rejected("Candidate names must not be blank"));
        }
        let unique: HashSet<&str> = definition.candidates.iter().map(String::as_str).collect();
        if unique.len() != definition.candidates.len() {
            return Err(rejected("Candidate names must be unique"));
        }

        let mut state = self.lock();
        let previous = state.poll.take();
        let candidates = definition
            .candidates
            .into_iter()
            .map(|name| {
                let votes = previous
                    .as_ref()
                    .and_then(|p| p.candidate(&name))
                    .map(|c| c.votes)
                    .unwrap_or(0);
                Candidate { name, votes }
            })
            .collect();

        state.poll = Some(Poll {
            candidates,
            end_time: definition.end_time,
        });
        info!("Poll defined by {}", identity);
        Ok(())
    }

    pub fn reset(&self, identity: &Identity) -> Result<(), RemoteError> {
        self.require_admin(identity)?;

        let mut state = self.lock();
        state.poll = None;
        state.voters.clear();
        info!("Poll reset by {}", identity);
        Ok(())
    }
}

/**
 * [`PollService`] over a shared [`PollLedger`], bound to one identity
 */
#[derive(Clone)]
pub struct LedgerClient {
    ledger: PollLedger,
    identity: Identity,
}

impl LedgerClient {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

#[async_trait]
impl PollService for LedgerClient {
    async fn get_poll_status(&self) -> Result<StatusReport, RemoteError> {
        Ok(self.ledger.status())
    }

    async fn get_poll_results(&self) -> Result<ResultsReport, RemoteError> {
        Ok(self.ledger.results())
    }

    async fn vote(&self, candidate: &str) -> Result<String, RemoteError> {
        self.ledger.vote(&self.identity, candidate)
    }

    async fn create_or_update_poll(&self, definition: PollDefinition) -> Result<(), RemoteError> {
        self.ledger.create_or_update(&self.identity, definition)
    }

    async fn reset_poll(&self) -> Result<(), RemoteError> {
        self.ledger.reset(&self.identity)
    }
}
