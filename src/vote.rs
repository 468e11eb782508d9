//! Submitting a ballot.
//!
//! The coordinator checks what it can locally, sends exactly one vote request
//! and reports the outcome. It never retries a vote: whether a failed write
//! landed is unknown, and a blind retry could come back as a false "already
//! voted". The local vote lock only guards this session against a second
//! click; one vote per identity is the service's to enforce.
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::*;
use uuid::Uuid;

use crate::api_models::StatusReport;
use crate::models::{Identity, PollStatus};
use crate::normalize::{classify, PollErrorKind};
use crate::remote::{PollService, VOTE_SUCCESS};
use crate::sync::{invalidate_all, Invalidator};
use crate::time::{time_remaining, Clock};

/**
 * Why a vote was refused before any request was sent
 */
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Blocked {
    NotAuthenticated,
    /**
     * No status snapshot to check against yet, or the last fetch failed
     */
    StatusUnavailable,
    NoActivePoll,
    VotingClosed,
    AlreadyVoted { candidate: String },
    InFlight,
}

impl Blocked {
    pub fn kind(&self) -> PollErrorKind {
        match self {
            Blocked::NotAuthenticated => PollErrorKind::Unauthenticated,
            Blocked::StatusUnavailable => PollErrorKind::Unknown,
            Blocked::NoActivePoll => PollErrorKind::PollAbsent,
            Blocked::VotingClosed => PollErrorKind::PollClosed,
            Blocked::AlreadyVoted { .. } => PollErrorKind::AlreadyVoted,
            Blocked::InFlight => PollErrorKind::Unknown,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoteFailure {
    /**
     * Refused locally, the service was not contacted
     */
    Blocked(Blocked),
    /**
     * The service refused or could not be reached; `detail` is its raw text
     */
    Rejected { kind: PollErrorKind, detail: String },
}

impl VoteFailure {
    pub fn kind(&self) -> PollErrorKind {
        match self {
            VoteFailure::Blocked(blocked) => blocked.kind(),
            VoteFailure::Rejected { kind, .. } => *kind,
        }
    }

    /**
     * Text to show next to the vote action
     */
    pub fn message(&self) -> &'static str {
        self.kind().message()
    }

    /**
     * Whether to offer the login flow instead of only showing the message
     */
    pub fn prompt_login(&self) -> bool {
        self.kind() == PollErrorKind::Unauthenticated
    }

    pub fn reached_service(&self) -> bool {
        matches!(self, VoteFailure::Rejected { .. })
    }
}

impl fmt::Display for VoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for VoteFailure {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteReceipt {
    pub candidate: String,
}

/**
 * Resets the in-flight flag however the submission ends, including when the
 * future is dropped
 */
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct VoteCoordinator {
    session: Uuid,
    service: Arc<dyn PollService>,
    identity: Identity,
    clock: Arc<dyn Clock>,
    invalidators: Vec<Invalidator>,
    voted: Mutex<Option<String>>,
    in_flight: AtomicBool,
}

impl VoteCoordinator {
    pub fn new(
        service: Arc<dyn PollService>,
        identity: Identity,
        clock: Arc<dyn Clock>,
        invalidators: Vec<Invalidator>,
    ) -> Self {
        VoteCoordinator {
            session: Uuid::new_v4(),
            service,
            identity,
            clock,
            invalidators,
            voted: Mutex::new(None),
            in_flight: AtomicBool::new(false),
        }
    }

    fn voted(&self) -> MutexGuard<'_, Option<String>> {
        self.voted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /**
     * Candidate this session has successfully voted for
     */
    pub fn voted_candidate(&self) -> Option<String> {
        self.voted().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_authenticated()
    }

    pub fn is_pending(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /**
     * Refuse a vote when no status snapshot is available to check it against
     */
    pub fn refuse_unsynced(&self) -> VoteFailure {
        let blocked = if self.identity.is_authenticated() {
            Blocked::StatusUnavailable
        } else {
            Blocked::NotAuthenticated
        };
        debug!("[{}] Vote blocked locally without poll status: {:?}", self.session, blocked);
        VoteFailure::Blocked(blocked)
    }

    /**
     * The local checks a vote has to pass, in the order they are reported.
     * These are conveniences for the voter, not a security boundary.
     */
    pub fn precheck(&self, view: &StatusReport) -> Result<(), Blocked> {
        if !self.identity.is_authenticated() {
            return Err(Blocked::NotAuthenticated);
        }

        let poll = match (&view.poll, view.status) {
            (Some(poll), status) if status != PollStatus::Absent => poll,
            _ => return Err(Blocked::NoActivePoll),
        };

        let locally_expired = poll
            .end_time
            .map(|end| time_remaining(end, self.clock.now_millis()).is_expired)
            .unwrap_or(false);
        if !view.status.is_ongoing() || locally_expired {
            return Err(Blocked::VotingClosed);
        }

        if let Some(candidate) = self.voted_candidate() {
            return Err(Blocked::AlreadyVoted { candidate });
        }

        if self.is_pending() {
            return Err(Blocked::InFlight);
        }

        Ok(())
    }

    /**
     * Send one vote for `candidate` against the poll as last synchronized
     */
    pub async fn submit_vote(
        &self,
        candidate: &str,
        view: &StatusReport,
    ) -> Result<VoteReceipt, VoteFailure> {
        self.precheck(view).map_err(|blocked| {
            debug!("[{}] Vote for {} blocked locally: {:?}", self.session, candidate, blocked);
            VoteFailure::Blocked(blocked)
        })?;

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(VoteFailure::Blocked(Blocked::InFlight));
        }
        let _in_flight = InFlight(&self.in_flight);

        match self.service.vote(candidate).await {
            Ok(marker) if marker == VOTE_SUCCESS => {
                *self.voted() = Some(candidate.to_string());
                invalidate_all(&self.invalidators);
                info!("[{}] Vote recorded for {}", self.session, candidate);
                Ok(VoteReceipt {
                    candidate: candidate.to_string(),
                })
            }
            Ok(other) => {
                invalidate_all(&self.invalidators);
                warn!("[{}] Unexpected vote response: {}", self.session, other);
                Err(VoteFailure::Rejected {
                    kind: classify(&other),
                    detail: other,
                })
            }
            Err(err) => {
                let detail = err.to_string();
                warn!("[{}] Vote for {} failed: {}", self.session, candidate, detail);
                Err(VoteFailure::Rejected {
                    kind: err.kind(),
                    detail,
                })
            }
        }
    }
}
