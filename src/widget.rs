//! The live poll as one session sees it.
//!
//! [`LivePoll`] owns both synchronizers, the countdown and the vote
//! coordinator for a single mounted widget. [`LivePoll::render`] folds their
//! current state into a [`WidgetView`], keeping "no poll", "poll closed" and
//! "service unreachable" apart because each asks something different of the
//! voter.
use std::fmt;
use std::sync::Arc;

use futures::join;
use log::*;

use crate::admin::AdminConsole;
use crate::api_models::{ResultsReport, StatusReport};
use crate::config::SyncConfig;
use crate::countdown::CountdownPresenter;
use crate::models::{Candidate, Identity, Poll};
use crate::remote::PollService;
use crate::sync::{ResultsSynchronizer, StatusSynchronizer, SyncHandle, SyncState};
use crate::time::Clock;
use crate::vote::{VoteCoordinator, VoteFailure, VoteReceipt};

#[derive(Clone, Debug, PartialEq)]
pub struct CandidateRow {
    pub name: String,
    pub votes: u64,
    /**
     * Percentage of all votes cast, 0 when nobody has voted
     */
    pub share: f64,
    pub can_vote: bool,
}

impl CandidateRow {
    pub fn votes_label(&self) -> String {
        if self.votes == 1 {
            "1 vote".to_string()
        } else {
            format!("{} votes", self.votes)
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActivePoll {
    /**
     * False once the service reports the poll closed or the local countdown
     * runs out, whichever comes first
     */
    pub open: bool,
    pub countdown: Option<String>,
    pub candidates: Vec<CandidateRow>,
    pub total_votes: u64,
    pub voted_candidate: Option<String>,
    pub login_required: bool,
    pub pending: bool,
    pub vote_error: Option<VoteFailure>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WidgetView {
    Loading,
    StatusUnavailable(String),
    ResultsUnavailable(String),
    NoActivePoll { is_admin: bool },
    Active(ActivePoll),
}

impl fmt::Display for WidgetView {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WidgetView::Loading => write!(f, "Loading poll..."),
            WidgetView::StatusUnavailable(reason) => {
                write!(f, "Failed to load poll status. {}", reason)
            }
            WidgetView::ResultsUnavailable(reason) => {
                write!(f, "Failed to load poll results. {}", reason)
            }
            WidgetView::NoActivePoll { is_admin: true } => {
                write!(f, "No Active Poll. Create a poll using the admin panel.")
            }
            WidgetView::NoActivePoll { is_admin: false } => {
                write!(f, "No Active Poll. Check back soon for upcoming polls!")
            }
            WidgetView::Active(active) => {
                let badge = if active.open { "Voting Open" } else { "Voting Closed" };
                write!(f, "Live Poll [{}]", badge)?;
                if let (true, Some(countdown)) = (active.open, &active.countdown) {
                    write!(f, " {}", countdown)?;
                }
                if active.candidates.is_empty() {
                    write!(f, "\n  No candidates available")?;
                }
                for row in &active.candidates {
                    write!(f, "\n  {}: {} ({:.1}%)", row.name, row.votes_label(), row.share)?;
                }
                if active.login_required {
                    write!(f, "\n  You must be logged in with Internet Identity to vote.")?;
                }
                if let Some(candidate) = &active.voted_candidate {
                    write!(f, "\n  Your vote for {} has been recorded!", candidate)?;
                }
                if let Some(err) = &active.vote_error {
                    write!(f, "\n  {}", err)?;
                }
                Ok(())
            }
        }
    }
}

pub struct LivePoll {
    identity: Identity,
    is_admin: bool,
    status: StatusSynchronizer,
    results: ResultsSynchronizer,
    running: Vec<SyncHandle>,
    countdown: CountdownPresenter,
    coordinator: VoteCoordinator,
    admin: Option<AdminConsole>,
    vote_error: Option<VoteFailure>,
}

impl LivePoll {
    pub fn new(
        service: Arc<dyn PollService>,
        identity: Identity,
        is_admin: bool,
        clock: Arc<dyn Clock>,
        config: &SyncConfig,
    ) -> Self {
        let status = StatusSynchronizer::for_status(service.clone(), config);
        let results = ResultsSynchronizer::for_results(service.clone(), config);
        let invalidators = vec![results.invalidator(), status.invalidator()];

        let coordinator = VoteCoordinator::new(
            service.clone(),
            identity.clone(),
            clock.clone(),
            invalidators.clone(),
        );
        let admin = if is_admin {
            Some(AdminConsole::new(service, clock.clone(), invalidators))
        } else {
            None
        };

        LivePoll {
            identity,
            is_admin,
            status,
            results,
            running: Vec::new(),
            countdown: CountdownPresenter::new(clock, config.countdown_tick),
            coordinator,
            admin,
            vote_error: None,
        }
    }

    pub fn status_synchronizer(&self) -> &StatusSynchronizer {
        &self.status
    }

    pub fn results_synchronizer(&self) -> &ResultsSynchronizer {
        &self.results
    }

    pub fn coordinator(&self) -> &VoteCoordinator {
        &self.coordinator
    }

    /**
     * Operator controls, only offered to admins
     */
    pub fn admin(&self) -> Option<&AdminConsole> {
        self.admin.as_ref()
    }

    pub fn is_mounted(&self) -> bool {
        !self.running.is_empty()
    }

    /**
     * Start both fetch loops. Mounting twice is a no-op.
     */
    pub fn mount(&mut self) {
        if self.is_mounted() {
            return;
        }
        debug!("Mounting live poll for {}", self.identity);
        self.running.push(self.status.spawn());
        self.running.push(self.results.spawn());
    }

    /**
     * Stop every timer this widget owns, in-flight fetches included
     */
    pub async fn unmount(&mut self) {
        for handle in self.running.drain(..) {
            handle.stop().await;
        }
        self.countdown.stop().await;
        debug!("Unmounted live poll for {}", self.identity);
    }

    /**
     * Sync both feeds once, concurrently
     */
    pub async fn refresh(&self) {
        join!(self.status.sync_once(), self.results.sync_once());
    }

    pub async fn vote(&mut self, candidate: &str) -> Result<VoteReceipt, VoteFailure> {
        let state = self.status.state();
        let outcome = match state.ready() {
            Some(view) => self.coordinator.submit_vote(candidate, view).await,
            None => Err(self.coordinator.refuse_unsynced()),
        };
        self.vote_error = outcome.as_ref().err().cloned();
        outcome
    }

    pub async fn render(&mut self) -> WidgetView {
        let status = self.status.state();
        let results = self.results.state();

        match status.ready() {
            Some(report) => self.countdown.track(report.poll.as_ref(), report.status).await,
            None => self.countdown.stop().await,
        }

        match (status, results) {
            (SyncState::Loading, _) | (_, SyncState::Loading) => WidgetView::Loading,
            (SyncState::Unavailable(reason), _) => WidgetView::StatusUnavailable(reason),
            (_, SyncState::Unavailable(reason)) => WidgetView::ResultsUnavailable(reason),
            (SyncState::Ready(status), SyncState::Ready(results)) => match &status.poll {
                None => WidgetView::NoActivePoll {
                    is_admin: self.is_admin,
                },
                Some(poll) => WidgetView::Active(self.active(&status, poll, &results)),
            },
        }
    }

    fn active(&self, status: &StatusReport, poll: &Poll, results: &ResultsReport) -> ActivePoll {
        let open = status.status.is_ongoing() && !self.countdown.is_locally_expired(poll);
        let voted_candidate = self.coordinator.voted_candidate();
        let pending = self.coordinator.is_pending();
        let authenticated = self.identity.is_authenticated();
        let can_vote = authenticated && open && !pending && voted_candidate.is_none();

        let candidates: &[Candidate] = results.candidates.as_deref().unwrap_or(&[]);
        let total_votes: u64 = candidates.iter().map(|c| c.votes).sum();
        let rows = candidates
            .iter()
            .map(|c| CandidateRow {
                name: c.name.clone(),
                votes: c.votes,
                share: if total_votes == 0 {
                    0.0
                } else {
                    c.votes as f64 * 100.0 / total_votes as f64
                },
                can_vote,
            })
            .collect();

        ActivePoll {
            open,
            countdown: if open { self.countdown.text() } else { None },
            candidates: rows,
            total_votes,
            voted_candidate,
            login_required: !authenticated,
            pending,
            vote_error: self.vote_error.clone(),
        }
    }
}
