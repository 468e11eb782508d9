//! Operator controls for the poll: define it, redefine it, wipe it.
//!
//! Operators are trusted, so service errors are passed through word for word
//! instead of going through the voter-facing normalizer.
use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use log::*;
use thiserror::Error;

use crate::api_models::PollDefinition;
use crate::remote::{PollService, RemoteError};
use crate::sync::{invalidate_all, Invalidator};
use crate::time::{millis_to_nanos, Clock};

pub const RESET_WARNING: &str =
    "This will delete the current poll and all votes. This action cannot be undone.";

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AdminError {
    #[error("At least one candidate name is required")]
    NoCandidates,

    #[error("Candidate names must be unique, {0} appears more than once")]
    DuplicateCandidate(String),

    #[error("Poll duration must be positive")]
    NonPositiveDuration,

    #[error("Poll duration of {0} minutes is too long")]
    DurationOutOfRange(i64),

    #[error("{0}")]
    Remote(#[from] RemoteError),
}

/**
 * Poll length from a count of minutes as typed by an operator
 */
pub fn duration_from_minutes(minutes: i64) -> Result<Duration, AdminError> {
    Duration::try_minutes(minutes).ok_or(AdminError::DurationOutOfRange(minutes))
}

/**
 * What an operator typed into the poll form
 */
#[derive(Clone, Debug, Default)]
pub struct PollDraft {
    pub candidates: Vec<String>,
    /**
     * None runs the poll until it is reset
     */
    pub duration: Option<Duration>,
}

impl PollDraft {
    /**
     * Turn the draft into a definition, fixing the end time relative to
     * `now_millis`. Blank names are dropped and the rest trimmed.
     */
    pub fn into_definition(self, now_millis: i64) -> Result<PollDefinition, AdminError> {
        let candidates: Vec<String> = self
            .candidates
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect();

        if candidates.is_empty() {
            return Err(AdminError::NoCandidates);
        }

        let mut seen = HashSet::new();
        if let Some(dup) = candidates.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(AdminError::DuplicateCandidate(dup.clone()));
        }

        let end_time = match self.duration {
            None => None,
            Some(d) if d <= Duration::zero() => return Err(AdminError::NonPositiveDuration),
            Some(d) => Some(millis_to_nanos(now_millis.saturating_add(d.num_milliseconds()))),
        };

        Ok(PollDefinition {
            candidates,
            end_time,
        })
    }
}

pub struct AdminConsole {
    service: Arc<dyn PollService>,
    clock: Arc<dyn Clock>,
    invalidators: Vec<Invalidator>,
}

impl AdminConsole {
    pub fn new(service: Arc<dyn PollService>, clock: Arc<dyn Clock>, invalidators: Vec<Invalidator>) -> Self {
        AdminConsole {
            service,
            clock,
            invalidators,
        }
    }

    /**
     * Replace the active poll. Returns the definition that was sent.
     */
    pub async fn create_or_update_poll(&self, draft: PollDraft) -> Result<PollDefinition, AdminError> {
        let definition = draft.into_definition(self.clock.now_millis())?;

        match self.service.create_or_update_poll(definition.clone()).await {
            Ok(()) => {
                invalidate_all(&self.invalidators);
                info!(
                    "Poll defined with {} candidate(s), end time {:?}",
                    definition.candidates.len(),
                    definition.end_time
                );
                Ok(definition)
            }
            Err(err) => {
                warn!("Failed to create/update poll: {}", err);
                Err(err.into())
            }
        }
    }

    /**
     * Start a reset. Nothing happens until the returned request is confirmed.
     */
    pub fn request_reset(&self) -> ResetRequest<'_> {
        ResetRequest { console: self }
    }
}

/**
 * A pending reset awaiting explicit confirmation; dropping it cancels
 */
#[must_use = "a reset only happens once confirmed"]
pub struct ResetRequest<'a> {
    console: &'a AdminConsole,
}

impl ResetRequest<'_> {
    pub fn warning(&self) -> &'static str {
        RESET_WARNING
    }

    pub async fn confirm(self) -> Result<(), AdminError> {
        let console = self.console;

        match console.service.reset_poll().await {
            Ok(()) => {
                invalidate_all(&console.invalidators);
                info!("Poll reset");
                Ok(())
            }
            Err(err) => {
                warn!("Failed to reset poll: {}", err);
                Err(err.into())
            }
        }
    }
}
