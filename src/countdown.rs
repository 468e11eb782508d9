//! Live countdown to the poll's end time.
//!
//! The countdown is a local projection of the last synchronized end time: it
//! never touches the network, and the next status fetch always has the final
//! say. It may read "closed" up to one status interval before the service
//! agrees.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_std::task::{self, JoinHandle};
use log::*;

use crate::models::{Poll, PollStatus, Timestamp};
use crate::time::{format_time_remaining, time_remaining, Clock};

struct Ticker {
    end_time: Timestamp,
    candidates: Vec<String>,
    task: JoinHandle<()>,
}

pub struct CountdownPresenter {
    clock: Arc<dyn Clock>,
    tick: Duration,
    text: Arc<Mutex<Option<String>>>,
    ticker: Option<Ticker>,
}

impl CountdownPresenter {
    pub fn new(clock: Arc<dyn Clock>, tick: Duration) -> Self {
        CountdownPresenter {
            clock,
            tick,
            text: Arc::new(Mutex::new(None)),
            ticker: None,
        }
    }

    fn lock(text: &Mutex<Option<String>>) -> MutexGuard<'_, Option<String>> {
        text.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /**
     * Most recently rendered countdown, if a timer is running
     */
    pub fn text(&self) -> Option<String> {
        Self::lock(&self.text).clone()
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /**
     * Follow the poll currently displayed.
     *
     * A timer runs only for an ongoing poll with an end time. It is replaced
     * when the poll changes (a new end time or a new candidate list) and torn
     * down when the poll goes away, loses its end time or stops being
     * ongoing. A poll that was reset and recreated identically between two
     * calls cannot be told apart, and its countdown reads the same either way.
     */
    pub async fn track(&mut self, poll: Option<&Poll>, status: PollStatus) {
        let wanted = match poll {
            Some(poll) if status.is_ongoing() => poll.end_time.map(|end| (end, poll)),
            _ => None,
        };

        if let (Some(ticker), Some((end_time, poll))) = (&self.ticker, wanted) {
            if ticker.end_time == end_time && same_candidates(&ticker.candidates, poll) {
                return;
            }
        }

        self.stop().await;

        if let Some((end_time, poll)) = wanted {
            self.start(end_time, poll.candidates.iter().map(|c| c.name.clone()).collect());
        }
    }

    fn start(&mut self, end_time: Timestamp, candidates: Vec<String>) {
        let clock = self.clock.clone();
        let text = self.text.clone();
        let tick = self.tick;

        *Self::lock(&text) = Some(format_time_remaining(end_time, clock.now_millis()));

        let task = task::spawn(async move {
            loop {
                task::sleep(tick).await;
                *Self::lock(&text) = Some(format_time_remaining(end_time, clock.now_millis()));
            }
        });

        debug!("Countdown started for end time {}", end_time.nanos());
        self.ticker = Some(Ticker {
            end_time,
            candidates,
            task,
        });
    }

    pub async fn stop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.task.cancel().await;
            debug!("Countdown stopped for end time {}", ticker.end_time.nanos());
        }
        *Self::lock(&self.text) = None;
    }

    /**
     * Whether the local clock says the poll is over, regardless of what the
     * service has reported so far
     */
    pub fn is_locally_expired(&self, poll: &Poll) -> bool {
        poll.end_time
            .map(|end| time_remaining(end, self.clock.now_millis()).is_expired)
            .unwrap_or(false)
    }
}

fn same_candidates(names: &[String], poll: &Poll) -> bool {
    names.len() == poll.candidates.len()
        && names.iter().zip(&poll.candidates).all(|(name, c)| *name == c.name)
}
