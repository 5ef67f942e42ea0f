//! Anonymous ballot flow driven by a voting link. The server owns the actual
//! rules (single use, voting window); this module tracks what the link
//! should currently show and enforces the client-side guards that keep
//! pointless requests off the wire.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::models::{BallotPayload, Candidate, ElectionWindow, Uid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BallotPhase {
    Loading,
    Ready,
    NotStarted { opens_at: DateTime<Utc> },
    Ended,
    AlreadyVoted,
    Invalid,
    Success,
}

/// Maps a vote-endpoint rejection onto the phase the ballot should show.
/// Only a 403 carries scheduling semantics; anything else means the link is
/// unusable. Match order matters: an already-voted message wins even when
/// the payload also carries the timeline.
pub fn classify_denial(err: &ApiError, now: DateTime<Utc>) -> BallotPhase {
    let ApiError::Rejected { status: 403, body } = err else {
        return BallotPhase::Invalid;
    };
    let message = body.message().to_lowercase();
    if message.contains("déjà effectué") || message.contains("already voted") {
        return BallotPhase::AlreadyVoted;
    }
    if let Some(start) = body.start_time() {
        if start > now {
            return BallotPhase::NotStarted { opens_at: start };
        }
    }
    if body.end_time().is_some() {
        return BallotPhase::Ended;
    }
    BallotPhase::Invalid
}

/// `HH:MM:SS`, with a day prefix once the wait exceeds a day.
pub fn format_countdown(remaining: Duration) -> String {
    let total = remaining.num_seconds().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    if days > 0 {
        format!("{days}j {hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}

pub struct BallotFlow {
    api: Arc<ApiClient>,
    election: Uid,
    token: String,
    phase: BallotPhase,
    window: Option<ElectionWindow>,
    candidates: Vec<Candidate>,
    selected: Option<Uid>,
}

impl BallotFlow {
    pub fn new(api: Arc<ApiClient>, election: Uid, token: impl Into<String>) -> Self {
        BallotFlow {
            api,
            election,
            token: token.into(),
            phase: BallotPhase::Loading,
            window: None,
            candidates: Vec::new(),
            selected: None,
        }
    }

    pub fn phase(&self) -> &BallotPhase {
        &self.phase
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn selected(&self) -> Option<&Uid> {
        self.selected.as_ref()
    }

    pub fn window(&self) -> Option<&ElectionWindow> {
        self.window.as_ref()
    }

    /// Fetches the ballot and settles the phase. A cast ballot is final:
    /// after a success the flow refuses to fetch again.
    pub async fn load(&mut self) -> &BallotPhase {
        if self.phase == BallotPhase::Success {
            return &self.phase;
        }
        self.phase = BallotPhase::Loading;
        match self.api.fetch_ballot(&self.election, &self.token).await {
            Ok(payload) => self.accept(payload),
            Err(err) => {
                warn!("ballot fetch rejected: {}", err.user_message());
                self.phase = classify_denial(&err, Utc::now());
            }
        }
        &self.phase
    }

    fn accept(&mut self, payload: BallotPayload) {
        self.window = Some(payload.election);
        self.candidates = payload.candidates;
        self.selected = None;
        self.phase = BallotPhase::Ready;
    }

    /// Marks a candidate for submission. Only valid on a loaded ballot and
    /// for a candidate that is actually on it.
    pub fn select(&mut self, candidate: Uid) -> Result<(), ApiError> {
        if self.phase != BallotPhase::Ready {
            return Err(ApiError::Validation(
                "the ballot is not open for selection".into(),
            ));
        }
        if !self.candidates.iter().any(|c| c.id == candidate) {
            return Err(ApiError::Validation(format!(
                "candidate {candidate} is not on this ballot"
            )));
        }
        self.selected = Some(candidate);
        Ok(())
    }

    /// Submits the selected candidate.
    ///
    /// Local guards first: no network traffic without a selection, none
    /// after a success. A 403 verdict with scheduling semantics is folded
    /// into the phase; a generic rejection or transport failure leaves the
    /// ballot ready so the voter can retry.
    pub async fn submit(&mut self) -> Result<&BallotPhase, ApiError> {
        match self.phase {
            BallotPhase::Ready => {}
            BallotPhase::Success => {
                return Err(ApiError::Validation(
                    "this ballot was already submitted".into(),
                ));
            }
            _ => return Err(ApiError::Validation("the ballot is not ready".into())),
        }
        let Some(candidate) = self.selected.clone() else {
            return Err(ApiError::Validation(
                "select a candidate before submitting".into(),
            ));
        };
        match self
            .api
            .cast_vote(&self.election, &self.token, &candidate)
            .await
        {
            Ok(()) => {
                info!("ballot accepted");
                self.phase = BallotPhase::Success;
                Ok(&self.phase)
            }
            Err(err) => {
                let verdict = classify_denial(&err, Utc::now());
                if verdict == BallotPhase::Invalid {
                    return Err(err);
                }
                warn!("ballot refused: {}", err.user_message());
                self.phase = verdict;
                Ok(&self.phase)
            }
        }
    }

    /// Remaining wait while the ballot is in the not-started phase. The
    /// opening instant is fixed at classification time and the remainder is
    /// recomputed from the clock, so it can shrink but never grow.
    pub fn countdown(&self, now: DateTime<Utc>) -> Option<Duration> {
        match &self.phase {
            BallotPhase::NotStarted { opens_at } => Some((*opens_at - now).max(Duration::zero())),
            _ => None,
        }
    }

    /// Ticks once per second while the election has not opened, invoking
    /// `on_tick` with the remaining wait, then re-fetches the ballot. The
    /// loop stops as soon as the phase leaves not-started; dropping the
    /// future cancels the timer.
    pub async fn wait_until_open<F>(&mut self, mut on_tick: F) -> &BallotPhase
    where
        F: FnMut(Duration),
    {
        let mut ticker = time::interval(std::time::Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        while let BallotPhase::NotStarted { opens_at } = self.phase {
            ticker.tick().await;
            let remaining = (opens_at - Utc::now()).max(Duration::zero());
            on_tick(remaining);
            if remaining.is_zero() {
                self.load().await;
            }
        }
        &self.phase
    }
}
