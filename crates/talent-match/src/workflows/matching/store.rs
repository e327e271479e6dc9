use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{AtsScore, CandidateId, CandidateRecord, EngagementFlags};

/// Identifies one scoring run. Tokens only ever increase within a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextToken(pub u64);

impl fmt::Display for ContextToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// Result proposed for one candidate by a scoring run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatchOutcome {
    Scored(AtsScore),
    Failed { reason: String },
}

/// Merge proposal written by the orchestrator; the store decides whether it applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorePatch {
    pub candidate_id: CandidateId,
    pub token: ContextToken,
    pub outcome: PatchOutcome,
}

/// What the store did with a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Applied,
    Duplicate,
    Stale,
    UnknownCandidate,
}

/// Progress tally for the active run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunProgress {
    pub token: ContextToken,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub finished: bool,
}

impl RunProgress {
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Payload delivered to subscribers after every state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingSnapshot {
    pub revision: u64,
    pub candidates: Vec<CandidateRecord>,
    pub progress: Option<RunProgress>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Arc<dyn Fn(&RankingSnapshot) + Send + Sync>;

#[derive(Debug, Clone)]
struct RankedEntry {
    record: CandidateRecord,
    original_index: usize,
}

#[derive(Debug, Default)]
struct StoreState {
    entries: Vec<RankedEntry>,
    active: Option<ContextToken>,
    last_token: u64,
    settled: HashMap<CandidateId, PatchOutcome>,
    progress: Option<RunProgress>,
    revision: u64,
}

impl StoreState {
    fn snapshot(&self) -> RankingSnapshot {
        RankingSnapshot {
            revision: self.revision,
            candidates: self.view(),
            progress: self.progress,
        }
    }

    fn view(&self) -> Vec<CandidateRecord> {
        self.entries.iter().map(|entry| entry.record.clone()).collect()
    }

    fn position_of(&self, id: &CandidateId) -> Option<usize> {
        self.entries.iter().position(|entry| &entry.record.id == id)
    }

    fn reposition(&mut self, index: usize) {
        let entry = self.entries.remove(index);
        let slot = self
            .entries
            .partition_point(|existing| rank_order(existing, &entry) == Ordering::Less);
        self.entries.insert(slot, entry);
    }

    fn tally(&mut self, outcome: &PatchOutcome, delta: isize) {
        if let Some(progress) = self.progress.as_mut() {
            let counter = match outcome {
                PatchOutcome::Scored(_) => &mut progress.succeeded,
                PatchOutcome::Failed { .. } => &mut progress.failed,
            };
            *counter = counter.saturating_add_signed(delta);
        }
    }
}

/// Score descending with unscored rows last, ties kept in their original order.
fn rank_order(a: &RankedEntry, b: &RankedEntry) -> Ordering {
    let by_score = match (a.record.ats_score(), b.record.ats_score()) {
        (Some(left), Some(right)) => right.total_cmp(&left),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_score.then(a.original_index.cmp(&b.original_index))
}

/// Single source of truth for the candidates shown in one display context.
///
/// Every mutation runs inside one critical section, and subscribers are notified in
/// mutation order. Callbacks may read from the store but must not subscribe or
/// unsubscribe from inside a notification.
#[derive(Default)]
pub struct LiveRankingStore {
    state: Mutex<StoreState>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: Mutex<u64>,
}

impl fmt::Debug for LiveRankingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("LiveRankingStore")
            .field("candidates", &state.entries.len())
            .field("active", &state.active)
            .field("revision", &state.revision)
            .finish()
    }
}

impl LiveRankingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the displayed set after a fresh fetch or filter. Input order becomes
    /// the tie-break order for ranking.
    pub fn replace(&self, candidates: Vec<CandidateRecord>) {
        self.mutate(|state| {
            let mut entries: Vec<RankedEntry> = candidates
                .into_iter()
                .enumerate()
                .map(|(original_index, record)| RankedEntry {
                    record,
                    original_index,
                })
                .collect();
            entries.sort_by(rank_order);
            debug!(candidates = entries.len(), "ranking store replaced");
            state.entries = entries;
            true
        });
    }

    /// Allocates a fresh token and makes it the only one whose patches are accepted.
    pub fn begin_run(&self, total: usize) -> ContextToken {
        let mut token = ContextToken(0);
        self.mutate(|state| {
            state.last_token += 1;
            token = ContextToken(state.last_token);
            if let Some(previous) = state.active.replace(token) {
                debug!(%previous, %token, "scoring run superseded");
            }
            state.settled.clear();
            state.progress = Some(RunProgress {
                token,
                total,
                succeeded: 0,
                failed: 0,
                finished: false,
            });
            true
        });
        token
    }

    /// Marks the run as finished if it is still the active one.
    pub fn finish_run(&self, token: ContextToken) -> bool {
        self.mutate(|state| match state.progress.as_mut() {
            Some(progress) if state.active == Some(token) && !progress.finished => {
                progress.finished = true;
                true
            }
            _ => false,
        })
    }

    pub fn active_token(&self) -> Option<ContextToken> {
        self.lock_state().active
    }

    pub fn is_active(&self, token: ContextToken) -> bool {
        self.lock_state().active == Some(token)
    }

    /// Applies a patch when its token is active. Re-delivering a patch leaves the state
    /// unchanged.
    pub fn merge_patch(&self, patch: ScorePatch) -> MergeOutcome {
        let mut outcome = MergeOutcome::Applied;
        self.mutate(|state| {
            if state.active != Some(patch.token) {
                debug!(candidate = %patch.candidate_id, token = %patch.token, "stale patch discarded");
                outcome = MergeOutcome::Stale;
                return false;
            }

            if state.settled.get(&patch.candidate_id) == Some(&patch.outcome) {
                outcome = MergeOutcome::Duplicate;
                return false;
            }

            if let Some(previous) = state
                .settled
                .insert(patch.candidate_id.clone(), patch.outcome.clone())
            {
                state.tally(&previous, -1);
            }
            state.tally(&patch.outcome, 1);

            if let PatchOutcome::Scored(score) = patch.outcome {
                match state.position_of(&patch.candidate_id) {
                    Some(index) => {
                        state.entries[index].record.ats = Some(score);
                        state.reposition(index);
                    }
                    None => outcome = MergeOutcome::UnknownCandidate,
                }
            }
            true
        });
        outcome
    }

    /// Merges engagement flags without touching score or order.
    pub fn apply_engagement(&self, id: &CandidateId, flags: EngagementFlags) -> bool {
        self.mutate(|state| match state.position_of(id) {
            Some(index) => {
                state.entries[index].record.apply_engagement(flags);
                true
            }
            None => false,
        })
    }

    pub fn current_view(&self) -> Vec<CandidateRecord> {
        self.lock_state().view()
    }

    pub fn snapshot(&self) -> RankingSnapshot {
        self.lock_state().snapshot()
    }

    pub fn progress(&self) -> Option<RunProgress> {
        self.lock_state().progress
    }

    pub fn get(&self, id: &CandidateId) -> Option<CandidateRecord> {
        let state = self.lock_state();
        state
            .position_of(id)
            .map(|index| state.entries[index].record.clone())
    }

    pub fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&RankingSnapshot) + Send + Sync + 'static,
    {
        let id = {
            let mut next = self
                .next_subscription
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            SubscriptionId(*next)
        };
        self.lock_subscribers().push((id, Arc::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock_subscribers();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    /// Runs `change` under the state lock; when it reports a change the revision is
    /// bumped and subscribers see the new snapshot before the next mutation lands.
    fn mutate<F>(&self, change: F) -> bool
    where
        F: FnOnce(&mut StoreState) -> bool,
    {
        let subscribers = self.lock_subscribers();
        let snapshot = {
            let mut state = self.lock_state();
            if !change(&mut state) {
                return false;
            }
            state.revision += 1;
            (!subscribers.is_empty()).then(|| state.snapshot())
        };

        if let Some(snapshot) = snapshot {
            for (_, subscriber) in subscribers.iter() {
                subscriber(&snapshot);
            }
        }
        true
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Subscriber)>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
