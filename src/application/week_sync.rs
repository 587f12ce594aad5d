use crate::domain::balance::compute_balance;
use crate::domain::models::{DayRecord, EntryId, EntryUpdate, NewEntry, Week, WorkDay};
use crate::domain::week::{default_week, reconcile};
use crate::infrastructure::entry_store::EntryStore;
use crate::infrastructure::error::InfraError;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinSet;

pub const DEFAULT_SAVE_CONCURRENCY: usize = 5;

/// Snapshot of one day taken under the state lock, persisted after the lock
/// is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSave {
    pub day: WorkDay,
    pub identity: Option<EntryId>,
    pub check_in: String,
    pub check_out: String,
    pub total_minutes: i64,
    pub revision: u64,
}

impl PendingSave {
    /// `None` when either time is empty; such a day is never sent to a store.
    pub fn from_record(record: &DayRecord) -> Option<Self> {
        if !record.has_times() {
            return None;
        }
        Some(Self {
            day: record.day(),
            identity: record.identity().cloned(),
            check_in: record.check_in().to_string(),
            check_out: record.check_out().to_string(),
            total_minutes: compute_balance(record.check_in(), record.check_out()),
            revision: record.revision(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SavePlan {
    Skip,
    Invalid,
    Persist(PendingSave),
}

pub fn plan_save(record: &DayRecord) -> SavePlan {
    if !record.is_unsaved() {
        return SavePlan::Skip;
    }
    match PendingSave::from_record(record) {
        Some(pending) => SavePlan::Persist(pending),
        None => SavePlan::Invalid,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted(EntryId),
    Updated(EntryId),
    Invalid,
}

impl SaveOutcome {
    pub fn identity(&self) -> Option<&EntryId> {
        match self {
            Self::Inserted(identity) | Self::Updated(identity) => Some(identity),
            Self::Invalid => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct SaveSummary {
    pub saved: usize,
    pub failed: usize,
    pub skipped: usize,
    pub invalid: usize,
}

#[derive(Debug, Default)]
pub struct WeekSavePlan {
    pub pending: Vec<PendingSave>,
    pub skipped: usize,
    pub invalid: usize,
}

pub fn plan_week(week: &Week) -> WeekSavePlan {
    let mut plan = WeekSavePlan::default();
    for record in week.records() {
        match plan_save(record) {
            SavePlan::Skip => plan.skipped += 1,
            SavePlan::Invalid => plan.invalid += 1,
            SavePlan::Persist(pending) => plan.pending.push(pending),
        }
    }
    plan
}

#[derive(Debug)]
pub struct PersistResult {
    pub pending: PendingSave,
    pub result: Result<SaveOutcome, InfraError>,
}

/// Writes a persist result back to its own day. Failed persists leave the
/// record untouched.
pub fn apply_outcome(record: &mut DayRecord, pending: &PendingSave, outcome: &SaveOutcome) {
    if let Some(identity) = outcome.identity() {
        record.mark_persisted(identity.clone(), pending.revision);
    }
}

pub fn apply_week_results(
    week: &mut Week,
    skipped: usize,
    invalid: usize,
    results: Vec<PersistResult>,
    expected: usize,
) -> SaveSummary {
    let mut summary = SaveSummary {
        skipped,
        invalid,
        ..SaveSummary::default()
    };

    for PersistResult { pending, result } in results {
        match result {
            Ok(outcome) => {
                apply_outcome(week.day_mut(pending.day), &pending, &outcome);
                summary.saved += 1;
            }
            Err(error) => {
                tracing::warn!(day = %pending.day, %error, "saving day failed");
                summary.failed += 1;
            }
        }
    }

    // Tasks that panicked or were cancelled never reported back.
    summary.failed += expected.saturating_sub(summary.saved + summary.failed);
    summary
}

/// Clearing is a local edit: the day goes back to the reference window and
/// becomes unsaved. It is persisted like any other edit.
pub fn clear_day(record: &mut DayRecord) {
    record.reset_to_defaults();
}

pub struct WeekSyncService<S>
where
    S: EntryStore + ?Sized + 'static,
{
    store: Arc<S>,
    user_id: String,
    concurrency: usize,
}

impl<S> WeekSyncService<S>
where
    S: EntryStore + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, user_id: impl Into<String>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
            concurrency: DEFAULT_SAVE_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub async fn load_week(&self) -> Result<Week, InfraError> {
        let rows = self.store.fetch_entries(&self.user_id).await?;
        Ok(reconcile(&rows))
    }

    pub async fn persist(&self, pending: &PendingSave) -> Result<SaveOutcome, InfraError> {
        persist_with(self.store.as_ref(), &self.user_id, pending).await
    }

    pub async fn save_one(&self, record: &mut DayRecord) -> Result<SaveOutcome, InfraError> {
        record.recompute();
        let Some(pending) = PendingSave::from_record(record) else {
            return Ok(SaveOutcome::Invalid);
        };
        let outcome = self.persist(&pending).await?;
        apply_outcome(record, &pending, &outcome);
        Ok(outcome)
    }

    /// Persists every pending save, at most `concurrency` at a time. One
    /// failing day never stops the others.
    pub async fn persist_all(&self, pending: Vec<PendingSave>) -> Vec<PersistResult> {
        let mut save_tasks: JoinSet<PersistResult> = JoinSet::new();
        let mut results = Vec::with_capacity(pending.len());

        for save in pending {
            let store = Arc::clone(&self.store);
            let user_id = self.user_id.clone();
            save_tasks.spawn(async move {
                let result = persist_with(store.as_ref(), &user_id, &save).await;
                PersistResult {
                    pending: save,
                    result,
                }
            });

            if save_tasks.len() >= self.concurrency {
                collect_persist_result(&mut save_tasks, &mut results).await;
            }
        }

        while !save_tasks.is_empty() {
            collect_persist_result(&mut save_tasks, &mut results).await;
        }

        results
    }

    pub async fn save_all(&self, week: &mut Week) -> SaveSummary {
        let WeekSavePlan {
            pending,
            skipped,
            invalid,
        } = plan_week(week);
        let expected = pending.len();
        let results = self.persist_all(pending).await;
        apply_week_results(week, skipped, invalid, results, expected)
    }

    pub async fn clear_week(&self) -> Result<Week, InfraError> {
        self.store.delete_entries(&self.user_id).await?;
        Ok(default_week())
    }
}

async fn persist_with<S>(store: &S, user_id: &str, pending: &PendingSave) -> Result<SaveOutcome, InfraError>
where
    S: EntryStore + ?Sized,
{
    match &pending.identity {
        Some(identity) => {
            store
                .update_entry(
                    identity,
                    &EntryUpdate {
                        check_in: pending.check_in.clone(),
                        check_out: pending.check_out.clone(),
                        total_minutes: pending.total_minutes,
                    },
                )
                .await?;
            Ok(SaveOutcome::Updated(identity.clone()))
        }
        None => {
            let identity = store
                .insert_entry(
                    user_id,
                    &NewEntry {
                        day: pending.day,
                        check_in: pending.check_in.clone(),
                        check_out: pending.check_out.clone(),
                        total_minutes: pending.total_minutes,
                    },
                )
                .await?;
            Ok(SaveOutcome::Inserted(identity))
        }
    }
}

async fn collect_persist_result(
    save_tasks: &mut JoinSet<PersistResult>,
    results: &mut Vec<PersistResult>,
) {
    let Some(join_result) = save_tasks.join_next().await else {
        return;
    };
    match join_result {
        Ok(result) => results.push(result),
        Err(error) => tracing::error!(%error, "failed to join save task"),
    }
}
