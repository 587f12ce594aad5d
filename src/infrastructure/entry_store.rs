use crate::domain::models::{EntryId, EntryRow, EntryUpdate, NewEntry};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::week_slot_store::WeekSlotStore;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

static NEXT_LOCAL_ID: AtomicU64 = AtomicU64::new(1);

/// Per-user CRUD boundary for time entries. One row per user and day.
#[async_trait]
pub trait EntryStore: Send + Sync {
    async fn fetch_entries(&self, user_id: &str) -> Result<Vec<EntryRow>, InfraError>;

    async fn insert_entry(&self, user_id: &str, entry: &NewEntry) -> Result<EntryId, InfraError>;

    async fn update_entry(&self, id: &EntryId, update: &EntryUpdate) -> Result<(), InfraError>;

    async fn delete_entries(&self, user_id: &str) -> Result<(), InfraError>;
}

fn duplicate_day_error(user_id: &str, entry: &NewEntry) -> InfraError {
    InfraError::Store(format!(
        "an entry for {} already exists for user {user_id}",
        entry.day
    ))
}

fn new_row(id: EntryId, user_id: &str, entry: &NewEntry) -> EntryRow {
    EntryRow {
        id,
        user_id: Some(user_id.to_string()),
        day: entry.day.as_str().to_string(),
        check_in: Some(entry.check_in.clone()),
        check_out: Some(entry.check_out.clone()),
        total_minutes: entry.total_minutes,
    }
}

fn apply_update(rows: &mut [EntryRow], id: &EntryId, update: &EntryUpdate) -> Result<(), InfraError> {
    let row = rows
        .iter_mut()
        .find(|row| &row.id == id)
        .ok_or_else(|| InfraError::Store(format!("no entry with id {id}")))?;
    row.check_in = Some(update.check_in.clone());
    row.check_out = Some(update.check_out.clone());
    row.total_minutes = update.total_minutes;
    Ok(())
}

fn is_duplicate(rows: &[EntryRow], user_id: &str, entry: &NewEntry) -> bool {
    rows.iter().any(|row| {
        row.user_id.as_deref() == Some(user_id)
            && row.day.trim().eq_ignore_ascii_case(entry.day.as_str())
    })
}

#[derive(Debug, Default)]
pub struct InMemoryEntryStore {
    rows: Mutex<Vec<EntryRow>>,
    next_id: AtomicU64,
}

impl InMemoryEntryStore {
    pub fn with_rows(rows: Vec<EntryRow>) -> Self {
        Self {
            rows: Mutex::new(rows),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> Result<Vec<EntryRow>, InfraError> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<EntryRow>>, InfraError> {
        self.rows
            .lock()
            .map_err(|error| InfraError::Store(format!("entry store lock poisoned: {error}")))
    }
}

#[async_trait]
impl EntryStore for InMemoryEntryStore {
    async fn fetch_entries(&self, user_id: &str) -> Result<Vec<EntryRow>, InfraError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|row| row.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect())
    }

    async fn insert_entry(&self, user_id: &str, entry: &NewEntry) -> Result<EntryId, InfraError> {
        let mut rows = self.lock()?;
        if is_duplicate(&rows, user_id, entry) {
            return Err(duplicate_day_error(user_id, entry));
        }
        let id = EntryId::new((self.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string());
        rows.push(new_row(id.clone(), user_id, entry));
        Ok(id)
    }

    async fn update_entry(&self, id: &EntryId, update: &EntryUpdate) -> Result<(), InfraError> {
        apply_update(&mut self.lock()?, id, update)
    }

    async fn delete_entries(&self, user_id: &str) -> Result<(), InfraError> {
        self.lock()?
            .retain(|row| row.user_id.as_deref() != Some(user_id));
        Ok(())
    }
}

/// Entry store for machines without a remote backend. The rows of one local
/// profile live as a JSON array in a single week slot.
pub struct LocalEntryStore<W>
where
    W: WeekSlotStore,
{
    slots: Arc<W>,
    slot_key: String,
    write_guard: Mutex<()>,
}

impl<W> LocalEntryStore<W>
where
    W: WeekSlotStore,
{
    pub fn new(slots: Arc<W>, profile: &str) -> Self {
        Self {
            slots,
            slot_key: format!("workWeek:{}", profile.trim()),
            write_guard: Mutex::new(()),
        }
    }

    pub fn slot_key(&self) -> &str {
        &self.slot_key
    }

    fn read_rows(&self) -> Result<Vec<EntryRow>, InfraError> {
        match self.slots.load(&self.slot_key)? {
            Some(payload) => Ok(serde_json::from_str(&payload)?),
            None => Ok(Vec::new()),
        }
    }

    fn write_rows(&self, rows: &[EntryRow]) -> Result<(), InfraError> {
        let payload = serde_json::to_string(rows)?;
        self.slots.save(&self.slot_key, &payload)
    }

    /// Read-change-write of the slot under one guard. A change that leaves
    /// no rows drops the slot instead of writing an empty array.
    fn modify<T>(&self, change: impl FnOnce(&mut Vec<EntryRow>) -> Result<T, InfraError>) -> Result<T, InfraError> {
        let _guard = self
            .write_guard
            .lock()
            .map_err(|error| InfraError::Store(format!("local store lock poisoned: {error}")))?;
        let mut rows = self.read_rows()?;
        let value = change(&mut rows)?;
        if rows.is_empty() {
            self.slots.remove(&self.slot_key)?;
        } else {
            self.write_rows(&rows)?;
        }
        Ok(value)
    }

    fn next_local_id(entry: &NewEntry) -> EntryId {
        let sequence = NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed);
        EntryId::new(format!(
            "local-{}-{}-{sequence}",
            entry.day.as_str().to_ascii_lowercase(),
            Utc::now().timestamp_micros()
        ))
    }
}

#[async_trait]
impl<W> EntryStore for LocalEntryStore<W>
where
    W: WeekSlotStore + 'static,
{
    async fn fetch_entries(&self, user_id: &str) -> Result<Vec<EntryRow>, InfraError> {
        Ok(self
            .read_rows()?
            .into_iter()
            .filter(|row| row.user_id.as_deref() == Some(user_id))
            .collect())
    }

    async fn insert_entry(&self, user_id: &str, entry: &NewEntry) -> Result<EntryId, InfraError> {
        self.modify(|rows| {
            if is_duplicate(rows, user_id, entry) {
                return Err(duplicate_day_error(user_id, entry));
            }
            let id = Self::next_local_id(entry);
            rows.push(new_row(id.clone(), user_id, entry));
            Ok(id)
        })
    }

    async fn update_entry(&self, id: &EntryId, update: &EntryUpdate) -> Result<(), InfraError> {
        self.modify(|rows| apply_update(rows, id, update))
    }

    async fn delete_entries(&self, user_id: &str) -> Result<(), InfraError> {
        self.modify(|rows| {
            rows.retain(|row| row.user_id.as_deref() != Some(user_id));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::WorkDay;
    use crate::infrastructure::week_slot_store::InMemoryWeekSlotStore;
    use std::sync::OnceLock;

    fn new_entry(day: WorkDay, check_in: &str, check_out: &str, total_minutes: i64) -> NewEntry {
        NewEntry {
            day,
            check_in: check_in.to_string(),
            check_out: check_out.to_string(),
            total_minutes,
        }
    }

    #[tokio::test]
    async fn in_memory_store_rejects_second_row_for_same_day() {
        let store = InMemoryEntryStore::default();
        store
            .insert_entry("user-1", &new_entry(WorkDay::Monday, "11:15", "20:30", 0))
            .await
            .expect("first insert");

        let duplicate = store
            .insert_entry("user-1", &new_entry(WorkDay::Monday, "11:30", "20:30", -15))
            .await;
        assert!(matches!(duplicate, Err(InfraError::Store(_))));

        store
            .insert_entry("user-2", &new_entry(WorkDay::Monday, "11:30", "20:30", -15))
            .await
            .expect("other user may insert the same day");
    }

    #[tokio::test]
    async fn in_memory_store_updates_by_identity_and_deletes_per_user() {
        let store = InMemoryEntryStore::default();
        let id = store
            .insert_entry("user-1", &new_entry(WorkDay::Tuesday, "11:15", "20:30", 0))
            .await
            .expect("insert");
        store
            .insert_entry("user-2", &new_entry(WorkDay::Tuesday, "11:15", "20:30", 0))
            .await
            .expect("insert other user");

        store
            .update_entry(
                &id,
                &EntryUpdate {
                    check_in: "11:15".to_string(),
                    check_out: "21:00".to_string(),
                    total_minutes: 30,
                },
            )
            .await
            .expect("update");
        let rows = store.fetch_entries("user-1").await.expect("fetch");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_minutes, 30);

        store.delete_entries("user-1").await.expect("delete");
        assert!(store.fetch_entries("user-1").await.expect("fetch").is_empty());
        assert_eq!(store.fetch_entries("user-2").await.expect("fetch").len(), 1);
    }

    #[tokio::test]
    async fn update_of_unknown_identity_fails() {
        let store = InMemoryEntryStore::default();
        let result = store
            .update_entry(
                &EntryId::new("missing"),
                &EntryUpdate {
                    check_in: "11:15".to_string(),
                    check_out: "20:30".to_string(),
                    total_minutes: 0,
                },
            )
            .await;
        assert!(matches!(result, Err(InfraError::Store(_))));
    }

    #[tokio::test]
    async fn local_store_keeps_rows_as_json_in_one_slot() {
        let slots = Arc::new(InMemoryWeekSlotStore::default());
        let store = LocalEntryStore::new(Arc::clone(&slots), "local");

        let id = store
            .insert_entry("local", &new_entry(WorkDay::Wednesday, "11:30", "21:00", 15))
            .await
            .expect("insert");
        assert!(id.as_str().starts_with("local-wednesday-"));

        let payload = slots
            .load("workWeek:local")
            .expect("load slot")
            .expect("slot written");
        let rows: Vec<EntryRow> = serde_json::from_str(&payload).expect("rows json");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].day, "Wednesday");

        store
            .update_entry(
                &id,
                &EntryUpdate {
                    check_in: "11:15".to_string(),
                    check_out: "20:30".to_string(),
                    total_minutes: 0,
                },
            )
            .await
            .expect("update");
        let fetched = store.fetch_entries("local").await.expect("fetch");
        assert_eq!(fetched[0].check_out.as_deref(), Some("20:30"));

        store.delete_entries("local").await.expect("delete");
        assert_eq!(slots.load("workWeek:local").expect("load slot"), None);
    }

    /// Slot store that, on the first `remove`, starts an insert through the
    /// owning entry store from another thread and gives it time to run.
    #[derive(Default)]
    struct RacingSlots {
        inner: InMemoryWeekSlotStore,
        owner: OnceLock<Arc<LocalEntryStore<RacingSlots>>>,
        racer: Mutex<Option<std::thread::JoinHandle<Result<EntryId, InfraError>>>>,
    }

    impl WeekSlotStore for RacingSlots {
        fn load(&self, key: &str) -> Result<Option<String>, InfraError> {
            self.inner.load(key)
        }

        fn save(&self, key: &str, payload: &str) -> Result<(), InfraError> {
            self.inner.save(key, payload)
        }

        fn remove(&self, key: &str) -> Result<(), InfraError> {
            let mut racer = self.racer.lock().expect("racer lock");
            if racer.is_none() {
                if let Some(owner) = self.owner.get() {
                    let owner = Arc::clone(owner);
                    *racer = Some(std::thread::spawn(move || {
                        let runtime = tokio::runtime::Runtime::new().expect("runtime");
                        runtime.block_on(
                            owner.insert_entry("local", &new_entry(WorkDay::Monday, "11:30", "20:30", -15)),
                        )
                    }));
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }
            }
            drop(racer);
            self.inner.remove(key)
        }
    }

    #[tokio::test]
    async fn insert_racing_a_delete_is_never_erased() {
        let slots = Arc::new(RacingSlots::default());
        let store = Arc::new(LocalEntryStore::new(Arc::clone(&slots), "local"));
        assert!(slots.owner.set(Arc::clone(&store)).is_ok());

        store
            .insert_entry("local", &new_entry(WorkDay::Friday, "11:15", "20:30", 0))
            .await
            .expect("seed row");
        store.delete_entries("local").await.expect("delete");

        let racer = slots
            .racer
            .lock()
            .expect("racer lock")
            .take()
            .expect("insert was started during delete");
        let inserted = racer.join().expect("racer thread").expect("racing insert");

        let rows = store.fetch_entries("local").await.expect("fetch");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, inserted);
        assert_eq!(rows[0].day, "Monday");
    }
}
