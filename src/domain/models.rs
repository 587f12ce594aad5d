use crate::domain::balance::{compute_balance, DEFAULT_CHECK_IN, DEFAULT_CHECK_OUT};
use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkDay {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
}

impl WorkDay {
    pub const ALL: [WorkDay; 5] = [
        WorkDay::Monday,
        WorkDay::Tuesday,
        WorkDay::Wednesday,
        WorkDay::Thursday,
        WorkDay::Friday,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monday => "Monday",
            Self::Tuesday => "Tuesday",
            Self::Wednesday => "Wednesday",
            Self::Thursday => "Thursday",
            Self::Friday => "Friday",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_name(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|day| day.as_str().eq_ignore_ascii_case(value))
    }

    /// Weekends have no work day.
    pub fn from_weekday(weekday: Weekday) -> Option<Self> {
        match weekday {
            Weekday::Mon => Some(Self::Monday),
            Weekday::Tue => Some(Self::Tuesday),
            Weekday::Wed => Some(Self::Wednesday),
            Weekday::Thu => Some(Self::Thursday),
            Weekday::Fri => Some(Self::Friday),
            Weekday::Sat | Weekday::Sun => None,
        }
    }
}

impl fmt::Display for WorkDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque handle assigned by a store on first insert. Stores may hand out
/// numeric or textual ids; both are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawEntryId", into = "String")]
pub struct EntryId(String);

impl EntryId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<EntryId> for String {
    fn from(value: EntryId) -> Self {
        value.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntryId {
    Text(String),
    Number(i64),
}

impl From<RawEntryId> for EntryId {
    fn from(value: RawEntryId) -> Self {
        match value {
            RawEntryId::Text(text) => Self(text),
            RawEntryId::Number(number) => Self(number.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Unsynced,
    Dirty { identity: Option<EntryId> },
    Synced { identity: EntryId },
}

impl SyncState {
    pub fn identity(&self) -> Option<&EntryId> {
        match self {
            Self::Unsynced => None,
            Self::Dirty { identity } => identity.as_ref(),
            Self::Synced { identity } => Some(identity),
        }
    }

    pub fn is_unsaved(&self) -> bool {
        matches!(self, Self::Dirty { .. })
    }

    fn edited(&self) -> Self {
        Self::Dirty {
            identity: self.identity().cloned(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsynced => "unsynced",
            Self::Dirty { .. } => "dirty",
            Self::Synced { .. } => "synced",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayRecord {
    day: WorkDay,
    check_in: String,
    check_out: String,
    balance_minutes: i64,
    state: SyncState,
    revision: u64,
}

impl DayRecord {
    pub fn new_default(day: WorkDay) -> Self {
        Self {
            day,
            check_in: DEFAULT_CHECK_IN.to_string(),
            check_out: DEFAULT_CHECK_OUT.to_string(),
            balance_minutes: 0,
            state: SyncState::Unsynced,
            revision: 0,
        }
    }

    /// A record mirroring a stored row. Empty times fall back to the reference
    /// window and the balance is recomputed instead of trusting the stored one.
    pub fn from_persisted(day: WorkDay, identity: EntryId, check_in: &str, check_out: &str) -> Self {
        let check_in = non_empty_or(check_in, DEFAULT_CHECK_IN);
        let check_out = non_empty_or(check_out, DEFAULT_CHECK_OUT);
        Self {
            day,
            balance_minutes: compute_balance(&check_in, &check_out),
            check_in,
            check_out,
            state: SyncState::Synced { identity },
            revision: 0,
        }
    }

    pub fn day(&self) -> WorkDay {
        self.day
    }

    pub fn check_in(&self) -> &str {
        &self.check_in
    }

    pub fn check_out(&self) -> &str {
        &self.check_out
    }

    pub fn balance_minutes(&self) -> i64 {
        self.balance_minutes
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn identity(&self) -> Option<&EntryId> {
        self.state.identity()
    }

    pub fn is_unsaved(&self) -> bool {
        self.state.is_unsaved()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn has_times(&self) -> bool {
        !self.check_in.trim().is_empty() && !self.check_out.trim().is_empty()
    }

    pub fn set_times(&mut self, check_in: impl Into<String>, check_out: impl Into<String>) {
        self.check_in = check_in.into();
        self.check_out = check_out.into();
        self.recompute();
        self.mark_edited();
    }

    pub fn reset_to_defaults(&mut self) {
        self.check_in = DEFAULT_CHECK_IN.to_string();
        self.check_out = DEFAULT_CHECK_OUT.to_string();
        self.balance_minutes = 0;
        self.mark_edited();
    }

    pub fn recompute(&mut self) {
        self.balance_minutes = compute_balance(&self.check_in, &self.check_out);
    }

    /// Records a successful persist of the snapshot taken at `revision`. A
    /// record edited since then keeps its dirty state but still learns the
    /// identity the store handed out.
    pub fn mark_persisted(&mut self, identity: EntryId, revision: u64) {
        self.state = if self.revision == revision {
            SyncState::Synced { identity }
        } else {
            SyncState::Dirty {
                identity: Some(identity),
            }
        };
    }

    fn mark_edited(&mut self) {
        self.state = self.state.edited();
        self.revision = self.revision.wrapping_add(1);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Week {
    days: [DayRecord; 5],
}

impl Week {
    pub fn from_records(days: [DayRecord; 5]) -> Self {
        Self { days }
    }

    pub fn day(&self, day: WorkDay) -> &DayRecord {
        &self.days[day.index()]
    }

    pub fn day_mut(&mut self, day: WorkDay) -> &mut DayRecord {
        &mut self.days[day.index()]
    }

    pub fn records(&self) -> &[DayRecord] {
        &self.days
    }

    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut DayRecord> {
        self.days.iter_mut()
    }

    pub fn weekly_total(&self) -> i64 {
        self.days.iter().map(DayRecord::balance_minutes).sum()
    }

    pub fn unsaved_count(&self) -> usize {
        self.days.iter().filter(|record| record.is_unsaved()).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryRow {
    pub id: EntryId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub day: String,
    #[serde(default)]
    pub check_in: Option<String>,
    #[serde(default)]
    pub check_out: Option<String>,
    #[serde(default)]
    pub total_minutes: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewEntry {
    pub day: WorkDay,
    pub check_in: String,
    pub check_out: String,
    pub total_minutes: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EntryUpdate {
    pub check_in: String,
    pub check_out: String,
    pub total_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub email: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_valid_at(&self, now: DateTime<Utc>, leeway_seconds: i64) -> bool {
        self.expires_at > now + chrono::Duration::seconds(leeway_seconds)
            && !self.access_token.trim().is_empty()
            && !self.user_id.trim().is_empty()
    }
}

pub fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}
