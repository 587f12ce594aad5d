use crate::domain::models::{DayRecord, EntryRow, Week, WorkDay};

pub fn default_week() -> Week {
    Week::from_records(WorkDay::ALL.map(DayRecord::new_default))
}

/// Lays stored rows over the fixed Monday..Friday skeleton. Rows for other
/// day names are dropped; for repeated day names the first row wins.
pub fn reconcile(rows: &[EntryRow]) -> Week {
    Week::from_records(WorkDay::ALL.map(|day| {
        rows.iter()
            .find(|row| WorkDay::from_name(&row.day) == Some(day))
            .map(|row| {
                DayRecord::from_persisted(
                    day,
                    row.id.clone(),
                    row.check_in.as_deref().unwrap_or_default(),
                    row.check_out.as_deref().unwrap_or_default(),
                )
            })
            .unwrap_or_else(|| DayRecord::new_default(day))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::balance::{DEFAULT_CHECK_IN, DEFAULT_CHECK_OUT};
    use crate::domain::models::{EntryId, SyncState};
    use proptest::prelude::*;

    fn row(id: &str, day: &str, check_in: Option<&str>, check_out: Option<&str>) -> EntryRow {
        EntryRow {
            id: EntryId::new(id),
            user_id: Some("user-1".to_string()),
            day: day.to_string(),
            check_in: check_in.map(ToOwned::to_owned),
            check_out: check_out.map(ToOwned::to_owned),
            total_minutes: 999,
        }
    }

    #[test]
    fn default_week_has_five_untouched_days() {
        let week = default_week();
        let days: Vec<WorkDay> = week.records().iter().map(DayRecord::day).collect();

        assert_eq!(days, WorkDay::ALL.to_vec());
        for record in week.records() {
            assert_eq!(record.check_in(), DEFAULT_CHECK_IN);
            assert_eq!(record.check_out(), DEFAULT_CHECK_OUT);
            assert_eq!(record.balance_minutes(), 0);
            assert_eq!(record.state(), &SyncState::Unsynced);
        }
        assert_eq!(week.weekly_total(), 0);
    }

    #[test]
    fn reconcile_fills_missing_days_with_defaults() {
        let week = reconcile(&[row("1", "Monday", Some("09:00"), Some("18:00"))]);

        let monday = week.day(WorkDay::Monday);
        assert_eq!(monday.check_in(), "09:00");
        assert_eq!(monday.check_out(), "18:00");
        assert_eq!(monday.balance_minutes(), 0);
        assert_eq!(monday.identity(), Some(&EntryId::new("1")));
        assert!(!monday.is_unsaved());

        for day in &WorkDay::ALL[1..] {
            let record = week.day(*day);
            assert_eq!(record.state(), &SyncState::Unsynced);
            assert_eq!(record.balance_minutes(), 0);
        }
    }

    #[test]
    fn reconcile_recomputes_instead_of_trusting_stored_total() {
        let week = reconcile(&[row("4", "Thursday", Some("11:30"), Some("21:00"))]);
        assert_eq!(week.day(WorkDay::Thursday).balance_minutes(), 15);
    }

    #[test]
    fn reconcile_substitutes_defaults_for_empty_times() {
        let week = reconcile(&[
            row("2", "Tuesday", None, Some("21:00")),
            row("3", "Wednesday", Some(""), Some("  ")),
        ]);

        let tuesday = week.day(WorkDay::Tuesday);
        assert_eq!(tuesday.check_in(), DEFAULT_CHECK_IN);
        assert_eq!(tuesday.balance_minutes(), 30);

        let wednesday = week.day(WorkDay::Wednesday);
        assert_eq!(wednesday.check_in(), DEFAULT_CHECK_IN);
        assert_eq!(wednesday.check_out(), DEFAULT_CHECK_OUT);
        assert_eq!(wednesday.identity(), Some(&EntryId::new("3")));
    }

    #[test]
    fn reconcile_reorders_and_ignores_unknown_days() {
        let week = reconcile(&[
            row("5", "Friday", Some("11:15"), Some("20:30")),
            row("6", "Sunday", Some("10:00"), Some("23:00")),
            row("1", "monday", Some("11:20"), Some("20:30")),
            row("7", "Monday", Some("12:00"), Some("20:30")),
        ]);

        assert_eq!(week.records().len(), 5);
        assert_eq!(week.day(WorkDay::Monday).identity(), Some(&EntryId::new("1")));
        assert_eq!(week.day(WorkDay::Monday).balance_minutes(), -5);
        assert_eq!(week.day(WorkDay::Friday).identity(), Some(&EntryId::new("5")));
        assert_eq!(week.records()[4].day(), WorkDay::Friday);
    }

    fn day_name() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("Monday".to_string()),
            Just("Tuesday".to_string()),
            Just("Wednesday".to_string()),
            Just("Thursday".to_string()),
            Just("Friday".to_string()),
            Just("Saturday".to_string()),
            "[A-Za-z]{0,10}",
        ]
    }

    proptest! {
        #[test]
        fn reconcile_always_yields_the_fixed_week(
            rows in prop::collection::vec((day_name(), "[0-9]{1,2}:[0-9]{2}", "[0-9]{1,2}:[0-9]{2}"), 0..12)
        ) {
            let rows: Vec<EntryRow> = rows
                .into_iter()
                .enumerate()
                .map(|(index, (day, check_in, check_out))| EntryRow {
                    id: EntryId::new(index.to_string()),
                    user_id: None,
                    day,
                    check_in: Some(check_in),
                    check_out: Some(check_out),
                    total_minutes: 0,
                })
                .collect();

            let week = reconcile(&rows);
            let days: Vec<WorkDay> = week.records().iter().map(DayRecord::day).collect();
            prop_assert_eq!(days, WorkDay::ALL.to_vec());
            prop_assert!(week.records().iter().all(|record| !record.is_unsaved()));
        }
    }
}
