pub const DEFAULT_CHECK_IN: &str = "11:15";
pub const DEFAULT_CHECK_OUT: &str = "20:30";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceWindow {
    pub check_in_minutes: i64,
    pub check_out_minutes: i64,
}

impl Default for ReferenceWindow {
    fn default() -> Self {
        Self {
            check_in_minutes: 11 * 60 + 15,
            check_out_minutes: 20 * 60 + 30,
        }
    }
}

impl ReferenceWindow {
    /// Late arrival costs the overage, late departure earns it. Arriving
    /// early or leaving early contributes nothing.
    pub fn balance(&self, check_in: &str, check_out: &str) -> i64 {
        let (Some(actual_in), Some(actual_out)) = (parse_minutes(check_in), parse_minutes(check_out))
        else {
            return 0;
        };

        let penalty = self.check_in_minutes.saturating_sub(actual_in).min(0);
        let bonus = actual_out.saturating_sub(self.check_out_minutes).max(0);
        penalty.saturating_add(bonus)
    }
}

pub fn compute_balance(check_in: &str, check_out: &str) -> i64 {
    ReferenceWindow::default().balance(check_in, check_out)
}

/// Minutes since midnight for an `HH:MM` value. Components past the minute
/// are ignored.
pub fn parse_minutes(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let mut split = value.split(':');
    let hour = split.next()?.trim().parse::<i64>().ok()?;
    let minute = split.next()?.trim().parse::<i64>().ok()?;
    hour.checked_mul(60)?.checked_add(minute)
}

pub fn format_minutes(total: i64) -> String {
    let sign = if total < 0 { '-' } else { '+' };
    let absolute = total.unsigned_abs();
    format!("{sign}{}h {:02}m", absolute / 60, absolute % 60)
}
