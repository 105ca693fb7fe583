use chrono::{DateTime, Duration, Months, Utc};

use crate::store::Recurrence;

impl Recurrence {
    /// Next due time for a run that finished at `from`; `None` for manual jobs.
    pub fn next_after(self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Recurrence::Manual => None,
            Recurrence::Daily => from.checked_add_signed(Duration::hours(24)),
            Recurrence::Weekly => from.checked_add_signed(Duration::days(7)),
            // chrono clamps to the last day of a shorter month.
            Recurrence::Monthly => from.checked_add_months(Months::new(1)),
        }
    }
}
