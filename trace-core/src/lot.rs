//! Lot code and day-of-year derivation.
//!
//! A lot code stamps a production batch as
//! `{product_code}-{day_of_year}-{operator_code}`. The day-of-year
//! segment is computed exactly once, at record creation, from the owning
//! task's actual start date (falling back to the planned date for tasks
//! that were never started). Regenerating a lot for a new operator code
//! substitutes only the last segment.

use chrono::{Datelike, NaiveDate};

use crate::error::{TraceError, TraceResult};
use crate::types::Task;

/// Gregorian ordinal day of `date` within its year, 1-366
pub fn day_of_year(date: NaiveDate) -> u16 {
    date.ordinal() as u16
}

/// The date the lot is derived from: the task's actual start if it was
/// started, otherwise the planned production date
pub fn lot_reference_date(task: &Task) -> NaiveDate {
    task.started_at
        .map(|at| at.date_naive())
        .unwrap_or(task.scheduled_date)
}

/// Operator-code syntax: non-empty, alphanumeric plus underscore.
///
/// Hyphens are excluded because `-` delimits the lot segments; an operator
/// code containing one would make the lot unparseable back into product,
/// day and operator.
pub fn validate_operator_code(code: &str) -> TraceResult<()> {
    if code.is_empty() {
        return Err(TraceError::validation("Operator code must not be empty"));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(TraceError::validation(format!(
            "Operator code {:?} contains invalid characters (allowed: alphanumeric, '_')",
            code
        )));
    }
    Ok(())
}

/// Assemble a lot code from its three segments
pub fn build_lot_code(
    product_code: &str,
    day_of_year: u16,
    operator_code: &str,
) -> TraceResult<String> {
    validate_operator_code(operator_code)?;
    Ok(format!("{}-{}-{}", product_code, day_of_year, operator_code))
}

/// Rebuild a stored lot code with a new operator code, preserving the
/// product and day-of-year segments.
///
/// The stored lot must split on `-` into exactly three segments; anything
/// else means the invariant was already broken and the update fails
/// instead of producing a malformed lot.
pub fn rebuild_lot_code(current: &str, new_operator_code: &str) -> TraceResult<String> {
    validate_operator_code(new_operator_code)?;

    let segments: Vec<&str> = current.split('-').collect();
    if segments.len() != 3 {
        return Err(TraceError::validation(format!(
            "Stored lot code {:?} does not have exactly 3 segments",
            current
        )));
    }

    Ok(format!(
        "{}-{}-{}",
        segments[0], segments[1], new_operator_code
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LineId, ShiftId, TaskId, TaskStatus, UserId};
    use chrono::{TimeZone, Utc};

    fn task_with_dates(
        started: Option<chrono::DateTime<Utc>>,
        scheduled: NaiveDate,
    ) -> Task {
        Task {
            id: TaskId::new(),
            line_id: LineId::new(),
            shift_id: ShiftId::new(),
            product_code: "410".to_string(),
            supervisor_id: UserId::new(),
            scheduled_date: scheduled,
            production_goal: 100,
            notes: None,
            status: if started.is_some() {
                TaskStatus::Finished
            } else {
                TaskStatus::Pending
            },
            assigned_operator_ids: vec![],
            created_at: Utc::now(),
            started_at: started,
            finished_at: None,
        }
    }

    #[test]
    fn ordinal_day_range() {
        assert_eq!(day_of_year(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()), 1);
        assert_eq!(
            day_of_year(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()),
            365
        );
        assert_eq!(
            day_of_year(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()),
            366
        );
    }

    #[test]
    fn leap_year_feb_29_is_day_60() {
        assert_eq!(day_of_year(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()), 60);
    }

    #[test]
    fn reference_date_prefers_actual_start() {
        let started = Utc.with_ymd_and_hms(2025, 12, 8, 14, 30, 0).unwrap();
        let scheduled = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        let task = task_with_dates(Some(started), scheduled);
        assert_eq!(
            lot_reference_date(&task),
            NaiveDate::from_ymd_opt(2025, 12, 8).unwrap()
        );
    }

    #[test]
    fn reference_date_falls_back_to_planned() {
        let scheduled = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        let task = task_with_dates(None, scheduled);
        assert_eq!(lot_reference_date(&task), scheduled);
    }

    #[test]
    fn lot_code_assembly() {
        // Product 410, 342nd day of the year, operator 96
        assert_eq!(build_lot_code("410", 342, "96").unwrap(), "410-342-96");
    }

    #[test]
    fn operator_code_syntax() {
        assert!(validate_operator_code("96").is_ok());
        assert!(validate_operator_code("OP_9b").is_ok());
        assert!(validate_operator_code("").is_err());
        assert!(validate_operator_code("96 A").is_err());
        assert!(validate_operator_code("96?").is_err());
    }

    #[test]
    fn hyphenated_operator_code_rejected() {
        // "A-B" would turn the lot into four hyphen-separated segments
        assert!(matches!(
            build_lot_code("410", 342, "A-B"),
            Err(TraceError::Validation(_))
        ));
        assert!(matches!(
            rebuild_lot_code("410-342-96", "A-B"),
            Err(TraceError::Validation(_))
        ));
    }

    #[test]
    fn rebuild_replaces_only_last_segment() {
        let rebuilt = rebuild_lot_code("410-342-96", "37").unwrap();
        assert_eq!(rebuilt, "410-342-37");
    }

    #[test]
    fn rebuild_rejects_malformed_lot() {
        assert!(matches!(
            rebuild_lot_code("410-342", "37"),
            Err(TraceError::Validation(_))
        ));
        assert!(matches!(
            rebuild_lot_code("410-342-96-extra", "37"),
            Err(TraceError::Validation(_))
        ));
    }
}
