//! Pure decision rules: role privileges, reservation status, recurrence
//! projection, and the in-memory list filters. Nothing in here touches the
//! store or the network.

use chrono::{Datelike, Duration, NaiveDate};

use crate::models::{Role, TaskRow, RES_CONFIRMED, RES_PENDING, TASK_IN_PROGRESS, TASK_PENDING};

pub fn has_permission(user: Role, required: Role) -> bool {
    user.level() >= required.level()
}

pub fn can_approve(role: Role) -> bool {
    has_permission(role, Role::Manager)
}

/// Status for a created or edited reservation. `None` means "leave the stored
/// status alone": an edit by someone who cannot approve must not reset an
/// already-decided reservation.
pub fn determine_status(role: Role, editing_existing: bool, can_approve: bool) -> Option<&'static str> {
    if editing_existing && !can_approve {
        return None;
    }
    match role {
        Role::Owner | Role::Admin | Role::Manager | Role::Family | Role::Friend => {
            Some(RES_CONFIRMED)
        }
        Role::Staff | Role::Tenant | Role::Guest => Some(RES_PENDING),
    }
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

pub fn nights(starts_on: NaiveDate, ends_on: NaiveDate) -> i64 {
    (ends_on - starts_on).num_days()
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    first_of_next
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// Calendar-month addition with the day-of-month clamped to the last valid
/// day of the target month (Jan 31 + 1 month = Feb 28/29, never Mar 2/3).
fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    let total = date.year() * 12 + date.month0() as i32 + months;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    let day = date.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(date)
}

/// Next occurrence of a recurring task. An unrecognized pattern advances by a
/// single day rather than erroring, so a bad descriptor cannot wedge a series.
pub fn next_due_date(current: NaiveDate, pattern: &str, interval: i64) -> NaiveDate {
    let step = interval.max(1);
    match pattern.trim().to_ascii_lowercase().as_str() {
        "daily" => current + Duration::days(step),
        "weekly" => current + Duration::days(step * 7),
        "monthly" => add_months(current, step as i32),
        "quarterly" => add_months(current, step as i32 * 3),
        "yearly" => add_months(current, step as i32 * 12),
        _ => current + Duration::days(1),
    }
}

/// A series keeps going while it has no end date, and the end date itself
/// still spawns.
pub fn should_spawn_next(next: NaiveDate, end: Option<NaiveDate>) -> bool {
    end.map_or(true, |end| next <= end)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSuccessor {
    pub due_date: NaiveDate,
    pub status: &'static str,
    pub parent_task_id: String,
}

/// Plan the single successor materialized when a recurring task completes.
/// Returns `None` for non-recurring tasks, expired series, or an unparseable
/// due date. `parent_task_id` always points at the series root.
pub fn plan_successor(task: &TaskRow) -> Option<TaskSuccessor> {
    let pattern = task.recurrence_pattern.as_deref()?;
    let due = parse_date(&task.due_date)?;
    let next = next_due_date(due, pattern, task.recurrence_interval);
    let end = task.recurrence_end.as_deref().and_then(parse_date);
    if !should_spawn_next(next, end) {
        return None;
    }
    Some(TaskSuccessor {
        due_date: next,
        status: if task.assignee_id.is_some() {
            TASK_IN_PROGRESS
        } else {
            TASK_PENDING
        },
        parent_task_id: task
            .parent_task_id
            .clone()
            .unwrap_or_else(|| task.id.clone()),
    })
}

/// Case-insensitive substring search over the given fields. An empty term
/// matches everything; absent fields never match.
pub fn search_matches(term: &str, fields: &[Option<&str>]) -> bool {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return true;
    }
    fields
        .iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&term))
}

/// Exact role filter. A stored role that fails to parse counts as guest; an
/// empty or unparseable filter leaves the list unfiltered.
pub fn role_matches(stored_role: &str, filter: &str) -> bool {
    if filter.trim().is_empty() {
        return true;
    }
    let Some(wanted) = Role::parse(filter) else {
        return true;
    };
    Role::parse(stored_role).unwrap_or(Role::Guest) == wanted
}

/// Task status filter; `open` covers both pending and in-progress.
pub fn status_matches(status: &str, filter: &str) -> bool {
    match filter.trim() {
        "" | "all" => true,
        "open" => status == TASK_PENDING || status == TASK_IN_PROGRESS,
        wanted => status == wanted,
    }
}

pub fn assignment_matches(assignee_id: Option<&str>, filter: &str, viewer_id: &str) -> bool {
    match filter.trim() {
        "mine" => assignee_id == Some(viewer_id),
        "unassigned" => assignee_id.is_none(),
        _ => true,
    }
}

pub fn category_matches(category: &str, filter: &str) -> bool {
    filter.trim().is_empty() || category.eq_ignore_ascii_case(filter.trim())
}

/// A staple is offered in "available to add" only while no inventory item
/// already matches it by case-insensitive (name, category).
pub fn staple_available(name: &str, category: &str, inventory: &[(String, String)]) -> bool {
    !inventory.iter().any(|(inv_name, inv_category)| {
        inv_name.eq_ignore_ascii_case(name) && inv_category.eq_ignore_ascii_case(category)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TASK_COMPLETED;

    fn date(value: &str) -> NaiveDate {
        parse_date(value).expect("test date")
    }

    #[test]
    fn role_levels_strictly_increase() {
        let ordered = [
            Role::Guest,
            Role::Friend,
            Role::Family,
            Role::Staff,
            Role::Manager,
            Role::Admin,
            Role::Owner,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0].level() < pair[1].level(), "{:?} !< {:?}", pair[0], pair[1]);
        }
        for role in Role::ALL {
            assert!(has_permission(role, role));
        }
        assert_eq!(Role::Tenant.level(), Role::Guest.level());
    }

    #[test]
    fn unknown_role_degrades_to_guest() {
        assert_eq!(Role::parse("superuser"), None);
        assert_eq!(Role::parse_or_guest("superuser"), Role::Guest);
        assert_eq!(Role::parse(" Owner "), Some(Role::Owner));
    }

    #[test]
    fn status_determination() {
        assert_eq!(determine_status(Role::Owner, false, true), Some(RES_CONFIRMED));
        assert_eq!(determine_status(Role::Friend, false, false), Some(RES_CONFIRMED));
        assert_eq!(determine_status(Role::Guest, false, true), Some(RES_PENDING));
        assert_eq!(determine_status(Role::Staff, false, false), Some(RES_PENDING));
        for role in Role::ALL {
            assert_eq!(determine_status(role, true, false), None);
        }
        assert_eq!(determine_status(Role::Admin, true, true), Some(RES_CONFIRMED));
    }

    #[test]
    fn month_addition_clamps_day_overflow() {
        assert_eq!(next_due_date(date("2024-01-31"), "monthly", 1), date("2024-02-29"));
        assert_eq!(next_due_date(date("2023-01-31"), "monthly", 1), date("2023-02-28"));
        assert_eq!(next_due_date(date("2024-11-30"), "quarterly", 1), date("2025-02-28"));
        assert_eq!(next_due_date(date("2024-02-29"), "yearly", 1), date("2025-02-28"));
    }

    #[test]
    fn fixed_step_patterns() {
        assert_eq!(next_due_date(date("2024-01-15"), "weekly", 2), date("2024-01-29"));
        assert_eq!(next_due_date(date("2024-12-15"), "yearly", 1), date("2025-12-15"));
        assert_eq!(next_due_date(date("2024-12-31"), "daily", 1), date("2025-01-01"));
        assert_eq!(next_due_date(date("2024-11-15"), "quarterly", 1), date("2025-02-15"));
    }

    #[test]
    fn unknown_pattern_advances_one_day() {
        assert_eq!(next_due_date(date("2024-03-01"), "fortnightly", 3), date("2024-03-02"));
    }

    #[test]
    fn zero_interval_treated_as_one() {
        assert_eq!(next_due_date(date("2024-03-01"), "weekly", 0), date("2024-03-08"));
    }

    #[test]
    fn spawn_termination_is_boundary_inclusive() {
        let next = date("2024-06-01");
        assert!(should_spawn_next(next, None));
        assert!(should_spawn_next(next, Some(date("2024-06-01"))));
        assert!(!should_spawn_next(next, Some(date("2024-05-31"))));
    }

    fn task(pattern: Option<&str>, assignee: Option<&str>, parent: Option<&str>) -> TaskRow {
        TaskRow {
            id: "task-1".to_string(),
            title: "Flip the mattresses".to_string(),
            description: None,
            status: TASK_PENDING.to_string(),
            priority: "normal".to_string(),
            category: Some("housekeeping".to_string()),
            assignee_id: assignee.map(str::to_string),
            due_date: "2024-03-01".to_string(),
            recurrence_pattern: pattern.map(str::to_string),
            recurrence_interval: 1,
            recurrence_end: None,
            parent_task_id: parent.map(str::to_string),
            created_at: "2024-02-01T00:00:00Z".to_string(),
            completed_at: None,
            assignee_name: None,
        }
    }

    #[test]
    fn successor_planned_for_recurring_task() {
        let planned = plan_successor(&task(Some("weekly"), None, None)).expect("successor");
        assert_eq!(planned.due_date, date("2024-03-08"));
        assert_eq!(planned.status, TASK_PENDING);
        assert_eq!(planned.parent_task_id, "task-1");

        let assigned = plan_successor(&task(Some("weekly"), Some("user-9"), Some("root-1")))
            .expect("successor");
        assert_eq!(assigned.status, TASK_IN_PROGRESS);
        assert_eq!(assigned.parent_task_id, "root-1");
    }

    #[test]
    fn no_successor_for_plain_or_expired_tasks() {
        assert_eq!(plan_successor(&task(None, None, None)), None);

        let mut expired = task(Some("weekly"), None, None);
        expired.recurrence_end = Some("2024-03-05".to_string());
        assert_eq!(plan_successor(&expired), None);

        let mut on_boundary = task(Some("weekly"), None, None);
        on_boundary.recurrence_end = Some("2024-03-08".to_string());
        assert!(plan_successor(&on_boundary).is_some());
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let people = [
            ("Anna", Some("anna@example.com")),
            ("Bob", Some("bob@example.com")),
            ("DYLAN", None),
            ("Cleo", Some("cleo@lantern.net")),
        ];
        let matched: Vec<&str> = people
            .iter()
            .filter(|(name, email)| search_matches("an", &[Some(*name), *email]))
            .map(|(name, _)| *name)
            .collect();
        assert_eq!(matched, vec!["Anna", "DYLAN", "Cleo"]);

        assert!(people
            .iter()
            .all(|(name, email)| search_matches("", &[Some(*name), *email])));
        assert!(search_matches("an", &[None, Some("Anders")]));
        assert!(!search_matches("an", &[None, None]));
    }

    #[test]
    fn role_and_status_filters() {
        assert!(role_matches("admin", "admin"));
        assert!(!role_matches("admin", "guest"));
        assert!(role_matches("mystery", "guest"));
        assert!(role_matches("admin", ""));
        assert!(role_matches("admin", "not-a-role"));

        assert!(status_matches(TASK_PENDING, "open"));
        assert!(status_matches(TASK_IN_PROGRESS, "open"));
        assert!(!status_matches(TASK_COMPLETED, "open"));
        assert!(status_matches(TASK_COMPLETED, ""));
        assert!(status_matches(TASK_COMPLETED, "completed"));
    }

    #[test]
    fn assignment_filter() {
        assert!(assignment_matches(Some("me"), "mine", "me"));
        assert!(!assignment_matches(Some("other"), "mine", "me"));
        assert!(assignment_matches(None, "unassigned", "me"));
        assert!(assignment_matches(Some("other"), "", "me"));
    }

    #[test]
    fn staple_hidden_once_stocked() {
        let inventory = vec![
            ("Paper Towels".to_string(), "Supplies".to_string()),
            ("Coffee".to_string(), "Pantry".to_string()),
        ];
        assert!(!staple_available("paper towels", "supplies", &inventory));
        assert!(staple_available("Paper Towels", "Pantry", &inventory));
        assert!(staple_available("Dish soap", "Cleaning", &inventory));
    }

    #[test]
    fn night_arithmetic() {
        assert_eq!(nights(date("2024-03-01"), date("2024-03-04")), 3);
        assert_eq!(nights(date("2024-03-01"), date("2024-03-01")), 0);
    }
}
