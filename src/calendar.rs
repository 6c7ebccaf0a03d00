use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The Monday on or before `date`. Plan weeks are always Monday-aligned,
/// whatever weekday the plan was actually started on.
pub fn start_monday(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Which plan week `today` falls in, clamped to `[1, duration_weeks]`.
///
/// A plan started on a Wednesday still flips to week 2 on the following
/// Monday, not seven days later.
pub fn current_week_number(plan_start: NaiveDate, duration_weeks: i64, today: NaiveDate) -> i64 {
    let elapsed = days_between(start_monday(plan_start), today);
    let week = elapsed.div_euclid(7) + 1;
    week.clamp(1, duration_weeks.max(1))
}

/// Unclamped variant for callers that walk past the plan's last week.
pub fn elapsed_week_number(plan_start: NaiveDate, today: NaiveDate) -> i64 {
    days_between(start_monday(plan_start), today).div_euclid(7) + 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Rest,
    Today,
    Completed,
    Missed,
    Upcoming,
}

impl DayStatus {
    /// Whether the client may open this day. Upcoming and rest days are
    /// view-only.
    pub fn is_interactive(&self) -> bool {
        matches!(
            self,
            DayStatus::Today | DayStatus::Completed | DayStatus::Missed
        )
    }
}

/// One template slot of a plan week, in Monday-first positional order.
#[derive(Debug, Clone)]
pub struct DaySlot {
    pub day_id: i64,
    pub day_number: i64,
    pub is_rest_day: bool,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayInfo {
    pub day_id: i64,
    pub date: NaiveDate,
    pub name: Option<String>,
    pub is_rest_day: bool,
    pub status: DayStatus,
    pub interactive: bool,
}

/// Maps one plan week onto concrete calendar dates.
///
/// Template slots fill calendar days positionally, Monday first. A week
/// with three workout days and four rest days lands them wherever the
/// template lists them; nothing is spread out or reordered.
pub fn week_days(
    plan_start: NaiveDate,
    week_number: i64,
    slots: &[DaySlot],
    completed_day_ids: &HashSet<i64>,
    today: NaiveDate,
) -> Vec<DayInfo> {
    let week_monday = start_monday(plan_start) + Duration::days(7 * (week_number - 1));

    slots
        .iter()
        .enumerate()
        .map(|(i, slot)| {
            let date = week_monday + Duration::days(i as i64);
            let completed = completed_day_ids.contains(&slot.day_id);

            let status = if slot.is_rest_day {
                DayStatus::Rest
            } else if date == today {
                if completed {
                    DayStatus::Completed
                } else {
                    DayStatus::Today
                }
            } else if date < today {
                if completed {
                    DayStatus::Completed
                } else {
                    DayStatus::Missed
                }
            } else {
                DayStatus::Upcoming
            };

            DayInfo {
                day_id: slot.day_id,
                date,
                name: slot.name.clone(),
                is_rest_day: slot.is_rest_day,
                status,
                interactive: status.is_interactive(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeekProgress {
    pub completed: i64,
    pub total: i64,
    pub percentage: i64,
}

pub fn week_progress(days: &[DayInfo]) -> WeekProgress {
    let total = days.iter().filter(|d| d.status != DayStatus::Rest).count() as i64;
    let completed = days
        .iter()
        .filter(|d| d.status == DayStatus::Completed)
        .count() as i64;

    let percentage = if total == 0 {
        0
    } else {
        ((100 * completed) as f64 / total as f64).round() as i64
    };

    WeekProgress {
        completed,
        total,
        percentage,
    }
}
