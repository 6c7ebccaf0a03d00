use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::calendar::elapsed_week_number;
use crate::db::{get_client_profile, get_clients_for_coach, get_plan};
use crate::error::AppError;

/// How far back the missed-week walk is allowed to look.
pub const MISSED_WEEK_LOOKBACK: i64 = 8;

/// Urgency tiers in strict priority order; the derived ordering doubles as
/// the worklist sort key.
///
/// A client who already responded to a check-in outranks one who is merely
/// overdue: the coach is the blocking party there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyTier {
    AwaitingResponse,
    AtRisk,
    CheckinDue,
    OnTrack,
}

/// The facts the classifier reads for one client, gathered by the caller.
#[derive(Debug, Clone, Default)]
pub struct ClientActivity {
    pub awaiting_coach_reply: bool,
    pub has_pending_checkin: bool,
    pub last_workout_completed_at: Option<DateTime<Utc>>,
}

/// First match wins, top to bottom.
pub fn classify(activity: &ClientActivity, now: DateTime<Utc>) -> UrgencyTier {
    if activity.awaiting_coach_reply {
        return UrgencyTier::AwaitingResponse;
    }

    let recently_active = activity
        .last_workout_completed_at
        .map(|at| now - at <= Duration::days(7))
        .unwrap_or(false);
    if !recently_active {
        return UrgencyTier::AtRisk;
    }

    if activity.has_pending_checkin {
        return UrgencyTier::CheckinDue;
    }

    UrgencyTier::OnTrack
}

/// Consecutive missed weeks immediately before the current one.
///
/// The current (possibly partial) week is never judged. The walk runs
/// backward from the most recently elapsed plan week, stops at the first
/// week that met its target, and never looks past the lookback cap.
pub fn consecutive_missed_weeks(
    plan_start: NaiveDate,
    duration_weeks: i64,
    workouts_per_week: Option<i64>,
    non_rest_per_week: &HashMap<i64, i64>,
    completed_per_week: &HashMap<i64, i64>,
    today: NaiveDate,
) -> i64 {
    let current = elapsed_week_number(plan_start, today);
    let newest_judged = (current - 1).min(duration_weeks);
    if newest_judged < 1 {
        return 0;
    }
    let oldest_judged = (newest_judged - MISSED_WEEK_LOOKBACK + 1).max(1);

    let mut missed = 0;
    for week in (oldest_judged..=newest_judged).rev() {
        let expected = workouts_per_week
            .unwrap_or_else(|| non_rest_per_week.get(&week).copied().unwrap_or(0));
        let completed = completed_per_week.get(&week).copied().unwrap_or(0);

        if completed < expected {
            missed += 1;
        } else {
            break;
        }
    }

    missed
}

#[derive(Serialize)]
pub struct WorklistEntry {
    pub client_id: i64,
    pub username: String,
    pub display_name: String,
    pub tier: UrgencyTier,
    pub missed_weeks: i64,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Gathers the missed-week inputs for one client and runs the walk.
/// Clients with no active plan have no weeks to miss.
#[instrument(skip(pool))]
pub async fn client_missed_weeks(
    pool: &Pool<Sqlite>,
    client_id: i64,
    today: NaiveDate,
) -> Result<i64, AppError> {
    let profile = get_client_profile(pool, client_id).await?;
    let (Some(plan_id), Some(plan_start)) = (profile.active_plan_id, profile.plan_start_date)
    else {
        return Ok(0);
    };

    let plan = get_plan(pool, plan_id).await?;

    let non_rest_rows = sqlx::query_as::<_, (i64, i64)>(
        "SELECT pw.week_number, SUM(CASE WHEN pd.is_rest_day THEN 0 ELSE 1 END)
         FROM plan_weeks pw
         JOIN plan_days pd ON pd.week_id = pw.id
         WHERE pw.plan_id = ?
         GROUP BY pw.week_number",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await?;

    let completed_rows = sqlx::query_as::<_, (i64, i64)>(
        "SELECT pw.week_number, COUNT(DISTINCT wc.day_id)
         FROM workout_completions wc
         JOIN plan_days pd ON pd.id = wc.day_id
         JOIN plan_weeks pw ON pw.id = pd.week_id
         WHERE wc.client_id = ? AND wc.plan_id = ? AND wc.status = 'completed'
         GROUP BY pw.week_number",
    )
    .bind(client_id)
    .bind(plan_id)
    .fetch_all(pool)
    .await?;

    Ok(consecutive_missed_weeks(
        plan_start,
        plan.duration_weeks,
        plan.workouts_per_week,
        &non_rest_rows.into_iter().collect(),
        &completed_rows.into_iter().collect(),
        today,
    ))
}

/// The coach's worklist, recomputed from the raw facts on every call.
/// Nothing is materialized.
#[instrument(skip(pool))]
pub async fn coach_worklist(
    pool: &Pool<Sqlite>,
    coach_id: i64,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Vec<WorklistEntry>, AppError> {
    info!("Building coach worklist");

    let clients = get_clients_for_coach(pool, coach_id).await?;
    let mut entries = Vec::with_capacity(clients.len());

    for client in clients {
        let activity = client_activity(pool, coach_id, client.id).await?;
        let tier = classify(&activity, now);
        let missed_weeks = client_missed_weeks(pool, client.id, today).await?;

        entries.push(WorklistEntry {
            client_id: client.id,
            username: client.username,
            display_name: client.display_name,
            tier,
            missed_weeks,
            last_activity: activity.last_workout_completed_at,
        });
    }

    entries.sort_by(|a, b| {
        a.tier
            .cmp(&b.tier)
            .then_with(|| b.last_activity.cmp(&a.last_activity))
    });

    Ok(entries)
}

async fn client_activity(
    pool: &Pool<Sqlite>,
    coach_id: i64,
    client_id: i64,
) -> Result<ClientActivity, AppError> {
    let (pending, responded): (i64, i64) = sqlx::query_as(
        "SELECT COALESCE(SUM(status = 'pending'), 0),
                COALESCE(SUM(status = 'client_responded'), 0)
         FROM checkins WHERE coach_id = ? AND client_id = ?",
    )
    .bind(coach_id)
    .bind(client_id)
    .fetch_one(pool)
    .await?;

    let last_completed = sqlx::query_scalar::<_, Option<NaiveDateTime>>(
        "SELECT MAX(completed_at) FROM workout_completions
         WHERE client_id = ? AND status = 'completed'",
    )
    .bind(client_id)
    .fetch_one(pool)
    .await?;

    Ok(ClientActivity {
        awaiting_coach_reply: responded > 0,
        has_pending_checkin: pending > 0,
        last_workout_completed_at: last_completed
            .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)),
    })
}
