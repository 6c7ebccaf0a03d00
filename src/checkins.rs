use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::calendar::days_between;
use crate::db::require_active_relationship;
use crate::error::AppError;
use crate::models::{
    CheckIn, CheckInSchedule, CheckInStatus, DbCheckIn, DbCheckInSchedule, EffortRating,
    ScheduleStatus,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientResponse {
    pub effort_rating: Option<EffortRating>,
    pub pain_blockers: Option<String>,
    pub client_feeling: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoachResponse {
    pub coach_feedback: Option<String>,
    #[serde(default)]
    pub plan_adjustment: bool,
}

#[instrument(skip(pool))]
pub async fn get_checkin(pool: &Pool<Sqlite>, checkin_id: i64) -> Result<CheckIn, AppError> {
    let row = sqlx::query_as::<_, DbCheckIn>("SELECT * FROM checkins WHERE id = ?")
        .bind(checkin_id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(checkin) => Ok(CheckIn::from(checkin)),
        _ => Err(AppError::NotFound(format!(
            "Check-in {} not found",
            checkin_id
        ))),
    }
}

/// Starts a new check-in conversation in `pending`.
///
/// A missing or ended relationship reports as `NotFound`, the same as a
/// relationship that never existed.
#[instrument(skip(pool))]
pub async fn initiate_checkin(
    pool: &Pool<Sqlite>,
    coach_id: i64,
    client_id: i64,
) -> Result<CheckIn, AppError> {
    info!("Initiating check-in");

    require_active_relationship(pool, coach_id, client_id).await?;

    let res = sqlx::query(
        "INSERT INTO checkins (coach_id, client_id, status, created_at) VALUES (?, ?, 'pending', ?)",
    )
    .bind(coach_id)
    .bind(client_id)
    .bind(Utc::now().naive_utc())
    .execute(pool)
    .await?;

    get_checkin(pool, res.last_insert_rowid()).await
}

/// First transition: the client answers. Client fields are written exactly
/// once, here.
#[instrument(skip(pool, response))]
pub async fn client_respond(
    pool: &Pool<Sqlite>,
    client_id: i64,
    checkin_id: i64,
    response: &ClientResponse,
) -> Result<CheckIn, AppError> {
    info!("Recording client check-in response");

    let checkin = get_checkin(pool, checkin_id).await?;
    if checkin.client_id != client_id {
        return Err(AppError::NotFound(format!(
            "Check-in {} not found",
            checkin_id
        )));
    }
    if checkin.status != CheckInStatus::Pending {
        return Err(AppError::Forbidden(
            "Check-in is not awaiting a client response".to_string(),
        ));
    }

    // Status predicate keeps the transition strictly forward even if two
    // submissions race.
    let result = sqlx::query(
        "UPDATE checkins
         SET status = 'client_responded', effort_rating = ?, pain_blockers = ?,
             client_feeling = ?, client_responded_at = ?
         WHERE id = ? AND status = 'pending'",
    )
    .bind(response.effort_rating.map(|r| r.as_str()))
    .bind(response.pain_blockers.as_deref())
    .bind(response.client_feeling.as_deref())
    .bind(Utc::now().naive_utc())
    .bind(checkin_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Forbidden(
            "Check-in is not awaiting a client response".to_string(),
        ));
    }

    get_checkin(pool, checkin_id).await
}

/// Second transition: the coach closes the loop. The row is immutable
/// afterwards.
#[instrument(skip(pool, response))]
pub async fn coach_respond(
    pool: &Pool<Sqlite>,
    coach_id: i64,
    checkin_id: i64,
    response: &CoachResponse,
) -> Result<CheckIn, AppError> {
    info!("Recording coach check-in response");

    let checkin = get_checkin(pool, checkin_id).await?;
    if checkin.coach_id != coach_id {
        return Err(AppError::NotFound(format!(
            "Check-in {} not found",
            checkin_id
        )));
    }
    if checkin.status != CheckInStatus::ClientResponded {
        return Err(AppError::Forbidden(
            "Check-in is not awaiting a coach response".to_string(),
        ));
    }

    let now = Utc::now().naive_utc();
    let result = sqlx::query(
        "UPDATE checkins
         SET status = 'completed', coach_feedback = ?, plan_adjustment = ?,
             coach_responded_at = ?, completed_at = ?
         WHERE id = ? AND status = 'client_responded'",
    )
    .bind(response.coach_feedback.as_deref())
    .bind(response.plan_adjustment)
    .bind(now)
    .bind(now)
    .bind(checkin_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Forbidden(
            "Check-in is not awaiting a coach response".to_string(),
        ));
    }

    get_checkin(pool, checkin_id).await
}

/// Whether a new check-in should be opened for the pair.
///
/// The reference date is the later of the anchor and the last completed
/// check-in, so a late response pushes the next due date out from the
/// actual completion rather than compounding drift from the anchor.
pub fn is_due(
    schedule: &CheckInSchedule,
    last_checkin_date: Option<NaiveDate>,
    has_open_checkin: bool,
    today: NaiveDate,
) -> bool {
    if schedule.status != ScheduleStatus::Active {
        return false;
    }

    // At most one in-flight check-in per relationship.
    if has_open_checkin {
        return false;
    }

    let reference = last_checkin_date
        .unwrap_or(schedule.anchor_date)
        .max(schedule.anchor_date);

    days_between(reference, today) >= schedule.cadence_days
}

/// Gathers the inputs for [`is_due`] from storage. Pure and repeatable;
/// callers invoke it on demand (e.g. at client session start), there is no
/// timer anywhere.
#[instrument(skip(pool))]
pub async fn checkin_due(
    pool: &Pool<Sqlite>,
    coach_id: i64,
    client_id: i64,
    today: NaiveDate,
) -> Result<bool, AppError> {
    let Some(schedule) = get_checkin_schedule(pool, coach_id, client_id).await? else {
        return Ok(false);
    };

    let has_open = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM checkins
         WHERE coach_id = ? AND client_id = ? AND status IN ('pending', 'client_responded')",
    )
    .bind(coach_id)
    .bind(client_id)
    .fetch_one(pool)
    .await?
        > 0;

    let last_completed = sqlx::query_scalar::<_, Option<chrono::NaiveDateTime>>(
        "SELECT MAX(completed_at) FROM checkins
         WHERE coach_id = ? AND client_id = ? AND status = 'completed'",
    )
    .bind(coach_id)
    .bind(client_id)
    .fetch_one(pool)
    .await?;

    Ok(is_due(
        &schedule,
        last_completed.map(|dt| dt.date()),
        has_open,
        today,
    ))
}

#[instrument(skip(pool))]
pub async fn get_checkin_schedule(
    pool: &Pool<Sqlite>,
    coach_id: i64,
    client_id: i64,
) -> Result<Option<CheckInSchedule>, AppError> {
    let row = sqlx::query_as::<_, DbCheckInSchedule>(
        "SELECT * FROM checkin_schedules WHERE coach_id = ? AND client_id = ?",
    )
    .bind(coach_id)
    .bind(client_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(CheckInSchedule::from))
}

#[instrument(skip(pool))]
pub async fn create_checkin_schedule(
    pool: &Pool<Sqlite>,
    coach_id: i64,
    client_id: i64,
    anchor_date: NaiveDate,
) -> Result<CheckInSchedule, AppError> {
    info!("Creating check-in schedule");

    require_active_relationship(pool, coach_id, client_id).await?;

    sqlx::query(
        "INSERT INTO checkin_schedules (coach_id, client_id, status, cadence_days, anchor_date)
         VALUES (?, ?, 'active', 7, ?)
         ON CONFLICT (coach_id, client_id)
         DO UPDATE SET status = 'active', anchor_date = excluded.anchor_date",
    )
    .bind(coach_id)
    .bind(client_id)
    .bind(anchor_date)
    .execute(pool)
    .await?;

    match get_checkin_schedule(pool, coach_id, client_id).await? {
        Some(schedule) => Ok(schedule),
        _ => Err(AppError::Internal(
            "Schedule missing after upsert".to_string(),
        )),
    }
}

#[instrument(skip(pool))]
pub async fn set_schedule_status(
    pool: &Pool<Sqlite>,
    coach_id: i64,
    client_id: i64,
    status: ScheduleStatus,
) -> Result<(), AppError> {
    info!("Updating check-in schedule status");

    let result =
        sqlx::query("UPDATE checkin_schedules SET status = ? WHERE coach_id = ? AND client_id = ?")
            .bind(status.as_str())
            .bind(coach_id)
            .bind(client_id)
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(
            "No check-in schedule for this pair".to_string(),
        ));
    }

    Ok(())
}
