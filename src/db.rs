use crate::{
    auth::{DbUser, DbUserSession, User, UserSession},
    error::AppError,
};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::models::{
    ClientProfile, DbClientProfile, DbPlan, DbPlanDay, DbScheduledExercise, Plan, PlanDay,
    ScheduledExercise,
};

#[instrument(skip(pool))]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(
        "SELECT id, username, role, display_name, archived FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(user) => Ok(User::from(user)),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        ))),
    }
}

#[instrument(skip(pool))]
pub async fn find_user_by_username(
    pool: &Pool<Sqlite>,
    username: &str,
) -> Result<Option<User>, AppError> {
    info!("Fetching user by username");
    let row = sqlx::query_as::<_, DbUser>(
        "SELECT id, username, role, display_name, archived FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(User::from))
}

#[instrument(skip_all, fields(username, role))]
pub async fn create_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
    role: &str,
    display_name: Option<&str>,
) -> Result<i64, AppError> {
    info!("Creating new user");

    let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Err(AppError::Validation(format!(
            "Username '{}' already exists",
            username
        )));
    }

    let hashed_password = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

    let res = sqlx::query(
        "INSERT INTO users (username, password, role, display_name) VALUES (?, ?, ?, ?)",
    )
    .bind(username)
    .bind(hashed_password)
    .bind(role)
    .bind(display_name)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip_all, fields(username))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");
    let stored = sqlx::query_scalar::<_, String>("SELECT password FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    let Some(stored) = stored else {
        return Ok(None);
    };

    match bcrypt::verify(password, &stored) {
        Ok(true) => find_user_by_username(pool, username).await,
        _ => Ok(None),
    }
}

#[instrument(skip(pool))]
pub async fn update_user_display_name(
    pool: &Pool<Sqlite>,
    user_id: i64,
    display_name: &str,
) -> Result<(), AppError> {
    info!("Updating user display name");
    sqlx::query("UPDATE users SET display_name = ? WHERE id = ?")
        .bind(display_name)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip_all, fields(user_id))]
pub async fn update_user_password(
    pool: &Pool<Sqlite>,
    user_id: i64,
    new_password: &str,
) -> Result<(), AppError> {
    info!("Updating user password");
    let hashed_password = bcrypt::hash(new_password, bcrypt::DEFAULT_COST)?;

    sqlx::query("UPDATE users SET password = ? WHERE id = ?")
        .bind(hashed_password)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating user session");

    let res = sqlx::query("INSERT INTO user_sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<UserSession, AppError> {
    info!("Getting session by token");

    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, user_id, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match session {
        Some(session) => Ok(UserSession::from(session)),
        _ => Err(AppError::Authentication(
            "Invalid session token".to_string(),
        )),
    }
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");

    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");

    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

#[instrument(skip(pool))]
pub async fn create_coach_client(
    pool: &Pool<Sqlite>,
    coach_id: i64,
    client_id: i64,
) -> Result<i64, AppError> {
    info!("Creating coach-client relationship");

    let res = sqlx::query(
        "INSERT INTO coach_clients (coach_id, client_id, status) VALUES (?, ?, 'active')
         ON CONFLICT (coach_id, client_id) DO UPDATE SET status = 'active'",
    )
    .bind(coach_id)
    .bind(client_id)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

/// Absence and non-ownership are indistinguishable to callers.
#[instrument(skip(pool))]
pub async fn require_active_relationship(
    pool: &Pool<Sqlite>,
    coach_id: i64,
    client_id: i64,
) -> Result<(), AppError> {
    let row = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM coach_clients WHERE coach_id = ? AND client_id = ? AND status = 'active'",
    )
    .bind(coach_id)
    .bind(client_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(_) => Ok(()),
        _ => Err(AppError::NotFound(
            "No active coaching relationship".to_string(),
        )),
    }
}

#[instrument(skip(pool))]
pub async fn get_clients_for_coach(
    pool: &Pool<Sqlite>,
    coach_id: i64,
) -> Result<Vec<User>, AppError> {
    info!("Getting clients for coach");
    let rows = sqlx::query_as::<_, DbUser>(
        "SELECT u.id, u.username, u.role, u.display_name, u.archived
         FROM users u
         JOIN coach_clients cc ON cc.client_id = u.id
         WHERE cc.coach_id = ? AND cc.status = 'active' AND u.archived IS 0
         ORDER BY u.display_name, u.username",
    )
    .bind(coach_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(User::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_coaches_for_client(
    pool: &Pool<Sqlite>,
    client_id: i64,
) -> Result<Vec<i64>, AppError> {
    let rows = sqlx::query_scalar::<_, i64>(
        "SELECT coach_id FROM coach_clients WHERE client_id = ? AND status = 'active'",
    )
    .bind(client_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn get_client_profile(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<ClientProfile, AppError> {
    let row = sqlx::query_as::<_, DbClientProfile>(
        "SELECT user_id, active_plan_id, plan_start_date FROM client_profiles WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    // No row means no plan has ever been assigned.
    Ok(row.map(ClientProfile::from).unwrap_or(ClientProfile {
        user_id,
        active_plan_id: None,
        plan_start_date: None,
    }))
}

/// active_plan_id and plan_start_date move together, always.
#[instrument(skip(pool))]
pub async fn assign_plan_to_client(
    pool: &Pool<Sqlite>,
    client_id: i64,
    plan_id: i64,
    start_date: NaiveDate,
) -> Result<(), AppError> {
    info!("Assigning plan to client");

    let plan_exists = sqlx::query_scalar::<_, i64>("SELECT id FROM plans WHERE id = ?")
        .bind(plan_id)
        .fetch_optional(pool)
        .await?;

    if plan_exists.is_none() {
        return Err(AppError::NotFound(format!("Plan {} not found", plan_id)));
    }

    sqlx::query(
        "INSERT INTO client_profiles (user_id, active_plan_id, plan_start_date) VALUES (?, ?, ?)
         ON CONFLICT (user_id) DO UPDATE SET active_plan_id = ?, plan_start_date = ?",
    )
    .bind(client_id)
    .bind(plan_id)
    .bind(start_date)
    .bind(plan_id)
    .bind(start_date)
    .execute(pool)
    .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clear_client_plan(pool: &Pool<Sqlite>, client_id: i64) -> Result<(), AppError> {
    info!("Clearing client's active plan");

    sqlx::query(
        "UPDATE client_profiles SET active_plan_id = NULL, plan_start_date = NULL WHERE user_id = ?",
    )
    .bind(client_id)
    .execute(pool)
    .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn get_plan(pool: &Pool<Sqlite>, plan_id: i64) -> Result<Plan, AppError> {
    let row = sqlx::query_as::<_, DbPlan>(
        "SELECT id, coach_id, name, duration_weeks, workouts_per_week FROM plans WHERE id = ?",
    )
    .bind(plan_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(plan) => Ok(Plan::from(plan)),
        _ => Err(AppError::NotFound(format!("Plan {} not found", plan_id))),
    }
}

#[instrument(skip(pool))]
pub async fn get_week_days(
    pool: &Pool<Sqlite>,
    plan_id: i64,
    week_number: i64,
) -> Result<Vec<PlanDay>, AppError> {
    info!("Getting template days for plan week");
    let rows = sqlx::query_as::<_, DbPlanDay>(
        "SELECT pd.id, pd.week_id, pd.day_number, pd.is_rest_day, pd.name
         FROM plan_days pd
         JOIN plan_weeks pw ON pd.week_id = pw.id
         WHERE pw.plan_id = ? AND pw.week_number = ?
         ORDER BY pd.day_number",
    )
    .bind(plan_id)
    .bind(week_number)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(PlanDay::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_scheduled_exercises(
    pool: &Pool<Sqlite>,
    day_id: i64,
) -> Result<Vec<ScheduledExercise>, AppError> {
    let rows = sqlx::query_as::<_, DbScheduledExercise>(
        "SELECT se.id, se.day_id, se.exercise_id, e.name AS exercise_name,
                e.category AS exercise_category, se.order_index, se.sets, se.reps,
                se.weight, se.rest_seconds
         FROM scheduled_exercises se
         JOIN exercises e ON e.id = se.exercise_id
         WHERE se.day_id = ?
         ORDER BY se.order_index",
    )
    .bind(day_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ScheduledExercise::from).collect())
}

#[derive(sqlx::FromRow)]
pub struct DayLocation {
    pub plan_id: i64,
    pub is_rest_day: bool,
}

/// Which plan a template day belongs to, for ownership checks.
#[instrument(skip(pool))]
pub async fn locate_day(pool: &Pool<Sqlite>, day_id: i64) -> Result<Option<DayLocation>, AppError> {
    let row = sqlx::query_as::<_, DayLocation>(
        "SELECT pw.plan_id, pd.is_rest_day
         FROM plan_days pd
         JOIN plan_weeks pw ON pd.week_id = pw.id
         WHERE pd.id = ?",
    )
    .bind(day_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

// Plan-structure inserts below are scaffolding for seeds and fixtures; the
// engine itself never authors plans.

#[instrument(skip(pool))]
pub async fn create_plan(
    pool: &Pool<Sqlite>,
    coach_id: i64,
    name: &str,
    duration_weeks: i64,
    workouts_per_week: Option<i64>,
) -> Result<i64, AppError> {
    info!("Creating plan");
    if duration_weeks < 1 {
        return Err(AppError::Validation(
            "Plan duration must be at least one week".to_string(),
        ));
    }

    let res = sqlx::query(
        "INSERT INTO plans (coach_id, name, duration_weeks, workouts_per_week) VALUES (?, ?, ?, ?)",
    )
    .bind(coach_id)
    .bind(name)
    .bind(duration_weeks)
    .bind(workouts_per_week)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn create_plan_week(
    pool: &Pool<Sqlite>,
    plan_id: i64,
    week_number: i64,
) -> Result<i64, AppError> {
    let res = sqlx::query("INSERT INTO plan_weeks (plan_id, week_number) VALUES (?, ?)")
        .bind(plan_id)
        .bind(week_number)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn create_plan_day(
    pool: &Pool<Sqlite>,
    week_id: i64,
    day_number: i64,
    is_rest_day: bool,
    name: Option<&str>,
) -> Result<i64, AppError> {
    if !(1..=7).contains(&day_number) {
        return Err(AppError::Validation(format!(
            "Day number {} outside 1..7",
            day_number
        )));
    }

    let res =
        sqlx::query("INSERT INTO plan_days (week_id, day_number, is_rest_day, name) VALUES (?, ?, ?, ?)")
            .bind(week_id)
            .bind(day_number)
            .bind(is_rest_day)
            .bind(name)
            .execute(pool)
            .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn create_exercise(
    pool: &Pool<Sqlite>,
    name: &str,
    category: Option<&str>,
) -> Result<i64, AppError> {
    let res = sqlx::query("INSERT INTO exercises (name, category) VALUES (?, ?)")
        .bind(name)
        .bind(category)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[allow(clippy::too_many_arguments)]
#[instrument(skip(pool))]
pub async fn create_scheduled_exercise(
    pool: &Pool<Sqlite>,
    day_id: i64,
    exercise_id: i64,
    order_index: i64,
    sets: i64,
    reps: i64,
    weight: Option<f64>,
    rest_seconds: Option<i64>,
) -> Result<i64, AppError> {
    if sets < 1 {
        return Err(AppError::Validation(
            "Prescribed sets must be at least 1".to_string(),
        ));
    }

    let res = sqlx::query(
        "INSERT INTO scheduled_exercises (day_id, exercise_id, order_index, sets, reps, weight, rest_seconds)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(day_id)
    .bind(exercise_id)
    .bind(order_index)
    .bind(sets)
    .bind(reps)
    .bind(weight)
    .bind(rest_seconds)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}
