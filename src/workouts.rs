use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use crate::db::{get_client_profile, get_scheduled_exercises, locate_day};
use crate::error::AppError;
use crate::models::{
    CompletionStatus, DbExerciseFlag, DbSetCompletion, DbWorkoutCompletion, EffortRating,
    ExerciseFlag, SetCompletion, WorkoutCompletion,
};

/// How long set taps are allowed to accumulate before they land in one
/// batched write.
pub const SET_WRITE_DEBOUNCE: Duration = Duration::from_millis(500);

/// A client's view of one scheduled day. "Not started" is a variant, not
/// a null, so callers never special-case a missing record.
#[derive(Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    InProgress { session: WorkoutSession },
    Completed { session: WorkoutSession },
}

#[derive(Serialize)]
pub struct WorkoutSession {
    pub completion: WorkoutCompletion,
    pub sets: Vec<SetCompletion>,
    pub flags: Vec<ExerciseFlag>,
}

#[instrument(skip(pool))]
pub async fn get_completion(
    pool: &Pool<Sqlite>,
    completion_id: i64,
) -> Result<WorkoutCompletion, AppError> {
    let row = sqlx::query_as::<_, DbWorkoutCompletion>(
        "SELECT * FROM workout_completions WHERE id = ?",
    )
    .bind(completion_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(completion) => Ok(WorkoutCompletion::from(completion)),
        _ => Err(AppError::NotFound(format!(
            "Workout completion {} not found",
            completion_id
        ))),
    }
}

/// Ownership check folded into the lookup so callers cannot tell "absent"
/// from "someone else's".
async fn get_owned_completion(
    pool: &Pool<Sqlite>,
    client_id: i64,
    completion_id: i64,
) -> Result<WorkoutCompletion, AppError> {
    let completion = get_completion(pool, completion_id).await?;
    if completion.client_id != client_id {
        return Err(AppError::NotFound(format!(
            "Workout completion {} not found",
            completion_id
        )));
    }
    Ok(completion)
}

#[instrument(skip(pool))]
pub async fn get_set_completions(
    pool: &Pool<Sqlite>,
    completion_id: i64,
) -> Result<Vec<SetCompletion>, AppError> {
    let rows = sqlx::query_as::<_, DbSetCompletion>(
        "SELECT * FROM set_completions WHERE completion_id = ?
         ORDER BY scheduled_exercise_id, set_number",
    )
    .bind(completion_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(SetCompletion::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_exercise_flags(
    pool: &Pool<Sqlite>,
    completion_id: i64,
) -> Result<Vec<ExerciseFlag>, AppError> {
    let rows =
        sqlx::query_as::<_, DbExerciseFlag>("SELECT * FROM exercise_flags WHERE completion_id = ?")
            .bind(completion_id)
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(ExerciseFlag::from).collect())
}

#[instrument(skip(pool))]
pub async fn session_state(
    pool: &Pool<Sqlite>,
    client_id: i64,
    day_id: i64,
) -> Result<SessionState, AppError> {
    let completion = find_completion_for_day(pool, client_id, day_id).await?;

    let Some(completion) = completion else {
        return Ok(SessionState::NotStarted);
    };

    let sets = get_set_completions(pool, completion.id).await?;
    let flags = get_exercise_flags(pool, completion.id).await?;
    let status = completion.status;
    let session = WorkoutSession {
        completion,
        sets,
        flags,
    };

    Ok(match status {
        CompletionStatus::InProgress => SessionState::InProgress { session },
        CompletionStatus::Completed => SessionState::Completed { session },
    })
}

/// Day ids the client has fully closed out, for the calendar view.
#[instrument(skip(pool))]
pub async fn completed_day_ids(
    pool: &Pool<Sqlite>,
    client_id: i64,
    plan_id: i64,
) -> Result<std::collections::HashSet<i64>, AppError> {
    let rows = sqlx::query_scalar::<_, i64>(
        "SELECT day_id FROM workout_completions
         WHERE client_id = ? AND plan_id = ? AND status = 'completed'",
    )
    .bind(client_id)
    .bind(plan_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().collect())
}

async fn find_completion_for_day(
    pool: &Pool<Sqlite>,
    client_id: i64,
    day_id: i64,
) -> Result<Option<WorkoutCompletion>, AppError> {
    let row = sqlx::query_as::<_, DbWorkoutCompletion>(
        "SELECT * FROM workout_completions WHERE client_id = ? AND day_id = ?",
    )
    .bind(client_id)
    .bind(day_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(WorkoutCompletion::from))
}

/// Starts a session for one scheduled day.
///
/// Idempotent: a second call for the same (client, plan, day) returns the
/// existing record unchanged, so a double-tap or a retried request never
/// errors and never duplicates set rows. The completion and every
/// pre-created set row land in one transaction.
#[instrument(skip(pool))]
pub async fn start_workout(
    pool: &Pool<Sqlite>,
    client_id: i64,
    day_id: i64,
) -> Result<WorkoutCompletion, AppError> {
    info!("Starting workout session");

    let profile = get_client_profile(pool, client_id).await?;
    let Some(plan_id) = profile.active_plan_id else {
        return Err(AppError::NotFound(
            "Day does not belong to the client's active plan".to_string(),
        ));
    };

    let day = locate_day(pool, day_id).await?;
    let day = match day {
        Some(day) if day.plan_id == plan_id => day,
        _ => {
            return Err(AppError::NotFound(
                "Day does not belong to the client's active plan".to_string(),
            ));
        }
    };

    if day.is_rest_day {
        return Err(AppError::Forbidden(
            "Rest days have no workout to start".to_string(),
        ));
    }

    if let Some(existing) = find_completion_for_day(pool, client_id, day_id).await? {
        info!(completion_id = existing.id, "Workout already started");
        return Ok(existing);
    }

    let exercises = get_scheduled_exercises(pool, day_id).await?;
    let now = Utc::now().naive_utc();

    let mut tx = pool.begin().await?;

    let insert = sqlx::query(
        "INSERT INTO workout_completions
         (client_id, plan_id, day_id, status, started_at, exercises_done, exercises_total, completion_pct)
         VALUES (?, ?, ?, 'in_progress', ?, 0, ?, 0)",
    )
    .bind(client_id)
    .bind(plan_id)
    .bind(day_id)
    .bind(now)
    .bind(exercises.len() as i64)
    .execute(&mut *tx)
    .await;

    let completion_id = match insert {
        Ok(res) => res.last_insert_rowid(),
        Err(e) => {
            // A concurrent start won the unique (client, plan, day) race;
            // surface its row instead.
            let lost_race = e
                .as_database_error()
                .map(|db| db.is_unique_violation())
                .unwrap_or(false);
            tx.rollback().await?;
            if lost_race {
                if let Some(existing) = find_completion_for_day(pool, client_id, day_id).await? {
                    return Ok(existing);
                }
            }
            return Err(AppError::Database(e));
        }
    };

    for exercise in &exercises {
        for set_number in 1..=exercise.sets {
            sqlx::query(
                "INSERT INTO set_completions (completion_id, scheduled_exercise_id, set_number, completed)
                 VALUES (?, ?, ?, FALSE)",
            )
            .bind(completion_id)
            .bind(exercise.id)
            .bind(set_number)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;

    get_completion(pool, completion_id).await
}

/// Flips one set. Completing a set stamps the time and stores the actuals;
/// un-completing clears all three, so toggling twice is a no-op.
#[instrument(skip(pool))]
pub async fn toggle_set(
    pool: &Pool<Sqlite>,
    client_id: i64,
    completion_id: i64,
    scheduled_exercise_id: i64,
    set_number: i64,
    actual_weight: Option<f64>,
    actual_reps: Option<i64>,
) -> Result<SetCompletion, AppError> {
    if set_number < 1 {
        return Err(AppError::Validation(format!(
            "Set number {} must be positive",
            set_number
        )));
    }

    let completion = get_owned_completion(pool, client_id, completion_id).await?;
    if completion.status == CompletionStatus::Completed {
        return Err(AppError::Forbidden(
            "Finished workouts are read-only".to_string(),
        ));
    }

    let row = sqlx::query_as::<_, DbSetCompletion>(
        "SELECT * FROM set_completions
         WHERE completion_id = ? AND scheduled_exercise_id = ? AND set_number = ?",
    )
    .bind(completion_id)
    .bind(scheduled_exercise_id)
    .bind(set_number)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Err(AppError::NotFound(format!(
            "No set {} for exercise {} in this session",
            set_number, scheduled_exercise_id
        )));
    };
    let set = SetCompletion::from(row);

    if set.completed {
        sqlx::query(
            "UPDATE set_completions
             SET completed = FALSE, completed_at = NULL, actual_weight = NULL, actual_reps = NULL
             WHERE id = ?",
        )
        .bind(set.id)
        .execute(pool)
        .await?;
    } else {
        sqlx::query(
            "UPDATE set_completions
             SET completed = TRUE, completed_at = ?, actual_weight = ?, actual_reps = ?
             WHERE id = ?",
        )
        .bind(Utc::now().naive_utc())
        .bind(actual_weight)
        .bind(actual_reps)
        .bind(set.id)
        .execute(pool)
        .await?;
    }

    let row = sqlx::query_as::<_, DbSetCompletion>("SELECT * FROM set_completions WHERE id = ?")
        .bind(set.id)
        .fetch_one(pool)
        .await?;

    Ok(SetCompletion::from(row))
}

/// One accumulated set state, keyed by (exercise, set number).
#[derive(Debug, Clone, Deserialize)]
pub struct SetWrite {
    pub scheduled_exercise_id: i64,
    pub set_number: i64,
    pub completed: bool,
    pub actual_weight: Option<f64>,
    pub actual_reps: Option<i64>,
}

/// Applies a coalesced batch of set states in one transaction.
///
/// Each tuple carries the final desired state, so the write is an
/// idempotent upsert: replaying the same batch is harmless. Any missing
/// row rolls the whole batch back.
#[instrument(skip(pool, writes), fields(batch_len = writes.len()))]
pub async fn apply_set_writes(
    pool: &Pool<Sqlite>,
    client_id: i64,
    completion_id: i64,
    writes: &[SetWrite],
) -> Result<(), AppError> {
    info!("Applying batched set writes");

    let completion = get_owned_completion(pool, client_id, completion_id).await?;
    if completion.status == CompletionStatus::Completed {
        return Err(AppError::Forbidden(
            "Finished workouts are read-only".to_string(),
        ));
    }

    // Latest state per set wins, whatever order the taps arrived in.
    let mut latest: HashMap<(i64, i64), &SetWrite> = HashMap::new();
    for write in writes {
        if write.set_number < 1 {
            return Err(AppError::Validation(format!(
                "Set number {} must be positive",
                write.set_number
            )));
        }
        latest.insert((write.scheduled_exercise_id, write.set_number), write);
    }

    let now = Utc::now().naive_utc();
    let mut tx = pool.begin().await?;

    for write in latest.values() {
        let result = if write.completed {
            sqlx::query(
                "UPDATE set_completions
                 SET completed = TRUE, completed_at = ?, actual_weight = ?, actual_reps = ?
                 WHERE completion_id = ? AND scheduled_exercise_id = ? AND set_number = ?",
            )
            .bind(now)
            .bind(write.actual_weight)
            .bind(write.actual_reps)
            .bind(completion_id)
            .bind(write.scheduled_exercise_id)
            .bind(write.set_number)
            .execute(&mut *tx)
            .await?
        } else {
            sqlx::query(
                "UPDATE set_completions
                 SET completed = FALSE, completed_at = NULL, actual_weight = NULL, actual_reps = NULL
                 WHERE completion_id = ? AND scheduled_exercise_id = ? AND set_number = ?",
            )
            .bind(completion_id)
            .bind(write.scheduled_exercise_id)
            .bind(write.set_number)
            .execute(&mut *tx)
            .await?
        };

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "No set {} for exercise {} in this session",
                write.set_number, write.scheduled_exercise_id
            )));
        }
    }

    tx.commit().await?;
    Ok(())
}

/// Raises a flag on one exercise within one session, or updates the note
/// if the flag already exists. There is no unflag: removal is modeled
/// locally by callers, never persisted.
#[instrument(skip(pool))]
pub async fn toggle_flag(
    pool: &Pool<Sqlite>,
    client_id: i64,
    completion_id: i64,
    scheduled_exercise_id: i64,
    note: Option<&str>,
) -> Result<ExerciseFlag, AppError> {
    info!("Flagging exercise");

    let completion = get_owned_completion(pool, client_id, completion_id).await?;
    if completion.status == CompletionStatus::Completed {
        return Err(AppError::Forbidden(
            "Finished workouts are read-only".to_string(),
        ));
    }

    let on_day = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM scheduled_exercises WHERE id = ? AND day_id = ?",
    )
    .bind(scheduled_exercise_id)
    .bind(completion.day_id)
    .fetch_optional(pool)
    .await?;

    if on_day.is_none() {
        return Err(AppError::NotFound(format!(
            "Exercise {} is not part of this session",
            scheduled_exercise_id
        )));
    }

    let now = Utc::now().naive_utc();
    sqlx::query(
        "INSERT INTO exercise_flags (completion_id, scheduled_exercise_id, note, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT (completion_id, scheduled_exercise_id)
         DO UPDATE SET note = excluded.note, updated_at = excluded.updated_at",
    )
    .bind(completion_id)
    .bind(scheduled_exercise_id)
    .bind(note)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let row = sqlx::query_as::<_, DbExerciseFlag>(
        "SELECT * FROM exercise_flags WHERE completion_id = ? AND scheduled_exercise_id = ?",
    )
    .bind(completion_id)
    .bind(scheduled_exercise_id)
    .fetch_one(pool)
    .await?;

    Ok(ExerciseFlag::from(row))
}

/// One-way transition to completed, with the aggregate stats computed from
/// the set rows. Calling it twice fails rather than recomputing.
#[instrument(skip(pool))]
pub async fn finish_workout(
    pool: &Pool<Sqlite>,
    client_id: i64,
    completion_id: i64,
    effort_rating: Option<EffortRating>,
) -> Result<WorkoutCompletion, AppError> {
    info!("Finishing workout session");

    let completion = get_owned_completion(pool, client_id, completion_id).await?;
    if completion.status == CompletionStatus::Completed {
        return Err(AppError::Forbidden(
            "Workout is already finished".to_string(),
        ));
    }

    let (total_sets, completed_sets): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(completed), 0) FROM set_completions WHERE completion_id = ?",
    )
    .bind(completion_id)
    .fetch_one(pool)
    .await?;

    // An exercise counts as done only when every prescribed set is
    // completed; partial exercises contribute nothing here.
    let exercises_done = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM (
             SELECT scheduled_exercise_id FROM set_completions
             WHERE completion_id = ?
             GROUP BY scheduled_exercise_id
             HAVING SUM(completed) = COUNT(*)
         )",
    )
    .bind(completion_id)
    .fetch_one(pool)
    .await?;

    let completion_pct = if total_sets == 0 {
        0.0
    } else {
        completed_sets as f64 / total_sets as f64
    };

    let now = Utc::now();
    let duration_sec = (now - completion.started_at).num_seconds();

    // The status predicate makes the transition one-way even under a
    // concurrent double finish.
    let result = sqlx::query(
        "UPDATE workout_completions
         SET status = 'completed', completed_at = ?, completion_pct = ?,
             exercises_done = ?, duration_sec = ?, effort_rating = ?
         WHERE id = ? AND status = 'in_progress'",
    )
    .bind(now.naive_utc())
    .bind(completion_pct)
    .bind(exercises_done)
    .bind(duration_sec)
    .bind(effort_rating.map(|r| r.as_str()))
    .bind(completion_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Forbidden(
            "Workout is already finished".to_string(),
        ));
    }

    get_completion(pool, completion_id).await
}

/// Debounced set-write queue: pending states keyed by (exercise, set) so
/// only the latest state per set survives, plus a single resettable timer.
/// Flushes after the inactivity window, on finish, and on teardown.
///
/// A failed flush discards the pending map instead of retrying; the
/// caller re-fetches authoritative state rather than diverging from it.
#[derive(Clone)]
pub struct SetWriteBuffer {
    inner: Arc<BufferInner>,
}

struct BufferInner {
    pool: Pool<Sqlite>,
    client_id: i64,
    completion_id: i64,
    debounce: Duration,
    pending: Mutex<HashMap<(i64, i64), SetWrite>>,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl SetWriteBuffer {
    pub fn new(pool: Pool<Sqlite>, client_id: i64, completion_id: i64) -> Self {
        Self::with_debounce(pool, client_id, completion_id, SET_WRITE_DEBOUNCE)
    }

    pub fn with_debounce(
        pool: Pool<Sqlite>,
        client_id: i64,
        completion_id: i64,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                pool,
                client_id,
                completion_id,
                debounce,
                pending: Mutex::new(HashMap::new()),
                flush_task: Mutex::new(None),
            }),
        }
    }

    /// Records one tap and restarts the inactivity timer.
    pub fn queue(&self, write: SetWrite) {
        {
            let mut pending = self.inner.pending.lock().unwrap();
            pending.insert((write.scheduled_exercise_id, write.set_number), write);
        }
        self.arm_timer();
    }

    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().unwrap().len()
    }

    fn arm_timer(&self) {
        let mut task = self.inner.flush_task.lock().unwrap();
        if let Some(handle) = task.take() {
            handle.abort();
        }

        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            if let Err(e) = BufferInner::flush_pending(&inner).await {
                error!(error = %e, "Debounced set write failed; pending taps dropped");
            }
        }));
    }

    /// Drains and writes whatever is pending. Used at finish and teardown
    /// so the last tap before navigating away is never lost.
    pub async fn flush(&self) -> Result<(), AppError> {
        {
            let mut task = self.inner.flush_task.lock().unwrap();
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
        BufferInner::flush_pending(&self.inner).await
    }
}

impl BufferInner {
    async fn flush_pending(inner: &Arc<BufferInner>) -> Result<(), AppError> {
        let drained: Vec<SetWrite> = {
            let mut pending = inner.pending.lock().unwrap();
            pending.drain().map(|(_, w)| w).collect()
        };

        if drained.is_empty() {
            return Ok(());
        }

        apply_set_writes(&inner.pool, inner.client_id, inner.completion_id, &drained).await
    }
}
