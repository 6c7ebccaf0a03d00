use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

fn to_utc(dt: NaiveDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    InProgress,
    Completed,
}

impl CompletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionStatus::InProgress => "in_progress",
            CompletionStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(CompletionStatus::InProgress),
            "completed" => Some(CompletionStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffortRating {
    Easy,
    Medium,
    Hard,
}

impl EffortRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffortRating::Easy => "easy",
            EffortRating::Medium => "medium",
            EffortRating::Hard => "hard",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "easy" => Some(EffortRating::Easy),
            "medium" => Some(EffortRating::Medium),
            "hard" => Some(EffortRating::Hard),
            _ => None,
        }
    }
}

impl fmt::Display for EffortRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInStatus {
    Pending,
    ClientResponded,
    Completed,
}

impl CheckInStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckInStatus::Pending => "pending",
            CheckInStatus::ClientResponded => "client_responded",
            CheckInStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CheckInStatus::Pending),
            "client_responded" => Some(CheckInStatus::ClientResponded),
            "completed" => Some(CheckInStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for CheckInStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    Paused,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Active => "active",
            ScheduleStatus::Paused => "paused",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ScheduleStatus::Active),
            "paused" => Some(ScheduleStatus::Paused),
            _ => None,
        }
    }
}

#[derive(Serialize, Clone)]
pub struct Plan {
    pub id: i64,
    pub coach_id: i64,
    pub name: String,
    pub duration_weeks: i64,
    pub workouts_per_week: Option<i64>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbPlan {
    pub id: Option<i64>,
    pub coach_id: Option<i64>,
    pub name: Option<String>,
    pub duration_weeks: Option<i64>,
    pub workouts_per_week: Option<i64>,
}

impl From<DbPlan> for Plan {
    fn from(plan: DbPlan) -> Self {
        Self {
            id: plan.id.unwrap_or_default(),
            coach_id: plan.coach_id.unwrap_or_default(),
            name: plan.name.unwrap_or_default(),
            duration_weeks: plan.duration_weeks.unwrap_or(1),
            workouts_per_week: plan.workouts_per_week,
        }
    }
}

#[derive(Serialize, Clone)]
pub struct PlanDay {
    pub id: i64,
    pub week_id: i64,
    pub day_number: i64,
    pub is_rest_day: bool,
    pub name: Option<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbPlanDay {
    pub id: Option<i64>,
    pub week_id: Option<i64>,
    pub day_number: Option<i64>,
    pub is_rest_day: Option<bool>,
    pub name: Option<String>,
}

impl From<DbPlanDay> for PlanDay {
    fn from(day: DbPlanDay) -> Self {
        Self {
            id: day.id.unwrap_or_default(),
            week_id: day.week_id.unwrap_or_default(),
            day_number: day.day_number.unwrap_or_default(),
            is_rest_day: day.is_rest_day.unwrap_or_default(),
            name: day.name,
        }
    }
}

#[derive(Serialize, Clone)]
pub struct ScheduledExercise {
    pub id: i64,
    pub day_id: i64,
    pub exercise_id: i64,
    pub exercise_name: String, // Denormalized from the exercise library
    pub exercise_category: Option<String>,
    pub order_index: i64,
    pub sets: i64,
    pub reps: i64,
    pub weight: Option<f64>,
    pub rest_seconds: Option<i64>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbScheduledExercise {
    pub id: Option<i64>,
    pub day_id: Option<i64>,
    pub exercise_id: Option<i64>,
    pub exercise_name: Option<String>,
    pub exercise_category: Option<String>,
    pub order_index: Option<i64>,
    pub sets: Option<i64>,
    pub reps: Option<i64>,
    pub weight: Option<f64>,
    pub rest_seconds: Option<i64>,
}

impl From<DbScheduledExercise> for ScheduledExercise {
    fn from(ex: DbScheduledExercise) -> Self {
        Self {
            id: ex.id.unwrap_or_default(),
            day_id: ex.day_id.unwrap_or_default(),
            exercise_id: ex.exercise_id.unwrap_or_default(),
            exercise_name: ex.exercise_name.unwrap_or_default(),
            exercise_category: ex.exercise_category,
            order_index: ex.order_index.unwrap_or_default(),
            sets: ex.sets.unwrap_or_default(),
            reps: ex.reps.unwrap_or_default(),
            weight: ex.weight,
            rest_seconds: ex.rest_seconds,
        }
    }
}

#[derive(Serialize, Clone)]
pub struct ClientProfile {
    pub user_id: i64,
    pub active_plan_id: Option<i64>,
    pub plan_start_date: Option<NaiveDate>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbClientProfile {
    pub user_id: Option<i64>,
    pub active_plan_id: Option<i64>,
    pub plan_start_date: Option<NaiveDate>,
}

impl From<DbClientProfile> for ClientProfile {
    fn from(profile: DbClientProfile) -> Self {
        Self {
            user_id: profile.user_id.unwrap_or_default(),
            active_plan_id: profile.active_plan_id,
            plan_start_date: profile.plan_start_date,
        }
    }
}

#[derive(Serialize, Clone)]
pub struct WorkoutCompletion {
    pub id: i64,
    pub client_id: i64,
    pub plan_id: i64,
    pub day_id: i64,
    pub status: CompletionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completion_pct: f64,
    pub exercises_done: i64,
    pub exercises_total: i64,
    pub duration_sec: Option<i64>,
    pub effort_rating: Option<EffortRating>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbWorkoutCompletion {
    pub id: Option<i64>,
    pub client_id: Option<i64>,
    pub plan_id: Option<i64>,
    pub day_id: Option<i64>,
    pub status: Option<String>,
    pub started_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub completion_pct: Option<f64>,
    pub exercises_done: Option<i64>,
    pub exercises_total: Option<i64>,
    pub duration_sec: Option<i64>,
    pub effort_rating: Option<String>,
}

impl From<DbWorkoutCompletion> for WorkoutCompletion {
    fn from(db: DbWorkoutCompletion) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            client_id: db.client_id.unwrap_or_default(),
            plan_id: db.plan_id.unwrap_or_default(),
            day_id: db.day_id.unwrap_or_default(),
            status: db
                .status
                .as_deref()
                .and_then(CompletionStatus::from_str)
                .unwrap_or(CompletionStatus::InProgress),
            started_at: db.started_at.map(to_utc).unwrap_or_else(Utc::now),
            completed_at: db.completed_at.map(to_utc),
            completion_pct: db.completion_pct.unwrap_or_default(),
            exercises_done: db.exercises_done.unwrap_or_default(),
            exercises_total: db.exercises_total.unwrap_or_default(),
            duration_sec: db.duration_sec,
            effort_rating: db.effort_rating.as_deref().and_then(EffortRating::from_str),
        }
    }
}

#[derive(Serialize, Clone)]
pub struct SetCompletion {
    pub id: i64,
    pub completion_id: i64,
    pub scheduled_exercise_id: i64,
    pub set_number: i64,
    pub completed: bool,
    pub actual_weight: Option<f64>,
    pub actual_reps: Option<i64>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbSetCompletion {
    pub id: Option<i64>,
    pub completion_id: Option<i64>,
    pub scheduled_exercise_id: Option<i64>,
    pub set_number: Option<i64>,
    pub completed: Option<bool>,
    pub actual_weight: Option<f64>,
    pub actual_reps: Option<i64>,
    pub completed_at: Option<NaiveDateTime>,
}

impl From<DbSetCompletion> for SetCompletion {
    fn from(db: DbSetCompletion) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            completion_id: db.completion_id.unwrap_or_default(),
            scheduled_exercise_id: db.scheduled_exercise_id.unwrap_or_default(),
            set_number: db.set_number.unwrap_or_default(),
            completed: db.completed.unwrap_or_default(),
            actual_weight: db.actual_weight,
            actual_reps: db.actual_reps,
            completed_at: db.completed_at.map(to_utc),
        }
    }
}

#[derive(Serialize, Clone)]
pub struct ExerciseFlag {
    pub id: i64,
    pub completion_id: i64,
    pub scheduled_exercise_id: i64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbExerciseFlag {
    pub id: Option<i64>,
    pub completion_id: Option<i64>,
    pub scheduled_exercise_id: Option<i64>,
    pub note: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<DbExerciseFlag> for ExerciseFlag {
    fn from(db: DbExerciseFlag) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            completion_id: db.completion_id.unwrap_or_default(),
            scheduled_exercise_id: db.scheduled_exercise_id.unwrap_or_default(),
            note: db.note,
            created_at: db.created_at.map(to_utc).unwrap_or_else(Utc::now),
            updated_at: db.updated_at.map(to_utc).unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Serialize, Clone)]
pub struct CheckIn {
    pub id: i64,
    pub coach_id: i64,
    pub client_id: i64,
    pub status: CheckInStatus,
    pub effort_rating: Option<EffortRating>,
    pub pain_blockers: Option<String>,
    pub client_feeling: Option<String>,
    pub client_responded_at: Option<DateTime<Utc>>,
    pub coach_feedback: Option<String>,
    pub plan_adjustment: bool,
    pub coach_responded_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbCheckIn {
    pub id: Option<i64>,
    pub coach_id: Option<i64>,
    pub client_id: Option<i64>,
    pub status: Option<String>,
    pub effort_rating: Option<String>,
    pub pain_blockers: Option<String>,
    pub client_feeling: Option<String>,
    pub client_responded_at: Option<NaiveDateTime>,
    pub coach_feedback: Option<String>,
    pub plan_adjustment: Option<bool>,
    pub coach_responded_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbCheckIn> for CheckIn {
    fn from(db: DbCheckIn) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            coach_id: db.coach_id.unwrap_or_default(),
            client_id: db.client_id.unwrap_or_default(),
            status: db
                .status
                .as_deref()
                .and_then(CheckInStatus::from_str)
                .unwrap_or(CheckInStatus::Pending),
            effort_rating: db.effort_rating.as_deref().and_then(EffortRating::from_str),
            pain_blockers: db.pain_blockers,
            client_feeling: db.client_feeling,
            client_responded_at: db.client_responded_at.map(to_utc),
            coach_feedback: db.coach_feedback,
            plan_adjustment: db.plan_adjustment.unwrap_or_default(),
            coach_responded_at: db.coach_responded_at.map(to_utc),
            completed_at: db.completed_at.map(to_utc),
            created_at: db.created_at.map(to_utc).unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Serialize, Clone)]
pub struct CheckInSchedule {
    pub id: i64,
    pub coach_id: i64,
    pub client_id: i64,
    pub status: ScheduleStatus,
    pub cadence_days: i64,
    pub anchor_date: NaiveDate,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbCheckInSchedule {
    pub id: Option<i64>,
    pub coach_id: Option<i64>,
    pub client_id: Option<i64>,
    pub status: Option<String>,
    pub cadence_days: Option<i64>,
    pub anchor_date: Option<NaiveDate>,
}

impl From<DbCheckInSchedule> for CheckInSchedule {
    fn from(db: DbCheckInSchedule) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            coach_id: db.coach_id.unwrap_or_default(),
            client_id: db.client_id.unwrap_or_default(),
            status: db
                .status
                .as_deref()
                .and_then(ScheduleStatus::from_str)
                .unwrap_or(ScheduleStatus::Active),
            cadence_days: db.cadence_days.unwrap_or(7),
            anchor_date: db.anchor_date.unwrap_or_default(),
        }
    }
}
