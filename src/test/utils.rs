use crate::auth::Role;
use crate::database::{CURRENT_SCHEMA, migrate_database_declaratively};
use crate::db::{
    assign_plan_to_client, create_coach_client, create_exercise, create_plan, create_plan_day,
    create_plan_week, create_scheduled_exercise, create_user,
};
use crate::error::AppError;
use chrono::NaiveDate;
use rocket::http::ContentType;
use rocket::local::asynchronous::Client;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::sync::Once;

static INIT: Once = Once::new();
static STANDARD_PASSWORD: &str = "password123";

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

#[derive(Default)]
pub struct TestDbBuilder {
    users: Vec<TestUser>,
    relationships: Vec<(String, String)>,
    plans: Vec<TestPlan>,
    weeks: Vec<TestWeek>,
    exercises: Vec<TestExercise>,
    assignments: Vec<(String, String, NaiveDate)>,
    schedules: Vec<(String, String, NaiveDate)>,
}

pub struct TestUser {
    pub username: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub password: String,
}

pub struct TestPlan {
    pub name: String,
    pub coach_username: String,
    pub duration_weeks: i64,
    pub workouts_per_week: Option<i64>,
}

pub struct TestWeek {
    pub plan_name: String,
    pub week_number: i64,
    pub workout_days: Vec<i64>,
}

pub struct TestExercise {
    pub plan_name: String,
    pub week_number: i64,
    pub day_number: i64,
    pub exercise_name: String,
    pub sets: i64,
    pub reps: i64,
}

impl TestDbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(mut self, username: &str, display_name: Option<&str>) -> Self {
        self.users.push(TestUser {
            username: username.to_string(),
            display_name: display_name.map(String::from),
            role: Role::Client,
            password: STANDARD_PASSWORD.to_string(),
        });
        self
    }

    pub fn coach(mut self, username: &str, display_name: Option<&str>) -> Self {
        self.users.push(TestUser {
            username: username.to_string(),
            display_name: display_name.map(String::from),
            role: Role::Coach,
            password: STANDARD_PASSWORD.to_string(),
        });
        self
    }

    pub fn relationship(mut self, coach_username: &str, client_username: &str) -> Self {
        self.relationships
            .push((coach_username.to_string(), client_username.to_string()));
        self
    }

    pub fn plan(
        mut self,
        name: &str,
        coach_username: &str,
        duration_weeks: i64,
        workouts_per_week: Option<i64>,
    ) -> Self {
        self.plans.push(TestPlan {
            name: name.to_string(),
            coach_username: coach_username.to_string(),
            duration_weeks,
            workouts_per_week,
        });
        self
    }

    /// Adds one 7-slot template week; `workout_days` are the non-rest
    /// slots, everything else becomes a rest day.
    pub fn week(mut self, plan_name: &str, week_number: i64, workout_days: &[i64]) -> Self {
        self.weeks.push(TestWeek {
            plan_name: plan_name.to_string(),
            week_number,
            workout_days: workout_days.to_vec(),
        });
        self
    }

    pub fn exercise(
        mut self,
        plan_name: &str,
        week_number: i64,
        day_number: i64,
        exercise_name: &str,
        sets: i64,
        reps: i64,
    ) -> Self {
        self.exercises.push(TestExercise {
            plan_name: plan_name.to_string(),
            week_number,
            day_number,
            exercise_name: exercise_name.to_string(),
            sets,
            reps,
        });
        self
    }

    pub fn assign_plan(
        mut self,
        client_username: &str,
        plan_name: &str,
        start_date: NaiveDate,
    ) -> Self {
        self.assignments.push((
            client_username.to_string(),
            plan_name.to_string(),
            start_date,
        ));
        self
    }

    pub fn schedule(
        mut self,
        coach_username: &str,
        client_username: &str,
        anchor_date: NaiveDate,
    ) -> Self {
        self.schedules.push((
            coach_username.to_string(),
            client_username.to_string(),
            anchor_date,
        ));
        self
    }

    pub async fn build(self) -> Result<TestDb, AppError> {
        INIT.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });

        // One connection, or every pooled checkout would see its own
        // private in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        migrate_database_declaratively(pool.clone(), CURRENT_SCHEMA, false).await?;

        let mut user_id_map: HashMap<String, i64> = HashMap::new();
        let mut plan_id_map: HashMap<String, i64> = HashMap::new();
        let mut week_id_map: HashMap<(String, i64), i64> = HashMap::new();
        let mut day_id_map: HashMap<(String, i64, i64), i64> = HashMap::new();
        let mut library_map: HashMap<String, i64> = HashMap::new();
        let mut scheduled_map: HashMap<(String, i64, i64, String), i64> = HashMap::new();
        let mut order_counters: HashMap<(String, i64, i64), i64> = HashMap::new();

        for user in &self.users {
            let user_id = create_user(
                &pool,
                &user.username,
                &user.password,
                user.role.as_str(),
                user.display_name.as_deref(),
            )
            .await?;

            user_id_map.insert(user.username.clone(), user_id);
        }

        for (coach, client) in &self.relationships {
            let coach_id = user_id_map[coach];
            let client_id = user_id_map[client];
            create_coach_client(&pool, coach_id, client_id).await?;
        }

        for plan in &self.plans {
            let coach_id = user_id_map[&plan.coach_username];
            let plan_id = create_plan(
                &pool,
                coach_id,
                &plan.name,
                plan.duration_weeks,
                plan.workouts_per_week,
            )
            .await?;
            plan_id_map.insert(plan.name.clone(), plan_id);
        }

        for week in &self.weeks {
            let plan_id = plan_id_map[&week.plan_name];
            let week_id = create_plan_week(&pool, plan_id, week.week_number).await?;
            week_id_map.insert((week.plan_name.clone(), week.week_number), week_id);

            for day_number in 1..=7 {
                let is_rest = !week.workout_days.contains(&day_number);
                let day_id = create_plan_day(&pool, week_id, day_number, is_rest, None).await?;
                day_id_map.insert(
                    (week.plan_name.clone(), week.week_number, day_number),
                    day_id,
                );
            }
        }

        for exercise in &self.exercises {
            let day_key = (
                exercise.plan_name.clone(),
                exercise.week_number,
                exercise.day_number,
            );
            let day_id = day_id_map[&day_key];

            let exercise_id = match library_map.get(&exercise.exercise_name) {
                Some(id) => *id,
                None => {
                    let id = create_exercise(&pool, &exercise.exercise_name, None).await?;
                    library_map.insert(exercise.exercise_name.clone(), id);
                    id
                }
            };

            let order = order_counters.entry(day_key.clone()).or_insert(0);
            let scheduled_id = create_scheduled_exercise(
                &pool,
                day_id,
                exercise_id,
                *order,
                exercise.sets,
                exercise.reps,
                None,
                None,
            )
            .await?;
            *order += 1;

            scheduled_map.insert(
                (
                    exercise.plan_name.clone(),
                    exercise.week_number,
                    exercise.day_number,
                    exercise.exercise_name.clone(),
                ),
                scheduled_id,
            );
        }

        for (client, plan_name, start_date) in &self.assignments {
            let client_id = user_id_map[client];
            let plan_id = plan_id_map[plan_name];
            assign_plan_to_client(&pool, client_id, plan_id, *start_date).await?;
        }

        for (coach, client, anchor) in &self.schedules {
            let coach_id = user_id_map[coach];
            let client_id = user_id_map[client];
            crate::checkins::create_checkin_schedule(&pool, coach_id, client_id, *anchor).await?;
        }

        Ok(TestDb {
            pool,
            user_id_map,
            plan_id_map,
            day_id_map,
            scheduled_map,
        })
    }
}

pub struct TestDb {
    pub pool: Pool<Sqlite>,
    pub user_id_map: HashMap<String, i64>,
    pub plan_id_map: HashMap<String, i64>,
    pub day_id_map: HashMap<(String, i64, i64), i64>,
    pub scheduled_map: HashMap<(String, i64, i64, String), i64>,
}

impl TestDb {
    pub fn user_id(&self, username: &str) -> Option<i64> {
        self.user_id_map.get(username).copied()
    }

    pub fn plan_id(&self, name: &str) -> Option<i64> {
        self.plan_id_map.get(name).copied()
    }

    pub fn day_id(&self, plan_name: &str, week_number: i64, day_number: i64) -> Option<i64> {
        self.day_id_map
            .get(&(plan_name.to_string(), week_number, day_number))
            .copied()
    }

    pub fn scheduled_exercise_id(
        &self,
        plan_name: &str,
        week_number: i64,
        day_number: i64,
        exercise_name: &str,
    ) -> Option<i64> {
        self.scheduled_map
            .get(&(
                plan_name.to_string(),
                week_number,
                day_number,
                exercise_name.to_string(),
            ))
            .copied()
    }
}

/// The 1-7 Monday-start slot `date` falls on.
pub fn weekday_slot(date: NaiveDate) -> i64 {
    use chrono::Datelike;
    date.weekday().num_days_from_monday() as i64 + 1
}

/// Coach + client pair with a one-week plan assigned from this week's
/// Monday, so "today" always lands in week 1.
pub async fn create_standard_test_db() -> TestDb {
    let today = chrono::Utc::now().date_naive();
    let monday = crate::calendar::start_monday(today);

    TestDbBuilder::new()
        .coach("coach_user", Some("Coach User"))
        .client("client_user", Some("Client User"))
        .relationship("coach_user", "client_user")
        .plan("Base Strength", "coach_user", 1, None)
        .week("Base Strength", 1, &[1, 2, 3, 4, 5, 6, 7])
        .exercise("Base Strength", 1, weekday_slot(today), "Back Squat", 3, 5)
        .assign_plan("client_user", "Base Strength", monday)
        .schedule("coach_user", "client_user", monday)
        .build()
        .await
        .expect("Failed to build test database")
}

pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
    let rocket = crate::init_rocket(test_db.pool.clone()).await;
    let client = Client::tracked(rocket)
        .await
        .expect("Failed to build test client");
    (client, test_db)
}

/// Logs in through the API; the tracked client keeps the session cookies.
pub async fn login_test_user(client: &Client, username: &str, password: &str) {
    let response = client
        .post("/api/login")
        .header(ContentType::JSON)
        .body(
            json!({
                "username": username,
                "password": password,
            })
            .to_string(),
        )
        .dispatch()
        .await;

    assert_eq!(response.status(), rocket::http::Status::Ok);
}
