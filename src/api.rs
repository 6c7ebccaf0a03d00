use chrono::{NaiveDate, Utc};
use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::adherence::{WorklistEntry, coach_worklist};
use crate::auth::{Permission, User, UserSession};
use crate::calendar::{self, DayInfo, DaySlot, WeekProgress};
use crate::checkins::{
    ClientResponse, CoachResponse, checkin_due, client_respond, coach_respond,
    create_checkin_schedule, initiate_checkin, set_schedule_status,
};
use crate::db::{
    assign_plan_to_client, authenticate_user, create_coach_client, create_user,
    create_user_session, find_user_by_username, get_client_profile, get_clients_for_coach,
    get_coaches_for_client, get_plan, get_week_days, invalidate_session,
    require_active_relationship,
};
use crate::error::AppError;
use crate::models::{CheckIn, EffortRating, ScheduleStatus, WorkoutCompletion};
use crate::validation::{AppErrorExt, JsonValidateExt, ValidationResponse};
use crate::workouts::{
    SessionState, SetWrite, apply_set_writes, completed_day_ids, finish_workout, session_state,
    start_workout, toggle_flag, toggle_set,
};

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<UserData>,
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UserData {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub role: String,
    pub archived: bool,
}

impl From<User> for UserData {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            role: user.role.to_string(),
            archived: user.archived,
        }
    }
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &rocket::http::CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<LoginResponse>, Custom<Json<ValidationResponse>>> {
    use rocket::http::{Cookie, SameSite};

    let validated = login.validate_custom()?;

    match authenticate_user(db, &validated.username, &validated.password)
        .await
        .validate_custom()?
    {
        Some(user) => {
            let token = UserSession::generate_token();
            let expires_at = Utc::now() + chrono::Duration::hours(1);

            create_user_session(db, user.id, &token, expires_at.naive_utc())
                .await
                .validate_custom()?;

            let cookie = Cookie::build(("session_token", token))
                .same_site(SameSite::Lax)
                .http_only(true)
                .max_age(rocket::time::Duration::hours(1));
            cookies.add_private(cookie);

            cookies.add_private(
                Cookie::build(("user_id", user.id.to_string()))
                    .same_site(SameSite::Lax)
                    .http_only(true)
                    .max_age(rocket::time::Duration::hours(1)),
            );

            cookies.add_private(
                Cookie::build(("user_role", user.role.to_string()))
                    .same_site(SameSite::Lax)
                    .max_age(rocket::time::Duration::hours(1)),
            );

            Ok(Json(LoginResponse {
                success: true,
                user: Some(UserData::from(user)),
                error: None,
            }))
        }
        None => Ok(Json(LoginResponse {
            success: false,
            user: None,
            error: Some("Invalid username or password".to_string()),
        })),
    }
}

#[post("/logout")]
pub async fn api_logout(
    cookies: &rocket::http::CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Status {
    let token = cookies
        .get_private("session_token")
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        let _ = invalidate_session(db, &token).await;
    }

    cookies.remove_private(rocket::http::Cookie::build("session_token"));
    cookies.remove_private(rocket::http::Cookie::build("user_id"));
    cookies.remove_private(rocket::http::Cookie::build("user_role"));

    Status::Ok
}

#[get("/me")]
pub async fn api_me(user: User) -> Json<UserData> {
    Json(UserData::from(user))
}

#[get("/me", rank = 2)]
pub async fn api_me_unauthorized() -> Status {
    Status::Unauthorized
}

#[derive(Deserialize, Validate, Clone)]
pub struct UserRegistrationRequest {
    #[validate(length(min = 3, message = "Username must be at least 3 characters"))]
    username: String,
    display_name: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    password: String,
    role: String,
}

#[post("/register", data = "<registration>")]
pub async fn api_register_user(
    registration: Json<UserRegistrationRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    let validated = registration.validate_custom()?;

    let existing_user = find_user_by_username(db, &validated.username)
        .await
        .validate_custom()?;

    if existing_user.is_some() {
        return Err(Custom(
            Status::Conflict,
            Json(ValidationResponse::with_error(
                "username",
                "Username already exists",
            )),
        ));
    }

    match validated.role.as_str() {
        "admin" => user
            .require_all_permissions(&[Permission::EditUserRoles, Permission::RegisterUsers])
            .validate_custom()?,
        _ => user
            .require_permission(Permission::RegisterUsers)
            .validate_custom()?,
    };

    let new_user_id = create_user(
        db,
        &validated.username,
        &validated.password,
        &validated.role,
        Some(&validated.display_name),
    )
    .await
    .validate_custom()?;

    // A coach registering a client takes them on immediately.
    if validated.role == "client" && user.role.as_str() == "coach" {
        create_coach_client(db, user.id, new_user_id)
            .await
            .validate_custom()?;
    }

    Ok(Status::Created)
}

#[derive(Serialize, Deserialize)]
pub struct WeekResponse {
    pub week_number: i64,
    pub current_week: i64,
    pub duration_weeks: i64,
    pub days: Vec<DayInfo>,
    pub progress: WeekProgress,
}

async fn require_client_visible(
    db: &Pool<Sqlite>,
    user: &User,
    client_id: i64,
) -> Result<(), Status> {
    if user.id == client_id {
        return Ok(());
    }
    user.require_permission(Permission::ViewAllClients)?;
    require_active_relationship(db, user.id, client_id)
        .await
        .map_err(Status::from)
}

async fn build_week_response(
    db: &Pool<Sqlite>,
    client_id: i64,
    requested_week: Option<i64>,
) -> Result<WeekResponse, AppError> {
    let profile = get_client_profile(db, client_id).await?;
    let (Some(plan_id), Some(plan_start)) = (profile.active_plan_id, profile.plan_start_date)
    else {
        return Err(AppError::NotFound("Client has no active plan".to_string()));
    };

    let plan = get_plan(db, plan_id).await?;
    let today = Utc::now().date_naive();
    let current_week = calendar::current_week_number(plan_start, plan.duration_weeks, today);

    let week_number = requested_week.unwrap_or(current_week);
    if !(1..=plan.duration_weeks).contains(&week_number) {
        return Err(AppError::NotFound(format!(
            "Week {} is not part of this plan",
            week_number
        )));
    }

    let slots: Vec<DaySlot> = get_week_days(db, plan_id, week_number)
        .await?
        .into_iter()
        .map(|day| DaySlot {
            day_id: day.id,
            day_number: day.day_number,
            is_rest_day: day.is_rest_day,
            name: day.name,
        })
        .collect();

    let completed = completed_day_ids(db, client_id, plan_id).await?;
    let days = calendar::week_days(plan_start, week_number, &slots, &completed, today);
    let progress = calendar::week_progress(&days);

    Ok(WeekResponse {
        week_number,
        current_week,
        duration_weeks: plan.duration_weeks,
        days,
        progress,
    })
}

#[get("/clients/<id>/week/current")]
pub async fn api_get_current_week(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<WeekResponse>, Status> {
    require_client_visible(db, &user, id).await?;
    Ok(Json(build_week_response(db, id, None).await?))
}

#[get("/clients/<id>/week/<week_number>", rank = 2)]
pub async fn api_get_week(
    id: i64,
    week_number: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<WeekResponse>, Status> {
    require_client_visible(db, &user, id).await?;
    Ok(Json(build_week_response(db, id, Some(week_number)).await?))
}

#[get("/days/<day_id>/session")]
pub async fn api_get_session(
    day_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SessionState>, Status> {
    user.require_permission(Permission::ViewOwnPlan)?;
    Ok(Json(session_state(db, user.id, day_id).await?))
}

#[derive(Deserialize)]
pub struct StartWorkoutRequest {
    day_id: i64,
}

#[post("/workouts/start", data = "<request>")]
pub async fn api_start_workout(
    request: Json<StartWorkoutRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<WorkoutCompletion>, Status> {
    user.require_permission(Permission::LogWorkouts)?;

    let completion = start_workout(db, user.id, request.day_id).await?;
    Ok(Json(completion))
}

#[derive(Deserialize)]
pub struct ToggleSetRequest {
    scheduled_exercise_id: i64,
    set_number: i64,
    actual_weight: Option<f64>,
    actual_reps: Option<i64>,
}

#[post("/workouts/<id>/sets/toggle", data = "<request>")]
pub async fn api_toggle_set(
    id: i64,
    request: Json<ToggleSetRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<crate::models::SetCompletion>, Status> {
    user.require_permission(Permission::LogWorkouts)?;

    let set = toggle_set(
        db,
        user.id,
        id,
        request.scheduled_exercise_id,
        request.set_number,
        request.actual_weight,
        request.actual_reps,
    )
    .await?;

    Ok(Json(set))
}

#[derive(Deserialize)]
pub struct SetWritesRequest {
    writes: Vec<SetWrite>,
}

#[put("/workouts/<id>/sets", data = "<request>")]
pub async fn api_apply_set_writes(
    id: i64,
    request: Json<SetWritesRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Status> {
    user.require_permission(Permission::LogWorkouts)?;

    apply_set_writes(db, user.id, id, &request.writes).await?;
    Ok(Status::Ok)
}

#[derive(Deserialize)]
pub struct FlagRequest {
    scheduled_exercise_id: i64,
    note: Option<String>,
}

#[post("/workouts/<id>/flags", data = "<request>")]
pub async fn api_flag_exercise(
    id: i64,
    request: Json<FlagRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<crate::models::ExerciseFlag>, Status> {
    user.require_permission(Permission::LogWorkouts)?;

    let flag = toggle_flag(
        db,
        user.id,
        id,
        request.scheduled_exercise_id,
        request.note.as_deref(),
    )
    .await?;

    Ok(Json(flag))
}

#[derive(Deserialize)]
pub struct FinishWorkoutRequest {
    effort_rating: Option<EffortRating>,
}

#[post("/workouts/<id>/finish", data = "<request>")]
pub async fn api_finish_workout(
    id: i64,
    request: Json<FinishWorkoutRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<WorkoutCompletion>, Status> {
    user.require_permission(Permission::LogWorkouts)?;

    let completion = finish_workout(db, user.id, id, request.effort_rating).await?;
    Ok(Json(completion))
}

#[derive(Deserialize)]
pub struct InitiateCheckInRequest {
    client_id: i64,
}

#[post("/checkins", data = "<request>")]
pub async fn api_initiate_checkin(
    request: Json<InitiateCheckInRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<CheckIn>, Status> {
    user.require_permission(Permission::InitiateCheckIns)?;

    let checkin = initiate_checkin(db, user.id, request.client_id).await?;
    Ok(Json(checkin))
}

#[put("/checkins/<id>/client-response", data = "<request>")]
pub async fn api_checkin_client_respond(
    id: i64,
    request: Json<ClientResponse>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<CheckIn>, Status> {
    user.require_permission(Permission::RespondCheckIns)?;

    let checkin = client_respond(db, user.id, id, &request).await?;
    Ok(Json(checkin))
}

#[put("/checkins/<id>/coach-response", data = "<request>")]
pub async fn api_checkin_coach_respond(
    id: i64,
    request: Json<CoachResponse>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<CheckIn>, Status> {
    user.require_permission(Permission::ReviewCheckIns)?;

    let checkin = coach_respond(db, user.id, id, &request).await?;
    Ok(Json(checkin))
}

#[derive(Serialize)]
pub struct CheckInDueEntry {
    pub coach_id: i64,
    pub due: bool,
}

/// A client polls this at session start; it never creates anything.
#[get("/checkins/due")]
pub async fn api_checkins_due(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<CheckInDueEntry>>, Status> {
    let today = Utc::now().date_naive();
    let mut entries = Vec::new();

    for coach_id in get_coaches_for_client(db, user.id).await? {
        let due = checkin_due(db, coach_id, user.id, today).await?;
        entries.push(CheckInDueEntry { coach_id, due });
    }

    Ok(Json(entries))
}

#[derive(Deserialize)]
pub struct CreateScheduleRequest {
    client_id: i64,
    anchor_date: NaiveDate,
}

#[post("/checkins/schedule", data = "<request>")]
pub async fn api_create_checkin_schedule(
    request: Json<CreateScheduleRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<crate::models::CheckInSchedule>, Status> {
    user.require_permission(Permission::InitiateCheckIns)?;

    let schedule = create_checkin_schedule(db, user.id, request.client_id, request.anchor_date)
        .await?;
    Ok(Json(schedule))
}

#[derive(Deserialize)]
pub struct ScheduleStatusRequest {
    client_id: i64,
    status: ScheduleStatus,
}

#[put("/checkins/schedule/status", data = "<request>")]
pub async fn api_set_schedule_status(
    request: Json<ScheduleStatusRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Status> {
    user.require_permission(Permission::InitiateCheckIns)?;

    set_schedule_status(db, user.id, request.client_id, request.status).await?;
    Ok(Status::Ok)
}

#[derive(Serialize)]
pub struct WorklistResponse {
    pub clients: Vec<WorklistEntry>,
    pub can_assign_plans: bool,
    pub can_initiate_checkins: bool,
}

#[get("/coach/worklist")]
pub async fn api_coach_worklist(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<WorklistResponse>, Status> {
    user.require_permission(Permission::ViewAllClients)?;

    let now = Utc::now();
    let clients = coach_worklist(db, user.id, now.date_naive(), now).await?;
    Ok(Json(WorklistResponse {
        clients,
        can_assign_plans: user.has_permission(Permission::AssignPlans),
        can_initiate_checkins: user.has_permission(Permission::InitiateCheckIns),
    }))
}

#[get("/coach/clients")]
pub async fn api_coach_clients(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<UserData>>, Status> {
    user.require_permission(Permission::ViewAllClients)?;

    let clients = get_clients_for_coach(db, user.id).await?;
    Ok(Json(clients.into_iter().map(UserData::from).collect()))
}

#[derive(Deserialize)]
pub struct AssignPlanRequest {
    plan_id: i64,
    start_date: NaiveDate,
}

#[put("/clients/<id>/plan", data = "<request>")]
pub async fn api_assign_plan(
    id: i64,
    request: Json<AssignPlanRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Status> {
    user.require_permission(Permission::AssignPlans)?;
    require_active_relationship(db, user.id, id)
        .await
        .map_err(Status::from)?;

    assign_plan_to_client(db, id, request.plan_id, request.start_date).await?;
    Ok(Status::Ok)
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}
