#[macro_use]
extern crate rocket;

mod adherence;
mod api;
mod auth;
mod calendar;
mod checkins;
mod database;
mod db;
mod env;
mod error;
mod models;
mod telemetry;
mod validation;
mod workouts;

#[cfg(test)]
mod test;

use api::{
    api_apply_set_writes, api_assign_plan, api_checkin_client_respond, api_checkin_coach_respond,
    api_checkins_due, api_coach_clients, api_coach_worklist, api_create_checkin_schedule,
    api_finish_workout, api_flag_exercise, api_get_current_week, api_get_session, api_get_week,
    api_initiate_checkin, api_login, api_logout, api_me, api_me_unauthorized, api_register_user,
    api_set_schedule_status, api_start_workout, api_toggle_set, health,
};
use auth::{forbidden_api, unauthorized_api};
use database::{CURRENT_SCHEMA, migrate_database_declaratively};
use db::clean_expired_sessions;
use rocket::{Build, Rocket, tokio};
use telemetry::TelemetryFairing;
use telemetry::init_tracing;

use sqlx::SqlitePool;
use tracing::{error, info};

#[launch]
async fn rocket() -> _ {
    if let Err(e) = env::load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }

    init_tracing();

    let database_url = std::env::var("DATABASE_URL").unwrap_or_default();

    let pool = SqlitePool::connect(&database_url)
        .await
        .expect("Failed to connect to SQLite database");

    let pool_clone = pool.clone();

    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool_clone).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });

    info!("Running database migrations...");
    match migrate_database_declaratively(pool.clone(), CURRENT_SCHEMA, false).await {
        Ok(changed) => {
            if changed {
                info!("Migrations applied schema changes");
            } else {
                info!("Schema already up to date");
            }
        }
        Err(e) => {
            error!("Failed to run migrations: {}", e);
            panic!("Database migration failed: {}", e);
        }
    }

    init_rocket(pool).await
}

pub async fn init_rocket(pool: SqlitePool) -> Rocket<Build> {
    info!("Starting training tracker");

    rocket::build()
        .manage(pool)
        .mount(
            "/api",
            routes![
                api_login,
                api_logout,
                api_me,
                api_me_unauthorized,
                api_register_user,
                api_get_current_week,
                api_get_week,
                api_get_session,
                api_start_workout,
                api_toggle_set,
                api_apply_set_writes,
                api_flag_exercise,
                api_finish_workout,
                api_initiate_checkin,
                api_checkin_client_respond,
                api_checkin_coach_respond,
                api_checkins_due,
                api_create_checkin_schedule,
                api_set_schedule_status,
                api_coach_worklist,
                api_coach_clients,
                api_assign_plan,
            ],
        )
        .register("/api", catchers![unauthorized_api, forbidden_api])
        .mount("/api", routes![health])
        .attach(TelemetryFairing)
        .attach(rocket::fairing::AdHoc::on_shutdown("Telemetry", |_| {
            Box::pin(async {
                telemetry::shutdown_telemetry();
            })
        }))
}
