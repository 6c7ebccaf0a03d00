#[cfg(test)]
mod tests {
    use crate::db::{assign_plan_to_client, clear_client_plan, get_client_profile};
    use crate::error::AppError;
    use crate::test::utils::{TestDbBuilder, date};
    use rocket::tokio;

    #[tokio::test]
    async fn test_plan_and_start_date_move_together() {
        let test_db = TestDbBuilder::new()
            .coach("coach_user", None)
            .client("client_user", None)
            .relationship("coach_user", "client_user")
            .plan("Linear Progression", "coach_user", 4, None)
            .build()
            .await
            .expect("Failed to build test database");

        let client_id = test_db.user_id("client_user").unwrap();
        let plan_id = test_db.plan_id("Linear Progression").unwrap();

        // Nothing assigned yet: both fields are empty
        let profile = get_client_profile(&test_db.pool, client_id).await.unwrap();
        assert!(profile.active_plan_id.is_none());
        assert!(profile.plan_start_date.is_none());

        assign_plan_to_client(&test_db.pool, client_id, plan_id, date(2025, 3, 3))
            .await
            .expect("Failed to assign plan");

        let profile = get_client_profile(&test_db.pool, client_id).await.unwrap();
        assert_eq!(profile.active_plan_id, Some(plan_id));
        assert_eq!(profile.plan_start_date, Some(date(2025, 3, 3)));

        // Re-assigning replaces both fields at once
        assign_plan_to_client(&test_db.pool, client_id, plan_id, date(2025, 4, 7))
            .await
            .expect("Failed to re-assign plan");

        let profile = get_client_profile(&test_db.pool, client_id).await.unwrap();
        assert_eq!(profile.plan_start_date, Some(date(2025, 4, 7)));

        clear_client_plan(&test_db.pool, client_id)
            .await
            .expect("Failed to clear plan");

        let profile = get_client_profile(&test_db.pool, client_id).await.unwrap();
        assert!(profile.active_plan_id.is_none());
        assert!(profile.plan_start_date.is_none());
    }

    #[tokio::test]
    async fn test_assign_unknown_plan() {
        let test_db = TestDbBuilder::new()
            .client("client_user", None)
            .build()
            .await
            .expect("Failed to build test database");

        let client_id = test_db.user_id("client_user").unwrap();

        let result = assign_plan_to_client(&test_db.pool, client_id, 424242, date(2025, 3, 3)).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
