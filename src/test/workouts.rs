#[cfg(test)]
mod tests {
    use crate::error::AppError;
    use crate::models::{CompletionStatus, EffortRating};
    use crate::test::utils::{TestDb, TestDbBuilder, date};
    use crate::workouts::{
        SessionState, SetWrite, SetWriteBuffer, apply_set_writes, finish_workout,
        get_set_completions, session_state, start_workout, toggle_flag, toggle_set,
    };
    use rocket::tokio;
    use std::time::Duration;

    async fn build_workout_db() -> TestDb {
        let today = chrono::Utc::now().date_naive();
        let monday = crate::calendar::start_monday(today);

        TestDbBuilder::new()
            .coach("coach_user", Some("Coach User"))
            .client("client_user", None)
            .relationship("coach_user", "client_user")
            .plan("Hypertrophy Block", "coach_user", 2, None)
            .week("Hypertrophy Block", 1, &[1, 3, 5])
            .week("Hypertrophy Block", 2, &[1, 3, 5])
            .exercise("Hypertrophy Block", 1, 1, "Back Squat", 3, 5)
            .exercise("Hypertrophy Block", 1, 1, "Bench Press", 2, 8)
            .assign_plan("client_user", "Hypertrophy Block", monday)
            .build()
            .await
            .expect("Failed to build test database")
    }

    #[tokio::test]
    async fn test_start_creates_all_set_rows() {
        let test_db = build_workout_db().await;
        let client_id = test_db.user_id("client_user").unwrap();
        let day_id = test_db.day_id("Hypertrophy Block", 1, 1).unwrap();

        let completion = start_workout(&test_db.pool, client_id, day_id)
            .await
            .expect("Failed to start workout");

        assert_eq!(completion.status, CompletionStatus::InProgress);
        assert_eq!(completion.exercises_total, 2);
        assert_eq!(completion.exercises_done, 0);
        assert_eq!(completion.completion_pct, 0.0);
        assert!(completion.completed_at.is_none());

        let sets = get_set_completions(&test_db.pool, completion.id)
            .await
            .expect("Failed to fetch sets");

        // 3 squat sets + 2 bench sets, all pre-created unticked
        assert_eq!(sets.len(), 5);
        assert!(sets.iter().all(|s| !s.completed));
        assert!(sets.iter().all(|s| s.completed_at.is_none()));
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let test_db = build_workout_db().await;
        let client_id = test_db.user_id("client_user").unwrap();
        let day_id = test_db.day_id("Hypertrophy Block", 1, 1).unwrap();

        let first = start_workout(&test_db.pool, client_id, day_id)
            .await
            .expect("Failed to start workout");
        let second = start_workout(&test_db.pool, client_id, day_id)
            .await
            .expect("Second start should not error");

        assert_eq!(first.id, second.id);

        let sets = get_set_completions(&test_db.pool, first.id).await.unwrap();
        assert_eq!(sets.len(), 5, "set rows must be created exactly once");
    }

    #[tokio::test]
    async fn test_start_rejects_foreign_day() {
        let test_db = build_workout_db().await;
        let client_id = test_db.user_id("client_user").unwrap();

        let result = start_workout(&test_db.pool, client_id, 9999).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_start_rejects_rest_day() {
        let test_db = build_workout_db().await;
        let client_id = test_db.user_id("client_user").unwrap();
        let rest_day = test_db.day_id("Hypertrophy Block", 1, 2).unwrap();

        let result = start_workout(&test_db.pool, client_id, rest_day).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_toggle_set_is_its_own_inverse() {
        let test_db = build_workout_db().await;
        let client_id = test_db.user_id("client_user").unwrap();
        let day_id = test_db.day_id("Hypertrophy Block", 1, 1).unwrap();
        let squat = test_db
            .scheduled_exercise_id("Hypertrophy Block", 1, 1, "Back Squat")
            .unwrap();

        let completion = start_workout(&test_db.pool, client_id, day_id).await.unwrap();

        let set = toggle_set(
            &test_db.pool,
            client_id,
            completion.id,
            squat,
            1,
            Some(102.5),
            Some(5),
        )
        .await
        .expect("Failed to toggle set on");

        assert!(set.completed);
        assert_eq!(set.actual_weight, Some(102.5));
        assert_eq!(set.actual_reps, Some(5));
        assert!(set.completed_at.is_some());

        let set = toggle_set(&test_db.pool, client_id, completion.id, squat, 1, None, None)
            .await
            .expect("Failed to toggle set off");

        assert!(!set.completed);
        assert_eq!(set.actual_weight, None);
        assert_eq!(set.actual_reps, None);
        assert!(set.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_toggle_set_rejects_bad_input() {
        let test_db = build_workout_db().await;
        let client_id = test_db.user_id("client_user").unwrap();
        let day_id = test_db.day_id("Hypertrophy Block", 1, 1).unwrap();
        let squat = test_db
            .scheduled_exercise_id("Hypertrophy Block", 1, 1, "Back Squat")
            .unwrap();

        let completion = start_workout(&test_db.pool, client_id, day_id).await.unwrap();

        let result =
            toggle_set(&test_db.pool, client_id, completion.id, squat, 0, None, None).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        // Set 4 of a 3-set prescription was never pre-created
        let result =
            toggle_set(&test_db.pool, client_id, completion.id, squat, 4, None, None).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_toggle_set_forbidden_after_finish() {
        let test_db = build_workout_db().await;
        let client_id = test_db.user_id("client_user").unwrap();
        let day_id = test_db.day_id("Hypertrophy Block", 1, 1).unwrap();
        let squat = test_db
            .scheduled_exercise_id("Hypertrophy Block", 1, 1, "Back Squat")
            .unwrap();

        let completion = start_workout(&test_db.pool, client_id, day_id).await.unwrap();
        finish_workout(&test_db.pool, client_id, completion.id, None)
            .await
            .unwrap();

        let result =
            toggle_set(&test_db.pool, client_id, completion.id, squat, 1, None, None).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_batch_writes_latest_state_wins() {
        let test_db = build_workout_db().await;
        let client_id = test_db.user_id("client_user").unwrap();
        let day_id = test_db.day_id("Hypertrophy Block", 1, 1).unwrap();
        let squat = test_db
            .scheduled_exercise_id("Hypertrophy Block", 1, 1, "Back Squat")
            .unwrap();
        let bench = test_db
            .scheduled_exercise_id("Hypertrophy Block", 1, 1, "Bench Press")
            .unwrap();

        let completion = start_workout(&test_db.pool, client_id, day_id).await.unwrap();

        // The same set toggled on and off in one burst: only the final
        // state may land.
        let writes = vec![
            SetWrite {
                scheduled_exercise_id: squat,
                set_number: 1,
                completed: true,
                actual_weight: Some(100.0),
                actual_reps: Some(5),
            },
            SetWrite {
                scheduled_exercise_id: squat,
                set_number: 1,
                completed: false,
                actual_weight: None,
                actual_reps: None,
            },
            SetWrite {
                scheduled_exercise_id: bench,
                set_number: 2,
                completed: true,
                actual_weight: Some(60.0),
                actual_reps: Some(8),
            },
        ];

        apply_set_writes(&test_db.pool, client_id, completion.id, &writes)
            .await
            .expect("Failed to apply batch");

        let sets = get_set_completions(&test_db.pool, completion.id).await.unwrap();
        let squat_set = sets
            .iter()
            .find(|s| s.scheduled_exercise_id == squat && s.set_number == 1)
            .unwrap();
        let bench_set = sets
            .iter()
            .find(|s| s.scheduled_exercise_id == bench && s.set_number == 2)
            .unwrap();

        assert!(!squat_set.completed);
        assert!(bench_set.completed);
        assert_eq!(bench_set.actual_weight, Some(60.0));
    }

    #[tokio::test]
    async fn test_batch_writes_are_atomic() {
        let test_db = build_workout_db().await;
        let client_id = test_db.user_id("client_user").unwrap();
        let day_id = test_db.day_id("Hypertrophy Block", 1, 1).unwrap();
        let squat = test_db
            .scheduled_exercise_id("Hypertrophy Block", 1, 1, "Back Squat")
            .unwrap();

        let completion = start_workout(&test_db.pool, client_id, day_id).await.unwrap();

        let writes = vec![
            SetWrite {
                scheduled_exercise_id: squat,
                set_number: 1,
                completed: true,
                actual_weight: None,
                actual_reps: None,
            },
            SetWrite {
                scheduled_exercise_id: squat,
                set_number: 9, // does not exist
                completed: true,
                actual_weight: None,
                actual_reps: None,
            },
        ];

        let result = apply_set_writes(&test_db.pool, client_id, completion.id, &writes).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let sets = get_set_completions(&test_db.pool, completion.id).await.unwrap();
        assert!(
            sets.iter().all(|s| !s.completed),
            "a failed batch must not apply partially"
        );
    }

    #[tokio::test]
    async fn test_set_write_buffer_coalesces_and_flushes() {
        let test_db = build_workout_db().await;
        let client_id = test_db.user_id("client_user").unwrap();
        let day_id = test_db.day_id("Hypertrophy Block", 1, 1).unwrap();
        let squat = test_db
            .scheduled_exercise_id("Hypertrophy Block", 1, 1, "Back Squat")
            .unwrap();

        let completion = start_workout(&test_db.pool, client_id, day_id).await.unwrap();

        // Default 500 ms window; the explicit flush below beats the timer
        let buffer = SetWriteBuffer::new(test_db.pool.clone(), client_id, completion.id);

        buffer.queue(SetWrite {
            scheduled_exercise_id: squat,
            set_number: 1,
            completed: true,
            actual_weight: Some(100.0),
            actual_reps: Some(5),
        });
        buffer.queue(SetWrite {
            scheduled_exercise_id: squat,
            set_number: 1,
            completed: true,
            actual_weight: Some(105.0),
            actual_reps: Some(4),
        });

        assert_eq!(buffer.pending_len(), 1, "same set coalesces to one write");

        buffer.flush().await.expect("Flush failed");
        assert_eq!(buffer.pending_len(), 0);

        let sets = get_set_completions(&test_db.pool, completion.id).await.unwrap();
        let squat_set = sets
            .iter()
            .find(|s| s.scheduled_exercise_id == squat && s.set_number == 1)
            .unwrap();
        assert!(squat_set.completed);
        assert_eq!(squat_set.actual_weight, Some(105.0));
    }

    #[tokio::test]
    async fn test_set_write_buffer_fires_on_inactivity() {
        let test_db = build_workout_db().await;
        let client_id = test_db.user_id("client_user").unwrap();
        let day_id = test_db.day_id("Hypertrophy Block", 1, 1).unwrap();
        let squat = test_db
            .scheduled_exercise_id("Hypertrophy Block", 1, 1, "Back Squat")
            .unwrap();

        let completion = start_workout(&test_db.pool, client_id, day_id).await.unwrap();

        let buffer = SetWriteBuffer::with_debounce(
            test_db.pool.clone(),
            client_id,
            completion.id,
            Duration::from_millis(20),
        );

        buffer.queue(SetWrite {
            scheduled_exercise_id: squat,
            set_number: 2,
            completed: true,
            actual_weight: None,
            actual_reps: None,
        });

        tokio::time::sleep(Duration::from_millis(200)).await;

        let sets = get_set_completions(&test_db.pool, completion.id).await.unwrap();
        let squat_set = sets
            .iter()
            .find(|s| s.scheduled_exercise_id == squat && s.set_number == 2)
            .unwrap();
        assert!(squat_set.completed, "timer flush should have landed");
    }

    #[tokio::test]
    async fn test_flag_created_then_updated() {
        let test_db = build_workout_db().await;
        let client_id = test_db.user_id("client_user").unwrap();
        let day_id = test_db.day_id("Hypertrophy Block", 1, 1).unwrap();
        let squat = test_db
            .scheduled_exercise_id("Hypertrophy Block", 1, 1, "Back Squat")
            .unwrap();

        let completion = start_workout(&test_db.pool, client_id, day_id).await.unwrap();

        let flag = toggle_flag(
            &test_db.pool,
            client_id,
            completion.id,
            squat,
            Some("knee pain on rep 3"),
        )
        .await
        .expect("Failed to create flag");

        let updated = toggle_flag(
            &test_db.pool,
            client_id,
            completion.id,
            squat,
            Some("resolved after warmup"),
        )
        .await
        .expect("Failed to update flag");

        assert_eq!(flag.id, updated.id, "one flag per exercise per session");
        assert_eq!(updated.note.as_deref(), Some("resolved after warmup"));
    }

    #[tokio::test]
    async fn test_finish_computes_aggregates() {
        let test_db = build_workout_db().await;
        let client_id = test_db.user_id("client_user").unwrap();
        let day_id = test_db.day_id("Hypertrophy Block", 1, 1).unwrap();
        let squat = test_db
            .scheduled_exercise_id("Hypertrophy Block", 1, 1, "Back Squat")
            .unwrap();
        let bench = test_db
            .scheduled_exercise_id("Hypertrophy Block", 1, 1, "Bench Press")
            .unwrap();

        let completion = start_workout(&test_db.pool, client_id, day_id).await.unwrap();

        // All squat sets, one of two bench sets
        for set_number in 1..=3 {
            toggle_set(
                &test_db.pool,
                client_id,
                completion.id,
                squat,
                set_number,
                None,
                None,
            )
            .await
            .unwrap();
        }
        toggle_set(&test_db.pool, client_id, completion.id, bench, 1, None, None)
            .await
            .unwrap();

        let finished = finish_workout(
            &test_db.pool,
            client_id,
            completion.id,
            Some(EffortRating::Hard),
        )
        .await
        .expect("Failed to finish workout");

        assert_eq!(finished.status, CompletionStatus::Completed);
        assert!((finished.completion_pct - 0.8).abs() < f64::EPSILON);
        // Bench has an unfinished set, so only the squat counts
        assert_eq!(finished.exercises_done, 1);
        assert_eq!(finished.exercises_total, 2);
        assert_eq!(finished.effort_rating, Some(EffortRating::Hard));
        assert!(finished.completed_at.is_some());
        assert!(finished.duration_sec.is_some());
        assert!(finished.duration_sec.unwrap() >= 0);
    }

    #[tokio::test]
    async fn test_finish_with_nothing_done() {
        let test_db = build_workout_db().await;
        let client_id = test_db.user_id("client_user").unwrap();
        let day_id = test_db.day_id("Hypertrophy Block", 1, 1).unwrap();

        let completion = start_workout(&test_db.pool, client_id, day_id).await.unwrap();
        let finished = finish_workout(&test_db.pool, client_id, completion.id, None)
            .await
            .unwrap();

        assert_eq!(finished.completion_pct, 0.0);
        assert_eq!(finished.exercises_done, 0);
        assert!(finished.effort_rating.is_none());
    }

    #[tokio::test]
    async fn test_finish_day_without_exercises() {
        let test_db = build_workout_db().await;
        let client_id = test_db.user_id("client_user").unwrap();
        // Day 3 of week 1 is a workout day with nothing prescribed
        let day_id = test_db.day_id("Hypertrophy Block", 1, 3).unwrap();

        let completion = start_workout(&test_db.pool, client_id, day_id).await.unwrap();
        assert_eq!(completion.exercises_total, 0);

        let finished = finish_workout(&test_db.pool, client_id, completion.id, None)
            .await
            .expect("Zero prescribed sets is not an error");

        assert_eq!(finished.completion_pct, 0.0);
    }

    #[tokio::test]
    async fn test_finish_is_one_way() {
        let test_db = build_workout_db().await;
        let client_id = test_db.user_id("client_user").unwrap();
        let day_id = test_db.day_id("Hypertrophy Block", 1, 1).unwrap();

        let completion = start_workout(&test_db.pool, client_id, day_id).await.unwrap();
        finish_workout(&test_db.pool, client_id, completion.id, None)
            .await
            .unwrap();

        let result = finish_workout(&test_db.pool, client_id, completion.id, None).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_session_state_transitions() {
        let test_db = build_workout_db().await;
        let client_id = test_db.user_id("client_user").unwrap();
        let day_id = test_db.day_id("Hypertrophy Block", 1, 1).unwrap();

        let state = session_state(&test_db.pool, client_id, day_id).await.unwrap();
        assert!(matches!(state, SessionState::NotStarted));

        let completion = start_workout(&test_db.pool, client_id, day_id).await.unwrap();

        let state = session_state(&test_db.pool, client_id, day_id).await.unwrap();
        match state {
            SessionState::InProgress { session } => {
                assert_eq!(session.completion.id, completion.id);
                assert_eq!(session.sets.len(), 5);
                assert!(session.flags.is_empty());
            }
            _ => panic!("Expected an in-progress session"),
        }

        finish_workout(&test_db.pool, client_id, completion.id, None)
            .await
            .unwrap();

        let state = session_state(&test_db.pool, client_id, day_id).await.unwrap();
        assert!(matches!(state, SessionState::Completed { .. }));
    }
}
