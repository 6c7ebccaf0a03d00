pub const CURRENT_SCHEMA: &str = r#"
PRAGMA foreign_keys = 1;

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    role TEXT NOT NULL,
    password TEXT NOT NULL DEFAULT '',
    display_name TEXT,
    archived BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE TABLE IF NOT EXISTS user_sessions (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    token TEXT NOT NULL UNIQUE,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    expires_at TIMESTAMP NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users (id)
);

CREATE TABLE IF NOT EXISTS coach_clients (
    id INTEGER PRIMARY KEY,
    coach_id INTEGER NOT NULL,
    client_id INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (coach_id, client_id),
    FOREIGN KEY (coach_id) REFERENCES users (id),
    FOREIGN KEY (client_id) REFERENCES users (id)
);

-- active_plan_id and plan_start_date are set and cleared together
CREATE TABLE IF NOT EXISTS client_profiles (
    user_id INTEGER PRIMARY KEY,
    active_plan_id INTEGER,
    plan_start_date DATE,
    FOREIGN KEY (user_id) REFERENCES users (id),
    FOREIGN KEY (active_plan_id) REFERENCES plans (id)
);

CREATE TABLE IF NOT EXISTS plans (
    id INTEGER PRIMARY KEY,
    coach_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    duration_weeks INTEGER NOT NULL,
    workouts_per_week INTEGER,
    FOREIGN KEY (coach_id) REFERENCES users (id)
);

CREATE TABLE IF NOT EXISTS plan_weeks (
    id INTEGER PRIMARY KEY,
    plan_id INTEGER NOT NULL,
    week_number INTEGER NOT NULL,
    UNIQUE (plan_id, week_number),
    FOREIGN KEY (plan_id) REFERENCES plans (id)
);

-- day_number is the Monday-start slot index, 1..7
CREATE TABLE IF NOT EXISTS plan_days (
    id INTEGER PRIMARY KEY,
    week_id INTEGER NOT NULL,
    day_number INTEGER NOT NULL,
    is_rest_day BOOLEAN NOT NULL DEFAULT FALSE,
    name TEXT,
    UNIQUE (week_id, day_number),
    FOREIGN KEY (week_id) REFERENCES plan_weeks (id)
);

CREATE TABLE IF NOT EXISTS exercises (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    category TEXT,
    instructions TEXT
);

CREATE TABLE IF NOT EXISTS scheduled_exercises (
    id INTEGER PRIMARY KEY,
    day_id INTEGER NOT NULL,
    exercise_id INTEGER NOT NULL,
    order_index INTEGER NOT NULL,
    sets INTEGER NOT NULL,
    reps INTEGER NOT NULL,
    weight REAL,
    rest_seconds INTEGER,
    UNIQUE (day_id, order_index),
    FOREIGN KEY (day_id) REFERENCES plan_days (id),
    FOREIGN KEY (exercise_id) REFERENCES exercises (id)
);

CREATE TABLE IF NOT EXISTS workout_completions (
    id INTEGER PRIMARY KEY,
    client_id INTEGER NOT NULL,
    plan_id INTEGER NOT NULL,
    day_id INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'in_progress',
    started_at TIMESTAMP NOT NULL,
    completed_at TIMESTAMP,
    completion_pct REAL NOT NULL DEFAULT 0,
    exercises_done INTEGER NOT NULL DEFAULT 0,
    exercises_total INTEGER NOT NULL DEFAULT 0,
    duration_sec INTEGER,
    effort_rating TEXT,
    UNIQUE (client_id, plan_id, day_id),
    FOREIGN KEY (client_id) REFERENCES users (id),
    FOREIGN KEY (plan_id) REFERENCES plans (id),
    FOREIGN KEY (day_id) REFERENCES plan_days (id)
);

CREATE TABLE IF NOT EXISTS set_completions (
    id INTEGER PRIMARY KEY,
    completion_id INTEGER NOT NULL,
    scheduled_exercise_id INTEGER NOT NULL,
    set_number INTEGER NOT NULL,
    completed BOOLEAN NOT NULL DEFAULT FALSE,
    actual_weight REAL,
    actual_reps INTEGER,
    completed_at TIMESTAMP,
    UNIQUE (completion_id, scheduled_exercise_id, set_number),
    FOREIGN KEY (completion_id) REFERENCES workout_completions (id),
    FOREIGN KEY (scheduled_exercise_id) REFERENCES scheduled_exercises (id)
);

CREATE TABLE IF NOT EXISTS exercise_flags (
    id INTEGER PRIMARY KEY,
    completion_id INTEGER NOT NULL,
    scheduled_exercise_id INTEGER NOT NULL,
    note TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (completion_id, scheduled_exercise_id),
    FOREIGN KEY (completion_id) REFERENCES workout_completions (id),
    FOREIGN KEY (scheduled_exercise_id) REFERENCES scheduled_exercises (id)
);

CREATE TABLE IF NOT EXISTS checkins (
    id INTEGER PRIMARY KEY,
    coach_id INTEGER NOT NULL,
    client_id INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    effort_rating TEXT,
    pain_blockers TEXT,
    client_feeling TEXT,
    client_responded_at TIMESTAMP,
    coach_feedback TEXT,
    plan_adjustment BOOLEAN NOT NULL DEFAULT FALSE,
    coach_responded_at TIMESTAMP,
    completed_at TIMESTAMP,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (coach_id) REFERENCES users (id),
    FOREIGN KEY (client_id) REFERENCES users (id)
);

CREATE TABLE IF NOT EXISTS checkin_schedules (
    id INTEGER PRIMARY KEY,
    coach_id INTEGER NOT NULL,
    client_id INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    cadence_days INTEGER NOT NULL DEFAULT 7,
    anchor_date DATE NOT NULL,
    UNIQUE (coach_id, client_id),
    FOREIGN KEY (coach_id) REFERENCES users (id),
    FOREIGN KEY (client_id) REFERENCES users (id)
);

CREATE INDEX IF NOT EXISTS idx_completions_client ON workout_completions (client_id, completed_at);
CREATE INDEX IF NOT EXISTS idx_set_completions_completion ON set_completions (completion_id);
CREATE INDEX IF NOT EXISTS idx_checkins_pair ON checkins (coach_id, client_id, status);
"#;
