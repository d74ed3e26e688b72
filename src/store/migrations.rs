//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "users_and_onboarding",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );

            CREATE TABLE IF NOT EXISTS onboarding_states (
                user_id TEXT PRIMARY KEY REFERENCES users(id),
                current_step INTEGER NOT NULL DEFAULT 0,
                is_complete INTEGER NOT NULL DEFAULT 0,
                step_data TEXT NOT NULL DEFAULT '{}',
                agent_history TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );
        "#,
    },
    Migration {
        version: 2,
        name: "profiles_and_preferences",
        sql: r#"
            CREATE TABLE IF NOT EXISTS user_profiles (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                fitness_level TEXT NOT NULL,
                lifestyle_rating INTEGER,
                is_locked INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS ux_user_profiles_user
                ON user_profiles(user_id) WHERE deleted_at IS NULL;

            CREATE TABLE IF NOT EXISTS fitness_goals (
                id TEXT PRIMARY KEY,
                profile_id TEXT NOT NULL REFERENCES user_profiles(id),
                goal_type TEXT NOT NULL,
                priority INTEGER NOT NULL,
                target_weight_kg REAL,
                target_body_fat_percentage REAL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS ux_fitness_goals_priority
                ON fitness_goals(profile_id, priority) WHERE deleted_at IS NULL;

            CREATE TABLE IF NOT EXISTS physical_constraints (
                id TEXT PRIMARY KEY,
                profile_id TEXT NOT NULL REFERENCES user_profiles(id),
                constraint_type TEXT NOT NULL,
                description TEXT NOT NULL,
                severity TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_physical_constraints_profile
                ON physical_constraints(profile_id);

            CREATE TABLE IF NOT EXISTS dietary_preferences (
                id TEXT PRIMARY KEY,
                profile_id TEXT NOT NULL REFERENCES user_profiles(id),
                diet_type TEXT NOT NULL,
                allergies TEXT NOT NULL DEFAULT '[]',
                intolerances TEXT NOT NULL DEFAULT '[]',
                dislikes TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS ux_dietary_preferences_profile
                ON dietary_preferences(profile_id) WHERE deleted_at IS NULL;

            CREATE TABLE IF NOT EXISTS meal_plans (
                id TEXT PRIMARY KEY,
                profile_id TEXT NOT NULL REFERENCES user_profiles(id),
                daily_calorie_target INTEGER NOT NULL,
                protein_percentage TEXT NOT NULL,
                carbs_percentage TEXT NOT NULL,
                fats_percentage TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS ux_meal_plans_profile
                ON meal_plans(profile_id) WHERE deleted_at IS NULL;

            CREATE TABLE IF NOT EXISTS meal_schedules (
                id TEXT PRIMARY KEY,
                profile_id TEXT NOT NULL REFERENCES user_profiles(id),
                meal_name TEXT NOT NULL,
                scheduled_time TEXT NOT NULL,
                enable_notifications INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS ux_meal_schedules_name
                ON meal_schedules(profile_id, meal_name) WHERE deleted_at IS NULL;

            CREATE TABLE IF NOT EXISTS workout_schedules (
                id TEXT PRIMARY KEY,
                profile_id TEXT NOT NULL REFERENCES user_profiles(id),
                day_of_week INTEGER NOT NULL,
                scheduled_time TEXT NOT NULL,
                enable_notifications INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS ux_workout_schedules_day
                ON workout_schedules(profile_id, day_of_week) WHERE deleted_at IS NULL;

            CREATE TABLE IF NOT EXISTS hydration_preferences (
                id TEXT PRIMARY KEY,
                profile_id TEXT NOT NULL REFERENCES user_profiles(id),
                daily_water_target_ml INTEGER NOT NULL,
                reminder_frequency_minutes INTEGER NOT NULL DEFAULT 60,
                enable_notifications INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS ux_hydration_preferences_profile
                ON hydration_preferences(profile_id) WHERE deleted_at IS NULL;

            CREATE TABLE IF NOT EXISTS profile_versions (
                id TEXT PRIMARY KEY,
                profile_id TEXT NOT NULL REFERENCES user_profiles(id),
                version INTEGER NOT NULL,
                reason TEXT NOT NULL,
                snapshot TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_profile_versions_profile
                ON profile_versions(profile_id);
        "#,
    },
    Migration {
        version: 3,
        name: "dish_catalogue_and_templates",
        sql: r#"
            CREATE TABLE IF NOT EXISTS dishes (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                meal_type TEXT NOT NULL,
                serving_size_g REAL NOT NULL,
                calories REAL NOT NULL,
                protein_g REAL NOT NULL,
                carbs_g REAL NOT NULL,
                fats_g REAL NOT NULL,
                is_vegetarian INTEGER NOT NULL DEFAULT 0,
                is_vegan INTEGER NOT NULL DEFAULT 0,
                contains_red_meat INTEGER NOT NULL DEFAULT 0,
                contains_poultry INTEGER NOT NULL DEFAULT 0,
                contains_fish INTEGER NOT NULL DEFAULT 0,
                contains_allergens TEXT NOT NULL DEFAULT '[]',
                ingredients TEXT NOT NULL DEFAULT '[]',
                popularity_score REAL NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_dishes_meal_type ON dishes(meal_type);

            CREATE TABLE IF NOT EXISTS meal_templates (
                id TEXT PRIMARY KEY,
                profile_id TEXT NOT NULL REFERENCES user_profiles(id),
                week_number INTEGER NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                generated_by TEXT NOT NULL DEFAULT 'ai_agent',
                generation_reason TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS ux_meal_templates_active
                ON meal_templates(profile_id, week_number)
                WHERE is_active = 1 AND deleted_at IS NULL;

            CREATE TABLE IF NOT EXISTS template_meals (
                id TEXT PRIMARY KEY,
                template_id TEXT NOT NULL REFERENCES meal_templates(id),
                meal_schedule_id TEXT NOT NULL REFERENCES meal_schedules(id),
                dish_id TEXT NOT NULL REFERENCES dishes(id),
                day_of_week INTEGER NOT NULL,
                is_primary INTEGER NOT NULL DEFAULT 0,
                alternative_order INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_template_meals_template
                ON template_meals(template_id);
        "#,
    },
    Migration {
        version: 4,
        name: "conversations_and_workout_logs",
        sql: r#"
            CREATE TABLE IF NOT EXISTS conversation_messages (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                agent_type TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_conversation_messages_user
                ON conversation_messages(user_id, created_at);

            CREATE TABLE IF NOT EXISTS workout_logs (
                id TEXT PRIMARY KEY,
                profile_id TEXT NOT NULL REFERENCES user_profiles(id),
                exercise TEXT NOT NULL,
                set_number INTEGER NOT NULL,
                reps INTEGER NOT NULL,
                weight_kg REAL,
                logged_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_workout_logs_profile
                ON workout_logs(profile_id, logged_at);
        "#,
    },
];

/// Run all pending migrations on the given connection.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    tracing::debug!("Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_conn() -> Connection {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap();
        db.connect().unwrap()
    }

    #[tokio::test]
    async fn migrations_create_all_tables() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        for table in &[
            "users",
            "onboarding_states",
            "user_profiles",
            "fitness_goals",
            "physical_constraints",
            "dietary_preferences",
            "meal_plans",
            "meal_schedules",
            "workout_schedules",
            "hydration_preferences",
            "profile_versions",
            "dishes",
            "meal_templates",
            "template_meals",
            "conversation_messages",
            "workout_logs",
            "_migrations",
        ] {
            let mut rows = conn
                .query(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    libsql::params![*table],
                )
                .await
                .unwrap();
            let row = rows.next().await.unwrap().unwrap();
            let count: i64 = row.get(0).unwrap();
            assert_eq!(count, 1, "Table '{}' should exist", table);
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();
        run_migrations(&conn).await.unwrap();

        let version = get_current_version(&conn).await.unwrap();
        assert_eq!(version, 4);
    }

    #[tokio::test]
    async fn active_template_uniqueness_is_enforced() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        conn.execute(
            "INSERT INTO meal_templates (id, profile_id, week_number, is_active, created_at, updated_at)
             VALUES ('t1', 'p1', 1, 1, '2026-01-01', '2026-01-01')",
            (),
        )
        .await
        .unwrap();

        // Second active template for the same (profile, week) must fail
        let result = conn
            .execute(
                "INSERT INTO meal_templates (id, profile_id, week_number, is_active, created_at, updated_at)
                 VALUES ('t2', 'p1', 1, 1, '2026-01-01', '2026-01-01')",
                (),
            )
            .await;
        assert!(result.is_err());

        // An inactive one is fine
        conn.execute(
            "INSERT INTO meal_templates (id, profile_id, week_number, is_active, created_at, updated_at)
             VALUES ('t3', 'p1', 1, 0, '2026-01-01', '2026-01-01')",
            (),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn workout_day_uniqueness_is_enforced() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        conn.execute(
            "INSERT INTO workout_schedules (id, profile_id, day_of_week, scheduled_time, created_at, updated_at)
             VALUES ('w1', 'p1', 0, '07:00', '2026-01-01', '2026-01-01')",
            (),
        )
        .await
        .unwrap();

        let result = conn
            .execute(
                "INSERT INTO workout_schedules (id, profile_id, day_of_week, scheduled_time, created_at, updated_at)
                 VALUES ('w2', 'p1', 0, '18:00', '2026-01-01', '2026-01-01')",
                (),
            )
            .await;
        assert!(result.is_err());
    }
}
