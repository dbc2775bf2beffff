use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::time::Duration;
use tracing::{debug, info};

use super::store::{RecordStore, StoreError};
use crate::models::{Checkpoint, CheckpointProgress, Difficulty, LearningModule, Progress, RoomRecord};

#[derive(Debug, sqlx::FromRow)]
struct RoomRow {
    room_id: String,
    owner_id: String,
    is_learning_room: bool,
    module_id: Option<String>,
    current_checkpoint_index: i32,
}

impl From<RoomRow> for RoomRecord {
    fn from(row: RoomRow) -> Self {
        RoomRecord {
            room_id: row.room_id,
            owner_id: row.owner_id,
            is_learning_room: row.is_learning_room,
            module_id: row.module_id,
            current_checkpoint_index: to_index(row.current_checkpoint_index),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ModuleRow {
    module_id: String,
    title: String,
    language: String,
    difficulty: String,
    estimated_time_minutes: i32,
    checkpoints: Json<Vec<Checkpoint>>,
}

impl TryFrom<ModuleRow> for LearningModule {
    type Error = StoreError;

    fn try_from(row: ModuleRow) -> Result<Self, Self::Error> {
        let difficulty: Difficulty = serde_json::from_value(serde_json::Value::String(row.difficulty))?;
        Ok(LearningModule {
            module_id: row.module_id,
            title: row.title,
            language: row.language,
            difficulty,
            estimated_time_minutes: u32::try_from(row.estimated_time_minutes).unwrap_or(0),
            checkpoints: row.checkpoints.0,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProgressRow {
    room_id: String,
    module_id: String,
    user_id: String,
    current_checkpoint_index: i32,
    checkpoints: Json<Vec<CheckpointProgress>>,
}

impl From<ProgressRow> for Progress {
    fn from(row: ProgressRow) -> Self {
        Progress {
            room_id: row.room_id,
            module_id: row.module_id,
            user_id: row.user_id,
            current_checkpoint_index: to_index(row.current_checkpoint_index),
            checkpoints: row.checkpoints.0,
        }
    }
}

fn to_index(value: i32) -> usize {
    usize::try_from(value).unwrap_or(0)
}

fn to_column(index: usize) -> i32 {
    i32::try_from(index).unwrap_or(i32::MAX)
}

const PROGRESS_COLUMNS: &str = "room_id, module_id, user_id, current_checkpoint_index, checkpoints";

/// Postgres-backed record store
pub struct DbCoderoom {
    pool: PgPool,
}

impl DbCoderoom {
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    ///
    /// # Returns
    /// * `Result<Self, StoreError>` - Store backed by the pool or error
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    fn log_pool(&self, action: &str) {
        let idle = self.pool.num_idle() as u32;
        let size = self.pool.size();
        debug!("{}. Pool connections: {} idle, {} in use", action, idle, size.saturating_sub(idle));
    }
}

#[async_trait]
impl RecordStore for DbCoderoom {
    async fn find_room(&self, room_id: &str) -> Result<Option<RoomRecord>, StoreError> {
        let row = sqlx::query_as::<_, RoomRow>(
            r#"
            SELECT room_id, owner_id, is_learning_room, module_id, current_checkpoint_index
            FROM rooms
            WHERE room_id = $1
            "#,
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RoomRecord::from))
    }

    async fn update_room(&self, room: &RoomRecord) -> Result<(), StoreError> {
        self.log_pool(&format!("Updating room {}", room.room_id));

        let result = sqlx::query(
            r#"
            UPDATE rooms
            SET is_learning_room = $2,
                module_id = $3,
                current_checkpoint_index = $4,
                updated_at = now()
            WHERE room_id = $1
            "#,
        )
        .bind(&room.room_id)
        .bind(room.is_learning_room)
        .bind(&room.module_id)
        .bind(to_column(room.current_checkpoint_index))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Other(format!("room {} does not exist", room.room_id)));
        }
        Ok(())
    }

    async fn list_modules(&self) -> Result<Vec<LearningModule>, StoreError> {
        let rows = sqlx::query_as::<_, ModuleRow>(
            r#"
            SELECT module_id, title, language, difficulty, estimated_time_minutes, checkpoints
            FROM learning_modules
            ORDER BY module_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LearningModule::try_from).collect()
    }

    async fn find_module(&self, module_id: &str) -> Result<Option<LearningModule>, StoreError> {
        let row = sqlx::query_as::<_, ModuleRow>(
            r#"
            SELECT module_id, title, language, difficulty, estimated_time_minutes, checkpoints
            FROM learning_modules
            WHERE module_id = $1
            "#,
        )
        .bind(module_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(LearningModule::try_from).transpose()
    }

    async fn upsert_module(&self, module: &LearningModule) -> Result<(), StoreError> {
        let difficulty = serde_json::to_value(module.difficulty)?;
        sqlx::query(
            r#"
            INSERT INTO learning_modules (module_id, title, language, difficulty, estimated_time_minutes, checkpoints)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (module_id) DO UPDATE
            SET title = EXCLUDED.title,
                language = EXCLUDED.language,
                difficulty = EXCLUDED.difficulty,
                estimated_time_minutes = EXCLUDED.estimated_time_minutes,
                checkpoints = EXCLUDED.checkpoints,
                updated_at = now()
            "#,
        )
        .bind(&module.module_id)
        .bind(&module.title)
        .bind(&module.language)
        .bind(difficulty.as_str().unwrap_or("beginner"))
        .bind(i32::try_from(module.estimated_time_minutes).unwrap_or(i32::MAX))
        .bind(Json(&module.checkpoints))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_progress(&self, room_id: &str, module_id: &str, user_id: &str) -> Result<Option<Progress>, StoreError> {
        let sql = format!(
            "SELECT {} FROM learning_progress WHERE room_id = $1 AND module_id = $2 AND user_id = $3",
            PROGRESS_COLUMNS
        );
        let row = sqlx::query_as::<_, ProgressRow>(&sql)
            .bind(room_id)
            .bind(module_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Progress::from))
    }

    async fn create_progress_if_absent(&self, progress: Progress) -> Result<Progress, StoreError> {
        // The no-op update makes RETURNING yield the stored row on conflict.
        let sql = format!(
            r#"
            INSERT INTO learning_progress (room_id, module_id, user_id, current_checkpoint_index, checkpoints)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (room_id, module_id, user_id) DO UPDATE SET room_id = EXCLUDED.room_id
            RETURNING {}
            "#,
            PROGRESS_COLUMNS
        );
        let row = sqlx::query_as::<_, ProgressRow>(&sql)
            .bind(&progress.room_id)
            .bind(&progress.module_id)
            .bind(&progress.user_id)
            .bind(to_column(progress.current_checkpoint_index))
            .bind(Json(&progress.checkpoints))
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into())
    }

    async fn list_progress(&self, room_id: &str, module_id: &str) -> Result<Vec<Progress>, StoreError> {
        let sql = format!(
            "SELECT {} FROM learning_progress WHERE room_id = $1 AND module_id = $2 ORDER BY user_id",
            PROGRESS_COLUMNS
        );
        let rows = sqlx::query_as::<_, ProgressRow>(&sql)
            .bind(room_id)
            .bind(module_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Progress::from).collect())
    }

    async fn update_progress(&self, progress: &Progress) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE learning_progress
            SET current_checkpoint_index = $4,
                checkpoints = $5,
                updated_at = now()
            WHERE room_id = $1 AND module_id = $2 AND user_id = $3
            "#,
        )
        .bind(&progress.room_id)
        .bind(&progress.module_id)
        .bind(&progress.user_id)
        .bind(to_column(progress.current_checkpoint_index))
        .bind(Json(&progress.checkpoints))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_progress_index(&self, room_id: &str, module_id: &str, index: usize) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE learning_progress
            SET current_checkpoint_index = $3,
                updated_at = now()
            WHERE room_id = $1 AND module_id = $2
            "#,
        )
        .bind(room_id)
        .bind(module_id)
        .bind(to_column(index))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
