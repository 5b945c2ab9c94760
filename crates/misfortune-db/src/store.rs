//! The wheel store seam and its `PostgreSQL` implementation.
//!
//! [`WheelStore`] is the narrow interface the session layer persists
//! through. Each call is a single asynchronous, possibly-failing network
//! operation with row-level atomicity only. The trait is object-safe so
//! the API layer can hold an `Arc<dyn WheelStore>` and tests can swap in
//! an in-memory implementation.

use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use misfortune_types::{Drink, UserId, Wheel, WheelId};

use crate::error::DbError;
use crate::postgres::PostgresPool;

/// Narrow persistence interface for wheel records.
#[async_trait]
pub trait WheelStore: Send + Sync {
    /// Fetch all persisted wheels (startup registry load).
    async fn fetch_wheels(&self) -> Result<Vec<Wheel>, DbError>;

    /// Persist a newly created wheel.
    async fn create_wheel(&self, wheel: &Wheel) -> Result<(), DbError>;

    /// Update a wheel's display name.
    async fn update_wheel_name(&self, wheel_id: WheelId, name: &str) -> Result<(), DbError>;

    /// Replace a wheel's drink list wholesale.
    async fn update_wheel_drinks(&self, wheel_id: WheelId, drinks: &[Drink])
    -> Result<(), DbError>;

    /// Delete a wheel record.
    async fn delete_wheel(&self, wheel_id: WheelId) -> Result<(), DbError>;
}

/// [`WheelStore`] backed by `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct PostgresWheelStore {
    pool: PostgresPool,
}

impl PostgresWheelStore {
    /// Create a store over an established pool.
    pub const fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }

    /// Decode one `wheels` row into a [`Wheel`].
    fn wheel_from_row(row: &PgRow) -> Result<Wheel, DbError> {
        let id: Uuid = row.try_get("id")?;
        let name: String = row.try_get("name")?;
        let owner: i64 = row.try_get("owner")?;
        let drinks: serde_json::Value = row.try_get("drinks")?;
        let drinks: Vec<Drink> = serde_json::from_value(drinks)?;

        Ok(Wheel {
            id: WheelId::from(id),
            name,
            owner: UserId::from(owner),
            drinks,
        })
    }
}

#[async_trait]
impl WheelStore for PostgresWheelStore {
    async fn fetch_wheels(&self) -> Result<Vec<Wheel>, DbError> {
        let rows = sqlx::query(
            r"SELECT id, name, owner, drinks
              FROM wheels
              ORDER BY created_at",
        )
        .fetch_all(self.pool.pool())
        .await?;

        let wheels = rows
            .iter()
            .map(Self::wheel_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(wheels = wheels.len(), "Fetched wheel records");
        Ok(wheels)
    }

    async fn create_wheel(&self, wheel: &Wheel) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO wheels (id, name, owner, drinks)
              VALUES ($1, $2, $3, $4)",
        )
        .bind(wheel.id.into_inner())
        .bind(&wheel.name)
        .bind(wheel.owner.into_inner())
        .bind(serde_json::to_value(&wheel.drinks)?)
        .execute(self.pool.pool())
        .await?;

        tracing::debug!(wheel = %wheel.id, "Created wheel record");
        Ok(())
    }

    async fn update_wheel_name(&self, wheel_id: WheelId, name: &str) -> Result<(), DbError> {
        sqlx::query(r"UPDATE wheels SET name = $2 WHERE id = $1")
            .bind(wheel_id.into_inner())
            .bind(name)
            .execute(self.pool.pool())
            .await?;

        tracing::debug!(wheel = %wheel_id, "Renamed wheel record");
        Ok(())
    }

    async fn update_wheel_drinks(
        &self,
        wheel_id: WheelId,
        drinks: &[Drink],
    ) -> Result<(), DbError> {
        sqlx::query(r"UPDATE wheels SET drinks = $2 WHERE id = $1")
            .bind(wheel_id.into_inner())
            .bind(serde_json::to_value(drinks)?)
            .execute(self.pool.pool())
            .await?;

        tracing::debug!(wheel = %wheel_id, drinks = drinks.len(), "Replaced wheel drinks");
        Ok(())
    }

    async fn delete_wheel(&self, wheel_id: WheelId) -> Result<(), DbError> {
        sqlx::query(r"DELETE FROM wheels WHERE id = $1")
            .bind(wheel_id.into_inner())
            .execute(self.pool.pool())
            .await?;

        tracing::debug!(wheel = %wheel_id, "Deleted wheel record");
        Ok(())
    }
}
