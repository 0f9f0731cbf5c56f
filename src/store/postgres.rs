//! `PostgreSQL` durable store.
//!
//! Plain runtime-checked queries over a shared [`PgPool`]. The conditional
//! slot updates lean on Postgres row-level atomicity: the `WHERE` predicate
//! and the mutation execute as one statement, so no client-side locking is
//! needed even under concurrent fallback traffic.

use crate::store::{EventPatch, EventStore, NewEvent, StoreError, StoreResult};
use crate::types::{
    AdminStats, Booking, BookingId, BookingStatus, Event, EventId, EventPage, EventSummary, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Event store backed by `PostgreSQL`.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    title: String,
    description: String,
    location: String,
    date: DateTime<Utc>,
    total_slots: i32,
    available_slots: i32,
    image: Option<String>,
    tags: Vec<String>,
    created_by: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Self {
            id: EventId::new(row.id),
            title: row.title,
            description: row.description,
            location: row.location,
            date: row.date,
            total_slots: row.total_slots,
            available_slots: row.available_slots,
            image: row.image,
            tags: row.tags,
            created_by: UserId::new(row.created_by),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const EVENT_COLUMNS: &str = "id, title, description, location, date, total_slots, \
     available_slots, image, tags, created_by, created_at, updated_at";

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

impl PgEventStore {
    /// Connect to `PostgreSQL` and run pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be built or a migration fails.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(url)
            .await
            .map_err(db_err)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Database(format!("migration failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool, e.g. for readiness checks.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn get_event(&self, id: EventId) -> StoreResult<Option<Event>> {
        let row: Option<EventRow> =
            sqlx::query_as(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
                .bind(id.get())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(row.map(Event::from))
    }

    async fn list_events(
        &self,
        page: u32,
        limit: u32,
        search: Option<&str>,
    ) -> StoreResult<EventPage> {
        let limit = i64::from(limit.max(1));
        let offset = i64::from(page.max(1) - 1) * limit;

        let rows: Vec<(
            i64,
            String,
            String,
            String,
            DateTime<Utc>,
            i32,
            i32,
            Option<String>,
            Vec<String>,
            i64,
            DateTime<Utc>,
            DateTime<Utc>,
            i64,
        )> = sqlx::query_as(
            "SELECT e.id, e.title, e.description, e.location, e.date, e.total_slots, \
                    e.available_slots, e.image, e.tags, e.created_by, e.created_at, \
                    e.updated_at, COUNT(b.id) AS booking_count \
             FROM events e \
             LEFT JOIN bookings b ON b.event_id = e.id \
             WHERE $1::TEXT IS NULL \
                OR e.title ILIKE '%' || $1 || '%' \
                OR $1 = ANY(e.tags) \
             GROUP BY e.id \
             ORDER BY e.date DESC \
             LIMIT $2 OFFSET $3",
        )
        .bind(search)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM events e \
             WHERE $1::TEXT IS NULL \
                OR e.title ILIKE '%' || $1 || '%' \
                OR $1 = ANY(e.tags)",
        )
        .bind(search)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let events = rows
            .into_iter()
            .map(
                |(
                    id,
                    title,
                    description,
                    location,
                    date,
                    total_slots,
                    available_slots,
                    image,
                    tags,
                    created_by,
                    created_at,
                    updated_at,
                    booking_count,
                )| EventSummary {
                    event: Event {
                        id: EventId::new(id),
                        title,
                        description,
                        location,
                        date,
                        total_slots,
                        available_slots,
                        image,
                        tags,
                        created_by: UserId::new(created_by),
                        created_at,
                        updated_at,
                    },
                    booking_count,
                },
            )
            .collect();

        Ok(EventPage { events, total })
    }

    async fn create_event(&self, new: NewEvent) -> StoreResult<Event> {
        let row: EventRow = sqlx::query_as(&format!(
            "INSERT INTO events (title, description, location, date, total_slots, \
                                 available_slots, image, tags, created_by) \
             VALUES ($1, $2, $3, $4, $5, $5, $6, $7, $8) \
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.location)
        .bind(new.date)
        .bind(new.total_slots)
        .bind(&new.image)
        .bind(&new.tags)
        .bind(new.created_by.get())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.into())
    }

    async fn update_event(&self, id: EventId, patch: EventPatch) -> StoreResult<Option<Event>> {
        let row: Option<EventRow> = sqlx::query_as(&format!(
            "UPDATE events SET \
                 title = COALESCE($2, title), \
                 description = COALESCE($3, description), \
                 location = COALESCE($4, location), \
                 date = COALESCE($5, date), \
                 total_slots = COALESCE($6, total_slots), \
                 available_slots = LEAST(available_slots, COALESCE($6, total_slots)), \
                 image = COALESCE($7, image), \
                 tags = COALESCE($8, tags), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(id.get())
        .bind(patch.title)
        .bind(patch.description)
        .bind(patch.location)
        .bind(patch.date)
        .bind(patch.total_slots)
        .bind(patch.image)
        .bind(patch.tags)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(Event::from))
    }

    async fn delete_event(&self, id: EventId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_available_slots(&self, id: EventId, slots: i32) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE events \
             SET available_slots = GREATEST(0, LEAST($2, total_slots)), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id.get())
        .bind(slots)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn reserve_slot_conditional(&self, id: EventId) -> StoreResult<Option<i32>> {
        let row: Option<(i32,)> = sqlx::query_as(
            "UPDATE events \
             SET available_slots = available_slots - 1, updated_at = NOW() \
             WHERE id = $1 AND available_slots > 0 \
             RETURNING available_slots",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(|(slots,)| slots))
    }

    async fn release_slot_conditional(&self, id: EventId) -> StoreResult<Option<i32>> {
        let row: Option<(i32,)> = sqlx::query_as(
            "UPDATE events \
             SET available_slots = LEAST(available_slots + 1, total_slots), updated_at = NOW() \
             WHERE id = $1 \
             RETURNING available_slots",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(|(slots,)| slots))
    }

    async fn create_booking(&self, event_id: EventId, user_id: UserId) -> StoreResult<Booking> {
        let row: Result<(i64, DateTime<Utc>), sqlx::Error> = sqlx::query_as(
            "INSERT INTO bookings (event_id, user_id) VALUES ($1, $2) \
             RETURNING id, created_at",
        )
        .bind(event_id.get())
        .bind(user_id.get())
        .fetch_one(&self.pool)
        .await;

        match row {
            Ok((id, created_at)) => Ok(Booking {
                id: BookingId::new(id),
                event_id,
                user_id,
                status: BookingStatus::Confirmed,
                created_at,
            }),
            Err(e) => {
                let unique_violation = e
                    .as_database_error()
                    .is_some_and(|db| matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation));
                if unique_violation {
                    Err(StoreError::DuplicateBooking)
                } else {
                    Err(db_err(e))
                }
            }
        }
    }

    async fn get_booking(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> StoreResult<Option<Booking>> {
        let row: Option<(i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, created_at FROM bookings WHERE user_id = $1 AND event_id = $2",
        )
        .bind(user_id.get())
        .bind(event_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|(id, created_at)| Booking {
            id: BookingId::new(id),
            event_id,
            user_id,
            status: BookingStatus::Confirmed,
            created_at,
        }))
    }

    async fn delete_booking(&self, user_id: UserId, event_id: EventId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM bookings WHERE user_id = $1 AND event_id = $2")
            .bind(user_id.get())
            .bind(event_id.get())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_user_bookings(&self, user_id: UserId) -> StoreResult<Vec<(Booking, Event)>> {
        let rows: Vec<(
            i64,
            DateTime<Utc>,
            i64,
            String,
            String,
            String,
            DateTime<Utc>,
            i32,
            i32,
            Option<String>,
            Vec<String>,
            i64,
            DateTime<Utc>,
            DateTime<Utc>,
        )> = sqlx::query_as(
            "SELECT b.id, b.created_at, \
                    e.id, e.title, e.description, e.location, e.date, e.total_slots, \
                    e.available_slots, e.image, e.tags, e.created_by, e.created_at, \
                    e.updated_at \
             FROM bookings b \
             INNER JOIN events e ON e.id = b.event_id \
             WHERE b.user_id = $1 \
             ORDER BY e.date DESC",
        )
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(
                |(
                    booking_id,
                    booked_at,
                    event_id,
                    title,
                    description,
                    location,
                    date,
                    total_slots,
                    available_slots,
                    image,
                    tags,
                    created_by,
                    created_at,
                    updated_at,
                )| {
                    (
                        Booking {
                            id: BookingId::new(booking_id),
                            event_id: EventId::new(event_id),
                            user_id,
                            status: BookingStatus::Confirmed,
                            created_at: booked_at,
                        },
                        Event {
                            id: EventId::new(event_id),
                            title,
                            description,
                            location,
                            date,
                            total_slots,
                            available_slots,
                            image,
                            tags,
                            created_by: UserId::new(created_by),
                            created_at,
                            updated_at,
                        },
                    )
                },
            )
            .collect())
    }

    async fn count_user_bookings(&self, user_id: UserId) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bookings WHERE user_id = $1")
            .bind(user_id.get())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count)
    }

    async fn admin_stats(&self) -> StoreResult<AdminStats> {
        let (total_events,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let (total_bookings,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bookings")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let (this_month,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM bookings WHERE created_at >= date_trunc('month', NOW())",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let (total_slots, booked_slots): (i64, i64) = sqlx::query_as(
            "SELECT COALESCE(SUM(total_slots), 0), \
                    COALESCE(SUM(total_slots - available_slots), 0) \
             FROM events",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(AdminStats {
            total_events,
            total_bookings,
            this_month,
            occupancy_rate: occupancy_rate(total_slots, booked_slots),
        })
    }
}

/// Whole-percent occupancy, zero when there is no capacity at all.
pub(crate) fn occupancy_rate(total_slots: i64, booked_slots: i64) -> i64 {
    if total_slots > 0 {
        (booked_slots * 100 + total_slots / 2) / total_slots
    } else {
        0
    }
}
