//! Postgres-backed booking and catalog store.
//!
//! ## Error mapping
//!
//! | SQLx error | code / constraint | StoreError |
//! |---|---|---|
//! | unique violation | `23505` on `bookings_seat_date_blocking` | `SeatConflict` |
//! | unique violation | `23505` on `bookings_reference_key` | `DuplicateReference` |
//! | unique violation | `23505` on `buses_bus_number_key` | `Duplicate` |
//! | foreign key violation | `23503` | `NotFound` |
//! | pool timeout | n/a | `Timeout` |
//! | anything else | n/a | `Backend` |
//!
//! Group inserts run in one transaction; the partial unique index on
//! `(seat_id, travel_date)` over blocking statuses is the last line against
//! double booking when two transactions pass the availability check together.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{FromRow, Row};
use tracing::instrument;
use uuid::Uuid;

use busline_booking::{
    Booking, BookingReference, BookingStatus, Bus, PassengerName, PaymentStatus, RegisteredBus,
    Route, Schedule, Seat,
};
use busline_core::{BatchId, BookingId, BusId, RouteId, ScheduleId, SeatId, UserId};

use super::{BookingStore, CatalogStore};
use crate::error::StoreError;

const MIGRATION: &str = include_str!("../../migrations/0001_bookings.sql");

const BOOKING_COLUMNS: &str = "id, reference, batch_id, schedule_id, seat_id, passenger_id, \
     passenger_name, gender, travel_date, amount, status, payment_status, created_at";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a bounded acquire timeout.
    pub async fn connect(database_url: &str, acquire_timeout: Duration) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(MIGRATION)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn fetch_bookings(
        &self,
        operation: &'static str,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<Booking>, StoreError> {
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter().map(booking_from_row).collect()
    }
}

#[async_trait]
impl BookingStore for PostgresStore {
    #[instrument(skip(self, bookings), fields(rows = bookings.len()), err)]
    async fn commit_group(&self, bookings: &[Booking]) -> Result<(), StoreError> {
        let Some(first) = bookings.first() else {
            return Ok(());
        };
        let seat_ids: Vec<Uuid> = bookings.iter().map(|b| *b.seat_id.as_uuid()).collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let held = held_seats(&mut *tx, first.travel_date, &seat_ids)
            .await
            .map_err(|e| map_sqlx_error("check_availability", e))?;
        if !held.is_empty() {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::SeatConflict { seat_ids: held });
        }

        for b in bookings {
            let amount = i64::try_from(b.amount)
                .map_err(|_| StoreError::Backend(format!("amount {} out of range", b.amount)))?;
            let inserted = sqlx::query(
                r#"
                INSERT INTO bookings (
                    id, reference, batch_id, schedule_id, seat_id, passenger_id,
                    passenger_name, gender, travel_date, amount, status, payment_status, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(b.id.as_uuid())
            .bind(b.reference.as_str())
            .bind(b.batch_id.as_uuid())
            .bind(b.schedule_id.as_uuid())
            .bind(b.seat_id.as_uuid())
            .bind(b.passenger_id.as_uuid())
            .bind(b.passenger_name.as_str())
            .bind(b.gender.as_str())
            .bind(b.travel_date)
            .bind(amount)
            .bind(b.status.as_str())
            .bind(b.payment_status.as_str())
            .bind(b.created_at)
            .execute(&mut *tx)
            .await;

            let Err(e) = inserted else { continue };
            match unique_violation(&e) {
                Some("bookings_seat_date_blocking") => {
                    // The transaction is aborted; look at committed rows instead.
                    tx.rollback()
                        .await
                        .map_err(|e| map_sqlx_error("rollback", e))?;
                    let mut held = held_seats(&self.pool, b.travel_date, &seat_ids)
                        .await
                        .map_err(|e| map_sqlx_error("check_availability", e))?;
                    if held.is_empty() {
                        held.push(b.seat_id);
                    }
                    return Err(StoreError::SeatConflict { seat_ids: held });
                }
                Some("bookings_reference_key") => {
                    return Err(StoreError::DuplicateReference(b.reference.to_string()));
                }
                _ => return Err(map_sqlx_error("insert_booking", e)),
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn blocking_bookings(
        &self,
        travel_date: NaiveDate,
        seat_ids: &[SeatId],
    ) -> Result<Vec<Booking>, StoreError> {
        let ids: Vec<Uuid> = seat_ids.iter().map(|id| *id.as_uuid()).collect();
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE travel_date = $1 AND seat_id = ANY($2) AND status IN ('confirmed', 'cancelled') \
             ORDER BY created_at"
        );
        self.fetch_bookings("blocking_bookings", sqlx::query(&sql).bind(travel_date).bind(ids))
            .await
    }

    async fn references_with_prefix(
        &self,
        prefix: &str,
    ) -> Result<HashSet<BookingReference>, StoreError> {
        let pattern = format!("{}%", prefix.replace(['%', '_'], ""));
        let refs: Vec<String> =
            sqlx::query_scalar("SELECT reference FROM bookings WHERE reference LIKE $1")
                .bind(pattern)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("references_with_prefix", e))?;
        refs.iter()
            .map(|r| r.parse().map_err(|e| StoreError::Backend(format!("stored reference: {e}"))))
            .collect()
    }

    async fn find(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
        let rows = self
            .fetch_bookings("find", sqlx::query(&sql).bind(*id.as_uuid()))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn find_by_reference(
        &self,
        reference: &BookingReference,
    ) -> Result<Option<Booking>, StoreError> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE reference = $1");
        let rows = self
            .fetch_bookings("find_by_reference", sqlx::query(&sql).bind(reference.as_str()))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn find_by_references(
        &self,
        references: &[BookingReference],
    ) -> Result<Vec<Booking>, StoreError> {
        let refs: Vec<String> = references.iter().map(|r| r.to_string()).collect();
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE reference = ANY($1) ORDER BY created_at"
        );
        self.fetch_bookings("find_by_references", sqlx::query(&sql).bind(refs))
            .await
    }

    #[instrument(skip(self), err)]
    async fn update_status(
        &self,
        id: BookingId,
        expected: BookingStatus,
        status: BookingStatus,
        payment_status: PaymentStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE bookings SET status = $3, payment_status = $4 WHERE id = $1 AND status = $2",
        )
        .bind(id.as_uuid())
        .bind(expected.as_str())
        .bind(status.as_str())
        .bind(payment_status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_status", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("{expected} booking {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn reconcile_seat(
        &self,
        seat_id: SeatId,
        travel_date: NaiveDate,
        before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM bookings
            WHERE seat_id = $1 AND travel_date = $2 AND status = 'cancelled' AND created_at < $3
            "#,
        )
        .bind(seat_id.as_uuid())
        .bind(travel_date)
        .bind(before)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("reconcile_seat", e))?;
        Ok(result.rows_affected())
    }

    async fn list_for_passenger(&self, passenger_id: UserId) -> Result<Vec<Booking>, StoreError> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE passenger_id = $1 ORDER BY created_at"
        );
        self.fetch_bookings("list_for_passenger", sqlx::query(&sql).bind(*passenger_id.as_uuid()))
            .await
    }

    async fn list_for_schedule(&self, schedule_id: ScheduleId) -> Result<Vec<Booking>, StoreError> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE schedule_id = $1 ORDER BY created_at"
        );
        self.fetch_bookings("list_for_schedule", sqlx::query(&sql).bind(*schedule_id.as_uuid()))
            .await
    }

    async fn list_by_status(&self, status: BookingStatus) -> Result<Vec<Booking>, StoreError> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE status = $1 ORDER BY created_at DESC"
        );
        self.fetch_bookings("list_by_status", sqlx::query(&sql).bind(status.as_str()))
            .await
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    #[instrument(skip(self, registered), fields(bus_id = %registered.bus.id), err)]
    async fn insert_bus(&self, registered: &RegisteredBus) -> Result<(), StoreError> {
        let bus = &registered.bus;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO buses (id, operator_id, bus_number, name, layout, total_seats)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(bus.id.as_uuid())
        .bind(bus.operator_id.as_uuid())
        .bind(&bus.bus_number)
        .bind(&bus.name)
        .bind(bus.layout.to_string())
        .bind(bus.total_seats as i32)
        .execute(&mut *tx)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some("buses_bus_number_key") => {
                StoreError::Duplicate(format!("bus number {}", bus.bus_number))
            }
            _ => map_sqlx_error("insert_bus", e),
        })?;

        for (position, seat) in registered.seats.iter().enumerate() {
            sqlx::query(
                "INSERT INTO seats (id, bus_id, position, label, seat_type) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(seat.id.as_uuid())
            .bind(bus.id.as_uuid())
            .bind(position as i32 + 1)
            .bind(seat.label.to_string())
            .bind(seat.seat_type.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_seat", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn insert_route(&self, route: &Route) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO routes (id, name, origin, destination) VALUES ($1, $2, $3, $4)")
            .bind(route.id.as_uuid())
            .bind(&route.name)
            .bind(&route.origin)
            .bind(&route.destination)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_route", e))?;
        Ok(())
    }

    async fn insert_schedule(&self, schedule: &Schedule) -> Result<(), StoreError> {
        let base_price = i64::try_from(schedule.base_price)
            .map_err(|_| StoreError::Backend("base price out of range".to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO schedules (id, bus_id, route_id, departure_time, arrival_time, base_price)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(schedule.id.as_uuid())
        .bind(schedule.bus_id.as_uuid())
        .bind(schedule.route_id.as_uuid())
        .bind(schedule.departure_time)
        .bind(schedule.arrival_time)
        .bind(base_price)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_schedule", e))?;
        Ok(())
    }

    async fn bus(&self, id: BusId) -> Result<Option<Bus>, StoreError> {
        let row = sqlx::query(
            "SELECT id, operator_id, bus_number, name, layout, total_seats FROM buses WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("bus", e))?;

        row.map(|row| -> Result<Bus, StoreError> {
            let layout: String = row.try_get("layout").map_err(decode_error)?;
            let total: i32 = row.try_get("total_seats").map_err(decode_error)?;
            Ok(Bus {
                id: BusId::from_uuid(row.try_get("id").map_err(decode_error)?),
                operator_id: UserId::from_uuid(row.try_get("operator_id").map_err(decode_error)?),
                bus_number: row.try_get("bus_number").map_err(decode_error)?,
                name: row.try_get("name").map_err(decode_error)?,
                layout: layout.parse().map_err(|e| StoreError::Backend(format!("{e}")))?,
                total_seats: u32::try_from(total).map_err(|_| StoreError::Backend("negative seat count".into()))?,
            })
        })
        .transpose()
    }

    async fn seats_for_bus(&self, bus_id: BusId) -> Result<Vec<Seat>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, bus_id, label, seat_type FROM seats WHERE bus_id = $1 ORDER BY position",
        )
        .bind(bus_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("seats_for_bus", e))?;

        rows.iter()
            .map(|row| {
                let label: String = row.try_get("label").map_err(decode_error)?;
                let seat_type: String = row.try_get("seat_type").map_err(decode_error)?;
                Ok(Seat {
                    id: SeatId::from_uuid(row.try_get("id").map_err(decode_error)?),
                    bus_id: BusId::from_uuid(row.try_get("bus_id").map_err(decode_error)?),
                    label: label.parse().map_err(|e| StoreError::Backend(format!("{e}")))?,
                    seat_type: seat_type.parse().map_err(|e| StoreError::Backend(format!("{e}")))?,
                })
            })
            .collect()
    }

    async fn route(&self, id: RouteId) -> Result<Option<Route>, StoreError> {
        let row = sqlx::query("SELECT id, name, origin, destination FROM routes WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("route", e))?;

        row.map(|row| -> Result<Route, StoreError> {
            Ok(Route {
                id: RouteId::from_uuid(row.try_get("id").map_err(decode_error)?),
                name: row.try_get("name").map_err(decode_error)?,
                origin: row.try_get("origin").map_err(decode_error)?,
                destination: row.try_get("destination").map_err(decode_error)?,
            })
        })
        .transpose()
    }

    async fn schedule(&self, id: ScheduleId) -> Result<Option<Schedule>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, bus_id, route_id, departure_time, arrival_time, base_price
            FROM schedules WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("schedule", e))?;

        row.map(|row| -> Result<Schedule, StoreError> {
            let base_price: i64 = row.try_get("base_price").map_err(decode_error)?;
            Ok(Schedule {
                id: ScheduleId::from_uuid(row.try_get("id").map_err(decode_error)?),
                bus_id: BusId::from_uuid(row.try_get("bus_id").map_err(decode_error)?),
                route_id: RouteId::from_uuid(row.try_get("route_id").map_err(decode_error)?),
                departure_time: row.try_get::<NaiveTime, _>("departure_time").map_err(decode_error)?,
                arrival_time: row.try_get::<Option<NaiveTime>, _>("arrival_time").map_err(decode_error)?,
                base_price: u64::try_from(base_price)
                    .map_err(|_| StoreError::Backend("negative base price".into()))?,
            })
        })
        .transpose()
    }
}

// SQLx row types

#[derive(Debug)]
struct BookingRow {
    id: Uuid,
    reference: String,
    batch_id: Uuid,
    schedule_id: Uuid,
    seat_id: Uuid,
    passenger_id: Uuid,
    passenger_name: String,
    gender: String,
    travel_date: NaiveDate,
    amount: i64,
    status: String,
    payment_status: String,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for BookingRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(BookingRow {
            id: row.try_get("id")?,
            reference: row.try_get("reference")?,
            batch_id: row.try_get("batch_id")?,
            schedule_id: row.try_get("schedule_id")?,
            seat_id: row.try_get("seat_id")?,
            passenger_id: row.try_get("passenger_id")?,
            passenger_name: row.try_get("passenger_name")?,
            gender: row.try_get("gender")?,
            travel_date: row.try_get("travel_date")?,
            amount: row.try_get("amount")?,
            status: row.try_get("status")?,
            payment_status: row.try_get("payment_status")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let corrupt = |field: &str, e: &dyn core::fmt::Display| {
            StoreError::Backend(format!("stored booking {} has invalid {field}: {e}", row.id))
        };
        Ok(Booking {
            id: BookingId::from_uuid(row.id),
            reference: row.reference.parse().map_err(|e| corrupt("reference", &e))?,
            batch_id: BatchId::from_uuid(row.batch_id),
            schedule_id: ScheduleId::from_uuid(row.schedule_id),
            seat_id: SeatId::from_uuid(row.seat_id),
            passenger_id: UserId::from_uuid(row.passenger_id),
            passenger_name: PassengerName::parse(&row.passenger_name)
                .map_err(|e| corrupt("passenger_name", &e))?,
            gender: row.gender.parse().map_err(|e| corrupt("gender", &e))?,
            travel_date: row.travel_date,
            amount: u64::try_from(row.amount).map_err(|e| corrupt("amount", &e))?,
            status: row.status.parse().map_err(|e| corrupt("status", &e))?,
            payment_status: row
                .payment_status
                .parse()
                .map_err(|e| corrupt("payment_status", &e))?,
            created_at: row.created_at,
        })
    }
}

fn booking_from_row(row: &PgRow) -> Result<Booking, StoreError> {
    BookingRow::from_row(row)
        .map_err(|e| StoreError::Backend(format!("failed to deserialize booking row: {e}")))?
        .try_into()
}

/// Seats among `seat_ids` that carry a blocking booking on `travel_date`.
async fn held_seats<'e, E>(
    executor: E,
    travel_date: NaiveDate,
    seat_ids: &[Uuid],
) -> Result<Vec<SeatId>, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    let held: Vec<Uuid> = sqlx::query_scalar(
        r#"
        SELECT seat_id FROM bookings
        WHERE travel_date = $1
          AND seat_id = ANY($2)
          AND status IN ('confirmed', 'cancelled')
        "#,
    )
    .bind(travel_date)
    .bind(seat_ids)
    .fetch_all(executor)
    .await?;
    Ok(held.into_iter().map(SeatId::from_uuid).collect())
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode row: {err}"))
}

/// Name of the violated unique constraint, if `err` is a unique violation.
fn unique_violation(err: &sqlx::Error) -> Option<&str> {
    if let sqlx::Error::Database(db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            return db_err.constraint();
        }
    }
    None
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23503") => StoreError::NotFound(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => StoreError::Timeout(operation.to_string()),
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        other => StoreError::Backend(format!("{} failed: {}", operation, other)),
    }
}
