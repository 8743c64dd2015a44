use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::error::BookingError;
use crate::booking::model::{
    Booking, BookingDraft, BookingPatch, BookingStatus, Dentist, PaymentStatus, ServiceOffering,
};
use crate::booking::repository::{BookingRepository, Catalog};

/// Name of the GiST exclusion constraint in migrations/0001_init.sql that
/// enforces no-overlap for active bookings at write time.
const NO_OVERLAP_CONSTRAINT: &str = "booking_no_overlap";

#[derive(Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

fn repo_err(e: sqlx::Error) -> BookingError {
    BookingError::Repository(anyhow::Error::new(e))
}

#[async_trait]
impl BookingRepository for PgStore {
    async fn find_by_id(&self, booking_id: Uuid) -> Result<Option<Booking>, BookingError> {
        sqlx::query_as::<_, Booking>(
            r#"
            SELECT *
            FROM booking
            WHERE booking_id = $1
            "#,
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(repo_err)
    }

    async fn find_overlapping(
        &self,
        dentist_id: Uuid,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingError> {
        // Half-open interval overlap with strict comparisons; served by the
        // (dentist_id, starts_at, ends_at, status) index.
        sqlx::query_as::<_, Booking>(
            r#"
            SELECT *
            FROM booking
            WHERE dentist_id = $1
              AND status IN (0, 1)
              AND starts_at < $3
              AND ends_at   > $2
            ORDER BY starts_at ASC
            "#,
        )
        .bind(dentist_id)
        .bind(starts_at)
        .bind(ends_at)
        .fetch_all(&self.pool)
        .await
        .map_err(repo_err)
    }

    async fn find_for_dentist_between(
        &self,
        dentist_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingError> {
        sqlx::query_as::<_, Booking>(
            r#"
            SELECT *
            FROM booking
            WHERE dentist_id = $1
              AND starts_at >= $2
              AND starts_at <  $3
            ORDER BY starts_at ASC
            "#,
        )
        .bind(dentist_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(repo_err)
    }

    async fn find_for_patient(&self, patient_id: Uuid) -> Result<Vec<Booking>, BookingError> {
        sqlx::query_as::<_, Booking>(
            r#"
            SELECT *
            FROM booking
            WHERE patient_id = $1
            ORDER BY starts_at DESC
            "#,
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await
        .map_err(repo_err)
    }

    async fn create(&self, draft: BookingDraft) -> Result<Booking, BookingError> {
        let now = Utc::now();
        let result = sqlx::query_as::<_, Booking>(
            r#"
            INSERT INTO booking (
              booking_id,
              patient_id,
              dentist_id,
              service_id,
              starts_at,
              ends_at,
              duration_min,
              price_cents,
              status,
              symptoms,
              payment_status,
              created_at,
              updated_at
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(draft.patient_id)
        .bind(draft.dentist_id)
        .bind(draft.service_id)
        .bind(draft.starts_at)
        .bind(draft.ends_at)
        .bind(draft.duration_min)
        .bind(draft.price_cents)
        .bind(BookingStatus::Pending)
        .bind(draft.symptoms)
        .bind(PaymentStatus::Unpaid)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(booking) => Ok(booking),
            // The exclusion constraint is the authoritative no-overlap check:
            // a concurrent create that slipped past the read-time pre-check
            // loses here.
            Err(sqlx::Error::Database(db)) if db.constraint() == Some(NO_OVERLAP_CONSTRAINT) => {
                Err(BookingError::SlotConflict)
            }
            Err(e) => Err(repo_err(e)),
        }
    }

    async fn update_status(
        &self,
        booking_id: Uuid,
        new_status: BookingStatus,
        expected: BookingStatus,
        now: DateTime<Utc>,
    ) -> Result<Booking, BookingError> {
        // Compare-and-set on status; a lost race updates zero rows.
        let row = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE booking
            SET status = $2,
                cancelled_at = CASE
                  WHEN $2 = 3::smallint THEN COALESCE(cancelled_at, $4)
                  ELSE cancelled_at
                END,
                updated_at = $4
            WHERE booking_id = $1
              AND status = $3
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .bind(new_status)
        .bind(expected)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(repo_err)?;

        match row {
            Some(booking) => Ok(booking),
            None => match self.find_by_id(booking_id).await? {
                Some(_) => Err(BookingError::Stale),
                None => Err(BookingError::NotFound("booking")),
            },
        }
    }

    async fn update_fields(
        &self,
        booking_id: Uuid,
        patch: &BookingPatch,
        expected_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Booking, BookingError> {
        // COALESCE keeps unset fields untouched; ends_at follows starts_at
        // using the stored duration snapshot so the two never diverge.
        let row = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE booking
            SET status          = COALESCE($3, status),
                starts_at       = COALESCE($4, starts_at),
                ends_at         = CASE
                  WHEN $4 IS NULL THEN ends_at
                  ELSE $4 + make_interval(mins => duration_min)
                END,
                symptoms        = COALESCE($5, symptoms),
                notes           = COALESCE($6, notes),
                clinical_notes  = COALESCE($7, clinical_notes),
                price_cents     = COALESCE($8, price_cents),
                payment_status  = COALESCE($9, payment_status),
                cancelled_at    = CASE
                  WHEN $3 = 3::smallint THEN COALESCE(cancelled_at, $10)
                  ELSE cancelled_at
                END,
                updated_at = $10
            WHERE booking_id = $1
              AND updated_at = $2
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .bind(expected_updated_at)
        .bind(patch.status)
        .bind(patch.starts_at)
        .bind(patch.symptoms.as_deref())
        .bind(patch.notes.as_deref())
        .bind(patch.clinical_notes.as_deref())
        .bind(patch.price_cents)
        .bind(patch.payment_status)
        .bind(now)
        .fetch_optional(&self.pool)
        .await;

        match row {
            Ok(Some(booking)) => Ok(booking),
            Ok(None) => match self.find_by_id(booking_id).await? {
                Some(_) => Err(BookingError::Stale),
                None => Err(BookingError::NotFound("booking")),
            },
            // The exclusion constraint fires on UPDATE too: a reschedule
            // that loses the race is a slot conflict, not a storage failure.
            Err(sqlx::Error::Database(db)) if db.constraint() == Some(NO_OVERLAP_CONSTRAINT) => {
                Err(BookingError::SlotConflict)
            }
            Err(e) => Err(repo_err(e)),
        }
    }
}

#[async_trait]
impl Catalog for PgStore {
    async fn find_dentist(&self, dentist_id: Uuid) -> Result<Option<Dentist>, BookingError> {
        sqlx::query_as::<_, Dentist>(
            r#"
            SELECT user_id AS dentist_id, display_name, is_active
            FROM clinic_user
            WHERE user_id = $1
              AND role = 2
            "#,
        )
        .bind(dentist_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(repo_err)
    }

    async fn find_service(
        &self,
        service_id: Uuid,
    ) -> Result<Option<ServiceOffering>, BookingError> {
        sqlx::query_as::<_, ServiceOffering>(
            r#"
            SELECT service_id, display_name, duration_min, price_cents, is_active
            FROM service_catalog
            WHERE service_id = $1
            "#,
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(repo_err)
    }
}
