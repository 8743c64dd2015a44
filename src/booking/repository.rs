use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::error::BookingError;
use crate::booking::model::{
    Booking, BookingDraft, BookingPatch, BookingStatus, Dentist, ServiceOffering,
};

/// Sole mutator of booking state. Every write goes through `create`,
/// `update_status` or `update_fields`, so the state machine and field
/// authorizer can never be bypassed by a direct field write.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn find_by_id(&self, booking_id: Uuid) -> Result<Option<Booking>, BookingError>;

    /// Active (pending/confirmed) bookings for `dentist_id` whose
    /// [starts_at, ends_at) overlaps the given half-open interval.
    async fn find_overlapping(
        &self,
        dentist_id: Uuid,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingError>;

    async fn find_for_dentist_between(
        &self,
        dentist_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingError>;

    async fn find_for_patient(&self, patient_id: Uuid) -> Result<Vec<Booking>, BookingError>;

    /// Persist a new Pending booking. The no-overlap invariant is enforced
    /// here at write time as well: even after a clean pre-check, a
    /// concurrent insert for the same dentist/interval must lose with
    /// `SlotConflict`.
    async fn create(&self, draft: BookingDraft) -> Result<Booking, BookingError>;

    /// Compare-and-set status transition. Fails with `NotFound` when the id
    /// does not exist and `Stale` when the current status no longer matches
    /// `expected` (a concurrent transition won). Stamps `updated_at`, and
    /// `cancelled_at` on cancellation, in the same atomic write.
    async fn update_status(
        &self,
        booking_id: Uuid,
        new_status: BookingStatus,
        expected: BookingStatus,
        now: DateTime<Utc>,
    ) -> Result<Booking, BookingError>;

    /// Apply an already-authorized field patch. Optimistic concurrency on
    /// `updated_at`: a mismatch means a concurrent writer won and yields
    /// `Stale`. When the patch moves `starts_at`, `ends_at` is recomputed
    /// from the stored duration snapshot in the same write.
    async fn update_fields(
        &self,
        booking_id: Uuid,
        patch: &BookingPatch,
        expected_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Booking, BookingError>;
}

/// Read-only lookups the booking service snapshots from.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn find_dentist(&self, dentist_id: Uuid) -> Result<Option<Dentist>, BookingError>;

    async fn find_service(
        &self,
        service_id: Uuid,
    ) -> Result<Option<ServiceOffering>, BookingError>;
}
