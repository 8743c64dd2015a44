//! In-memory store backing the integration tests and local development
//! without a database. All checks that Postgres enforces declaratively
//! (the no-overlap exclusion constraint on insert and reschedule, status
//! CAS, updated_at CAS) are re-implemented here inside a single mutex so
//! concurrency semantics match.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::booking::conflict::overlaps;
use crate::booking::error::BookingError;
use crate::booking::model::{
    Booking, BookingDraft, BookingPatch, BookingStatus, Dentist, PaymentStatus, ServiceOffering,
};
use crate::booking::repository::{BookingRepository, Catalog};

#[derive(Default)]
struct Inner {
    bookings: HashMap<Uuid, Booking>,
    dentists: HashMap<Uuid, Dentist>,
    services: HashMap<Uuid, ServiceOffering>,
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every writer applies its whole mutation under the lock, so a poisoned
    /// mutex still guards a coherent map; recover rather than panic.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_dentist(&self, dentist: Dentist) {
        let mut inner = self.lock();
        inner.dentists.insert(dentist.dentist_id, dentist);
    }

    /// Insert or replace a catalog entry. Replacing an entry must not touch
    /// the duration/price snapshots on existing bookings.
    pub fn put_service(&self, service: ServiceOffering) {
        let mut inner = self.lock();
        inner.services.insert(service.service_id, service);
    }
}

/// True when an active booking other than `exclude` occupies any part of
/// [starts_at, ends_at) for the dentist. Callers hold the lock.
fn slot_taken(
    inner: &Inner,
    dentist_id: Uuid,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    exclude: Option<Uuid>,
) -> bool {
    inner.bookings.values().any(|b| {
        Some(b.booking_id) != exclude
            && b.dentist_id == dentist_id
            && b.status.is_active()
            && overlaps(b.starts_at, b.ends_at, starts_at, ends_at)
    })
}

#[async_trait]
impl BookingRepository for MemStore {
    async fn find_by_id(&self, booking_id: Uuid) -> Result<Option<Booking>, BookingError> {
        let inner = self.lock();
        Ok(inner.bookings.get(&booking_id).cloned())
    }

    async fn find_overlapping(
        &self,
        dentist_id: Uuid,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingError> {
        let inner = self.lock();
        let mut hits: Vec<Booking> = inner
            .bookings
            .values()
            .filter(|b| {
                b.dentist_id == dentist_id
                    && b.status.is_active()
                    && overlaps(b.starts_at, b.ends_at, starts_at, ends_at)
            })
            .cloned()
            .collect();
        hits.sort_by_key(|b| b.starts_at);
        Ok(hits)
    }

    async fn find_for_dentist_between(
        &self,
        dentist_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingError> {
        let inner = self.lock();
        let mut hits: Vec<Booking> = inner
            .bookings
            .values()
            .filter(|b| b.dentist_id == dentist_id && b.starts_at >= from && b.starts_at < to)
            .cloned()
            .collect();
        hits.sort_by_key(|b| b.starts_at);
        Ok(hits)
    }

    async fn find_for_patient(&self, patient_id: Uuid) -> Result<Vec<Booking>, BookingError> {
        let inner = self.lock();
        let mut hits: Vec<Booking> = inner
            .bookings
            .values()
            .filter(|b| b.patient_id == patient_id)
            .cloned()
            .collect();
        hits.sort_by_key(|b| std::cmp::Reverse(b.starts_at));
        Ok(hits)
    }

    async fn create(&self, draft: BookingDraft) -> Result<Booking, BookingError> {
        let mut inner = self.lock();

        // Write-time no-overlap check, inside the lock: the read-time
        // pre-check in the service is only advisory.
        if slot_taken(&inner, draft.dentist_id, draft.starts_at, draft.ends_at, None) {
            return Err(BookingError::SlotConflict);
        }

        let now = Utc::now();
        let booking = Booking {
            booking_id: Uuid::new_v4(),
            patient_id: draft.patient_id,
            dentist_id: draft.dentist_id,
            service_id: draft.service_id,
            starts_at: draft.starts_at,
            ends_at: draft.ends_at,
            duration_min: draft.duration_min,
            price_cents: draft.price_cents,
            status: BookingStatus::Pending,
            symptoms: draft.symptoms,
            notes: None,
            clinical_notes: None,
            payment_status: PaymentStatus::Unpaid,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
        };
        inner.bookings.insert(booking.booking_id, booking.clone());
        Ok(booking)
    }

    async fn update_status(
        &self,
        booking_id: Uuid,
        new_status: BookingStatus,
        expected: BookingStatus,
        now: DateTime<Utc>,
    ) -> Result<Booking, BookingError> {
        let mut inner = self.lock();
        let booking = inner
            .bookings
            .get_mut(&booking_id)
            .ok_or(BookingError::NotFound("booking"))?;

        if booking.status != expected {
            return Err(BookingError::Stale);
        }

        booking.status = new_status;
        if new_status == BookingStatus::Cancelled {
            booking.cancelled_at.get_or_insert(now);
        }
        booking.updated_at = now;
        Ok(booking.clone())
    }

    async fn update_fields(
        &self,
        booking_id: Uuid,
        patch: &BookingPatch,
        expected_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Booking, BookingError> {
        let mut inner = self.lock();
        let mut booking = inner
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or(BookingError::NotFound("booking"))?;

        if booking.updated_at != expected_updated_at {
            return Err(BookingError::Stale);
        }

        // A reschedule re-runs the no-overlap check inside the lock, exactly
        // like the exclusion constraint fires on UPDATE in Postgres. Only
        // active bookings occupy a slot, so the effective post-patch status
        // decides whether the moved interval must be free.
        if let Some(starts_at) = patch.starts_at {
            let ends_at = starts_at + Duration::minutes(booking.duration_min as i64);
            let effective = patch.status.unwrap_or(booking.status);
            if effective.is_active()
                && slot_taken(&inner, booking.dentist_id, starts_at, ends_at, Some(booking_id))
            {
                return Err(BookingError::SlotConflict);
            }
            booking.starts_at = starts_at;
            booking.ends_at = ends_at;
        }

        if let Some(status) = patch.status {
            booking.status = status;
            if status == BookingStatus::Cancelled {
                booking.cancelled_at.get_or_insert(now);
            }
        }
        if let Some(symptoms) = &patch.symptoms {
            booking.symptoms = Some(symptoms.clone());
        }
        if let Some(notes) = &patch.notes {
            booking.notes = Some(notes.clone());
        }
        if let Some(clinical_notes) = &patch.clinical_notes {
            booking.clinical_notes = Some(clinical_notes.clone());
        }
        if let Some(price_cents) = patch.price_cents {
            booking.price_cents = price_cents;
        }
        if let Some(payment_status) = patch.payment_status {
            booking.payment_status = payment_status;
        }
        booking.updated_at = now;

        inner.bookings.insert(booking_id, booking.clone());
        Ok(booking)
    }
}

#[async_trait]
impl Catalog for MemStore {
    async fn find_dentist(&self, dentist_id: Uuid) -> Result<Option<Dentist>, BookingError> {
        let inner = self.lock();
        Ok(inner.dentists.get(&dentist_id).cloned())
    }

    async fn find_service(
        &self,
        service_id: Uuid,
    ) -> Result<Option<ServiceOffering>, BookingError> {
        let inner = self.lock();
        Ok(inner.services.get(&service_id).cloned())
    }
}
