use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::booking::conflict::ConflictChecker;
use crate::booking::error::BookingError;
use crate::booking::events::{BookingEvent, BookingEventKind, EventReceiver, EventSender};
use crate::booking::model::{Booking, BookingDraft, BookingPatch, BookingStatus};
use crate::booking::policy;
use crate::booking::repository::{BookingRepository, Catalog};
use crate::models::Role;

/// Authenticated caller, as resolved by the identity layer.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub dentist_id: Uuid,
    pub service_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub symptoms: Option<String>,
    /// Admins may book on behalf of a patient; everyone else books for
    /// themselves.
    pub patient_id: Option<Uuid>,
}

/// Orchestrates conflict checking, the lifecycle state machine and the
/// field authorizer over the repository. All booking mutations enter here.
pub struct BookingService {
    repo: Arc<dyn BookingRepository>,
    catalog: Arc<dyn Catalog>,
    conflicts: ConflictChecker,
    events: EventSender,
}

impl BookingService {
    pub fn new(
        repo: Arc<dyn BookingRepository>,
        catalog: Arc<dyn Catalog>,
        events: EventSender,
    ) -> Self {
        Self {
            conflicts: ConflictChecker::new(repo.clone()),
            repo,
            catalog,
            events,
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Create a Pending booking: verify dentist and service, snapshot
    /// duration/price, pre-check the slot, then insert. The repository's
    /// write-time constraint remains authoritative, so `SlotConflict` can
    /// still surface from `create` after a clean pre-check.
    pub async fn create_booking(
        &self,
        caller: Caller,
        req: NewBooking,
    ) -> Result<Booking, BookingError> {
        let patient_id = match caller.role {
            Role::Patient => {
                // Patients only ever book for themselves.
                if req.patient_id.is_some_and(|id| id != caller.user_id) {
                    return Err(BookingError::Permission);
                }
                caller.user_id
            }
            Role::Admin => req.patient_id.unwrap_or(caller.user_id),
            Role::Dentist => return Err(BookingError::Permission),
        };

        let dentist = self
            .catalog
            .find_dentist(req.dentist_id)
            .await?
            .filter(|d| d.is_active)
            .ok_or(BookingError::NotFound("dentist"))?;

        let service = self
            .catalog
            .find_service(req.service_id)
            .await?
            .ok_or(BookingError::NotFound("service"))?;
        if !service.is_active {
            return Err(BookingError::ServiceInactive);
        }

        let ends_at = req.starts_at + Duration::minutes(service.duration_min as i64);

        if self
            .conflicts
            .check(dentist.dentist_id, req.starts_at, ends_at, None)
            .await?
        {
            return Err(BookingError::SlotConflict);
        }

        let booking = self
            .repo
            .create(BookingDraft {
                patient_id,
                dentist_id: dentist.dentist_id,
                service_id: service.service_id,
                starts_at: req.starts_at,
                ends_at,
                duration_min: service.duration_min,
                price_cents: service.price_cents,
                symptoms: req.symptoms,
            })
            .await?;

        tracing::info!(
            booking_id = %booking.booking_id,
            dentist_id = %booking.dentist_id,
            starts_at = %booking.starts_at,
            "booking created"
        );
        self.emit(BookingEventKind::Created, &booking);
        Ok(booking)
    }

    /// Partial update. The field authorizer silently drops whatever the
    /// caller may not touch; an empty remainder fails. A surviving status
    /// change still goes through the transition table, and a surviving
    /// starts_at change re-runs the conflict check against the new interval
    /// before anything is written.
    pub async fn update_booking(
        &self,
        caller: Caller,
        booking_id: Uuid,
        mut patch: BookingPatch,
    ) -> Result<Booking, BookingError> {
        let current = self
            .repo
            .find_by_id(booking_id)
            .await?
            .ok_or(BookingError::NotFound("booking"))?;
        self.ensure_party(caller, &current)?;

        patch.retain(policy::allowed_fields(caller.role, current.status));
        if patch.is_empty() {
            return Err(BookingError::NoUpdatableFields);
        }

        let now = Utc::now();

        if let Some(to) = patch.status {
            self.check_transition(&current, to, caller.role, now)?;
        }

        if let Some(new_start) = patch.starts_at {
            let new_end = new_start + Duration::minutes(current.duration_min as i64);
            if self
                .conflicts
                .check(current.dentist_id, new_start, new_end, Some(current.booking_id))
                .await?
            {
                return Err(BookingError::SlotConflict);
            }
        }

        let updated = self
            .repo
            .update_fields(booking_id, &patch, current.updated_at, now)
            .await?;

        if let Some(to) = patch.status {
            self.emit_for_status(to, &updated);
        }
        Ok(updated)
    }

    /// Drive one lifecycle edge. Commit is a compare-and-set on the status
    /// observed here, so of two concurrent transition attempts exactly one
    /// wins and the loser sees `Stale`.
    pub async fn transition_booking(
        &self,
        caller: Caller,
        booking_id: Uuid,
        requested: BookingStatus,
    ) -> Result<Booking, BookingError> {
        let current = self
            .repo
            .find_by_id(booking_id)
            .await?
            .ok_or(BookingError::NotFound("booking"))?;
        self.ensure_party(caller, &current)?;

        let now = Utc::now();
        self.check_transition(&current, requested, caller.role, now)?;

        let updated = self
            .repo
            .update_status(booking_id, requested, current.status, now)
            .await?;

        tracing::info!(
            booking_id = %updated.booking_id,
            from = %current.status,
            to = %updated.status,
            "booking transitioned"
        );
        self.emit_for_status(requested, &updated);
        Ok(updated)
    }

    /// Sugar for `transition_booking(.., Cancelled)`; `cancelled_at` is
    /// stamped by the repository so both call paths agree.
    pub async fn cancel_booking(
        &self,
        caller: Caller,
        booking_id: Uuid,
    ) -> Result<Booking, BookingError> {
        self.transition_booking(caller, booking_id, BookingStatus::Cancelled)
            .await
    }

    pub async fn get_booking(
        &self,
        caller: Caller,
        booking_id: Uuid,
    ) -> Result<Booking, BookingError> {
        let booking = self
            .repo
            .find_by_id(booking_id)
            .await?
            .ok_or(BookingError::NotFound("booking"))?;
        self.ensure_party(caller, &booking)?;
        Ok(booking)
    }

    /// Dentist-day/week view. Dentists may only read their own schedule;
    /// admins any; patients none (they use `list_my_bookings`).
    pub async fn list_dentist_schedule(
        &self,
        caller: Caller,
        dentist_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingError> {
        match caller.role {
            Role::Admin => {}
            Role::Dentist if caller.user_id == dentist_id => {}
            _ => return Err(BookingError::Permission),
        }
        self.repo.find_for_dentist_between(dentist_id, from, to).await
    }

    pub async fn list_my_bookings(&self, caller: Caller) -> Result<Vec<Booking>, BookingError> {
        self.repo.find_for_patient(caller.user_id).await
    }

    /// Caller must be the booking's patient, its assigned dentist, or an
    /// admin. Deliberately reports nothing beyond "insufficient permission".
    fn ensure_party(&self, caller: Caller, booking: &Booking) -> Result<(), BookingError> {
        let is_party = match caller.role {
            Role::Admin => true,
            Role::Patient => caller.user_id == booking.patient_id,
            Role::Dentist => caller.user_id == booking.dentist_id,
        };
        if is_party { Ok(()) } else { Err(BookingError::Permission) }
    }

    /// Shared transition validation for both the explicit transition path
    /// and a status field surviving the update authorizer. NoShow is
    /// time-gated: a patient cannot be a no-show before the slot starts.
    fn check_transition(
        &self,
        current: &Booking,
        to: BookingStatus,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        if !policy::transition_allowed(current.status, to, role) {
            return Err(BookingError::InvalidTransition {
                from: current.status,
                to,
            });
        }
        if to == BookingStatus::NoShow && now < current.starts_at {
            return Err(BookingError::InvalidTransition {
                from: current.status,
                to,
            });
        }
        Ok(())
    }

    fn emit_for_status(&self, status: BookingStatus, booking: &Booking) {
        let kind = match status {
            BookingStatus::Confirmed => BookingEventKind::Confirmed,
            BookingStatus::Cancelled => BookingEventKind::Cancelled,
            BookingStatus::Completed => BookingEventKind::Completed,
            BookingStatus::NoShow => BookingEventKind::NoShow,
            BookingStatus::Pending => return,
        };
        self.emit(kind, booking);
    }

    fn emit(&self, kind: BookingEventKind, booking: &Booking) {
        // No subscribers is fine; the core does not depend on delivery.
        let _ = self.events.send(BookingEvent {
            kind,
            booking: booking.clone(),
        });
    }
}
