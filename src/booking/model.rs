use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Booking lifecycle status, stored as smallint.
/// Pending and Confirmed are the only statuses that block a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum BookingStatus {
    Pending = 0,
    Confirmed = 1,
    Completed = 2,
    Cancelled = 3,
    NoShow = 4,
}

impl BookingStatus {
    pub fn is_active(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::NoShow
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::NoShow => "no_show",
        }
    }

    pub const ALL: [BookingStatus; 5] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
        BookingStatus::NoShow,
    ];
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment lifecycle is independent of the booking status machine;
/// only admins touch it through the field authorizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum PaymentStatus {
    Unpaid = 0,
    Paid = 1,
    Refunded = 2,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub booking_id: Uuid,
    pub patient_id: Uuid,
    pub dentist_id: Uuid,
    pub service_id: Uuid,
    pub starts_at: DateTime<Utc>,
    /// Always starts_at + duration_min; stored so the overlap query stays an
    /// index scan.
    pub ends_at: DateTime<Utc>,
    /// Snapshot of the catalog duration at booking time (minutes).
    pub duration_min: i32,
    /// Snapshot of the catalog price at booking time.
    pub price_cents: i32,
    pub status: BookingStatus,
    pub symptoms: Option<String>,
    pub notes: Option<String>,
    pub clinical_notes: Option<String>,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Everything the repository needs to persist a new Pending booking.
/// duration/price are already snapshotted by the service layer.
#[derive(Debug, Clone)]
pub struct BookingDraft {
    pub patient_id: Uuid,
    pub dentist_id: Uuid,
    pub service_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub duration_min: i32,
    pub price_cents: i32,
    pub symptoms: Option<String>,
}

/// Mutable booking fields a caller may request to change. The field
/// authorizer prunes this down to what the caller's role/state permits
/// before it ever reaches the repository.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingPatch {
    pub status: Option<BookingStatus>,
    pub starts_at: Option<DateTime<Utc>>,
    pub symptoms: Option<String>,
    pub notes: Option<String>,
    pub clinical_notes: Option<String>,
    pub price_cents: Option<i32>,
    pub payment_status: Option<PaymentStatus>,
}

/// Named handle for each patchable field, used by the allow-list tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Status,
    StartsAt,
    Symptoms,
    Notes,
    ClinicalNotes,
    Price,
    PaymentStatus,
}

impl BookingPatch {
    /// Fields the caller actually asked to change.
    pub fn requested(&self) -> Vec<Field> {
        let mut out = Vec::new();
        if self.status.is_some() {
            out.push(Field::Status);
        }
        if self.starts_at.is_some() {
            out.push(Field::StartsAt);
        }
        if self.symptoms.is_some() {
            out.push(Field::Symptoms);
        }
        if self.notes.is_some() {
            out.push(Field::Notes);
        }
        if self.clinical_notes.is_some() {
            out.push(Field::ClinicalNotes);
        }
        if self.price_cents.is_some() {
            out.push(Field::Price);
        }
        if self.payment_status.is_some() {
            out.push(Field::PaymentStatus);
        }
        out
    }

    /// Drop every field not in `allowed`. Disallowed fields are removed
    /// silently; the caller decides what an empty patch means.
    pub fn retain(&mut self, allowed: &[Field]) {
        if !allowed.contains(&Field::Status) {
            self.status = None;
        }
        if !allowed.contains(&Field::StartsAt) {
            self.starts_at = None;
        }
        if !allowed.contains(&Field::Symptoms) {
            self.symptoms = None;
        }
        if !allowed.contains(&Field::Notes) {
            self.notes = None;
        }
        if !allowed.contains(&Field::ClinicalNotes) {
            self.clinical_notes = None;
        }
        if !allowed.contains(&Field::Price) {
            self.price_cents = None;
        }
        if !allowed.contains(&Field::PaymentStatus) {
            self.payment_status = None;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.requested().is_empty()
    }
}

/// Practitioner view the booking service needs; resolved through the
/// catalog, never stored on the booking beyond the id.
#[derive(Debug, Clone, FromRow)]
pub struct Dentist {
    pub dentist_id: Uuid,
    pub display_name: String,
    pub is_active: bool,
}

/// Catalog entry a booking snapshots duration/price from.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ServiceOffering {
    pub service_id: Uuid,
    pub display_name: String,
    pub duration_min: i32,
    pub price_cents: i32,
    pub is_active: bool,
}
