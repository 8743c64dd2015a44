use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::error::BookingError;
use crate::booking::repository::BookingRepository;

/// Half-open interval overlap: [a_start, a_end) vs [b_start, b_end).
/// Strict comparisons so back-to-back bookings sharing a boundary instant
/// never count as overlapping.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && a_end > b_start
}

/// Advisory read-time conflict check against active bookings. The write-time
/// constraint in the repository stays authoritative under concurrent
/// creates; this is the early-rejection path.
pub struct ConflictChecker {
    repo: Arc<dyn BookingRepository>,
}

impl ConflictChecker {
    pub fn new(repo: Arc<dyn BookingRepository>) -> Self {
        Self { repo }
    }

    /// True when an active booking for `dentist_id` overlaps
    /// [starts_at, ends_at). `exclude` skips one booking id, used when
    /// rescheduling a booking against its own current slot.
    ///
    /// A repository failure propagates; it is never collapsed into "no
    /// conflict".
    pub async fn check(
        &self,
        dentist_id: Uuid,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<bool, BookingError> {
        let existing = self
            .repo
            .find_overlapping(dentist_id, starts_at, ends_at)
            .await?;

        Ok(existing
            .iter()
            .any(|b| Some(b.booking_id) != exclude))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, h, m, 0).unwrap()
    }

    #[test]
    fn overlap_is_symmetric() {
        let cases = [
            (at(10, 0), at(10, 30), at(10, 15), at(10, 45)),
            (at(10, 0), at(10, 30), at(10, 30), at(11, 0)),
            (at(10, 0), at(11, 0), at(10, 15), at(10, 45)),
            (at(9, 0), at(9, 30), at(10, 0), at(10, 30)),
        ];
        for (a1, a2, b1, b2) in cases {
            assert_eq!(overlaps(a1, a2, b1, b2), overlaps(b1, b2, a1, a2));
        }
    }

    #[test]
    fn partial_overlap_conflicts() {
        assert!(overlaps(at(10, 0), at(10, 30), at(10, 15), at(10, 45)));
    }

    #[test]
    fn containment_conflicts() {
        assert!(overlaps(at(10, 0), at(11, 0), at(10, 15), at(10, 45)));
        assert!(overlaps(at(10, 15), at(10, 45), at(10, 0), at(11, 0)));
    }

    #[test]
    fn adjacency_does_not_conflict() {
        assert!(!overlaps(at(10, 0), at(10, 30), at(10, 30), at(11, 0)));
        assert!(!overlaps(at(10, 30), at(11, 0), at(10, 0), at(10, 30)));
    }

    #[test]
    fn disjoint_does_not_conflict() {
        assert!(!overlaps(at(9, 0), at(9, 30), at(10, 0), at(10, 30)));
    }
}
