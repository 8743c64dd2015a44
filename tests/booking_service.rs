//! End-to-end tests for the booking core against the in-memory store:
//! conflict detection, lifecycle transitions, field authorization and the
//! concurrent double-booking race.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use dental_booking_server::booking::{
    error::BookingError,
    events::{self, BookingEventKind},
    memory::MemStore,
    model::{BookingPatch, BookingStatus, Dentist, PaymentStatus, ServiceOffering},
    repository::BookingRepository,
    service::{BookingService, Caller, NewBooking},
};
use dental_booking_server::models::Role;

struct Clinic {
    bookings: Arc<BookingService>,
    store: Arc<MemStore>,
    patient: Caller,
    other_patient: Caller,
    dentist: Caller,
    admin: Caller,
    service_id: Uuid,
}

fn setup() -> Clinic {
    let store = Arc::new(MemStore::new());
    let dentist = Caller {
        user_id: Uuid::new_v4(),
        role: Role::Dentist,
    };
    store.add_dentist(Dentist {
        dentist_id: dentist.user_id,
        display_name: "Dr. Molar".into(),
        is_active: true,
    });

    let service_id = Uuid::new_v4();
    store.put_service(ServiceOffering {
        service_id,
        display_name: "Cleaning".into(),
        duration_min: 30,
        price_cents: 8000,
        is_active: true,
    });

    let (tx, _) = events::channel();
    let repo: Arc<MemStore> = store.clone();
    let bookings = Arc::new(BookingService::new(repo.clone(), repo, tx));

    Clinic {
        bookings,
        store,
        patient: Caller {
            user_id: Uuid::new_v4(),
            role: Role::Patient,
        },
        other_patient: Caller {
            user_id: Uuid::new_v4(),
            role: Role::Patient,
        },
        dentist,
        admin: Caller {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
        },
        service_id,
    }
}

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 10, h, m, 0).unwrap()
}

fn slot(clinic: &Clinic, starts_at: DateTime<Utc>) -> NewBooking {
    NewBooking {
        dentist_id: clinic.dentist.user_id,
        service_id: clinic.service_id,
        starts_at,
        symptoms: None,
        patient_id: None,
    }
}

/* ============================================================
   Creation + conflict detection
   ============================================================ */

#[tokio::test]
async fn booking_snapshots_service_duration_and_price() {
    let clinic = setup();
    let booking = clinic
        .bookings
        .create_booking(clinic.patient, slot(&clinic, at(10, 0)))
        .await
        .unwrap();

    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.patient_id, clinic.patient.user_id);
    assert_eq!(booking.duration_min, 30);
    assert_eq!(booking.price_cents, 8000);
    assert_eq!(booking.ends_at, at(10, 30));
    assert_eq!(booking.payment_status, PaymentStatus::Unpaid);
    assert!(booking.cancelled_at.is_none());
}

#[tokio::test]
async fn overlapping_slot_is_rejected_and_adjacent_slot_is_not() {
    let clinic = setup();
    let first = clinic
        .bookings
        .create_booking(clinic.patient, slot(&clinic, at(10, 0)))
        .await
        .unwrap();
    clinic
        .bookings
        .transition_booking(clinic.dentist, first.booking_id, BookingStatus::Confirmed)
        .await
        .unwrap();

    // [10:00, 10:30) confirmed; 10:15 collides, 10:30 is back-to-back.
    let err = clinic
        .bookings
        .create_booking(clinic.other_patient, slot(&clinic, at(10, 15)))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::SlotConflict));

    let adjacent = clinic
        .bookings
        .create_booking(clinic.other_patient, slot(&clinic, at(10, 30)))
        .await
        .unwrap();
    assert_eq!(adjacent.starts_at, at(10, 30));
    assert_eq!(adjacent.ends_at, at(11, 0));
}

#[tokio::test]
async fn cancelled_bookings_do_not_block_the_slot() {
    let clinic = setup();
    let first = clinic
        .bookings
        .create_booking(clinic.patient, slot(&clinic, at(10, 0)))
        .await
        .unwrap();
    clinic
        .bookings
        .cancel_booking(clinic.patient, first.booking_id)
        .await
        .unwrap();

    clinic
        .bookings
        .create_booking(clinic.other_patient, slot(&clinic, at(10, 0)))
        .await
        .unwrap();
}

#[tokio::test]
async fn unknown_dentist_or_service_is_rejected() {
    let clinic = setup();

    let err = clinic
        .bookings
        .create_booking(
            clinic.patient,
            NewBooking {
                dentist_id: Uuid::new_v4(),
                ..slot(&clinic, at(10, 0))
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NotFound("dentist")));

    let err = clinic
        .bookings
        .create_booking(
            clinic.patient,
            NewBooking {
                service_id: Uuid::new_v4(),
                ..slot(&clinic, at(10, 0))
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NotFound("service")));
}

#[tokio::test]
async fn retired_service_is_rejected() {
    let clinic = setup();
    clinic.store.put_service(ServiceOffering {
        service_id: clinic.service_id,
        display_name: "Cleaning".into(),
        duration_min: 30,
        price_cents: 8000,
        is_active: false,
    });

    let err = clinic
        .bookings
        .create_booking(clinic.patient, slot(&clinic, at(10, 0)))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::ServiceInactive));
}

#[tokio::test]
async fn patient_cannot_book_for_someone_else() {
    let clinic = setup();
    let err = clinic
        .bookings
        .create_booking(
            clinic.patient,
            NewBooking {
                patient_id: Some(clinic.other_patient.user_id),
                ..slot(&clinic, at(10, 0))
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Permission));

    // Admins may.
    let booking = clinic
        .bookings
        .create_booking(
            clinic.admin,
            NewBooking {
                patient_id: Some(clinic.other_patient.user_id),
                ..slot(&clinic, at(11, 0))
            },
        )
        .await
        .unwrap();
    assert_eq!(booking.patient_id, clinic.other_patient.user_id);
}

#[tokio::test]
async fn concurrent_creates_for_one_slot_yield_exactly_one_booking() {
    let clinic = setup();
    const ATTEMPTS: usize = 16;

    let mut handles = Vec::new();
    for _ in 0..ATTEMPTS {
        let bookings = clinic.bookings.clone();
        let req = slot(&clinic, at(9, 0));
        let patient = Caller {
            user_id: Uuid::new_v4(),
            role: Role::Patient,
        };
        handles.push(tokio::spawn(
            async move { bookings.create_booking(patient, req).await },
        ));
    }

    let mut won = 0;
    let mut lost = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(BookingError::SlotConflict) => lost += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(lost, ATTEMPTS - 1);
}

/* ============================================================
   Lifecycle transitions
   ============================================================ */

#[tokio::test]
async fn patient_cancels_own_pending_booking_once() {
    let clinic = setup();
    let booking = clinic
        .bookings
        .create_booking(clinic.patient, slot(&clinic, at(10, 0)))
        .await
        .unwrap();

    let cancelled = clinic
        .bookings
        .cancel_booking(clinic.patient, booking.booking_id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());

    let err = clinic
        .bookings
        .cancel_booking(clinic.patient, booking.booking_id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::InvalidTransition {
            from: BookingStatus::Cancelled,
            to: BookingStatus::Cancelled,
        }
    ));
}

#[tokio::test]
async fn role_scoping_on_transitions() {
    let clinic = setup();
    let booking = clinic
        .bookings
        .create_booking(clinic.patient, slot(&clinic, at(10, 0)))
        .await
        .unwrap();

    // Patients never confirm, dentists never cancel.
    let err = clinic
        .bookings
        .transition_booking(clinic.patient, booking.booking_id, BookingStatus::Confirmed)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { .. }));

    let err = clinic
        .bookings
        .transition_booking(clinic.dentist, booking.booking_id, BookingStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { .. }));

    // A patient who is not party to the booking is refused outright.
    let err = clinic
        .bookings
        .transition_booking(
            clinic.other_patient,
            booking.booking_id,
            BookingStatus::Cancelled,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Permission));

    let confirmed = clinic
        .bookings
        .transition_booking(clinic.dentist, booking.booking_id, BookingStatus::Confirmed)
        .await
        .unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);

    let completed = clinic
        .bookings
        .transition_booking(clinic.dentist, booking.booking_id, BookingStatus::Completed)
        .await
        .unwrap();
    assert_eq!(completed.status, BookingStatus::Completed);

    // Terminal: nothing leaves Completed.
    let err = clinic
        .bookings
        .transition_booking(clinic.admin, booking.booking_id, BookingStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { .. }));
}

#[tokio::test]
async fn no_show_requires_the_slot_to_have_started() {
    let clinic = setup();

    // Well in the future: rejected.
    let future = clinic
        .bookings
        .create_booking(clinic.patient, slot(&clinic, Utc::now() + Duration::days(30)))
        .await
        .unwrap();
    let err = clinic
        .bookings
        .transition_booking(clinic.dentist, future.booking_id, BookingStatus::NoShow)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { .. }));

    // Already past: allowed.
    let past = clinic
        .bookings
        .create_booking(clinic.patient, slot(&clinic, Utc::now() - Duration::days(1)))
        .await
        .unwrap();
    let marked = clinic
        .bookings
        .transition_booking(clinic.dentist, past.booking_id, BookingStatus::NoShow)
        .await
        .unwrap();
    assert_eq!(marked.status, BookingStatus::NoShow);
}

#[tokio::test]
async fn lost_status_race_surfaces_as_stale() {
    let clinic = setup();
    let booking = clinic
        .bookings
        .create_booking(clinic.patient, slot(&clinic, at(10, 0)))
        .await
        .unwrap();
    clinic
        .bookings
        .transition_booking(clinic.dentist, booking.booking_id, BookingStatus::Confirmed)
        .await
        .unwrap();

    // A writer still holding the Pending snapshot loses the CAS.
    let err = clinic
        .store
        .update_status(
            booking.booking_id,
            BookingStatus::Cancelled,
            BookingStatus::Pending,
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Stale));
}

#[tokio::test]
async fn missing_booking_is_not_found() {
    let clinic = setup();
    let err = clinic
        .bookings
        .transition_booking(clinic.admin, Uuid::new_v4(), BookingStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NotFound("booking")));
}

/* ============================================================
   Field-level updates
   ============================================================ */

#[tokio::test]
async fn disallowed_fields_are_dropped_not_rejected() {
    let clinic = setup();
    let booking = clinic
        .bookings
        .create_booking(clinic.patient, slot(&clinic, at(10, 0)))
        .await
        .unwrap();

    let updated = clinic
        .bookings
        .update_booking(
            clinic.patient,
            booking.booking_id,
            BookingPatch {
                symptoms: Some("sensitive molar".into()),
                clinical_notes: Some("should be dropped".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.symptoms.as_deref(), Some("sensitive molar"));
    assert!(updated.clinical_notes.is_none());
}

#[tokio::test]
async fn patient_updates_lock_out_after_pending() {
    let clinic = setup();
    let booking = clinic
        .bookings
        .create_booking(clinic.patient, slot(&clinic, at(10, 0)))
        .await
        .unwrap();
    clinic
        .bookings
        .transition_booking(clinic.dentist, booking.booking_id, BookingStatus::Confirmed)
        .await
        .unwrap();

    let err = clinic
        .bookings
        .update_booking(
            clinic.patient,
            booking.booking_id,
            BookingPatch {
                symptoms: Some("still aching".into()),
                notes: Some("running late".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NoUpdatableFields));

    // The assigned dentist still can.
    let updated = clinic
        .bookings
        .update_booking(
            clinic.dentist,
            booking.booking_id,
            BookingPatch {
                clinical_notes: Some("caries on 36".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.clinical_notes.as_deref(), Some("caries on 36"));
}

#[tokio::test]
async fn status_changes_through_patch_still_obey_the_state_machine() {
    let clinic = setup();
    let booking = clinic
        .bookings
        .create_booking(clinic.patient, slot(&clinic, at(10, 0)))
        .await
        .unwrap();
    clinic
        .bookings
        .transition_booking(clinic.admin, booking.booking_id, BookingStatus::Cancelled)
        .await
        .unwrap();

    // Cancelled is terminal even for an admin patching the field directly.
    let err = clinic
        .bookings
        .update_booking(
            clinic.admin,
            booking.booking_id,
            BookingPatch {
                status: Some(BookingStatus::Confirmed),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { .. }));
}

#[tokio::test]
async fn admin_reschedule_rechecks_conflicts_and_keeps_ends_at_consistent() {
    let clinic = setup();
    let first = clinic
        .bookings
        .create_booking(clinic.patient, slot(&clinic, at(10, 0)))
        .await
        .unwrap();
    let second = clinic
        .bookings
        .create_booking(clinic.other_patient, slot(&clinic, at(11, 0)))
        .await
        .unwrap();

    // Moving the second booking onto the first collides.
    let err = clinic
        .bookings
        .update_booking(
            clinic.admin,
            second.booking_id,
            BookingPatch {
                starts_at: Some(at(10, 15)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::SlotConflict));

    // Moving it to a free slot recomputes ends_at from the duration snapshot.
    let moved = clinic
        .bookings
        .update_booking(
            clinic.admin,
            second.booking_id,
            BookingPatch {
                starts_at: Some(at(14, 0)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(moved.starts_at, at(14, 0));
    assert_eq!(moved.ends_at, at(14, 30));

    // Rescheduling against its own old slot is not a self-conflict.
    let back = clinic
        .bookings
        .update_booking(
            clinic.admin,
            first.booking_id,
            BookingPatch {
                starts_at: Some(at(10, 5)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(back.ends_at, at(10, 35));
}

#[tokio::test]
async fn reschedule_write_path_enforces_no_overlap() {
    let clinic = setup();
    let first = clinic
        .bookings
        .create_booking(clinic.patient, slot(&clinic, at(10, 0)))
        .await
        .unwrap();
    let second = clinic
        .bookings
        .create_booking(clinic.other_patient, slot(&clinic, at(11, 0)))
        .await
        .unwrap();

    // Straight to the repository, skipping the advisory pre-check the
    // service runs: the write itself must still refuse the overlap.
    let err = clinic
        .store
        .update_fields(
            second.booking_id,
            &BookingPatch {
                starts_at: Some(at(10, 15)),
                ..Default::default()
            },
            second.updated_at,
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::SlotConflict));

    // The losing write left nothing behind: only the first booking holds
    // the slot.
    let clashes = clinic
        .store
        .find_overlapping(clinic.dentist.user_id, at(10, 0), at(11, 0))
        .await
        .unwrap();
    assert_eq!(clashes.len(), 1);
    assert_eq!(clashes[0].booking_id, first.booking_id);

    // A cancelled booking no longer occupies a slot, so moving it over an
    // active one is not a conflict.
    let cancelled = clinic
        .bookings
        .cancel_booking(clinic.other_patient, second.booking_id)
        .await
        .unwrap();
    let moved = clinic
        .store
        .update_fields(
            cancelled.booking_id,
            &BookingPatch {
                starts_at: Some(at(10, 15)),
                ..Default::default()
            },
            cancelled.updated_at,
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(moved.ends_at, at(10, 45));
}

#[tokio::test]
async fn catalog_edits_never_touch_existing_snapshots() {
    let clinic = setup();
    let booking = clinic
        .bookings
        .create_booking(clinic.patient, slot(&clinic, at(10, 0)))
        .await
        .unwrap();

    clinic.store.put_service(ServiceOffering {
        service_id: clinic.service_id,
        display_name: "Cleaning".into(),
        duration_min: 45,
        price_cents: 12000,
        is_active: true,
    });

    let unchanged = clinic
        .bookings
        .get_booking(clinic.patient, booking.booking_id)
        .await
        .unwrap();
    assert_eq!(unchanged.duration_min, 30);
    assert_eq!(unchanged.price_cents, 8000);

    // New bookings pick up the edited catalog entry.
    let fresh = clinic
        .bookings
        .create_booking(clinic.other_patient, slot(&clinic, at(12, 0)))
        .await
        .unwrap();
    assert_eq!(fresh.duration_min, 45);
    assert_eq!(fresh.price_cents, 12000);
}

/* ============================================================
   Reads + events
   ============================================================ */

#[tokio::test]
async fn reads_are_scoped_to_parties() {
    let clinic = setup();
    let booking = clinic
        .bookings
        .create_booking(clinic.patient, slot(&clinic, at(10, 0)))
        .await
        .unwrap();

    clinic
        .bookings
        .get_booking(clinic.patient, booking.booking_id)
        .await
        .unwrap();
    clinic
        .bookings
        .get_booking(clinic.dentist, booking.booking_id)
        .await
        .unwrap();
    let err = clinic
        .bookings
        .get_booking(clinic.other_patient, booking.booking_id)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Permission));

    // Dentists read only their own schedule.
    let err = clinic
        .bookings
        .list_dentist_schedule(
            Caller {
                user_id: Uuid::new_v4(),
                role: Role::Dentist,
            },
            clinic.dentist.user_id,
            at(0, 0),
            at(23, 59),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Permission));

    let day = clinic
        .bookings
        .list_dentist_schedule(clinic.admin, clinic.dentist.user_id, at(0, 0), at(23, 59))
        .await
        .unwrap();
    assert_eq!(day.len(), 1);

    let mine = clinic.bookings.list_my_bookings(clinic.patient).await.unwrap();
    assert_eq!(mine.len(), 1);
}

#[tokio::test]
async fn lifecycle_events_are_emitted_in_order() {
    let clinic = setup();
    let mut rx = clinic.bookings.subscribe();

    let booking = clinic
        .bookings
        .create_booking(clinic.patient, slot(&clinic, at(10, 0)))
        .await
        .unwrap();
    clinic
        .bookings
        .transition_booking(clinic.dentist, booking.booking_id, BookingStatus::Confirmed)
        .await
        .unwrap();
    clinic
        .bookings
        .cancel_booking(clinic.patient, booking.booking_id)
        .await
        .unwrap();

    let created = rx.recv().await.unwrap();
    assert_eq!(created.kind, BookingEventKind::Created);
    assert_eq!(created.booking.booking_id, booking.booking_id);

    let confirmed = rx.recv().await.unwrap();
    assert_eq!(confirmed.kind, BookingEventKind::Confirmed);

    let cancelled = rx.recv().await.unwrap();
    assert_eq!(cancelled.kind, BookingEventKind::Cancelled);
    assert!(cancelled.booking.cancelled_at.is_some());
}
