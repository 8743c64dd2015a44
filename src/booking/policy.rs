//! Authorization policy as data: the lifecycle transition table and the
//! per-role field allow-lists live here and nowhere else. Route handlers and
//! the service layer consult these tables instead of re-deriving role checks
//! inline.

use crate::booking::model::{BookingStatus, Field};
use crate::models::Role;

struct Edge {
    from: BookingStatus,
    to: BookingStatus,
    roles: &'static [Role],
}

/// Who may drive which lifecycle edge.
///
/// | From → To             | patient | dentist | admin |
/// |-----------------------|---------|---------|-------|
/// | pending → confirmed   |         |    ✓    |   ✓   |
/// | pending → cancelled   |    ✓    |         |   ✓   |
/// | confirmed → cancelled |    ✓    |         |   ✓   |
/// | active → completed    |         |    ✓    |   ✓   |
/// | active → no_show      |         |    ✓    |   ✓   |
const EDGES: &[Edge] = &[
    Edge {
        from: BookingStatus::Pending,
        to: BookingStatus::Confirmed,
        roles: &[Role::Dentist, Role::Admin],
    },
    Edge {
        from: BookingStatus::Pending,
        to: BookingStatus::Cancelled,
        roles: &[Role::Patient, Role::Admin],
    },
    Edge {
        from: BookingStatus::Confirmed,
        to: BookingStatus::Cancelled,
        roles: &[Role::Patient, Role::Admin],
    },
    Edge {
        from: BookingStatus::Pending,
        to: BookingStatus::Completed,
        roles: &[Role::Dentist, Role::Admin],
    },
    Edge {
        from: BookingStatus::Confirmed,
        to: BookingStatus::Completed,
        roles: &[Role::Dentist, Role::Admin],
    },
    Edge {
        from: BookingStatus::Pending,
        to: BookingStatus::NoShow,
        roles: &[Role::Dentist, Role::Admin],
    },
    Edge {
        from: BookingStatus::Confirmed,
        to: BookingStatus::NoShow,
        roles: &[Role::Dentist, Role::Admin],
    },
];

/// True when `role` may move a booking from `from` to `to`.
/// Terminal states have no outgoing edges, so they always return false.
pub fn transition_allowed(from: BookingStatus, to: BookingStatus, role: Role) -> bool {
    EDGES
        .iter()
        .any(|e| e.from == from && e.to == to && e.roles.contains(&role))
}

/// All statuses `role` may move a booking in `from` to.
pub fn transition_targets(from: BookingStatus, role: Role) -> Vec<BookingStatus> {
    EDGES
        .iter()
        .filter(|e| e.from == from && e.roles.contains(&role))
        .map(|e| e.to)
        .collect()
}

const ADMIN_FIELDS: &[Field] = &[
    Field::Status,
    Field::Notes,
    Field::ClinicalNotes,
    Field::Price,
    Field::PaymentStatus,
    Field::StartsAt,
];

const DENTIST_FIELDS: &[Field] = &[Field::Status, Field::ClinicalNotes, Field::Notes];

const PATIENT_PENDING_FIELDS: &[Field] = &[Field::Symptoms, Field::Notes];

/// Fields `role` may change on a booking currently in `status`. Ownership
/// (assigned dentist, owning patient) is checked by the service before this
/// table applies.
pub fn allowed_fields(role: Role, status: BookingStatus) -> &'static [Field] {
    match role {
        Role::Admin => ADMIN_FIELDS,
        Role::Dentist => DENTIST_FIELDS,
        Role::Patient if status == BookingStatus::Pending => PATIENT_PENDING_FIELDS,
        Role::Patient => &[],
    }
}
