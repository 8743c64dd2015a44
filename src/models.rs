use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::booking::BookingService;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub bookings: Arc<BookingService>,
}

/// Role mapping (clinic_user.role smallint):
/// 0 patient, 1 admin, 2 dentist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum Role {
    Patient = 0,
    Admin = 1,
    Dentist = 2,
}

impl Role {
    pub fn from_i16(raw: i16) -> Option<Role> {
        match raw {
            0 => Some(Role::Patient),
            1 => Some(Role::Admin),
            2 => Some(Role::Dentist),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Admin => "admin",
            Role::Dentist => "dentist",
        }
    }
}
