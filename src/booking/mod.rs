//! Appointment booking core: conflict detection, the lifecycle state
//! machine, role-scoped field updates and the repository seam they share.

pub mod conflict;
pub mod error;
pub mod events;
pub mod memory;
pub mod model;
pub mod pg;
pub mod policy;
pub mod repository;
pub mod service;

pub use error::BookingError;
pub use model::{Booking, BookingPatch, BookingStatus, PaymentStatus};
pub use service::{BookingService, Caller, NewBooking};
