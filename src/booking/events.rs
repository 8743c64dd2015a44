use serde::Serialize;
use tokio::sync::broadcast;

use crate::booking::model::Booking;

/// Logical lifecycle events handed to the notification/socket layer.
/// Delivery is fire-and-forget from the core's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingEventKind {
    Created,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl BookingEventKind {
    pub fn topic(self) -> &'static str {
        match self {
            BookingEventKind::Created => "booking.created",
            BookingEventKind::Confirmed => "booking.confirmed",
            BookingEventKind::Cancelled => "booking.cancelled",
            BookingEventKind::Completed => "booking.completed",
            BookingEventKind::NoShow => "booking.no_show",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingEvent {
    pub kind: BookingEventKind,
    pub booking: Booking,
}

pub type EventSender = broadcast::Sender<BookingEvent>;
pub type EventReceiver = broadcast::Receiver<BookingEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    broadcast::channel(64)
}
