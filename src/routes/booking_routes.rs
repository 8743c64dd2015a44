// src/routes/booking_routes.rs

use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    booking::{Booking, BookingPatch, BookingStatus, Caller, NewBooking},
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::AppState,
};

fn caller(auth: &AuthContext) -> Caller {
    Caller {
        user_id: auth.user_id,
        role: auth.role,
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/mine", get(list_my_bookings))
        .route("/bookings/schedule", get(get_schedule))
        .route("/bookings/{booking_id}", get(get_booking))
        .route("/bookings/{booking_id}", patch(patch_booking))
        .route("/bookings/{booking_id}/confirm", post(confirm_booking))
        .route("/bookings/{booking_id}/complete", post(complete_booking))
        .route("/bookings/{booking_id}/cancel", post(cancel_booking))
        .route("/bookings/{booking_id}/no_show", post(mark_no_show))
}

/* ============================================================
   DTOs
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub dentist_id: Uuid,
    pub service_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub symptoms: Option<String>,
    /// Admin-only: book on behalf of this patient.
    pub patient_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleQuery {
    // YYYY-MM-DD (UTC day; local interpretation belongs to the frontend)
    pub start: String,
    pub days: Option<i64>,
    pub dentist_id: Uuid,
}

/* ============================================================
   POST /bookings (create)
   ============================================================ */

pub async fn create_booking(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateBookingRequest>,
) -> Result<Json<ApiOk<Booking>>, ApiError> {
    let booking = state
        .bookings
        .create_booking(
            caller(&auth),
            NewBooking {
                dentist_id: req.dentist_id,
                service_id: req.service_id,
                starts_at: req.starts_at,
                symptoms: req.symptoms,
                patient_id: req.patient_id,
            },
        )
        .await?;

    Ok(Json(ApiOk { data: booking }))
}

/* ============================================================
   GET /bookings/{id}
   ============================================================ */

pub async fn get_booking(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<ApiOk<Booking>>, ApiError> {
    let booking = state.bookings.get_booking(caller(&auth), booking_id).await?;
    Ok(Json(ApiOk { data: booking }))
}

/* ============================================================
   GET /bookings/mine
   ============================================================ */

pub async fn list_my_bookings(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<Booking>>>, ApiError> {
    let bookings = state.bookings.list_my_bookings(caller(&auth)).await?;
    Ok(Json(ApiOk { data: bookings }))
}

/* ============================================================
   GET /bookings/schedule  (dentist day/week view)
   ============================================================ */

pub async fn get_schedule(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<ScheduleQuery>,
) -> Result<Json<ApiOk<Vec<Booking>>>, ApiError> {
    let days = q.days.unwrap_or(7);
    if !(1..=14).contains(&days) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "days must be between 1 and 14".into(),
        ));
    }

    let start_date = NaiveDate::parse_from_str(q.start.trim(), "%Y-%m-%d").map_err(|_| {
        ApiError::BadRequest("VALIDATION_ERROR", "start must be YYYY-MM-DD".into())
    })?;

    // Range: [start, start+days)
    let from = DateTime::<Utc>::from_naive_utc_and_offset(
        start_date.and_hms_opt(0, 0, 0).expect("midnight is valid"),
        Utc,
    );
    let to = from + chrono::Duration::days(days);

    let bookings = state
        .bookings
        .list_dentist_schedule(caller(&auth), q.dentist_id, from, to)
        .await?;

    Ok(Json(ApiOk { data: bookings }))
}

/* ============================================================
   PATCH /bookings/{id}  (role/state-filtered field update)
   ============================================================ */

pub async fn patch_booking(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(booking_id): Path<Uuid>,
    Json(patch): Json<BookingPatch>,
) -> Result<Json<ApiOk<Booking>>, ApiError> {
    let booking = state
        .bookings
        .update_booking(caller(&auth), booking_id, patch)
        .await?;
    Ok(Json(ApiOk { data: booking }))
}

/* ============================================================
   Status transitions
   ============================================================ */

async fn transition(
    state: AppState,
    auth: AuthContext,
    booking_id: Uuid,
    to: BookingStatus,
) -> Result<Json<ApiOk<Booking>>, ApiError> {
    let booking = state
        .bookings
        .transition_booking(caller(&auth), booking_id, to)
        .await?;
    Ok(Json(ApiOk { data: booking }))
}

pub async fn confirm_booking(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<ApiOk<Booking>>, ApiError> {
    transition(state, auth, booking_id, BookingStatus::Confirmed).await
}

pub async fn complete_booking(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<ApiOk<Booking>>, ApiError> {
    transition(state, auth, booking_id, BookingStatus::Completed).await
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<ApiOk<Booking>>, ApiError> {
    let booking = state
        .bookings
        .cancel_booking(caller(&auth), booking_id)
        .await?;
    Ok(Json(ApiOk { data: booking }))
}

pub async fn mark_no_show(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<ApiOk<Booking>>, ApiError> {
    transition(state, auth, booking_id, BookingStatus::NoShow).await
}
