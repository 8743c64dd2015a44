// src/routes/service_routes.rs

use axum::{Json, Router, extract::State, routing::get};

use crate::{
    booking::model::ServiceOffering,
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_services))
}

pub async fn list_services(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<Vec<ServiceOffering>>, ApiError> {
    let rows: Vec<ServiceOffering> = sqlx::query_as::<_, ServiceOffering>(
        r#"
        SELECT
          service_id,
          display_name,
          duration_min,
          price_cents,
          is_active
        FROM service_catalog
        WHERE is_active = true
        ORDER BY display_name ASC
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(rows))
}
