//! REST endpoint handlers.
//!
//! Two credential domains exist side by side:
//!
//! - the **internal token** authenticates the chat bot for all
//!   `/user/...` management endpoints;
//! - the **spin code** (ephemeral capability) and the **wheel token**
//!   (signed, long-lived) authenticate the wheel client for
//!   `/wheel/...` spin and unlock.
//!
//! Mutations that touch persisted records run inside the session
//! Observable's `atomic()` window and persist **before** committing, so
//! a store failure leaves the in-memory state untouched.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/probe/live` | Liveness probe |
//! | `GET` | `/user/{user_id}/wheel` | List wheels visible to a user |
//! | `POST` | `/user/{user_id}/wheel` | Create a wheel |
//! | `GET` | `/user/{user_id}/wheel/{wheel_id}` | Wheel plus drink list |
//! | `PATCH` | `/user/{user_id}/wheel/{wheel_id}/name` | Rename a wheel |
//! | `DELETE` | `/user/{user_id}/wheel/{wheel_id}` | Delete a wheel |
//! | `POST` | `/user/{user_id}/wheel/{wheel_id}/registration` | Confirm a pairing |
//! | `POST` | `/user/{user_id}/wheel/{wheel_id}/drink` | Add a drink |
//! | `DELETE` | `/user/{user_id}/wheel/{wheel_id}/drink/{drink_id}` | Remove a drink |
//! | `POST` | `/wheel/{wheel_id}/is_locked` | Spin (bearer = spin code) |
//! | `DELETE` | `/wheel/is_locked` | Unlock (bearer = wheel token) |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use chrono::Utc;
use uuid::Uuid;

use misfortune_types::{
    Drink, DrinkId, TelegramWheel, TelegramWheelState, TelegramWheels, UserId, Wheel, WheelId,
    WheelState,
};

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

/// Query parameters carrying a display name.
#[derive(Debug, serde::Deserialize)]
pub struct NameQuery {
    /// The display name.
    pub name: String,
}

/// Query parameters for the spin endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct SpinQuery {
    /// Requested spin speed.
    pub speed: f64,
}

/// Query parameters for the pairing confirmation endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct RegistrationQuery {
    /// The pending registration to confirm.
    pub registration_id: Uuid,
}

// ---------------------------------------------------------------------------
// Auth helpers
// ---------------------------------------------------------------------------

/// Extract the bearer token from the `Authorization` header.
fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::Forbidden)
}

/// Require the chat bot's internal token.
fn require_internal(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    if bearer_token(headers)? == state.internal_token {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

fn telegram_wheel(wheel_id: WheelId, state: &WheelState, user: UserId) -> TelegramWheel {
    TelegramWheel {
        name: state.wheel_name.clone(),
        id: wheel_id,
        is_owned: state.owner == user,
    }
}

// ---------------------------------------------------------------------------
// GET /probe/live
// ---------------------------------------------------------------------------

/// Liveness probe.
pub async fn liveness() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// GET /user/{user_id}/wheel
// ---------------------------------------------------------------------------

/// List all wheels visible to `user_id`.
pub async fn list_wheels(
    Path(user_id): Path<i64>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Json<TelegramWheels>, ApiError> {
    require_internal(&state, &headers)?;
    let user = UserId::from(user_id);

    let wheels = state
        .registry
        .accessible_snapshots(user)
        .await
        .iter()
        .map(|(wheel_id, snapshot)| telegram_wheel(*wheel_id, snapshot, user))
        .collect();

    Ok(Json(TelegramWheels { wheels }))
}

// ---------------------------------------------------------------------------
// POST /user/{user_id}/wheel
// ---------------------------------------------------------------------------

/// Create a wheel for `user_id`.
///
/// Enforces the per-user quota, persists the record, then registers the
/// live session.
pub async fn create_wheel(
    Path(user_id): Path<i64>,
    Query(query): Query<NameQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<TelegramWheel>), ApiError> {
    require_internal(&state, &headers)?;
    let user = UserId::from(user_id);

    if state.registry.owned_count(user).await >= state.max_user_wheels {
        return Err(ApiError::WheelLimit);
    }

    let wheel = Wheel::create(user, query.name);
    state.store.create_wheel(&wheel).await?;
    state.registry.insert(&wheel).await;
    tracing::info!(wheel = %wheel.id, owner = %user, "wheel created");

    Ok((
        StatusCode::CREATED,
        Json(TelegramWheel {
            name: wheel.name,
            id: wheel.id,
            is_owned: true,
        }),
    ))
}

// ---------------------------------------------------------------------------
// GET /user/{user_id}/wheel/{wheel_id}
// ---------------------------------------------------------------------------

/// One wheel plus its drink list.
pub async fn get_wheel_state(
    Path((user_id, wheel_id)): Path<(i64, Uuid)>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Json<TelegramWheelState>, ApiError> {
    require_internal(&state, &headers)?;
    let user = UserId::from(user_id);
    let wheel_id = WheelId::from(wheel_id);

    let session = state.registry.verify_access(user, wheel_id, false).await?;
    let snapshot = session.snapshot();

    Ok(Json(TelegramWheelState {
        wheel: telegram_wheel(wheel_id, &snapshot, user),
        drinks: snapshot.drinks.clone(),
    }))
}

// ---------------------------------------------------------------------------
// PATCH /user/{user_id}/wheel/{wheel_id}/name
// ---------------------------------------------------------------------------

/// Rename a wheel (owner only). Persists, then commits in-memory.
pub async fn update_wheel_name(
    Path((user_id, wheel_id)): Path<(i64, Uuid)>,
    Query(query): Query<NameQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Json<TelegramWheel>, ApiError> {
    require_internal(&state, &headers)?;
    let user = UserId::from(user_id);
    let wheel_id = WheelId::from(wheel_id);

    let session = state.registry.verify_access(user, wheel_id, true).await?;

    let atom = session.state().atomic().await;
    let snapshot = atom.read();
    state.store.update_wheel_name(wheel_id, &query.name).await?;
    atom.update(WheelState {
        wheel_name: query.name.clone(),
        ..(*snapshot).clone()
    })
    .await?;

    Ok(Json(TelegramWheel {
        name: query.name,
        id: wheel_id,
        is_owned: true,
    }))
}

// ---------------------------------------------------------------------------
// POST /user/{user_id}/wheel/{wheel_id}/registration
// ---------------------------------------------------------------------------

/// Confirm a pending wheel client registration.
///
/// The owner pairs a waiting client with this wheel. An expired or
/// unknown registration is a 404 so the bot can tell the owner the
/// client gave up waiting.
pub async fn confirm_registration(
    Path((user_id, wheel_id)): Path<(i64, Uuid)>,
    Query(query): Query<RegistrationQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    require_internal(&state, &headers)?;
    let user = UserId::from(user_id);
    let wheel_id = WheelId::from(wheel_id);

    state.registry.verify_access(user, wheel_id, false).await?;
    state
        .pairing
        .confirm(query.registration_id.into(), wheel_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// DELETE /user/{user_id}/wheel/{wheel_id}
// ---------------------------------------------------------------------------

/// Delete a wheel (owner only).
///
/// Persists the deletion, removes the live session, and closes it so
/// subscribed wheel clients disconnect instead of serving a dead wheel.
pub async fn delete_wheel(
    Path((user_id, wheel_id)): Path<(i64, Uuid)>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    require_internal(&state, &headers)?;
    let user = UserId::from(user_id);
    let wheel_id = WheelId::from(wheel_id);

    state.registry.verify_access(user, wheel_id, true).await?;
    state.store.delete_wheel(wheel_id).await?;

    if let Some(session) = state.registry.remove(wheel_id).await {
        session.close();
    }
    tracing::info!(wheel = %wheel_id, "wheel deleted");

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// POST /wheel/{wheel_id}/is_locked
// ---------------------------------------------------------------------------

/// Spin a wheel. The bearer token is the ephemeral spin code.
///
/// An unknown wheel id is indistinguishable from a bad code.
pub async fn spin(
    Path(wheel_id): Path<Uuid>,
    Query(query): Query<SpinQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    let code = bearer_token(&headers)?;
    let session = state
        .registry
        .get(WheelId::from(wheel_id))
        .await
        .ok_or(ApiError::Forbidden)?;

    session.spin(code, query.speed).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// DELETE /wheel/is_locked
// ---------------------------------------------------------------------------

/// Unlock after a spin. The bearer token is the signed wheel token,
/// whose subject selects the wheel.
pub async fn unlock(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    let token = bearer_token(&headers)?;
    let wheel_id = state.tokens.verify(token)?;

    let session = state
        .registry
        .get(wheel_id)
        .await
        .ok_or(ApiError::Forbidden)?;

    session.unlock().await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// POST /user/{user_id}/wheel/{wheel_id}/drink
// ---------------------------------------------------------------------------

/// Add a drink to a wheel.
///
/// Duplicate names are ignored rather than duplicated on the wheel.
pub async fn add_drink(
    Path((user_id, wheel_id)): Path<(i64, Uuid)>,
    Query(query): Query<NameQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    require_internal(&state, &headers)?;
    let user = UserId::from(user_id);
    let wheel_id = WheelId::from(wheel_id);
    let name = query.name.trim();

    let session = state.registry.verify_access(user, wheel_id, false).await?;

    let atom = session.state().atomic().await;
    let snapshot = atom.read();

    if !snapshot.drinks.iter().any(|drink| drink.name == name) {
        let mut drinks = snapshot.drinks.clone();
        drinks.push(Drink::create(name));

        state.store.update_wheel_drinks(wheel_id, &drinks).await?;
        atom.update(WheelState {
            drinks,
            drinks_refreshed_at: Some(Utc::now()),
            ..(*snapshot).clone()
        })
        .await?;
    }

    Ok(StatusCode::CREATED)
}

// ---------------------------------------------------------------------------
// DELETE /user/{user_id}/wheel/{wheel_id}/drink/{drink_id}
// ---------------------------------------------------------------------------

/// Remove a drink from a wheel.
pub async fn delete_drink(
    Path((user_id, wheel_id, drink_id)): Path<(i64, Uuid, Uuid)>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    require_internal(&state, &headers)?;
    let user = UserId::from(user_id);
    let wheel_id = WheelId::from(wheel_id);
    let drink_id = DrinkId::from(drink_id);

    let session = state.registry.verify_access(user, wheel_id, false).await?;

    let atom = session.state().atomic().await;
    let snapshot = atom.read();

    let drinks: Vec<Drink> = snapshot
        .drinks
        .iter()
        .filter(|drink| drink.id != drink_id)
        .cloned()
        .collect();

    state.store.update_wheel_drinks(wheel_id, &drinks).await?;
    // Keep current_drink a valid index after the removal.
    let current_drink = snapshot
        .current_drink
        .min(drinks.len().saturating_sub(1));
    atom.update(WheelState {
        drinks,
        current_drink,
        drinks_refreshed_at: Some(Utc::now()),
        ..(*snapshot).clone()
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
