//! JSON/HTTP surface. Thin: decode, authenticate, call the engine, encode.
//! All entitlement decisions live in the engine; this layer only turns a
//! bearer token into a `Principal` and engine errors into status codes.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::error;
use ulid::Ulid;

use crate::auth::AuthRegistry;
use crate::engine::{policy_for, BookingRequest, Engine, EngineError, Probe};
use crate::model::*;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub auth: Arc<AuthRegistry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/venues", post(create_venue).get(list_venues))
        .route(
            "/venues/:id",
            get(get_venue).put(update_venue).delete(delete_venue),
        )
        .route("/venues/:id/availability", get(availability))
        .route("/bookings", post(create_booking))
        .route(
            "/bookings/:id",
            get(get_booking).put(edit_booking).delete(delete_booking),
        )
        .route("/bookings/:id/approve", put(approve_booking))
        .route("/bookings/:id/decline", put(decline_booking))
        .route("/bookings/:id/cancel", put(cancel_booking))
        .route("/my/bookings", get(my_bookings))
        .route("/owner/bookings", get(owner_listing))
        .route("/admin/stats", get(admin_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Errors ───────────────────────────────────────────────────────

pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::Rejected(_)
            | EngineError::Unsupported(_)
            | EngineError::LimitExceeded(_) => StatusCode::BAD_REQUEST,
            EngineError::AuthRequired => StatusCode::UNAUTHORIZED,
            EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::InvalidTransition { .. } | EngineError::HasActiveBookings(_) => {
                StatusCode::CONFLICT
            }
            EngineError::WalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = match &self.0 {
            // Details stay in the log, not the response
            EngineError::WalError(e) => {
                error!(error = %e, "write-ahead log failure");
                json!({ "errorMsg": "internal error" })
            }
            EngineError::Rejected(violations) => json!({
                "errorMsg": violations.join("; "),
                "violations": violations,
            }),
            other => json!({ "errorMsg": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

// ── Authentication ───────────────────────────────────────────────

/// Extracts the caller from the `Authorization: Bearer` header. Missing or
/// unknown tokens are rejected before the handler runs.
pub struct Authed(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for Authed {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "));
        token
            .and_then(|t| state.auth.resolve(t))
            .map(Authed)
            .ok_or(ApiError(EngineError::AuthRequired))
    }
}

// ── DTOs ─────────────────────────────────────────────────────────

/// JSON shape of `VenueRules`: one object tagged by `kind`, camelCase fields.
/// The model keeps plain external tagging for the WAL's bincode encoding, so
/// the translation happens here.
#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
enum RulesDto {
    Restaurant {
        max_pax: u32,
        opens_at: NaiveTime,
        closes_at: NaiveTime,
        closed_days: Vec<chrono::Weekday>,
    },
    Event {
        max_capacity: u32,
        ticket_price: Decimal,
    },
    Activity {
        capacity: u32,
        price_per_person: Decimal,
        dates: Vec<NaiveDate>,
    },
    Service {
        hourly_rate: Decimal,
    },
}

impl From<RulesDto> for VenueRules {
    fn from(dto: RulesDto) -> Self {
        match dto {
            RulesDto::Restaurant { max_pax, opens_at, closes_at, closed_days } => {
                VenueRules::Restaurant { max_pax, opens_at, closes_at, closed_days }
            }
            RulesDto::Event { max_capacity, ticket_price } => {
                VenueRules::Event { max_capacity, ticket_price }
            }
            RulesDto::Activity { capacity, price_per_person, dates } => {
                VenueRules::Activity { capacity, price_per_person, dates }
            }
            RulesDto::Service { hourly_rate } => VenueRules::Service { hourly_rate },
        }
    }
}

impl From<VenueRules> for RulesDto {
    fn from(rules: VenueRules) -> Self {
        match rules {
            VenueRules::Restaurant { max_pax, opens_at, closes_at, closed_days } => {
                RulesDto::Restaurant { max_pax, opens_at, closes_at, closed_days }
            }
            VenueRules::Event { max_capacity, ticket_price } => {
                RulesDto::Event { max_capacity, ticket_price }
            }
            VenueRules::Activity { capacity, price_per_person, dates } => {
                RulesDto::Activity { capacity, price_per_person, dates }
            }
            VenueRules::Service { hourly_rate } => RulesDto::Service { hourly_rate },
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VenuePayload {
    name: String,
    rules: RulesDto,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VenueDto {
    id: Ulid,
    owner: Ulid,
    name: String,
    #[serde(flatten)]
    rules: RulesDto,
}

impl From<Venue> for VenueDto {
    fn from(v: Venue) -> Self {
        Self { id: v.id, owner: v.owner, name: v.name, rules: v.rules.into() }
    }
}

/// A booking with its status rendered in the kind's vocabulary.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BookingDto {
    id: Ulid,
    venue_id: Ulid,
    requester: Ulid,
    slot: BookingSlot,
    quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_price: Option<Decimal>,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BookingDto {
    fn new(b: Booking, kind: VenueKind) -> Self {
        let status = policy_for(kind).display_status(b.status);
        Self {
            id: b.id,
            venue_id: b.venue_id,
            requester: b.requester,
            slot: b.slot,
            quantity: b.quantity,
            total_price: b.total_price,
            status,
            status_reason: b.status_reason,
            created_at: b.created_at,
            updated_at: b.updated_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OwnerBookingDto {
    venue_id: Ulid,
    venue_name: String,
    venue_kind: VenueKind,
    #[serde(flatten)]
    booking: BookingDto,
}

#[derive(Deserialize, Default)]
struct ReasonPayload {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct AvailabilityQuery {
    #[serde(default)]
    date: Option<NaiveDate>,
    #[serde(default)]
    from: Option<DateTime<Utc>>,
    #[serde(default)]
    to: Option<DateTime<Utc>>,
    #[serde(default)]
    start: Option<NaiveTime>,
    #[serde(default)]
    hours: Option<u32>,
}

impl AvailabilityQuery {
    fn probe(&self) -> Probe {
        match (self.date, self.start, self.hours, self.from, self.to) {
            (Some(date), Some(start), Some(hours), ..) => {
                Probe::Slot { date, span: SlotSpan::from_time(start, hours) }
            }
            (Some(date), ..) => Probe::Day(date),
            (None, _, _, Some(from), Some(to)) => Probe::Window { from, to },
            _ => Probe::Lifetime,
        }
    }
}

async fn booking_dto(engine: &Engine, booking: Booking) -> Result<BookingDto, ApiError> {
    let venue = engine.get_venue(booking.venue_id).await?;
    Ok(BookingDto::new(booking, venue.kind()))
}

// ── Handlers ─────────────────────────────────────────────────────

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn create_venue(
    State(state): State<AppState>,
    Authed(principal): Authed,
    Json(body): Json<VenuePayload>,
) -> Result<(StatusCode, Json<VenueDto>), ApiError> {
    let venue = state
        .engine
        .create_venue(&principal, body.name, body.rules.into())
        .await?;
    Ok((StatusCode::CREATED, Json(venue.into())))
}

async fn list_venues(State(state): State<AppState>) -> Json<Vec<VenueDto>> {
    Json(
        state
            .engine
            .list_venues()
            .await
            .into_iter()
            .map(VenueDto::from)
            .collect(),
    )
}

async fn get_venue(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
) -> Result<Json<VenueDto>, ApiError> {
    Ok(Json(state.engine.get_venue(id).await?.into()))
}

async fn update_venue(
    State(state): State<AppState>,
    Authed(principal): Authed,
    Path(id): Path<Ulid>,
    Json(body): Json<VenuePayload>,
) -> Result<Json<VenueDto>, ApiError> {
    let venue = state
        .engine
        .update_venue(&principal, id, body.name, body.rules.into())
        .await?;
    Ok(Json(venue.into()))
}

async fn delete_venue(
    State(state): State<AppState>,
    Authed(principal): Authed,
    Path(id): Path<Ulid>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete_venue(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Public availability probe. Events answer in ticket vocabulary; the other
/// kinds get the generic shape.
async fn availability(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let venue = state.engine.get_venue(id).await?;
    let avail = state.engine.check_availability(id, query.probe()).await?;
    let body = match venue.kind() {
        VenueKind::Event => json!({
            "maxCapacity": avail.capacity,
            "bookedTickets": avail.committed,
            "ticketsRemaining": avail.remaining,
            "isSoldOut": avail.is_full,
        }),
        _ => json!({
            "capacity": avail.capacity,
            "committed": avail.committed,
            "remaining": avail.remaining,
            "isFull": avail.is_full,
        }),
    };
    Ok(Json(body))
}

async fn create_booking(
    State(state): State<AppState>,
    Authed(principal): Authed,
    Json(req): Json<BookingRequest>,
) -> Result<(StatusCode, Json<BookingDto>), ApiError> {
    let booking = state.engine.create_booking(&principal, &req).await?;
    let dto = booking_dto(&state.engine, booking).await?;
    Ok((StatusCode::CREATED, Json(dto)))
}

async fn get_booking(
    State(state): State<AppState>,
    Authed(principal): Authed,
    Path(id): Path<Ulid>,
) -> Result<Json<BookingDto>, ApiError> {
    let booking = state.engine.get_booking(&principal, id).await?;
    Ok(Json(booking_dto(&state.engine, booking).await?))
}

async fn edit_booking(
    State(state): State<AppState>,
    Authed(principal): Authed,
    Path(id): Path<Ulid>,
    Json(req): Json<BookingRequest>,
) -> Result<Json<BookingDto>, ApiError> {
    let booking = state.engine.edit_booking(&principal, id, &req).await?;
    Ok(Json(booking_dto(&state.engine, booking).await?))
}

async fn delete_booking(
    State(state): State<AppState>,
    Authed(principal): Authed,
    Path(id): Path<Ulid>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete_booking(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn approve_booking(
    State(state): State<AppState>,
    Authed(principal): Authed,
    Path(id): Path<Ulid>,
) -> Result<Json<BookingDto>, ApiError> {
    let booking = state.engine.approve_booking(&principal, id).await?;
    Ok(Json(booking_dto(&state.engine, booking).await?))
}

async fn decline_booking(
    State(state): State<AppState>,
    Authed(principal): Authed,
    Path(id): Path<Ulid>,
    body: Option<Json<ReasonPayload>>,
) -> Result<Json<BookingDto>, ApiError> {
    let reason = body.map(|Json(b)| b.reason).unwrap_or_default();
    let booking = state.engine.decline_booking(&principal, id, reason).await?;
    Ok(Json(booking_dto(&state.engine, booking).await?))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Authed(principal): Authed,
    Path(id): Path<Ulid>,
    body: Option<Json<ReasonPayload>>,
) -> Result<Json<BookingDto>, ApiError> {
    let reason = body.map(|Json(b)| b.reason).unwrap_or_default();
    let booking = state.engine.cancel_booking(&principal, id, reason).await?;
    Ok(Json(booking_dto(&state.engine, booking).await?))
}

async fn my_bookings(
    State(state): State<AppState>,
    Authed(principal): Authed,
) -> Result<Json<Vec<BookingDto>>, ApiError> {
    let mut out = Vec::new();
    for booking in state.engine.requester_bookings(&principal).await {
        out.push(booking_dto(&state.engine, booking).await?);
    }
    Ok(Json(out))
}

async fn owner_listing(
    State(state): State<AppState>,
    Authed(principal): Authed,
) -> Json<Vec<OwnerBookingDto>> {
    let listed = state.engine.owner_bookings(&principal).await;
    Json(
        listed
            .into_iter()
            .map(|o| OwnerBookingDto {
                venue_id: o.venue_id,
                venue_name: o.venue_name,
                venue_kind: o.venue_kind,
                booking: BookingDto::new(o.booking, o.venue_kind),
            })
            .collect(),
    )
}

async fn admin_stats(
    State(state): State<AppState>,
    Authed(principal): Authed,
) -> Result<Json<Stats>, ApiError> {
    Ok(Json(state.engine.stats(&principal).await?))
}
