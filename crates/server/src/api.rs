use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequestParts, Path, Request, State,
    },
    http::{request::Parts, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use intake_core::domain::customer::{Customer, CustomerCode, CustomerDraft, CustomerId};
use intake_core::domain::order::{Order, OrderDraft, OrderId};
use intake_core::errors::{ApplicationError, InterfaceError};

use crate::intake::IntakeService;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    service: Arc<IntakeService>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for CorrelationId {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CorrelationId>()
            .cloned()
            .unwrap_or_else(|| CorrelationId(Uuid::new_v4().to_string())))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct CustomerCreated {
    message: &'static str,
    id: CustomerId,
    code: CustomerCode,
}

#[derive(Debug, Serialize)]
struct OrderCreated {
    message: &'static str,
    order_id: OrderId,
}

/// Handler failure rendered as `{"error": ...}` with the status of its kind.
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    fn from_application(error: ApplicationError, correlation_id: &CorrelationId) -> Self {
        Self(error.into_interface(correlation_id.0.clone()))
    }

    fn bad_request(message: &str, correlation_id: &CorrelationId) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.to_string(),
            correlation_id: correlation_id.0.clone(),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(
                event_name = "api.request.failed",
                correlation_id = %self.0.correlation_id(),
                error = %self.0,
                "request failed"
            );
        } else {
            info!(
                event_name = "api.request.rejected",
                correlation_id = %self.0.correlation_id(),
                status = status.as_u16(),
                error = %self.0,
                "request rejected"
            );
        }

        (status, Json(ErrorBody { error: self.0.user_message().to_string() })).into_response()
    }
}

pub fn router(service: Arc<IntakeService>) -> Router {
    Router::new()
        .route("/customers", post(create_customer))
        .route("/customers/{id}", get(get_customer))
        .route("/customers/{id}/orders", get(list_customer_orders))
        .route("/orders", post(create_order))
        .route("/orders/{id}", get(get_order))
        .with_state(ApiState { service })
}

/// Unmatched paths and methods answer with `{error}` bodies like every other
/// failure. Apply once, to the fully merged router.
pub fn with_error_fallbacks(router: Router) -> Router {
    router.fallback(route_not_found).method_not_allowed_fallback(method_not_allowed)
}

async fn route_not_found(correlation_id: CorrelationId) -> ApiError {
    ApiError(InterfaceError::NotFound {
        message: "Route not found".to_string(),
        correlation_id: correlation_id.0,
    })
}

async fn method_not_allowed(correlation_id: CorrelationId) -> ApiError {
    ApiError(InterfaceError::MethodNotAllowed {
        message: "Method not allowed".to_string(),
        correlation_id: correlation_id.0,
    })
}

/// Attaches a correlation id to every request: the caller's
/// `x-correlation-id` when usable, a fresh UUID otherwise. The id is echoed on
/// the response and recorded on the request span.
pub async fn correlation(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = info_span!(
        "http_request",
        correlation_id = %id,
        method = %request.method(),
        path = %request.uri().path()
    );
    request.extensions_mut().insert(CorrelationId(id.clone()));

    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

async fn create_customer(
    State(state): State<ApiState>,
    correlation_id: CorrelationId,
    payload: Result<Json<CustomerDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<CustomerCreated>), ApiError> {
    let Json(draft) = payload.map_err(|rejection| body_rejected(rejection, &correlation_id))?;
    let customer = state
        .service
        .create_customer(draft)
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;

    Ok((
        StatusCode::CREATED,
        Json(CustomerCreated { message: "Customer added", id: customer.id, code: customer.code }),
    ))
}

async fn create_order(
    State(state): State<ApiState>,
    correlation_id: CorrelationId,
    payload: Result<Json<OrderDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderCreated>), ApiError> {
    let Json(draft) = payload.map_err(|rejection| body_rejected(rejection, &correlation_id))?;
    let order = state
        .service
        .create_order(draft)
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;

    Ok((StatusCode::CREATED, Json(OrderCreated { message: "Order added", order_id: order.id })))
}

async fn get_customer(
    State(state): State<ApiState>,
    correlation_id: CorrelationId,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Customer>, ApiError> {
    let Path(id) = id.map_err(|_| ApiError::bad_request("Invalid identifier", &correlation_id))?;
    state
        .service
        .customer(CustomerId(id))
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &correlation_id))
}

async fn list_customer_orders(
    State(state): State<ApiState>,
    correlation_id: CorrelationId,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let Path(id) = id.map_err(|_| ApiError::bad_request("Invalid identifier", &correlation_id))?;
    state
        .service
        .customer_orders(CustomerId(id))
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &correlation_id))
}

async fn get_order(
    State(state): State<ApiState>,
    correlation_id: CorrelationId,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Order>, ApiError> {
    let Path(id) = id.map_err(|_| ApiError::bad_request("Invalid identifier", &correlation_id))?;
    state
        .service
        .order(OrderId(id))
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &correlation_id))
}

fn body_rejected(rejection: JsonRejection, correlation_id: &CorrelationId) -> ApiError {
    warn!(
        event_name = "api.request.invalid_body",
        correlation_id = %correlation_id.0,
        detail = %rejection.body_text(),
        "request body rejected"
    );
    ApiError::bad_request("Invalid request body", correlation_id)
}
