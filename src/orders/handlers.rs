use axum::{extract::State, http::StatusCode, routing::get, Router};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use super::repo_types::{NewOrder, Order, OrderItem};
use crate::{
    auth::AuthUser,
    error::{ApiError, AppJson, Envelope},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/orders", get(list_orders).post(create_order))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub items: Option<Vec<OrderItem>>,
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub total: Option<f64>,
    pub payment_method: Option<String>,
}

/// Totals are taken as the client computed them; only their shape is checked.
fn amount(name: &str, value: Option<f64>) -> Result<f64, ApiError> {
    match value {
        None => Ok(0.0),
        Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
        Some(_) => Err(ApiError::bad_request(format!("{name} must be a number >= 0"))),
    }
}

fn check_item(item: &OrderItem) -> Result<(), ApiError> {
    if !item.price.is_finite() || item.price < 0.0 {
        return Err(ApiError::bad_request("item price must be a number >= 0"));
    }
    if item.quantity < 1 {
        return Err(ApiError::bad_request("item quantity must be at least 1"));
    }
    Ok(())
}

fn caller_id(sub: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(sub.trim()).map_err(|_| ApiError::unauthorized())
}

#[instrument(skip(state, session))]
pub async fn list_orders(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
) -> Result<Envelope<Vec<Order>>, ApiError> {
    let user_id = caller_id(&session.sub)?;
    let orders = state.orders.list_for_user(user_id).await?;
    Ok(Envelope::data(orders))
}

#[instrument(skip(state, session, payload))]
pub async fn create_order(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    AppJson(payload): AppJson<CreateOrderRequest>,
) -> Result<(StatusCode, Envelope<Order>), ApiError> {
    let user_id = caller_id(&session.sub)?;
    let items = payload.items.unwrap_or_default();
    if items.is_empty() {
        return Err(ApiError::bad_request("No items"));
    }
    items.iter().try_for_each(check_item)?;

    let order = state
        .orders
        .create(NewOrder {
            user_id,
            items,
            subtotal: amount("subtotal", payload.subtotal)?,
            tax: amount("tax", payload.tax)?,
            total: amount("total", payload.total)?,
            payment_method: payload.payment_method,
        })
        .await?;

    info!(order_id = %order.id, %user_id, total = order.total, "order placed");
    Ok((StatusCode::CREATED, Envelope::data(order)))
}
