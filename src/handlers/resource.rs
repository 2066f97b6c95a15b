//! Resource handlers: list, show, store, update, destroy, rules.

use crate::error::AppError;
use crate::extractors::CallContext;
use crate::query::ReadParams;
use crate::response::Envelope;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::Value;
use std::collections::HashMap;

/// Integer ids bind as numbers, anything else (uuid, slug) as text.
fn parse_id(id: &str) -> Value {
    match id.trim().parse::<i64>() {
        Ok(n) => Value::Number(n.into()),
        Err(_) => Value::String(id.to_string()),
    }
}

pub async fn list(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    ctx: CallContext,
) -> Result<Envelope, AppError> {
    let controller = state.controller(&resource)?;
    controller.list(&ctx, &ReadParams::from_query(&params)).await
}

pub async fn show(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    ctx: CallContext,
) -> Result<Envelope, AppError> {
    let controller = state.controller(&resource)?;
    controller
        .show(&ctx, &parse_id(&id), &ReadParams::from_query(&params))
        .await
}

pub async fn store(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    ctx: CallContext,
    Json(body): Json<Value>,
) -> Result<Envelope, AppError> {
    let controller = state.controller(&resource)?;
    controller.store(&ctx, body).await
}

pub async fn update(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    ctx: CallContext,
    Json(body): Json<Value>,
) -> Result<Envelope, AppError> {
    let controller = state.controller(&resource)?;
    controller.update(&ctx, &parse_id(&id), body).await
}

pub async fn destroy(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    ctx: CallContext,
) -> Result<Envelope, AppError> {
    let controller = state.controller(&resource)?;
    controller.destroy(&ctx, &parse_id(&id)).await
}

pub async fn validation_rules(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    ctx: CallContext,
) -> Result<Envelope, AppError> {
    let controller = state.controller(&resource)?;
    controller.validation_rules(&ctx).await
}
