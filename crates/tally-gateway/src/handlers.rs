// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON handlers for health and the expense record endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Days, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tally_core::{ExpenseFilter, ExpenseRecord, ExpenseUpdate, RecordId, RecordPage};

use crate::error::ApiError;
use crate::owner::OwnerId;
use crate::server::{GatewayState, HealthState};

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Query string of GET /v1/expenses.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub category: Option<String>,
    /// `YYYY-MM-DD`, inclusive.
    pub start_date: Option<String>,
    /// `YYYY-MM-DD`, inclusive.
    pub end_date: Option<String>,
}

/// Request body for POST /v1/expenses/update.
#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub id: RecordId,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub note: Option<String>,
    /// `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`, local time.
    #[serde(default)]
    pub date: Option<String>,
}

/// Request body for POST /v1/expenses/delete.
#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub id: RecordId,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: RecordId,
}

/// GET /health
pub async fn get_health(State(health): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: health.start_time.elapsed().as_secs(),
    })
}

/// GET /v1/expenses
pub async fn list_expenses(
    State(state): State<GatewayState>,
    OwnerId(owner): OwnerId,
    Query(query): Query<ListQuery>,
) -> Result<Json<RecordPage>, ApiError> {
    let mut filter = ExpenseFilter::for_owner(owner);
    if let Some(page) = query.page {
        filter.page = page;
    }
    if let Some(size) = query.page_size {
        filter.page_size = size;
    }
    filter.category = query.category.filter(|c| !c.trim().is_empty());
    if let Some(start) = query.start_date.as_deref() {
        filter.start = Some(day_start(parse_day(start)?));
    }
    if let Some(end) = query.end_date.as_deref() {
        let next = parse_day(end)?
            .checked_add_days(Days::new(1))
            .ok_or_else(|| ApiError::bad_request("end_date out of range"))?;
        filter.end = Some(day_start(next));
    }
    if let (Some(start), Some(end)) = (filter.start, filter.end)
        && start >= end
    {
        return Err(ApiError::bad_request("start_date is after end_date"));
    }

    Ok(Json(state.pipeline.list_expenses(filter).await?))
}

/// GET /v1/expenses/{id}
pub async fn get_expense(
    State(state): State<GatewayState>,
    OwnerId(owner): OwnerId,
    Path(id): Path<RecordId>,
) -> Result<Json<ExpenseRecord>, ApiError> {
    Ok(Json(state.pipeline.get_expense(&owner, id).await?))
}

/// POST /v1/expenses/update
pub async fn update_expense(
    State(state): State<GatewayState>,
    OwnerId(owner): OwnerId,
    Json(body): Json<UpdateRequest>,
) -> Result<Json<ExpenseRecord>, ApiError> {
    let created_at = match body.date.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(parse_timestamp(raw)?),
    };
    let update = ExpenseUpdate {
        category: body.category,
        amount: body.amount,
        note: body.note,
        created_at,
    };
    Ok(Json(
        state.pipeline.update_expense(&owner, body.id, update).await?,
    ))
}

/// POST /v1/expenses/delete
pub async fn delete_expense(
    State(state): State<GatewayState>,
    OwnerId(owner): OwnerId,
    Json(body): Json<DeleteRequest>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.pipeline.delete_expense(&owner, body.id).await?;
    Ok(Json(DeleteResponse { deleted: body.id }))
}

fn parse_day(raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request(format!("invalid date `{raw}`, expected YYYY-MM-DD")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
        .ok_or_else(|| {
            ApiError::bad_request(format!(
                "invalid date `{raw}`, expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS"
            ))
        })?;
    Ok(local_to_utc(naive))
}

/// Local midnight of `day`.
fn day_start(day: NaiveDate) -> DateTime<Utc> {
    local_to_utc(day.and_time(NaiveTime::MIN))
}

/// Interpret `naive` in the local zone. Nonexistent local times (DST gaps)
/// are read as UTC.
fn local_to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}
