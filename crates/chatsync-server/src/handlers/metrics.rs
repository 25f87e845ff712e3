//! Usage metrics handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;

use chatsync_core::UsageAggregate;
use chatsync_storage::UsageStore;

use crate::error::ApiError;
use crate::schema::common::{ApiResponse, DeletedResponse};
use crate::schema::metrics::{CostEntry, MetricsListResponse, MetricsRequest, MetricsResult};
use crate::state::AppState;

/// Every service aggregate, ordered by service id.
///
/// `GET /metrics`
pub async fn list_metrics(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<MetricsListResponse>>, ApiError> {
    let aggregates = state.usage.get_all_aggregates()?;
    Ok(Json(ApiResponse::ok(MetricsListResponse { aggregates })))
}

/// Runs one metrics operation.
///
/// `POST /metrics`
pub async fn post_metrics(
    State(state): State<AppState>,
    body: Result<Json<MetricsRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<MetricsResult>>, ApiError> {
    let Json(req) = body?;
    let result = match req {
        MetricsRequest::AddCostEntry(entry) => {
            validate_entry(&entry)?;
            let aggregate = state.usage.record_event(&entry.into_event())?;
            MetricsResult::Aggregate(aggregate)
        }
        MetricsRequest::SaveStore(save) => {
            validate_aggregates(&save.aggregates)?;
            state.usage.replace_all(&save.aggregates)?;
            MetricsResult::Saved {
                saved: save.aggregates.len(),
            }
        }
        MetricsRequest::Clear => {
            state.usage.clear_all()?;
            tracing::info!("usage metrics cleared");
            MetricsResult::Cleared { cleared: true }
        }
    };
    Ok(Json(ApiResponse::ok(result)))
}

/// `GET /metrics/{serviceId}`
pub async fn get_service_metrics(
    State(state): State<AppState>,
    Path(service_id): Path<String>,
) -> Result<Json<ApiResponse<UsageAggregate>>, ApiError> {
    let aggregate = state
        .usage
        .get_aggregate(&service_id)?
        .ok_or_else(|| ApiError::NotFound(format!("no usage for service '{}'", service_id)))?;
    Ok(Json(ApiResponse::ok(aggregate)))
}

/// Drops one service aggregate. Its logged events are kept.
///
/// `DELETE /metrics/{serviceId}`
pub async fn delete_service_metrics(
    State(state): State<AppState>,
    Path(service_id): Path<String>,
) -> Result<Json<ApiResponse<DeletedResponse>>, ApiError> {
    if !state.usage.delete_aggregate(&service_id)? {
        return Err(ApiError::NotFound(format!(
            "no usage for service '{}'",
            service_id
        )));
    }
    Ok(Json(ApiResponse::ok(DeletedResponse {
        deleted: service_id,
    })))
}

fn validate_entry(entry: &CostEntry) -> Result<(), ApiError> {
    if entry.service_id.trim().is_empty() {
        return Err(ApiError::BadRequest("serviceId must not be empty".to_string()));
    }
    if entry.input_tokens < 0 || entry.output_tokens < 0 {
        return Err(ApiError::BadRequest(
            "token counts must not be negative".to_string(),
        ));
    }
    Ok(())
}

fn validate_aggregates(aggregates: &[UsageAggregate]) -> Result<(), ApiError> {
    let mut seen = std::collections::HashSet::new();
    for aggregate in aggregates {
        if aggregate.service_id.trim().is_empty() {
            return Err(ApiError::BadRequest("serviceId must not be empty".to_string()));
        }
        if !seen.insert(aggregate.service_id.as_str()) {
            return Err(ApiError::BadRequest(format!(
                "duplicate aggregate for service '{}'",
                aggregate.service_id
            )));
        }
    }
    Ok(())
}
