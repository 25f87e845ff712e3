//! Usage metrics endpoints.
//!
//! `POST /metrics` is discriminated by its `operation` field:
//!
//! ```json
//! {"operation": "addCostEntry", "serviceId": "openai", "inputTokens": 12, ...}
//! {"operation": "saveStore", "aggregates": [ ... ]}
//! {"operation": "clear"}
//! ```

use serde::{Deserialize, Serialize};

use chatsync_core::{now_millis, Timestamp, UsageAggregate, UsageCategory, UsageEvent};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum MetricsRequest {
    /// Append one usage event and fold it into its service aggregate.
    AddCostEntry(CostEntry),
    /// Replace every aggregate (the event log is kept).
    SaveStore(SaveStoreRequest),
    /// Drop the event log and every aggregate.
    Clear,
}

/// A usage event as posted by clients. Omitted fields get defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEntry {
    pub service_id: String,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub savings: Option<f64>,
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
    /// Defaults to `priced` when a cost is given, `no-pricing` otherwise.
    #[serde(default)]
    pub category: Option<UsageCategory>,
    /// Defaults to the time of receipt.
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

impl CostEntry {
    pub fn into_event(self) -> UsageEvent {
        let category = self.category.unwrap_or(if self.cost.is_some() {
            UsageCategory::Priced
        } else {
            UsageCategory::NoPricing
        });
        UsageEvent {
            service_id: self.service_id,
            model_id: self.model_id,
            cost: self.cost,
            savings: self.savings,
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            category,
            timestamp: self.timestamp.unwrap_or_else(now_millis),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveStoreRequest {
    pub aggregates: Vec<UsageAggregate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsListResponse {
    pub aggregates: Vec<UsageAggregate>,
}

/// What a `POST /metrics` operation produced.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MetricsResult {
    Aggregate(UsageAggregate),
    Saved { saved: usize },
    Cleared { cleared: bool },
}
