//! Usage events and the per-service running aggregate derived from them.
//!
//! [`UsageAggregate::accumulate`] is the ⊕ of the aggregator: an associative
//! fold of events into totals, counters and first/last bounds.

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// How an event was priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UsageCategory {
    /// Fully priced usage.
    Priced,
    /// The model is free.
    Free,
    /// No pricing is known for the model.
    NoPricing,
    /// Token counts were unavailable.
    NoTokens,
    /// The message was cut short (aborted or errored).
    PartialMessage,
    /// Only some of the price components were known.
    PartialPrice,
}

impl UsageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageCategory::Priced => "priced",
            UsageCategory::Free => "free",
            UsageCategory::NoPricing => "no-pricing",
            UsageCategory::NoTokens => "no-tokens",
            UsageCategory::PartialMessage => "partial-message",
            UsageCategory::PartialPrice => "partial-price",
        }
    }

    pub fn parse(s: &str) -> Option<UsageCategory> {
        match s {
            "priced" => Some(UsageCategory::Priced),
            "free" => Some(UsageCategory::Free),
            "no-pricing" => Some(UsageCategory::NoPricing),
            "no-tokens" => Some(UsageCategory::NoTokens),
            "partial-message" => Some(UsageCategory::PartialMessage),
            "partial-price" => Some(UsageCategory::PartialPrice),
            _ => None,
        }
    }
}

/// One raw usage event, as appended to the immutable log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    pub service_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub savings: Option<f64>,
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
    pub category: UsageCategory,
    pub timestamp: Timestamp,
}

/// Running per-service totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageAggregate {
    pub service_id: String,
    pub total_cost: f64,
    pub total_savings: f64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub usage_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_usage: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_usage: Option<Timestamp>,
    #[serde(default)]
    pub free_usages: i64,
    #[serde(default)]
    pub no_pricing_usages: i64,
    #[serde(default)]
    pub no_token_usages: i64,
    #[serde(default)]
    pub partial_message_usages: i64,
    #[serde(default)]
    pub partial_price_usages: i64,
}

impl UsageAggregate {
    /// The zero-valued aggregate for `service_id`.
    pub fn empty(service_id: impl Into<String>) -> Self {
        UsageAggregate {
            service_id: service_id.into(),
            total_cost: 0.0,
            total_savings: 0.0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            usage_count: 0,
            first_usage: None,
            last_usage: None,
            free_usages: 0,
            no_pricing_usages: 0,
            no_token_usages: 0,
            partial_message_usages: 0,
            partial_price_usages: 0,
        }
    }

    /// Folds one event into the aggregate.
    pub fn accumulate(&mut self, event: &UsageEvent) {
        self.total_cost += event.cost.unwrap_or(0.0);
        self.total_savings += event.savings.unwrap_or(0.0);
        self.total_input_tokens = self.total_input_tokens.saturating_add(event.input_tokens);
        self.total_output_tokens = self.total_output_tokens.saturating_add(event.output_tokens);
        self.usage_count = self.usage_count.saturating_add(1);
        let counter = match event.category {
            UsageCategory::Priced => None,
            UsageCategory::Free => Some(&mut self.free_usages),
            UsageCategory::NoPricing => Some(&mut self.no_pricing_usages),
            UsageCategory::NoTokens => Some(&mut self.no_token_usages),
            UsageCategory::PartialMessage => Some(&mut self.partial_message_usages),
            UsageCategory::PartialPrice => Some(&mut self.partial_price_usages),
        };
        if let Some(counter) = counter {
            *counter = counter.saturating_add(1);
        }
        self.first_usage = Some(match self.first_usage {
            Some(first) => first.min(event.timestamp),
            None => event.timestamp,
        });
        self.last_usage = Some(match self.last_usage {
            Some(last) => last.max(event.timestamp),
            None => event.timestamp,
        });
    }

    /// Combines two aggregates for the same service.
    pub fn merge(&mut self, other: &UsageAggregate) {
        self.total_cost += other.total_cost;
        self.total_savings += other.total_savings;
        // Counters saturate at i64::MAX instead of wrapping.
        self.total_input_tokens = self.total_input_tokens.saturating_add(other.total_input_tokens);
        self.total_output_tokens = self
            .total_output_tokens
            .saturating_add(other.total_output_tokens);
        self.usage_count = self.usage_count.saturating_add(other.usage_count);
        self.free_usages = self.free_usages.saturating_add(other.free_usages);
        self.no_pricing_usages = self.no_pricing_usages.saturating_add(other.no_pricing_usages);
        self.no_token_usages = self.no_token_usages.saturating_add(other.no_token_usages);
        self.partial_message_usages = self
            .partial_message_usages
            .saturating_add(other.partial_message_usages);
        self.partial_price_usages = self
            .partial_price_usages
            .saturating_add(other.partial_price_usages);
        self.first_usage = match (self.first_usage, other.first_usage) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.last_usage = match (self.last_usage, other.last_usage) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}
