use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::{BillingCycle, PricingModel};

/// One pricing tier found on a page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanRecord {
    pub plan_name: String,
    pub price: String,
    pub pricing_model: PricingModel,
    pub features: Vec<String>,
    pub billing_cycle: BillingCycle,
}

impl PlanRecord {
    /// Case-insensitive identity used to drop repeated plans.
    pub fn dedup_key(&self) -> String {
        format!("{}|{}", self.plan_name, self.price).to_lowercase()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScrapeRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkScrapeRequest {
    #[serde(default)]
    pub urls: Vec<String>,
    /// Newline separated hosts, as pasted into a text area.
    #[serde(default)]
    pub domains: Option<String>,
}

impl BulkScrapeRequest {
    pub fn targets(&self, limit: usize) -> Vec<String> {
        let pasted = self
            .domains
            .as_deref()
            .unwrap_or_default()
            .lines()
            .map(str::to_owned);
        self.urls
            .iter()
            .cloned()
            .chain(pasted)
            .map(|raw| raw.trim().to_owned())
            .filter(|raw| !raw.is_empty())
            .take(limit)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkScrapeResult {
    pub url: String,
    pub plans: Vec<PlanRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkScrapeResponse {
    pub message: String,
    pub results: Vec<BulkScrapeResult>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthBody {
    pub status: String,
    pub message: String,
    pub browser_available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_record_uses_wire_field_names() {
        let plan = PlanRecord {
            plan_name: "Pro".to_string(),
            price: "$29/month".to_string(),
            pricing_model: PricingModel::PerUser,
            features: vec!["5 users".to_string()],
            billing_cycle: BillingCycle::Monthly,
        };
        let value = serde_json::to_value(&plan).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "plan_name": "Pro",
                "price": "$29/month",
                "pricing_model": "Per-User",
                "features": ["5 users"],
                "billing_cycle": "monthly",
            })
        );
    }

    #[test]
    fn dedup_key_ignores_case() {
        let a = PlanRecord {
            plan_name: "PRO".to_string(),
            price: "$29".to_string(),
            pricing_model: PricingModel::Tiered,
            features: Vec::new(),
            billing_cycle: BillingCycle::NotApplicable,
        };
        let mut b = a.clone();
        b.plan_name = "pro".to_string();
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn bulk_targets_merge_lists_and_cap() {
        let request: BulkScrapeRequest = serde_json::from_value(serde_json::json!({
            "urls": ["a.test", "  "],
            "domains": "b.test\n\n c.test \nd.test\ne.test\nf.test",
        }))
        .unwrap();
        assert_eq!(
            request.targets(5),
            vec!["a.test", "b.test", "c.test", "d.test", "e.test"]
        );
    }
}
