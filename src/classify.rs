use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static CUSTOM_PRICING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"contact\s+(?:sales|us)|talk\s+to\s+sales|request\s+a\s+quote|custom\s+pricing")
        .expect("valid custom pricing regex")
});
static PER_SEAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"per\s*user|/user|per\s*seat|/seat").expect("valid per-seat regex")
});
static USAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"per\s*(?:api|gb|request|usage|unit)|\busage\b|pay\s+as\s+you\s+go")
        .expect("valid usage regex")
});
static FREE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)(?:free|\$?0\b)").expect("valid free regex"));
static MONTHLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"month|mo\b").expect("valid monthly regex"));
static ANNUAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"year|annual|yr\b").expect("valid annual regex"));

/// How a plan is priced.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PricingModel {
    #[default]
    Tiered,
    #[serde(rename = "Per-User")]
    PerUser,
    #[serde(rename = "Usage-Based")]
    UsageBased,
    Freemium,
    Custom,
}

impl PricingModel {
    /// First matching rule wins: Custom, Per-User, Usage-Based, Freemium, then Tiered.
    pub fn infer(text: &str) -> Self {
        let lower = text.to_lowercase();
        if CUSTOM_PRICING_RE.is_match(&lower) {
            return Self::Custom;
        }
        if PER_SEAT_RE.is_match(&lower) {
            return Self::PerUser;
        }
        if USAGE_RE.is_match(&lower) {
            return Self::UsageBased;
        }
        if FREE_RE.is_match(&lower) {
            return Self::Freemium;
        }
        Self::Tiered
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tiered => "Tiered",
            Self::PerUser => "Per-User",
            Self::UsageBased => "Usage-Based",
            Self::Freemium => "Freemium",
            Self::Custom => "Custom",
        }
    }
}

impl fmt::Display for PricingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment period attached to a price.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BillingCycle {
    #[serde(rename = "monthly")]
    Monthly,
    #[serde(rename = "annually")]
    Annually,
    #[serde(rename = "per user")]
    PerUser,
    #[default]
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl BillingCycle {
    /// First matching rule wins: monthly, annually, per user, then N/A.
    pub fn infer(text: &str) -> Self {
        let lower = text.to_lowercase();
        if MONTHLY_RE.is_match(&lower) {
            return Self::Monthly;
        }
        if ANNUAL_RE.is_match(&lower) {
            return Self::Annually;
        }
        if PER_SEAT_RE.is_match(&lower) {
            return Self::PerUser;
        }
        Self::NotApplicable
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Annually => "annually",
            Self::PerUser => "per user",
            Self::NotApplicable => "N/A",
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
