// Plan catalog: per-channel limits and billing price mapping
// Injected configuration so plan economics change without touching
// evaluator logic, and so tests can substitute fixture plans

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

use crate::models::generation_event::Channel;
use crate::models::user::Plan;

#[derive(Debug, Error)]
pub enum PlanCatalogError {
    #[error("Invalid plan catalog JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Unknown plan name in catalog: {0}")]
    UnknownPlan(String),
}

/// Per-channel generation limits for one plan.
/// `None` means unlimited; `Some(0)` means the plan does not include the
/// channel at all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanLimits {
    pub web: Option<u32>,
    pub api: Option<u32>,
    pub is_pro: bool,
}

impl PlanLimits {
    pub fn channel_limit(&self, channel: Channel) -> Option<u32> {
        match channel {
            Channel::Web => self.web,
            Channel::Api => self.api,
        }
    }

    /// Limit as reported in evaluator responses: -1 stands for unlimited.
    pub fn reported_limit(&self, channel: Channel) -> i64 {
        match self.channel_limit(channel) {
            Some(n) => n as i64,
            None => -1,
        }
    }

    /// The API limit as persisted on the account row. Unlimited API plans
    /// don't exist in the catalog, but clamp defensively to i32 range.
    pub fn stored_api_limit(&self) -> i32 {
        self.api.map(|n| n.min(i32::MAX as u32) as i32).unwrap_or(0)
    }
}

/// JSON shape accepted from PLAN_CATALOG_JSON
#[derive(Debug, Deserialize)]
struct PlanCatalogSpec {
    plans: HashMap<String, PlanLimits>,
    #[serde(default)]
    prices: HashMap<String, String>,
}

/// The plan -> limits table plus the billing price -> plan mapping
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: HashMap<Plan, PlanLimits>,
    prices: HashMap<String, Plan>,
}

impl Default for PlanCatalog {
    fn default() -> Self {
        let mut plans = HashMap::new();
        plans.insert(
            Plan::Free,
            PlanLimits {
                web: Some(1),
                api: Some(0),
                is_pro: false,
            },
        );
        plans.insert(
            Plan::WebUnlimited,
            PlanLimits {
                web: None,
                api: Some(0),
                is_pro: true,
            },
        );
        plans.insert(
            Plan::ApiMetered,
            PlanLimits {
                web: Some(1),
                api: Some(100),
                is_pro: true,
            },
        );
        plans.insert(
            Plan::Bundle,
            PlanLimits {
                web: None,
                api: Some(100),
                is_pro: true,
            },
        );

        let mut prices = HashMap::new();
        prices.insert("price_web_unlimited_monthly".to_string(), Plan::WebUnlimited);
        prices.insert("price_api_metered_monthly".to_string(), Plan::ApiMetered);
        prices.insert("price_bundle_monthly".to_string(), Plan::Bundle);

        Self { plans, prices }
    }
}

impl PlanCatalog {
    /// Build the catalog from an optional JSON override. Plans present in
    /// the override replace the defaults; prices from the override replace
    /// the default price map entirely when supplied.
    pub fn from_env(json_override: Option<&str>) -> Result<Self, PlanCatalogError> {
        let mut catalog = Self::default();

        if let Some(raw) = json_override {
            let spec: PlanCatalogSpec = serde_json::from_str(raw)?;

            for (name, limits) in spec.plans {
                let plan = Plan::from_str(&name)
                    .map_err(|_| PlanCatalogError::UnknownPlan(name.clone()))?;
                catalog.plans.insert(plan, limits);
            }

            if !spec.prices.is_empty() {
                let mut prices = HashMap::new();
                for (price_id, plan_name) in spec.prices {
                    let plan = Plan::from_str(&plan_name)
                        .map_err(|_| PlanCatalogError::UnknownPlan(plan_name.clone()))?;
                    prices.insert(price_id, plan);
                }
                catalog.prices = prices;
            }
        }

        Ok(catalog)
    }

    /// Limits for a plan. Every plan in the closed enumeration has an
    /// entry; a missing one falls back to free-tier limits.
    pub fn limits_for(&self, plan: Plan) -> PlanLimits {
        self.plans.get(&plan).copied().unwrap_or(PlanLimits {
            web: Some(1),
            api: Some(0),
            is_pro: false,
        })
    }

    /// Resolve a billing price identifier to an internal plan.
    /// Unknown prices resolve to None; callers must not guess a plan.
    pub fn plan_for_price(&self, price_id: &str) -> Option<Plan> {
        self.prices.get(price_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_matches_plan_table() {
        let catalog = PlanCatalog::default();

        let free = catalog.limits_for(Plan::Free);
        assert_eq!(free.web, Some(1));
        assert_eq!(free.api, Some(0));
        assert!(!free.is_pro);

        let web = catalog.limits_for(Plan::WebUnlimited);
        assert_eq!(web.web, None);
        assert_eq!(web.api, Some(0));
        assert!(web.is_pro);

        let api = catalog.limits_for(Plan::ApiMetered);
        assert_eq!(api.web, Some(1));
        assert_eq!(api.api, Some(100));

        let bundle = catalog.limits_for(Plan::Bundle);
        assert_eq!(bundle.web, None);
        assert_eq!(bundle.api, Some(100));
    }

    #[test]
    fn test_reported_limit_uses_minus_one_for_unlimited() {
        let catalog = PlanCatalog::default();
        assert_eq!(
            catalog.limits_for(Plan::Bundle).reported_limit(Channel::Web),
            -1
        );
        assert_eq!(
            catalog.limits_for(Plan::Bundle).reported_limit(Channel::Api),
            100
        );
        assert_eq!(
            catalog.limits_for(Plan::Free).reported_limit(Channel::Api),
            0
        );
    }

    #[test]
    fn test_json_override_replaces_plan_limits() {
        let json = r#"{
            "plans": {
                "api_metered": { "web": 3, "api": 500, "is_pro": true }
            },
            "prices": {
                "price_123": "api_metered"
            }
        }"#;

        let catalog = PlanCatalog::from_env(Some(json)).unwrap();

        let limits = catalog.limits_for(Plan::ApiMetered);
        assert_eq!(limits.web, Some(3));
        assert_eq!(limits.api, Some(500));

        // Untouched plans keep their defaults
        assert_eq!(catalog.limits_for(Plan::Free).web, Some(1));

        // Supplying prices replaces the default price map
        assert_eq!(catalog.plan_for_price("price_123"), Some(Plan::ApiMetered));
        assert_eq!(catalog.plan_for_price("price_bundle_monthly"), None);
    }

    #[test]
    fn test_unknown_price_resolves_to_none() {
        let catalog = PlanCatalog::default();
        assert_eq!(catalog.plan_for_price("price_does_not_exist"), None);
    }

    #[test]
    fn test_unknown_plan_name_is_rejected() {
        let json = r#"{ "plans": { "enterprise": { "web": 1, "api": 0, "is_pro": true } } }"#;
        assert!(PlanCatalog::from_env(Some(json)).is_err());
    }

    #[test]
    fn test_stored_api_limit() {
        let limits = PlanLimits {
            web: None,
            api: Some(100),
            is_pro: true,
        };
        assert_eq!(limits.stored_api_limit(), 100);

        let no_api = PlanLimits {
            web: Some(1),
            api: Some(0),
            is_pro: false,
        };
        assert_eq!(no_api.stored_api_limit(), 0);
    }
}
