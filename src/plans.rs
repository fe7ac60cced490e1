//! Plan definitions and the plan catalog.
//!
//! The catalog is the only long-lived object in this crate: it is built once
//! at process start from configuration, then treated as read-only. Lookup is
//! a pure mapping read; absence is a recoverable condition except where a
//! plan is required (a pending-change target, the configured institution
//! plan), in which case [`PlanCatalog::require`] fails the computation.
//!
//! # Example
//!
//! ```rust
//! use bestplan::{PlanCatalog, FeatureValue};
//!
//! let catalog = PlanCatalog::builder()
//!     .plan("collaborator")
//!         .name("Standard")
//!         .feature("collaborators", FeatureValue::Limit(10))
//!         .feature("dropbox", FeatureValue::Bool(true))
//!         .done()
//!     .plan("group_professional_10_enterprise")
//!         .name("Professional Group")
//!         .group_plan()
//!         .members_limit(10)
//!         .members_limit_add_on("additional-license")
//!         .done()
//!     .institution_plan_code("professional")
//!     .build();
//!
//! assert!(catalog.lookup("collaborator").is_some());
//! ```

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SubscriptionError};
use crate::features::{FeatureSet, FeatureValue};

/// A static plan definition.
///
/// Immutable once loaded; owned by the [`PlanCatalog`] for the process
/// lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan identifier (e.g., "collaborator", "group_professional_10_enterprise").
    pub plan_code: String,
    /// Human display name.
    pub name: String,
    /// Capabilities granted by this plan.
    pub features: FeatureSet,
    /// Seats included in the base price (meaningful for group plans).
    pub members_limit: u32,
    /// Add-on code that grants extra seats, if the plan supports them.
    pub members_limit_add_on: Option<String>,
    /// Hidden from plan listings shown to users.
    pub hide_from_users: bool,
    /// Whether this is a group plan.
    pub group_plan: bool,
    /// Whether this plan bills annually.
    pub annual: bool,
}

impl Plan {
    /// Check whether the given add-on code is this plan's seat-limit add-on.
    #[must_use]
    pub fn is_members_limit_add_on(&self, code: &str) -> bool {
        self.members_limit_add_on.as_deref() == Some(code)
    }

    /// Total licensed seats for a given number of additional licenses.
    #[must_use]
    pub fn total_licenses(&self, additional_licenses: u32) -> u32 {
        self.members_limit.saturating_add(additional_licenses)
    }
}

/// Read-only lookup from plan code to plan definition.
#[derive(Debug, Clone, Default)]
pub struct PlanCatalog {
    plans: HashMap<String, Plan>,
    institution_plan_code: Option<String>,
    standalone_add_on_codes: HashSet<String>,
}

impl PlanCatalog {
    /// Create a builder for constructing a catalog.
    #[must_use]
    pub fn builder() -> PlanCatalogBuilder {
        PlanCatalogBuilder::default()
    }

    /// Get a plan by code. Absence is recoverable; callers that tolerate a
    /// missing plan handle `None` explicitly.
    #[must_use]
    pub fn lookup(&self, plan_code: &str) -> Option<&Plan> {
        self.plans.get(plan_code)
    }

    /// Get a plan by code, failing the computation when it is missing.
    ///
    /// Use this on paths where an unknown plan code means the deployment is
    /// misconfigured (a candidate's plan, a pending-change target).
    pub fn require(&self, plan_code: &str) -> Result<&Plan> {
        self.plans
            .get(plan_code)
            .ok_or_else(|| SubscriptionError::PlanNotFound {
                plan_code: plan_code.to_string(),
            })
    }

    /// Resolve the single globally configured institution plan.
    pub fn institution_plan(&self) -> Result<&Plan> {
        let code = self.institution_plan_code.as_deref().ok_or_else(|| {
            SubscriptionError::PlanNotFound {
                plan_code: "institution".to_string(),
            }
        })?;
        self.require(code)
    }

    /// Check whether a plan code denotes a standalone add-on-only product.
    ///
    /// These never compete on features during resolution; they only fill the
    /// free slot.
    #[must_use]
    pub fn is_standalone_add_on_plan(&self, plan_code: &str) -> bool {
        self.standalone_add_on_codes.contains(plan_code)
    }

    /// Check if a plan exists.
    #[must_use]
    pub fn contains(&self, plan_code: &str) -> bool {
        self.plans.contains_key(plan_code)
    }

    /// Number of plans in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    /// Check if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Iterate over all plans.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Plan)> {
        self.plans.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Group plans billed monthly.
    #[must_use]
    pub fn group_monthly_plans(&self) -> Vec<&Plan> {
        self.filtered(|p| p.group_plan && !p.annual)
    }

    /// Group plans billed annually.
    #[must_use]
    pub fn group_annual_plans(&self) -> Vec<&Plan> {
        self.filtered(|p| p.group_plan && p.annual)
    }

    /// Student plans (plan code contains "student").
    #[must_use]
    pub fn student_plans(&self) -> Vec<&Plan> {
        self.filtered(|p| p.plan_code.contains("student"))
    }

    /// Individual plans billed monthly, excluding student plans.
    #[must_use]
    pub fn individual_monthly_plans(&self) -> Vec<&Plan> {
        self.filtered(|p| !p.group_plan && !p.annual && !p.plan_code.contains("student"))
    }

    /// Individual plans billed annually, excluding student plans.
    #[must_use]
    pub fn individual_annual_plans(&self) -> Vec<&Plan> {
        self.filtered(|p| !p.group_plan && p.annual && !p.plan_code.contains("student"))
    }

    /// Plans a user may pick on a change-plans page: student and individual
    /// plans that are not hidden.
    #[must_use]
    pub fn visible_individual_plans(&self) -> Vec<&Plan> {
        let mut plans: Vec<&Plan> = self
            .student_plans()
            .into_iter()
            .chain(self.individual_monthly_plans())
            .chain(self.individual_annual_plans())
            .filter(|p| !p.hide_from_users)
            .collect();
        plans.dedup_by(|a, b| a.plan_code == b.plan_code);
        plans
    }

    fn filtered(&self, predicate: impl Fn(&Plan) -> bool) -> Vec<&Plan> {
        let mut plans: Vec<&Plan> = self.plans.values().filter(|p| predicate(p)).collect();
        plans.sort_by(|a, b| a.plan_code.cmp(&b.plan_code));
        plans
    }
}

/// Builder for constructing a plan catalog.
#[derive(Debug, Default)]
pub struct PlanCatalogBuilder {
    plans: HashMap<String, Plan>,
    institution_plan_code: Option<String>,
    standalone_add_on_codes: HashSet<String>,
}

impl PlanCatalogBuilder {
    /// Start defining a new plan.
    #[must_use]
    pub fn plan(self, plan_code: &str) -> PlanBuilder {
        PlanBuilder {
            parent: self,
            plan_code: plan_code.to_string(),
            name: None,
            features: FeatureSet::new(),
            members_limit: 0,
            members_limit_add_on: None,
            hide_from_users: false,
            group_plan: false,
            annual: false,
        }
    }

    /// Set the plan code granted through institutional licences.
    #[must_use]
    pub fn institution_plan_code(mut self, plan_code: &str) -> Self {
        self.institution_plan_code = Some(plan_code.to_string());
        self
    }

    /// Register a plan code as a standalone add-on-only product.
    #[must_use]
    pub fn standalone_add_on_plan(mut self, plan_code: &str) -> Self {
        self.standalone_add_on_codes.insert(plan_code.to_string());
        self
    }

    /// Build the catalog.
    #[must_use]
    pub fn build(self) -> PlanCatalog {
        PlanCatalog {
            plans: self.plans,
            institution_plan_code: self.institution_plan_code,
            standalone_add_on_codes: self.standalone_add_on_codes,
        }
    }

    fn add_plan(mut self, plan: Plan) -> Self {
        self.plans.insert(plan.plan_code.clone(), plan);
        self
    }
}

/// Builder for a single plan definition.
#[derive(Debug)]
pub struct PlanBuilder {
    parent: PlanCatalogBuilder,
    plan_code: String,
    name: Option<String>,
    features: FeatureSet,
    members_limit: u32,
    members_limit_add_on: Option<String>,
    hide_from_users: bool,
    group_plan: bool,
    annual: bool,
}

impl PlanBuilder {
    /// Set the display name. Defaults to the plan code when unset.
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Add a single feature.
    #[must_use]
    pub fn feature(mut self, name: &str, value: impl Into<FeatureValue>) -> Self {
        self.features.insert(name, value);
        self
    }

    /// Set the full feature set.
    #[must_use]
    pub fn features(mut self, features: FeatureSet) -> Self {
        self.features = features;
        self
    }

    /// Set the number of seats included in the base price.
    #[must_use]
    pub fn members_limit(mut self, seats: u32) -> Self {
        self.members_limit = seats;
        self
    }

    /// Set the add-on code that grants extra seats.
    #[must_use]
    pub fn members_limit_add_on(mut self, add_on_code: &str) -> Self {
        self.members_limit_add_on = Some(add_on_code.to_string());
        self
    }

    /// Hide this plan from user-facing listings.
    #[must_use]
    pub fn hide_from_users(mut self) -> Self {
        self.hide_from_users = true;
        self
    }

    /// Mark this plan as a group plan.
    #[must_use]
    pub fn group_plan(mut self) -> Self {
        self.group_plan = true;
        self
    }

    /// Mark this plan as billing annually.
    #[must_use]
    pub fn annual(mut self) -> Self {
        self.annual = true;
        self
    }

    /// Finish defining this plan and return to the catalog builder.
    #[must_use]
    pub fn done(self) -> PlanCatalogBuilder {
        let plan = Plan {
            name: self.name.unwrap_or_else(|| self.plan_code.clone()),
            plan_code: self.plan_code,
            features: self.features,
            members_limit: self.members_limit,
            members_limit_add_on: self.members_limit_add_on,
            hide_from_users: self.hide_from_users,
            group_plan: self.group_plan,
            annual: self.annual,
        };
        self.parent.add_plan(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_catalog() -> PlanCatalog {
        PlanCatalog::builder()
            .plan("collaborator")
            .name("Standard")
            .feature("collaborators", FeatureValue::Limit(10))
            .done()
            .plan("professional")
            .name("Professional")
            .feature("collaborators", FeatureValue::Limit(i64::MAX))
            .done()
            .plan("student_annual")
            .name("Student (Annual)")
            .annual()
            .done()
            .plan("group_collaborator_5_educational")
            .name("Standard Group")
            .group_plan()
            .members_limit(5)
            .members_limit_add_on("additional-license")
            .done()
            .plan("group_professional_10_enterprise")
            .name("Professional Group (Annual)")
            .group_plan()
            .annual()
            .members_limit(10)
            .done()
            .plan("legacy_pro")
            .name("Legacy Pro")
            .hide_from_users()
            .done()
            .plan("assistant")
            .name("Assistant")
            .done()
            .institution_plan_code("professional")
            .standalone_add_on_plan("assistant")
            .build()
    }

    #[test]
    fn test_lookup_and_require() {
        let catalog = build_catalog();
        assert!(catalog.lookup("collaborator").is_some());
        assert!(catalog.lookup("nope").is_none());

        assert!(catalog.require("collaborator").is_ok());
        let err = catalog.require("nope").unwrap_err();
        assert_eq!(
            err,
            SubscriptionError::PlanNotFound {
                plan_code: "nope".to_string()
            }
        );
    }

    #[test]
    fn test_institution_plan() {
        let catalog = build_catalog();
        assert_eq!(catalog.institution_plan().unwrap().plan_code, "professional");

        let unconfigured = PlanCatalog::builder().build();
        assert!(unconfigured.institution_plan().unwrap_err().is_configuration());
    }

    #[test]
    fn test_standalone_add_on_plans() {
        let catalog = build_catalog();
        assert!(catalog.is_standalone_add_on_plan("assistant"));
        assert!(!catalog.is_standalone_add_on_plan("collaborator"));
    }

    #[test]
    fn test_plan_listings() {
        let catalog = build_catalog();

        let group_monthly: Vec<&str> = catalog
            .group_monthly_plans()
            .iter()
            .map(|p| p.plan_code.as_str())
            .collect();
        assert_eq!(group_monthly, vec!["group_collaborator_5_educational"]);

        let group_annual: Vec<&str> = catalog
            .group_annual_plans()
            .iter()
            .map(|p| p.plan_code.as_str())
            .collect();
        assert_eq!(group_annual, vec!["group_professional_10_enterprise"]);

        let students: Vec<&str> = catalog
            .student_plans()
            .iter()
            .map(|p| p.plan_code.as_str())
            .collect();
        assert_eq!(students, vec!["student_annual"]);

        // hidden plans are excluded from the user-facing listing
        let visible: Vec<&str> = catalog
            .visible_individual_plans()
            .iter()
            .map(|p| p.plan_code.as_str())
            .collect();
        assert!(!visible.contains(&"legacy_pro"));
        assert!(visible.contains(&"collaborator"));
        assert!(visible.contains(&"student_annual"));
    }

    #[test]
    fn test_total_licenses() {
        let catalog = build_catalog();
        let group = catalog.require("group_collaborator_5_educational").unwrap();
        assert_eq!(group.total_licenses(0), 5);
        assert_eq!(group.total_licenses(3), 8);
        assert!(group.is_members_limit_add_on("additional-license"));
        assert!(!group.is_members_limit_add_on("assistant"));
    }

    #[test]
    fn test_name_defaults_to_plan_code() {
        let catalog = PlanCatalog::builder().plan("v1_pro").done().build();
        assert_eq!(catalog.lookup("v1_pro").unwrap().name, "v1_pro");
    }
}
