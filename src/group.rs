//! Group subscription views.
//!
//! Normalizes a group subscription record into the subset of fields safe to
//! expose to a given viewer, and derives a human display name for the plan
//! tier from historically inconsistent plan-code formats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plans::PlanCatalog;
use crate::sources::CachedStatus;

/// Free-text fields pass through the surrounding system's HTML sanitizer
/// before they reach a view.
pub trait HtmlSanitizer: Send + Sync {
    /// Strip or escape markup the product does not allow.
    fn sanitize(&self, html: &str) -> String;
}

impl<H: HtmlSanitizer + ?Sized> HtmlSanitizer for &H {
    fn sanitize(&self, html: &str) -> String {
        (**self).sanitize(html)
    }
}

/// A group subscription record as the store hands it over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSubscription {
    /// Record identifier, in canonical string form.
    pub id: String,
    /// Plan code purchased for the group.
    pub plan_code: String,
    /// Whether the record is flagged as a group plan.
    pub group_plan: bool,
    /// Team display name, if the group set one.
    pub team_name: Option<String>,
    /// Free-text notice shown to members; may contain markup.
    pub team_notice: Option<String>,
    /// Email of the administrating account.
    pub admin_email: String,
    /// Accounts managing the group, canonical string ids.
    pub manager_ids: Vec<String>,
    /// Member accounts, canonical string ids.
    pub member_ids: Vec<String>,
    /// Cached provider status, when the group is externally billed.
    pub cached_status: Option<CachedStatus>,
}

impl GroupSubscription {
    /// Trial end from the cached provider status, if any.
    #[must_use]
    pub fn trial_ends_at(&self) -> Option<DateTime<Utc>> {
        self.cached_status
            .as_ref()
            .and_then(|status| status.trial_ends_at)
    }
}

/// The viewer-safe projection of a group subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupView {
    /// Record identifier.
    pub id: String,
    /// Plan code purchased for the group.
    pub plan_code: String,
    /// Team display name.
    pub team_name: Option<String>,
    /// Sanitized team notice.
    pub team_notice: Option<String>,
    /// Email of the administrating account.
    pub admin_email: String,
    /// Whether the viewer manages this group.
    pub user_is_group_manager: bool,
    /// Whether the viewer is a member of this group.
    pub user_is_group_member: bool,
    /// Human display name for the plan tier.
    pub plan_level_name: String,
}

/// Adapts group subscription records for a specific viewer.
pub struct GroupViewAdapter<H: HtmlSanitizer> {
    catalog: std::sync::Arc<PlanCatalog>,
    sanitizer: H,
}

impl<H: HtmlSanitizer> GroupViewAdapter<H> {
    /// Create a new adapter.
    #[must_use]
    pub fn new(catalog: std::sync::Arc<PlanCatalog>, sanitizer: H) -> Self {
        Self { catalog, sanitizer }
    }

    /// Shape a group record for the given viewer.
    ///
    /// Membership is decided by canonical-string containment, never by
    /// reference identity.
    #[must_use]
    pub fn adapt(&self, group: &GroupSubscription, viewer_id: &str) -> GroupView {
        GroupView {
            id: group.id.clone(),
            plan_code: group.plan_code.clone(),
            team_name: group.team_name.clone(),
            team_notice: group
                .team_notice
                .as_deref()
                .map(|notice| self.sanitizer.sanitize(notice)),
            admin_email: group.admin_email.clone(),
            user_is_group_manager: group.manager_ids.iter().any(|id| id == viewer_id),
            user_is_group_member: group.member_ids.iter().any(|id| id == viewer_id),
            plan_level_name: self.plan_level_name(&group.plan_code),
        }
    }

    /// Derive the plan tier's display name from the plan code.
    ///
    /// Most group plan codes follow `group_<level>_<size>_<usage>`, so the
    /// level is the fixed-width slice after the prefix. Some historical
    /// records carry individual plan codes instead, which the prefix match
    /// covers. Whatever is left falls back to the catalog name, then to the
    /// raw code.
    #[must_use]
    pub fn plan_level_name(&self, plan_code: &str) -> String {
        if let Some(level) = plan_code.get(6..18) {
            match level {
                "professional" => return "Professional".to_string(),
                "collaborator" => return "Standard".to_string(),
                _ => {}
            }
        }
        if plan_code.starts_with("professional") {
            "Professional".to_string()
        } else if plan_code.starts_with("collaborator") {
            "Standard".to_string()
        } else if let Some(plan) = self.catalog.lookup(plan_code) {
            plan.name.clone()
        } else {
            plan_code.to_string()
        }
    }
}

/// Test sanitizer.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::HtmlSanitizer;

    /// Escapes angle brackets, enough to prove the seam is exercised.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct EscapingSanitizer;

    impl HtmlSanitizer for EscapingSanitizer {
        fn sanitize(&self, html: &str) -> String {
            html.replace('<', "&lt;").replace('>', "&gt;")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::test::EscapingSanitizer;
    use super::*;
    use crate::plans::PlanCatalog;

    fn adapter() -> GroupViewAdapter<EscapingSanitizer> {
        let catalog = Arc::new(
            PlanCatalog::builder()
                .plan("v1_pro")
                .name("v1 Pro")
                .done()
                .build(),
        );
        GroupViewAdapter::new(catalog, EscapingSanitizer)
    }

    fn group() -> GroupSubscription {
        GroupSubscription {
            id: "sub_42".to_string(),
            plan_code: "group_professional_10_enterprise".to_string(),
            group_plan: true,
            team_name: Some("Cartography".to_string()),
            team_notice: None,
            admin_email: "admin@example.com".to_string(),
            manager_ids: vec!["user_1".to_string(), "user_2".to_string()],
            member_ids: vec!["user_2".to_string(), "user_3".to_string()],
            cached_status: None,
        }
    }

    #[test]
    fn test_membership_flags() {
        let adapter = adapter();

        let view = adapter.adapt(&group(), "user_1");
        assert!(view.user_is_group_manager);
        assert!(!view.user_is_group_member);

        let view = adapter.adapt(&group(), "user_2");
        assert!(view.user_is_group_manager);
        assert!(view.user_is_group_member);

        let view = adapter.adapt(&group(), "user_9");
        assert!(!view.user_is_group_manager);
        assert!(!view.user_is_group_member);
    }

    #[test]
    fn test_plan_level_from_group_plan_code() {
        let adapter = adapter();
        assert_eq!(
            adapter.plan_level_name("group_professional_10_enterprise"),
            "Professional"
        );
        assert_eq!(
            adapter.plan_level_name("group_collaborator_5_educational"),
            "Standard"
        );
    }

    #[test]
    fn test_plan_level_prefix_fallback() {
        // legacy group records carrying individual plan codes
        let adapter = adapter();
        assert_eq!(adapter.plan_level_name("professional_annual"), "Professional");
        assert_eq!(adapter.plan_level_name("collaborator_pro"), "Standard");
    }

    #[test]
    fn test_plan_level_catalog_and_raw_fallbacks() {
        let adapter = adapter();
        assert_eq!(adapter.plan_level_name("v1_pro"), "v1 Pro");
        assert_eq!(adapter.plan_level_name("mystery_plan"), "mystery_plan");
    }

    #[test]
    fn test_team_notice_is_sanitized() {
        let adapter = adapter();
        let mut group = group();
        group.team_notice = Some("Welcome <script>alert(1)</script>".to_string());

        let view = adapter.adapt(&group, "user_1");
        assert_eq!(
            view.team_notice.as_deref(),
            Some("Welcome &lt;script&gt;alert(1)&lt;/script&gt;")
        );
    }
}
