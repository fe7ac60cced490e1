//! Best-subscription resolution.
//!
//! An account may hold features from several sources at once: an
//! individually purchased plan, group-plan memberships, and institutional
//! licences. The resolver fetches all candidates concurrently, compares
//! their plans' feature sets, and produces the single subscription worth
//! presenting.
//!
//! Evaluation order is institution → group → individual, and a later
//! equal-or-better candidate always overwrites the current best. That
//! ordering is the tie-break rule: an individual subscription beats an
//! equally good group membership, which beats an equally good institutional
//! licence.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::features::is_feature_set_equal_or_better;
use crate::plans::{Plan, PlanCatalog};
use crate::sources::{
    BillingProvider, IndividualSubscription, InstitutionMembership, InstitutionService,
    SubscriptionStore,
};
use crate::trial::remaining_trial_days;

/// The winning subscription for an account, with presentation metadata.
///
/// Created fresh per resolution call; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BestSubscription {
    /// No paid source grants anything.
    Free,
    /// An institutional licence wins.
    Commons {
        /// The institution granting the licence.
        institution: InstitutionMembership,
        /// The globally configured institution plan.
        plan: Plan,
    },
    /// A group membership wins.
    Group {
        /// The group's plan.
        plan: Plan,
        /// Team display name, when the group set one.
        team_name: Option<String>,
        /// Whole trial days left, or -1 when no trial is active.
        remaining_trial_days: i64,
    },
    /// The account's own subscription wins.
    Individual {
        /// The purchased plan.
        plan: Plan,
        /// The underlying subscription record.
        subscription: IndividualSubscription,
        /// Whole trial days left, or -1 when no trial is active.
        remaining_trial_days: i64,
    },
    /// The account only holds a standalone add-on product. This variant
    /// never competes on features; it fills the free slot.
    StandaloneAddOn,
}

impl BestSubscription {
    /// The winning plan, if the variant carries one.
    #[must_use]
    pub fn plan(&self) -> Option<&Plan> {
        match self {
            Self::Commons { plan, .. } | Self::Group { plan, .. } | Self::Individual { plan, .. } => {
                Some(plan)
            }
            Self::Free | Self::StandaloneAddOn => None,
        }
    }

    /// Stable tag for logging and serialization.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Commons { .. } => "commons",
            Self::Group { .. } => "group",
            Self::Individual { .. } => "individual",
            Self::StandaloneAddOn => "standalone-add-on",
        }
    }
}

/// Resolves the best subscription across all sources for an account.
pub struct SubscriptionResolver<S, I, B> {
    store: S,
    institutions: I,
    billing: B,
    catalog: Arc<PlanCatalog>,
}

impl<S, I, B> SubscriptionResolver<S, I, B>
where
    S: SubscriptionStore,
    I: InstitutionService,
    B: BillingProvider,
{
    /// Create a new resolver.
    #[must_use]
    pub fn new(store: S, institutions: I, billing: B, catalog: Arc<PlanCatalog>) -> Self {
        Self {
            store,
            institutions,
            billing,
            catalog,
        }
    }

    /// Resolve the best subscription for an account as of now.
    pub async fn resolve(&self, account_id: &str) -> Result<BestSubscription> {
        self.resolve_at(account_id, Utc::now()).await
    }

    /// Resolve the best subscription as of a caller-supplied instant.
    ///
    /// All state is local to the call; concurrent resolutions for different
    /// accounts are fully independent.
    pub async fn resolve_at(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<BestSubscription> {
        let (individual, member_groups, institutions) = tokio::try_join!(
            self.store.get_individual_subscription(account_id),
            self.store.get_group_memberships(account_id),
            self.fetch_institutions(account_id),
        )?;

        // Must complete before any comparison: the individual candidate's
        // trial metadata comes from the cached status.
        let individual = self.refresh_cached_status(account_id, individual).await?;

        let mut best = BestSubscription::Free;

        for institution in institutions {
            let plan = self.catalog.institution_plan()?;
            if self.equal_or_better(plan, &best) {
                best = BestSubscription::Commons {
                    institution,
                    plan: plan.clone(),
                };
            }
        }

        for group in &member_groups {
            let plan = self.catalog.require(&group.plan_code)?;
            if self.equal_or_better(plan, &best) {
                best = BestSubscription::Group {
                    plan: plan.clone(),
                    team_name: group.team_name.clone(),
                    remaining_trial_days: remaining_trial_days(group.trial_ends_at(), now),
                };
            }
        }

        if let Some(subscription) = individual {
            // A group-purchased seat already competed through its group.
            if !subscription.group_plan {
                if self.catalog.is_standalone_add_on_plan(&subscription.plan_code)
                    && best == BestSubscription::Free
                {
                    best = BestSubscription::StandaloneAddOn;
                } else {
                    let plan = self.catalog.require(&subscription.plan_code)?;
                    if self.equal_or_better(plan, &best) {
                        best = BestSubscription::Individual {
                            plan: plan.clone(),
                            remaining_trial_days: remaining_trial_days(
                                subscription.trial_ends_at(),
                                now,
                            ),
                            subscription,
                        };
                    }
                }
            }
        }

        tracing::debug!(
            account_id = %account_id,
            best = best.kind(),
            plan_code = best.plan().map(|p| p.plan_code.as_str()).unwrap_or("-"),
            "resolved best subscription"
        );

        Ok(best)
    }

    fn equal_or_better(&self, candidate: &Plan, best: &BestSubscription) -> bool {
        is_feature_set_equal_or_better(
            Some(&candidate.features),
            best.plan().map(|plan| &plan.features),
        )
    }

    /// Institution lookup, with its connectivity failure downgraded to
    /// "no institutional licences".
    async fn fetch_institutions(&self, account_id: &str) -> Result<Vec<InstitutionMembership>> {
        match self
            .institutions
            .get_current_institutions_with_licence(account_id)
            .await
        {
            Ok(memberships) => Ok(memberships),
            Err(err) if err.is_connection_failure() => {
                tracing::warn!(
                    account_id = %account_id,
                    error = %err,
                    "institution lookup unavailable, resolving without institutional licences"
                );
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    /// Write-through refresh: an externally billed record with no cached
    /// status gets one from the provider, then the record is re-read so the
    /// store stays the source of truth.
    async fn refresh_cached_status(
        &self,
        account_id: &str,
        individual: Option<IndividualSubscription>,
    ) -> Result<Option<IndividualSubscription>> {
        let Some(subscription) = individual else {
            return Ok(None);
        };

        match (
            &subscription.external_subscription_id,
            &subscription.cached_status,
        ) {
            (Some(external_id), None) if !subscription.custom_account => {
                tracing::debug!(
                    account_id = %account_id,
                    external_id = %external_id,
                    "refreshing cached subscription status"
                );
                let status = self.billing.get_subscription_status(external_id).await?;
                self.store.update_cached_status(account_id, &status).await?;
                self.store.get_individual_subscription(account_id).await
            }
            _ => Ok(Some(subscription)),
        }
    }
}
