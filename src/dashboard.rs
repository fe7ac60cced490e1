//! Subscription dashboard view model.
//!
//! Assembles everything the subscription page presents for one account: the
//! personal subscription with its display pricing, every group the account
//! belongs to or manages (shaped for that viewer), and current institutional
//! licences. Also builds redirect URLs for the billing provider's hosted
//! account pages.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::currency::CurrencyFormatter;
use crate::error::{Result, SubscriptionError};
use crate::group::{GroupView, GroupViewAdapter, HtmlSanitizer};
use crate::plans::{Plan, PlanCatalog};
use crate::pricing::{PricingCalculator, PricingView, SubscriptionState};
use crate::sources::{
    BillingProvider, IndividualSubscription, InstitutionMembership, InstitutionService,
    SubscriptionStore,
};
use crate::trial::remaining_trial_days;

/// A hosted page at the billing provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostedPageType {
    /// Edit billing details.
    BillingDetails,
    /// Manage the account.
    AccountManagement,
}

impl HostedPageType {
    /// Stable tag, also used in local link paths.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BillingDetails => "billing-details",
            Self::AccountManagement => "account-management",
        }
    }
}

impl FromStr for HostedPageType {
    type Err = SubscriptionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "billing-details" => Ok(Self::BillingDetails),
            "account-management" => Ok(Self::AccountManagement),
            other => Err(SubscriptionError::invalid_input(format!(
                "unexpected page type '{other}'"
            ))),
        }
    }
}

/// The account's own subscription, shaped for presentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonalSubscriptionView {
    /// The purchased plan.
    pub plan: Plan,
    /// Display pricing, present when the provider returned a billing
    /// snapshot for the current term.
    pub pricing: Option<PricingView>,
    /// Provider lifecycle state, from the snapshot or the cached status.
    pub state: Option<SubscriptionState>,
    /// End of the current billing period, when known.
    pub next_payment_due_at: Option<DateTime<Utc>>,
    /// Trial end, when known.
    pub trial_ends_at: Option<DateTime<Utc>>,
    /// Whole trial days left, or -1 when no trial is active.
    pub remaining_trial_days: i64,
    /// Local link to the billing-details flow.
    pub billing_details_link: String,
    /// Local link to the account-management flow.
    pub account_management_link: String,
}

/// Everything the subscription dashboard presents for one account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionDashboard {
    /// The account's own subscription, if any.
    pub personal: Option<PersonalSubscriptionView>,
    /// Groups the account is a member of, shaped for this viewer.
    pub member_groups: Vec<GroupView>,
    /// Groups the account manages, shaped for this viewer.
    pub managed_groups: Vec<GroupView>,
    /// Institutions currently entitling the account.
    pub institutions: Vec<InstitutionMembership>,
}

/// Builds the subscription dashboard for an account.
pub struct DashboardBuilder<S, I, B, F, H>
where
    F: CurrencyFormatter,
    H: HtmlSanitizer,
{
    store: S,
    institutions: I,
    billing: B,
    catalog: Arc<PlanCatalog>,
    pricing: PricingCalculator<F>,
    groups: GroupViewAdapter<H>,
    /// Host serving the provider's hosted account pages.
    provider_host: String,
}

impl<S, I, B, F, H> DashboardBuilder<S, I, B, F, H>
where
    S: SubscriptionStore,
    I: InstitutionService,
    B: BillingProvider,
    F: CurrencyFormatter,
    H: HtmlSanitizer,
{
    /// Create a new dashboard builder.
    #[must_use]
    pub fn new(
        store: S,
        institutions: I,
        billing: B,
        catalog: Arc<PlanCatalog>,
        formatter: F,
        sanitizer: H,
        provider_host: impl Into<String>,
    ) -> Self {
        let pricing = PricingCalculator::new(Arc::clone(&catalog), formatter);
        let groups = GroupViewAdapter::new(Arc::clone(&catalog), sanitizer);
        Self {
            store,
            institutions,
            billing,
            catalog,
            pricing,
            groups,
            provider_host: provider_host.into(),
        }
    }

    /// Build the dashboard for an account as of now.
    pub async fn build(&self, account_id: &str, locale: &str) -> Result<SubscriptionDashboard> {
        self.build_at(account_id, locale, Utc::now()).await
    }

    /// Build the dashboard as of a caller-supplied instant.
    pub async fn build_at(
        &self,
        account_id: &str,
        locale: &str,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionDashboard> {
        let (personal, member_groups, managed_groups, institutions) = tokio::try_join!(
            self.store.get_individual_subscription(account_id),
            self.store.get_group_memberships(account_id),
            self.store.get_managed_group_subscriptions(account_id),
            self.fetch_institutions(account_id),
        )?;

        let member_groups = member_groups
            .iter()
            .map(|group| self.groups.adapt(group, account_id))
            .collect();
        let managed_groups = managed_groups
            .iter()
            .map(|group| self.groups.adapt(group, account_id))
            .collect();

        let personal = match personal {
            Some(subscription) => Some(self.build_personal(subscription, locale, now).await?),
            None => None,
        };

        tracing::debug!(
            account_id = %account_id,
            has_personal = personal.is_some(),
            "built subscription dashboard"
        );

        Ok(SubscriptionDashboard {
            personal,
            member_groups,
            managed_groups,
            institutions,
        })
    }

    /// Redirect URL for one of the provider's hosted account pages.
    ///
    /// # Errors
    ///
    /// Fails when the account has no externally billed subscription; the
    /// page-type parse (`HostedPageType::from_str`) rejects unsupported
    /// types before this is called.
    pub async fn hosted_page_url(
        &self,
        account_id: &str,
        page_type: HostedPageType,
    ) -> Result<String> {
        let subscription = self
            .store
            .get_individual_subscription(account_id)
            .await?
            .ok_or_else(|| SubscriptionError::NoExternalSubscription {
                account_id: account_id.to_string(),
            })?;
        let external_id = subscription.external_subscription_id.as_deref().ok_or_else(
            || SubscriptionError::NoExternalSubscription {
                account_id: account_id.to_string(),
            },
        )?;

        let token = self.billing.get_hosted_login_token(external_id).await?;
        let path = match page_type {
            HostedPageType::BillingDetails => "billing_info/edit?ht=",
            HostedPageType::AccountManagement => "",
        };
        Ok(format!(
            "https://{}/account/{}{}",
            self.provider_host, path, token
        ))
    }

    async fn build_personal(
        &self,
        subscription: IndividualSubscription,
        locale: &str,
        now: DateTime<Utc>,
    ) -> Result<PersonalSubscriptionView> {
        let plan = self.catalog.require(&subscription.plan_code)?.clone();

        let snapshot = match &subscription.external_subscription_id {
            Some(external_id) => self.billing.get_billing_snapshot(external_id).await?,
            None => None,
        };

        let view = match snapshot {
            Some(snapshot) => {
                let pricing = self.pricing.compute(&plan, &snapshot, locale)?;
                PersonalSubscriptionView {
                    remaining_trial_days: remaining_trial_days(snapshot.trial_period_end, now),
                    state: Some(snapshot.state),
                    next_payment_due_at: Some(snapshot.period_end),
                    trial_ends_at: snapshot.trial_period_end,
                    pricing: Some(pricing),
                    plan,
                    billing_details_link: hosted_link(HostedPageType::BillingDetails),
                    account_management_link: hosted_link(HostedPageType::AccountManagement),
                }
            }
            None => PersonalSubscriptionView {
                remaining_trial_days: remaining_trial_days(subscription.trial_ends_at(), now),
                state: subscription.cached_status.as_ref().map(|status| status.state),
                next_payment_due_at: None,
                trial_ends_at: subscription.trial_ends_at(),
                pricing: None,
                plan,
                billing_details_link: hosted_link(HostedPageType::BillingDetails),
                account_management_link: hosted_link(HostedPageType::AccountManagement),
            },
        };
        Ok(view)
    }

    /// Institution lookup with the same connectivity downgrade the resolver
    /// applies.
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
                    "institution lookup unavailable, building dashboard without licences"
                );
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }
}

/// Local path routing to the hosted-page redirect for the given page type.
#[must_use]
pub fn hosted_link(page_type: HostedPageType) -> String {
    format!("/user/subscription/provider/{}", page_type.as_str())
}
