//! Collaborator seams for subscription data.
//!
//! Persistence, the billing provider, and the institution licence service
//! live outside this crate. Implement these traits to wire the resolver and
//! dashboard builder to real backends; in-memory implementations are
//! provided for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::group::GroupSubscription;
use crate::pricing::{BillingSnapshot, SubscriptionState};

/// Provider status cached on a subscription record.
///
/// Synced from the billing provider so most reads avoid a provider call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedStatus {
    /// Last known lifecycle state.
    pub state: SubscriptionState,
    /// Last known trial end.
    pub trial_ends_at: Option<DateTime<Utc>>,
}

/// An individually purchased subscription record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndividualSubscription {
    /// Plan code the account purchased.
    pub plan_code: String,
    /// Set when the record is a group-purchased seat rather than a personal
    /// purchase; such records never compete as individual candidates.
    pub group_plan: bool,
    /// Manually provisioned accounts are never refreshed against the
    /// billing provider.
    pub custom_account: bool,
    /// Identifier of the subscription at the billing provider, when the
    /// account is externally billed.
    pub external_subscription_id: Option<String>,
    /// Cached provider status, absent until the first sync.
    pub cached_status: Option<CachedStatus>,
}

impl IndividualSubscription {
    /// Trial end from the cached provider status, if any.
    #[must_use]
    pub fn trial_ends_at(&self) -> Option<DateTime<Utc>> {
        self.cached_status
            .as_ref()
            .and_then(|status| status.trial_ends_at)
    }
}

/// Membership in an institution holding a site-wide licence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionMembership {
    /// Institution identifier, canonical string form.
    pub institution_id: String,
    /// Institution display name.
    pub institution_name: String,
}

/// Persistence for subscription records.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// The account's own subscription, if it has one.
    async fn get_individual_subscription(
        &self,
        account_id: &str,
    ) -> Result<Option<IndividualSubscription>>;

    /// Group subscriptions the account is a member of.
    async fn get_group_memberships(&self, account_id: &str) -> Result<Vec<GroupSubscription>>;

    /// Group subscriptions the account manages.
    async fn get_managed_group_subscriptions(
        &self,
        account_id: &str,
    ) -> Result<Vec<GroupSubscription>>;

    /// Write a freshly fetched provider status onto the account's
    /// individual subscription record.
    async fn update_cached_status(&self, account_id: &str, status: &CachedStatus) -> Result<()>;
}

/// Institution licence lookup.
///
/// A connectivity failure from this collaborator is reported as
/// [`crate::SubscriptionError::ConnectionFailed`], which the resolver
/// downgrades to "no institutional licences".
pub trait InstitutionService: Send + Sync {
    /// Institutions whose licence currently entitles the account.
    async fn get_current_institutions_with_licence(
        &self,
        account_id: &str,
    ) -> Result<Vec<InstitutionMembership>>;
}

/// The third-party billing provider.
pub trait BillingProvider: Send + Sync {
    /// Current status of a provider subscription, used to refresh the
    /// cached copy.
    async fn get_subscription_status(&self, external_subscription_id: &str)
        -> Result<CachedStatus>;

    /// Authoritative billing figures for the subscription's current term.
    ///
    /// Returns `None` when the provider no longer knows the subscription.
    async fn get_billing_snapshot(
        &self,
        external_subscription_id: &str,
    ) -> Result<Option<BillingSnapshot>>;

    /// One-time token for the provider's hosted account pages.
    async fn get_hosted_login_token(&self, external_subscription_id: &str) -> Result<String>;
}

/// In-memory implementations for testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use std::collections::HashMap;
    use std::sync::RwLock;

    use async_trait::async_trait;

    use super::{
        BillingProvider, CachedStatus, IndividualSubscription, InstitutionMembership,
        InstitutionService, SubscriptionStore,
    };
    use crate::error::{Result, SubscriptionError};
    use crate::group::GroupSubscription;
    use crate::pricing::BillingSnapshot;

    /// In-memory subscription store.
    #[derive(Debug, Default)]
    pub struct InMemorySubscriptionStore {
        individual: RwLock<HashMap<String, IndividualSubscription>>,
        member_groups: RwLock<HashMap<String, Vec<GroupSubscription>>>,
        managed_groups: RwLock<HashMap<String, Vec<GroupSubscription>>>,
    }

    impl InMemorySubscriptionStore {
        /// Create an empty store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Set the account's individual subscription.
        pub fn set_individual(&self, account_id: &str, subscription: IndividualSubscription) {
            self.individual
                .write()
                .unwrap()
                .insert(account_id.to_string(), subscription);
        }

        /// Add a group the account is a member of.
        pub fn add_member_group(&self, account_id: &str, group: GroupSubscription) {
            self.member_groups
                .write()
                .unwrap()
                .entry(account_id.to_string())
                .or_default()
                .push(group);
        }

        /// Add a group the account manages.
        pub fn add_managed_group(&self, account_id: &str, group: GroupSubscription) {
            self.managed_groups
                .write()
                .unwrap()
                .entry(account_id.to_string())
                .or_default()
                .push(group);
        }
    }

    #[async_trait]
    impl SubscriptionStore for InMemorySubscriptionStore {
        async fn get_individual_subscription(
            &self,
            account_id: &str,
        ) -> Result<Option<IndividualSubscription>> {
            Ok(self.individual.read().unwrap().get(account_id).cloned())
        }

        async fn get_group_memberships(&self, account_id: &str) -> Result<Vec<GroupSubscription>> {
            Ok(self
                .member_groups
                .read()
                .unwrap()
                .get(account_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn get_managed_group_subscriptions(
            &self,
            account_id: &str,
        ) -> Result<Vec<GroupSubscription>> {
            Ok(self
                .managed_groups
                .read()
                .unwrap()
                .get(account_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn update_cached_status(
            &self,
            account_id: &str,
            status: &CachedStatus,
        ) -> Result<()> {
            let mut individual = self.individual.write().unwrap();
            let record = individual.get_mut(account_id).ok_or_else(|| {
                SubscriptionError::upstream(
                    "update_cached_status",
                    format!("no subscription record for account '{account_id}'"),
                )
            })?;
            record.cached_status = Some(status.clone());
            Ok(())
        }
    }

    /// Mock institution service.
    #[derive(Debug, Default)]
    pub struct MockInstitutionService {
        memberships: HashMap<String, Vec<InstitutionMembership>>,
        fail_with_connection_error: bool,
    }

    impl MockInstitutionService {
        /// Create a service with no memberships.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a service that always reports a connectivity failure.
        #[must_use]
        pub fn unreachable() -> Self {
            Self {
                memberships: HashMap::new(),
                fail_with_connection_error: true,
            }
        }

        /// Grant the account a licence through the given institution.
        pub fn add_membership(&mut self, account_id: &str, membership: InstitutionMembership) {
            self.memberships
                .entry(account_id.to_string())
                .or_default()
                .push(membership);
        }
    }

    impl InstitutionService for MockInstitutionService {
        async fn get_current_institutions_with_licence(
            &self,
            account_id: &str,
        ) -> Result<Vec<InstitutionMembership>> {
            if self.fail_with_connection_error {
                return Err(SubscriptionError::connection_failed(
                    "institutions",
                    "connection refused",
                ));
            }
            Ok(self
                .memberships
                .get(account_id)
                .cloned()
                .unwrap_or_default())
        }
    }

    /// Mock billing provider backed by maps of canned responses.
    #[derive(Debug, Default)]
    pub struct MockBillingProvider {
        statuses: RwLock<HashMap<String, CachedStatus>>,
        snapshots: RwLock<HashMap<String, BillingSnapshot>>,
        hosted_login_tokens: RwLock<HashMap<String, String>>,
    }

    impl MockBillingProvider {
        /// Create a provider that knows no subscriptions.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Set the status returned for an external subscription id.
        pub fn set_status(&self, external_id: &str, status: CachedStatus) {
            self.statuses
                .write()
                .unwrap()
                .insert(external_id.to_string(), status);
        }

        /// Set the snapshot returned for an external subscription id.
        pub fn set_snapshot(&self, external_id: &str, snapshot: BillingSnapshot) {
            self.snapshots
                .write()
                .unwrap()
                .insert(external_id.to_string(), snapshot);
        }

        /// Set the hosted login token for an external subscription id.
        pub fn set_hosted_login_token(&self, external_id: &str, token: &str) {
            self.hosted_login_tokens
                .write()
                .unwrap()
                .insert(external_id.to_string(), token.to_string());
        }
    }

    impl BillingProvider for MockBillingProvider {
        async fn get_subscription_status(
            &self,
            external_subscription_id: &str,
        ) -> Result<CachedStatus> {
            self.statuses
                .read()
                .unwrap()
                .get(external_subscription_id)
                .cloned()
                .ok_or_else(|| {
                    SubscriptionError::upstream(
                        "get_subscription_status",
                        format!("unknown subscription '{external_subscription_id}'"),
                    )
                })
        }

        async fn get_billing_snapshot(
            &self,
            external_subscription_id: &str,
        ) -> Result<Option<BillingSnapshot>> {
            Ok(self
                .snapshots
                .read()
                .unwrap()
                .get(external_subscription_id)
                .cloned())
        }

        async fn get_hosted_login_token(
            &self,
            external_subscription_id: &str,
        ) -> Result<String> {
            self.hosted_login_tokens
                .read()
                .unwrap()
                .get(external_subscription_id)
                .cloned()
                .ok_or_else(|| {
                    SubscriptionError::upstream(
                        "get_hosted_login_token",
                        format!("unknown subscription '{external_subscription_id}'"),
                    )
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test::*;
    use super::*;
    use crate::pricing::SubscriptionState;

    fn individual(plan_code: &str) -> IndividualSubscription {
        IndividualSubscription {
            plan_code: plan_code.to_string(),
            group_plan: false,
            custom_account: false,
            external_subscription_id: Some("ext_1".to_string()),
            cached_status: None,
        }
    }

    #[tokio::test]
    async fn test_in_memory_store_round_trip() {
        let store = InMemorySubscriptionStore::new();
        store.set_individual("user_1", individual("collaborator"));

        let found = store
            .get_individual_subscription("user_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.plan_code, "collaborator");

        assert!(store
            .get_individual_subscription("user_2")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_cached_status_writes_through() {
        let store = InMemorySubscriptionStore::new();
        store.set_individual("user_1", individual("collaborator"));

        let status = CachedStatus {
            state: SubscriptionState::Active,
            trial_ends_at: None,
        };
        store.update_cached_status("user_1", &status).await.unwrap();

        let found = store
            .get_individual_subscription("user_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.cached_status, Some(status));

        // no record, nothing to update
        let status = CachedStatus {
            state: SubscriptionState::Active,
            trial_ends_at: None,
        };
        assert!(store.update_cached_status("user_2", &status).await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_institution_service() {
        let service = MockInstitutionService::unreachable();
        let err = service
            .get_current_institutions_with_licence("user_1")
            .await
            .unwrap_err();
        assert!(err.is_connection_failure());
    }

    #[tokio::test]
    async fn test_mock_billing_provider() {
        let provider = MockBillingProvider::new();
        provider.set_status(
            "ext_1",
            CachedStatus {
                state: SubscriptionState::Active,
                trial_ends_at: None,
            },
        );

        let status = provider.get_subscription_status("ext_1").await.unwrap();
        assert_eq!(status.state, SubscriptionState::Active);

        let err = provider.get_subscription_status("ext_9").await.unwrap_err();
        assert!(err.is_upstream());

        assert!(provider
            .get_billing_snapshot("ext_1")
            .await
            .unwrap()
            .is_none());
    }
}
