//! Bestplan - subscription resolution and display pricing
//!
//! Bestplan decides which subscription an account is actually entitled to
//! when entitlements can arrive through several channels at once, and turns
//! raw billing-provider figures into tax-inclusive display prices without
//! touching floating point.
//!
//! # Features
//!
//! - **Resolution**: institutional, group and individual sources evaluated
//!   under a single feature-set partial order
//! - **Pricing**: integer minor-unit arithmetic with authoritative tax for
//!   the current term and self-computed tax for pending changes
//! - **Dashboard**: a complete view model for the subscription page,
//!   including viewer-shaped group views and hosted-page redirects
//! - **Testing**: in-memory store and mock provider/institution clients
//!   behind the `test-support` feature
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bestplan::{PlanCatalog, SubscriptionResolver};
//! use bestplan::test::{InMemorySubscriptionStore, MockBillingProvider, MockInstitutionService};
//!
//! #[tokio::main]
//! async fn main() {
//!     bestplan::init_tracing();
//!
//!     let catalog = Arc::new(
//!         PlanCatalog::builder()
//!             .plan("collaborator")
//!             .name("Standard")
//!             .done()
//!             .build(),
//!     );
//!
//!     let resolver = SubscriptionResolver::new(
//!         InMemorySubscriptionStore::new(),
//!         MockInstitutionService::new(),
//!         MockBillingProvider::new(),
//!         catalog,
//!     );
//!
//!     let best = resolver.resolve("user_1").await.unwrap();
//!     println!("{}", best.kind());
//! }
//! ```

#![allow(async_fn_in_trait)] // client traits stay object-simple; stores use async_trait

pub mod currency;
pub mod dashboard;
mod error;
pub mod features;
pub mod group;
pub mod plans;
pub mod pricing;
pub mod resolver;
pub mod sources;
pub mod trial;

// Re-exports for public API
pub use currency::{CurrencyFormatter, TaxRate};
pub use dashboard::{
    hosted_link, DashboardBuilder, HostedPageType, PersonalSubscriptionView, SubscriptionDashboard,
};
pub use error::{Result, SubscriptionError};
pub use features::{is_feature_set_equal_or_better, FeatureSet, FeatureValue};
pub use group::{GroupSubscription, GroupView, GroupViewAdapter, HtmlSanitizer};
pub use plans::{Plan, PlanBuilder, PlanCatalog, PlanCatalogBuilder};
pub use pricing::{
    AddOn, BillingSnapshot, PendingChange, PendingPricingView, PricingCalculator, PricingView,
    SubscriptionState,
};
pub use resolver::{BestSubscription, SubscriptionResolver};
pub use sources::{
    BillingProvider, CachedStatus, IndividualSubscription, InstitutionMembership,
    InstitutionService, SubscriptionStore,
};
pub use trial::{remaining_trial_days, MS_PER_DAY, NO_ACTIVE_TRIAL};

/// Test doubles for every upstream seam, gathered in one place.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    pub use crate::currency::test::PlainCurrencyFormatter;
    pub use crate::group::test::EscapingSanitizer;
    pub use crate::sources::test::{
        InMemorySubscriptionStore, MockBillingProvider, MockInstitutionService,
    };
}

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging with sensible defaults
///
/// This should be called early in your application, before resolving any
/// subscriptions.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "bestplan=debug")
/// - `BESTPLAN_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("BESTPLAN_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
