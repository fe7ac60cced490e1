//! Display pricing for an externally billed subscription.
//!
//! The billing provider's snapshot is authoritative for the current term:
//! its `tax_amount` already covers the plan and every add-on. A pending
//! change has not been billed yet, so its tax must be estimated locally from
//! the snapshot's tax rate. The calculator reconciles the two without
//! double-counting, and folds the seat-limit add-on into the "plan" price
//! since it is treated as part of the base plan's effective price.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::currency::{CurrencyFormatter, TaxRate};
use crate::error::Result;
use crate::plans::{Plan, PlanCatalog};

/// A purchased add-on attached to a billing snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOn {
    /// Add-on code, e.g. "additional-license".
    pub code: String,
    /// Units purchased.
    pub quantity: u32,
    /// Price per unit in minor currency units, tax-exclusive.
    pub unit_price: i64,
}

impl AddOn {
    /// Tax-exclusive total for this add-on line.
    #[must_use]
    pub fn total_price(&self) -> i64 {
        i64::from(self.quantity) * self.unit_price
    }
}

/// A scheduled plan/add-on change not yet reflected in authoritative totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    /// Plan code taking effect at the next term.
    pub next_plan_code: String,
    /// Tax-exclusive plan price for the next term, in minor units.
    pub next_plan_price: i64,
    /// Add-ons for the next term. Absent means the plan-price delta is the
    /// only contribution.
    pub next_add_ons: Option<Vec<AddOn>>,
}

/// Lifecycle state reported by the billing provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Billing normally.
    Active,
    /// Canceled but possibly still inside a paid term.
    Canceled,
    /// Term over, no further billing.
    Expired,
    /// Starts at a future date.
    Future,
    /// Billing paused.
    Paused,
}

impl SubscriptionState {
    /// Parse from the provider's status string.
    #[must_use]
    pub fn from_provider(state: &str) -> Self {
        match state {
            "active" => Self::Active,
            "canceled" => Self::Canceled,
            "future" => Self::Future,
            "paused" => Self::Paused,
            // Unknown states grant nothing
            _ => Self::Expired,
        }
    }

    /// Provider-format string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Canceled => "canceled",
            Self::Expired => "expired",
            Self::Future => "future",
            Self::Paused => "paused",
        }
    }
}

/// Authoritative billing figures for one term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingSnapshot {
    /// Tax-exclusive plan price in minor units.
    pub plan_price: i64,
    /// Authoritative tax for the whole current term, add-ons included.
    pub tax_amount: i64,
    /// Tax rate for this account.
    pub tax_rate: TaxRate,
    /// ISO currency code.
    pub currency: String,
    /// Add-ons attached to the current term, in provider order.
    pub add_ons: Vec<AddOn>,
    /// End of the current billing period.
    pub period_end: DateTime<Utc>,
    /// Trial end, when the subscription is (or was) trialing.
    pub trial_period_end: Option<DateTime<Utc>>,
    /// Provider lifecycle state.
    pub state: SubscriptionState,
    /// Scheduled change for the next term, if any.
    pub pending_change: Option<PendingChange>,
}

impl BillingSnapshot {
    /// Tax-exclusive sum over all add-on lines.
    #[must_use]
    pub fn add_on_price(&self) -> i64 {
        self.add_ons.iter().map(AddOn::total_price).sum()
    }
}

/// All display price strings for one subscription.
///
/// Built fresh on every call and never mutated in place. The pending block
/// is present exactly when the snapshot carries a pending change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricingView {
    /// Tax-inclusive total for the term being presented. When a pending
    /// change exists this is the *pending* term's total.
    pub display_price: String,
    /// The total minus every non-seat add-on's tax-inclusive price. The
    /// seat-limit add-on stays folded in.
    pub plan_only_display_price: String,
    /// Tax-inclusive price per non-seat add-on, included only when positive.
    pub add_on_display_prices: BTreeMap<String, String>,
    /// Seats granted by the seat-limit add-on in the current term.
    pub additional_licenses: u32,
    /// Base seats plus additional licenses for the current term.
    pub total_licenses: u32,
    /// ISO currency code, echoed for presentation.
    pub currency: String,
    /// Provider lifecycle state, echoed for presentation.
    pub state: SubscriptionState,
    /// Pricing for a scheduled-but-unbilled plan change.
    pub pending: Option<PendingPricingView>,
}

/// Speculative pricing for a pending change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingPricingView {
    /// The plan taking effect next term.
    pub plan: Plan,
    /// The current (pre-change) term's tax-inclusive total, for comparison.
    pub current_plan_display_price: String,
    /// Seat-limit add-on seats in the pending term.
    pub pending_additional_licenses: u32,
    /// Base seats plus additional licenses in the pending term.
    pub pending_total_licenses: u32,
}

/// Computes display pricing from a plan and its billing snapshot.
pub struct PricingCalculator<F: CurrencyFormatter> {
    catalog: std::sync::Arc<PlanCatalog>,
    formatter: F,
}

impl<F: CurrencyFormatter> PricingCalculator<F> {
    /// Create a new pricing calculator.
    #[must_use]
    pub fn new(catalog: std::sync::Arc<PlanCatalog>, formatter: F) -> Self {
        Self { catalog, formatter }
    }

    /// Compute all display price strings for a subscription.
    ///
    /// # Errors
    ///
    /// Fails with a configuration error when a pending change references a
    /// plan code the catalog does not know.
    pub fn compute(
        &self,
        plan: &Plan,
        snapshot: &BillingSnapshot,
        locale: &str,
    ) -> Result<PricingView> {
        let add_on_price = snapshot.add_on_price();
        let additional_licenses =
            count_additional_licenses(plan.members_limit_add_on.as_deref(), &snapshot.add_ons);
        let total_licenses = plan.total_licenses(additional_licenses);

        // tax_amount already includes the tax for every current-term add-on
        let current_total = snapshot.plan_price + add_on_price + snapshot.tax_amount;

        let view = match &snapshot.pending_change {
            None => PricingView {
                display_price: self.format(current_total, snapshot, locale),
                plan_only_display_price: self.plan_only_display_price(
                    current_total,
                    snapshot.tax_rate,
                    &snapshot.add_ons,
                    plan.members_limit_add_on.as_deref(),
                    snapshot,
                    locale,
                ),
                add_on_display_prices: self.add_on_display_prices(
                    snapshot.tax_rate,
                    &snapshot.add_ons,
                    plan.members_limit_add_on.as_deref(),
                    snapshot,
                    locale,
                ),
                additional_licenses,
                total_licenses,
                currency: snapshot.currency.clone(),
                state: snapshot.state,
                pending: None,
            },
            Some(pending_change) => {
                let pending_plan = self.catalog.require(&pending_change.next_plan_code)?;
                let pending_add_ons: &[AddOn] =
                    pending_change.next_add_ons.as_deref().unwrap_or(&[]);

                let pending_add_on_price: i64 =
                    pending_add_ons.iter().map(AddOn::total_price).sum();
                let pending_additional_licenses = count_additional_licenses(
                    pending_plan.members_limit_add_on.as_deref(),
                    pending_add_ons,
                );

                // The authoritative tax_amount covers only the billed term, so
                // the pending term's tax is estimated from the rate. The plan
                // and add-on taxes are kept as distinct quantities.
                let pending_add_on_tax = snapshot.tax_rate.apply(pending_add_on_price);
                let pending_subscription_tax =
                    snapshot.tax_rate.apply(pending_change.next_plan_price);
                let pending_total = pending_change.next_plan_price
                    + pending_add_on_price
                    + pending_add_on_tax
                    + pending_subscription_tax;

                tracing::debug!(
                    next_plan_code = %pending_change.next_plan_code,
                    pending_total,
                    pending_add_on_tax,
                    pending_subscription_tax,
                    "priced pending change"
                );

                PricingView {
                    display_price: self.format(pending_total, snapshot, locale),
                    plan_only_display_price: self.plan_only_display_price(
                        pending_total,
                        snapshot.tax_rate,
                        pending_add_ons,
                        pending_plan.members_limit_add_on.as_deref(),
                        snapshot,
                        locale,
                    ),
                    add_on_display_prices: self.add_on_display_prices(
                        snapshot.tax_rate,
                        pending_add_ons,
                        pending_plan.members_limit_add_on.as_deref(),
                        snapshot,
                        locale,
                    ),
                    additional_licenses,
                    total_licenses,
                    currency: snapshot.currency.clone(),
                    state: snapshot.state,
                    pending: Some(PendingPricingView {
                        current_plan_display_price: self.format(current_total, snapshot, locale),
                        pending_total_licenses: pending_plan
                            .total_licenses(pending_additional_licenses),
                        pending_additional_licenses,
                        plan: pending_plan.clone(),
                    }),
                }
            }
        };

        Ok(view)
    }

    /// Subtract every non-seat add-on's tax-inclusive price from the total.
    fn plan_only_display_price(
        &self,
        total_price: i64,
        tax_rate: TaxRate,
        add_ons: &[AddOn],
        members_limit_add_on: Option<&str>,
        snapshot: &BillingSnapshot,
        locale: &str,
    ) -> String {
        let excluded_price: i64 = add_ons
            .iter()
            .filter(|add_on| Some(add_on.code.as_str()) != members_limit_add_on)
            .map(AddOn::total_price)
            .sum();
        let excluded_with_tax = excluded_price + tax_rate.apply(excluded_price);
        self.format(total_price - excluded_with_tax, snapshot, locale)
    }

    /// Tax-inclusive display price per non-seat add-on, positive amounts only.
    fn add_on_display_prices(
        &self,
        tax_rate: TaxRate,
        add_ons: &[AddOn],
        members_limit_add_on: Option<&str>,
        snapshot: &BillingSnapshot,
        locale: &str,
    ) -> BTreeMap<String, String> {
        let mut prices = BTreeMap::new();
        for add_on in add_ons {
            if Some(add_on.code.as_str()) == members_limit_add_on {
                continue;
            }
            let price = add_on.total_price();
            let price_with_tax = price + tax_rate.apply(price);
            if price_with_tax > 0 {
                prices.insert(
                    add_on.code.clone(),
                    self.format(price_with_tax, snapshot, locale),
                );
            }
        }
        prices
    }

    fn format(&self, amount_minor: i64, snapshot: &BillingSnapshot, locale: &str) -> String {
        self.formatter
            .format(amount_minor, &snapshot.currency, locale)
    }
}

/// Seats granted through the plan's seat-limit add-on.
fn count_additional_licenses(members_limit_add_on: Option<&str>, add_ons: &[AddOn]) -> u32 {
    let Some(seat_code) = members_limit_add_on else {
        return 0;
    };
    add_ons
        .iter()
        .filter(|add_on| add_on.code == seat_code)
        .map(|add_on| add_on.quantity)
        .sum()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::currency::test::PlainCurrencyFormatter;
    use crate::features::FeatureValue;

    fn catalog() -> Arc<PlanCatalog> {
        Arc::new(
            PlanCatalog::builder()
                .plan("collaborator")
                .name("Standard")
                .feature("collaborators", FeatureValue::Limit(10))
                .members_limit(1)
                .members_limit_add_on("additional-license")
                .done()
                .plan("professional")
                .name("Professional")
                .members_limit(1)
                .members_limit_add_on("additional-license")
                .done()
                .build(),
        )
    }

    fn calculator() -> PricingCalculator<PlainCurrencyFormatter> {
        PricingCalculator::new(catalog(), PlainCurrencyFormatter)
    }

    fn snapshot() -> BillingSnapshot {
        BillingSnapshot {
            plan_price: 1000,
            tax_amount: 120,
            tax_rate: TaxRate::from_percent(20),
            currency: "usd".to_string(),
            add_ons: vec![AddOn {
                code: "extra-seat".to_string(),
                quantity: 2,
                unit_price: 200,
            }],
            period_end: "2025-04-01T00:00:00Z".parse().unwrap(),
            trial_period_end: None,
            state: SubscriptionState::Active,
            pending_change: None,
        }
    }

    fn plan(catalog: &PlanCatalog) -> Plan {
        catalog.require("collaborator").unwrap().clone()
    }

    #[test]
    fn test_current_term_totals() {
        let catalog = catalog();
        let calc = calculator();
        let view = calc.compute(&plan(&catalog), &snapshot(), "en").unwrap();

        // 1000 + 2*200 + 120
        assert_eq!(view.display_price, "USD 15.20");
        // extra-seat is not the seat-limit add-on: 1520 - 400*(1+0.2) = 1040
        assert_eq!(view.plan_only_display_price, "USD 10.40");
        assert_eq!(
            view.add_on_display_prices.get("extra-seat"),
            Some(&"USD 4.80".to_string())
        );
        assert_eq!(view.additional_licenses, 0);
        assert_eq!(view.total_licenses, 1);
        assert!(view.pending.is_none());
    }

    #[test]
    fn test_seat_limit_add_on_folds_into_plan_price() {
        let catalog = catalog();
        let calc = calculator();
        let mut snap = snapshot();
        snap.add_ons = vec![AddOn {
            code: "additional-license".to_string(),
            quantity: 3,
            unit_price: 500,
        }];
        snap.tax_amount = 500; // 20% of 1000 + 1500

        let view = calc.compute(&plan(&catalog), &snap, "en").unwrap();
        // the seat-limit add-on is part of the plan's effective price
        assert!(view.add_on_display_prices.is_empty());
        assert_eq!(view.plan_only_display_price, view.display_price);
        assert_eq!(view.additional_licenses, 3);
        assert_eq!(view.total_licenses, 4);
    }

    #[test]
    fn test_zero_priced_add_on_omitted() {
        let catalog = catalog();
        let calc = calculator();
        let mut snap = snapshot();
        snap.add_ons.push(AddOn {
            code: "bundled-extra".to_string(),
            quantity: 1,
            unit_price: 0,
        });

        let view = calc.compute(&plan(&catalog), &snap, "en").unwrap();
        assert!(!view.add_on_display_prices.contains_key("bundled-extra"));
        assert!(view.add_on_display_prices.contains_key("extra-seat"));
    }

    #[test]
    fn test_pending_change_without_add_ons() {
        let catalog = catalog();
        let calc = calculator();
        let mut snap = snapshot();
        snap.pending_change = Some(PendingChange {
            next_plan_code: "professional".to_string(),
            next_plan_price: 2000,
            next_add_ons: None,
        });

        let view = calc.compute(&plan(&catalog), &snap, "en").unwrap();
        // pending add-on price and tax are both zero:
        // total = 2000 + 20% * 2000
        assert_eq!(view.display_price, "USD 24.00");
        assert!(view.add_on_display_prices.is_empty());
        assert_eq!(view.plan_only_display_price, "USD 24.00");

        let pending = view.pending.expect("pending block");
        assert_eq!(pending.plan.plan_code, "professional");
        // the pre-change term formats with the authoritative tax
        assert_eq!(pending.current_plan_display_price, "USD 15.20");
        assert_eq!(pending.pending_additional_licenses, 0);
        assert_eq!(pending.pending_total_licenses, 1);
    }

    #[test]
    fn test_pending_change_with_add_ons() {
        let catalog = catalog();
        let calc = calculator();
        let mut snap = snapshot();
        snap.pending_change = Some(PendingChange {
            next_plan_code: "professional".to_string(),
            next_plan_price: 2000,
            next_add_ons: Some(vec![
                AddOn {
                    code: "additional-license".to_string(),
                    quantity: 2,
                    unit_price: 300,
                },
                AddOn {
                    code: "extra-seat".to_string(),
                    quantity: 1,
                    unit_price: 100,
                },
            ]),
        });

        let view = calc.compute(&plan(&catalog), &snap, "en").unwrap();
        // add-on price 700, add-on tax 140, plan tax 400 → 2000+700+140+400
        assert_eq!(view.display_price, "USD 32.40");
        // pending plan-only excludes extra-seat at 100*(1+0.2)
        assert_eq!(view.plan_only_display_price, "USD 31.20");
        assert_eq!(
            view.add_on_display_prices.get("extra-seat"),
            Some(&"USD 1.20".to_string())
        );
        assert!(!view.add_on_display_prices.contains_key("additional-license"));

        let pending = view.pending.expect("pending block");
        assert_eq!(pending.pending_additional_licenses, 2);
        assert_eq!(pending.pending_total_licenses, 3);

        // current-term license fields still describe the current term
        assert_eq!(view.additional_licenses, 0);
        assert_eq!(view.total_licenses, 1);
    }

    #[test]
    fn test_pending_change_with_unknown_plan_fails() {
        let catalog = catalog();
        let calc = calculator();
        let mut snap = snapshot();
        snap.pending_change = Some(PendingChange {
            next_plan_code: "retired_plan".to_string(),
            next_plan_price: 2000,
            next_add_ons: None,
        });

        let err = calc.compute(&plan(&catalog), &snap, "en").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_compute_is_idempotent() {
        let catalog = catalog();
        let calc = calculator();
        let snap = snapshot();
        let plan = plan(&catalog);

        let first = calc.compute(&plan, &snap, "en").unwrap();
        let second = calc.compute(&plan, &snap, "en").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_state_parsing() {
        assert_eq!(
            SubscriptionState::from_provider("active"),
            SubscriptionState::Active
        );
        assert_eq!(
            SubscriptionState::from_provider("mystery"),
            SubscriptionState::Expired
        );
        assert_eq!(SubscriptionState::Paused.as_str(), "paused");
    }
}
