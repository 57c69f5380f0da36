use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// USD per one million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input: f64,
    pub output: f64,
}

impl ModelPrice {
    pub const fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }

    /// Both rates must be finite and non-negative.
    pub fn is_valid(&self) -> bool {
        [self.input, self.output].iter().all(|rate| rate.is_finite() && *rate >= 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceLookup {
    Known(ModelPrice),
    Unknown,
}

const DEFAULT_PRICES: &[(&str, ModelPrice)] = &[
    ("gpt-4o-mini", ModelPrice::new(0.150, 0.600)),
    ("gpt-4o", ModelPrice::new(2.50, 10.00)),
    ("gpt-4-turbo", ModelPrice::new(10.00, 30.00)),
    ("claude-3-5-sonnet-20241022", ModelPrice::new(3.00, 15.00)),
    ("claude-3-haiku-20240307", ModelPrice::new(0.25, 1.25)),
    ("grok-beta", ModelPrice::new(5.00, 15.00)),
    ("grok-vision-beta", ModelPrice::new(5.00, 15.00)),
];

#[derive(Debug, Clone, PartialEq)]
pub struct PricingTable {
    prices: BTreeMap<String, ModelPrice>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            prices: DEFAULT_PRICES
                .iter()
                .map(|(model, price)| (model.to_string(), *price))
                .collect(),
        }
    }
}

impl PricingTable {
    pub fn empty() -> Self {
        Self {
            prices: BTreeMap::new(),
        }
    }

    /// Default prices with `overrides` layered on top. Invalid rates are
    /// skipped and the default, if any, stays in place.
    pub fn with_overrides(overrides: &BTreeMap<String, ModelPrice>) -> Self {
        let mut table = Self::default();
        for (model, price) in overrides {
            if !price.is_valid() {
                warn!("Ignoring invalid price override for model {}: {:?}", model, price);
                continue;
            }
            table.set(model.clone(), *price);
        }
        table
    }

    pub fn set(&mut self, model: impl Into<String>, price: ModelPrice) {
        self.prices.insert(model.into(), price);
    }

    pub fn lookup(&self, model: &str) -> PriceLookup {
        match self.prices.get(model) {
            Some(price) => PriceLookup::Known(*price),
            None => PriceLookup::Unknown,
        }
    }

    /// Estimated cost in USD, rounded to 4 decimals and never negative.
    /// Unknown models cost 0.0.
    pub fn cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        match self.lookup(model) {
            PriceLookup::Known(price) => {
                let input_cost = input_tokens as f64 / 1_000_000.0 * price.input;
                let output_cost = output_tokens as f64 / 1_000_000.0 * price.output;
                let total = input_cost + output_cost;
                if total.is_finite() {
                    round4(total.max(0.0))
                } else {
                    warn!("Price for model {} is not usable, returning 0", model);
                    0.0
                }
            }
            PriceLookup::Unknown => {
                warn!("Pricing not available for model {}, returning 0", model);
                0.0
            }
        }
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_cost() {
        let table = PricingTable::default();
        // 1M input at 0.15 + 1M output at 0.60
        assert_eq!(table.cost("gpt-4o-mini", 1_000_000, 1_000_000), 0.75);
        assert_eq!(table.cost("gpt-4o", 10_000, 2_000), 0.045);
    }

    #[test]
    fn unknown_model_is_free_and_reported() {
        let table = PricingTable::default();
        assert_eq!(table.lookup("llama-local"), PriceLookup::Unknown);
        assert_eq!(table.cost("llama-local", 5_000_000, 5_000_000), 0.0);
    }

    #[test]
    fn cost_is_monotonic_in_tokens() {
        let table = PricingTable::default();
        let mut previous = 0.0;
        for tokens in [0u64, 10, 1_000, 50_000, 2_000_000] {
            let cost = table.cost("claude-3-haiku-20240307", tokens, tokens / 2);
            assert!(cost >= previous);
            assert!(cost >= 0.0);
            previous = cost;
        }
    }

    #[test]
    fn overrides_replace_defaults() {
        let mut overrides = BTreeMap::new();
        overrides.insert("gpt-4o".to_string(), ModelPrice::new(1.0, 1.0));
        overrides.insert("local".to_string(), ModelPrice::new(0.0, 0.0));
        let table = PricingTable::with_overrides(&overrides);
        assert_eq!(table.lookup("gpt-4o"), PriceLookup::Known(ModelPrice::new(1.0, 1.0)));
        assert!(matches!(table.lookup("local"), PriceLookup::Known(_)));
        assert!(matches!(PricingTable::empty().lookup("gpt-4o"), PriceLookup::Unknown));
    }

    #[test]
    fn invalid_overrides_keep_defaults() {
        let mut overrides = BTreeMap::new();
        overrides.insert("gpt-4o".to_string(), ModelPrice::new(-1.0, 10.0));
        overrides.insert("nan-model".to_string(), ModelPrice::new(f64::NAN, 1.0));
        let table = PricingTable::with_overrides(&overrides);
        assert_eq!(table.lookup("gpt-4o"), PriceLookup::Known(ModelPrice::new(2.50, 10.00)));
        assert_eq!(table.lookup("nan-model"), PriceLookup::Unknown);
        assert!(table.cost("gpt-4o", 1_000_000, 0) > 0.0);
    }

    #[test]
    fn cost_never_goes_negative() {
        let mut table = PricingTable::empty();
        table.set("refund-model", ModelPrice::new(-5.0, -5.0));
        table.set("huge-model", ModelPrice::new(f64::INFINITY, 1.0));
        assert!(!ModelPrice::new(-5.0, 0.0).is_valid());
        assert_eq!(table.cost("refund-model", 1_000_000, 1_000_000), 0.0);
        assert_eq!(table.cost("huge-model", 1_000, 1_000), 0.0);
    }
}
