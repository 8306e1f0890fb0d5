//! Pricing table and cost calculator (C1, C2)
//!
//! Model identifiers are resolved against an ordered list of substring patterns,
//! most specific first; the first pattern occurring in the lowercased model name
//! wins. Unmatched names fall back to the terminal `default` entry.

/// A USD-per-million-token schedule for one token class: either a flat rate or a
/// set of ascending thresholds, each charged at its own rate up to the next one.
#[derive(Debug, Clone)]
pub enum Price {
    Flat(f64),
    /// Tiers sorted ascending by `threshold`; the final tier should carry `u64::MAX`.
    Tiered(Vec<Tier>),
}

#[derive(Debug, Clone, Copy)]
pub struct Tier {
    pub threshold: u64,
    pub price_per_million: f64,
}

impl Price {
    /// Cost in USD for `tokens` tokens under this schedule.
    pub fn charge(&self, tokens: u64) -> f64 {
        match self {
            Price::Flat(p) => (tokens as f64 / 1_000_000.0) * p,
            Price::Tiered(tiers) => {
                let mut remaining = tokens;
                let mut previous_threshold: u64 = 0;
                let mut total = 0.0;
                for tier in tiers {
                    let capacity = tier.threshold.saturating_sub(previous_threshold);
                    let in_tier = remaining.min(capacity);
                    if in_tier > 0 {
                        total += (in_tier as f64 / 1_000_000.0) * tier.price_per_million;
                        remaining -= in_tier;
                    }
                    previous_threshold = tier.threshold;
                    if remaining == 0 {
                        break;
                    }
                }
                total
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelPricing {
    pub input: Price,
    pub output: Price,
    pub cache_write: Price,
    pub cache_read: Price,
}

/// Ordered most-specific-first; substring-matched against the lowercased model name.
fn pricing_table() -> Vec<(&'static str, ModelPricing)> {
    vec![
        (
            "claude-sonnet-4-5",
            ModelPricing {
                input: Price::Tiered(vec![
                    Tier { threshold: 200_000, price_per_million: 3.00 },
                    Tier { threshold: u64::MAX, price_per_million: 6.00 },
                ]),
                output: Price::Tiered(vec![
                    Tier { threshold: 200_000, price_per_million: 15.00 },
                    Tier { threshold: u64::MAX, price_per_million: 22.50 },
                ]),
                cache_write: Price::Flat(3.75),
                cache_read: Price::Flat(0.30),
            },
        ),
        (
            "claude-opus-4-1",
            ModelPricing {
                input: Price::Flat(15.00),
                output: Price::Flat(75.00),
                cache_write: Price::Flat(18.75),
                cache_read: Price::Flat(1.50),
            },
        ),
        (
            "claude-sonnet-3-7",
            ModelPricing {
                input: Price::Flat(3.00),
                output: Price::Flat(15.00),
                cache_write: Price::Flat(3.75),
                cache_read: Price::Flat(0.30),
            },
        ),
        (
            "claude-3-5-haiku",
            ModelPricing {
                input: Price::Flat(0.80),
                output: Price::Flat(4.00),
                cache_write: Price::Flat(1.00),
                cache_read: Price::Flat(0.08),
            },
        ),
        (
            "claude-3-5-sonnet",
            ModelPricing {
                input: Price::Flat(3.00),
                output: Price::Flat(15.00),
                cache_write: Price::Flat(3.75),
                cache_read: Price::Flat(0.30),
            },
        ),
        (
            "claude-sonnet-4",
            ModelPricing {
                input: Price::Flat(3.00),
                output: Price::Flat(15.00),
                cache_write: Price::Flat(3.75),
                cache_read: Price::Flat(0.30),
            },
        ),
        (
            "claude-opus-4",
            ModelPricing {
                input: Price::Flat(15.00),
                output: Price::Flat(75.00),
                cache_write: Price::Flat(18.75),
                cache_read: Price::Flat(1.50),
            },
        ),
        (
            "claude-3-opus",
            ModelPricing {
                input: Price::Flat(15.00),
                output: Price::Flat(75.00),
                cache_write: Price::Flat(18.75),
                cache_read: Price::Flat(1.50),
            },
        ),
        (
            "claude-3-haiku",
            ModelPricing {
                input: Price::Flat(0.25),
                output: Price::Flat(1.25),
                cache_write: Price::Flat(0.30),
                cache_read: Price::Flat(0.03),
            },
        ),
        (
            "default",
            ModelPricing {
                input: Price::Flat(3.00),
                output: Price::Flat(15.00),
                cache_write: Price::Flat(3.75),
                cache_read: Price::Flat(0.30),
            },
        ),
    ]
}

/// Resolve a model identifier to its pricing entry. Case-insensitive substring
/// match in declared priority order; unmatched names resolve to `default`.
pub fn match_model_pricing(model: &str) -> ModelPricing {
    let model_lower = model.to_lowercase();
    let table = pricing_table();
    for (pattern, pricing) in &table {
        if *pattern != "default" && model_lower.contains(pattern) {
            return pricing.clone();
        }
    }
    table
        .into_iter()
        .find(|(pattern, _)| *pattern == "default")
        .expect("default pricing entry always present")
        .1
}

/// Four token-class counts for one request.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCounts {
    pub input: u64,
    pub output: u64,
    pub cache_creation: u64,
    pub cache_read: u64,
}

/// Total USD cost across the four token classes, rounded to 8 decimals.
pub fn calculate_cost(model: &str, counts: TokenCounts) -> f64 {
    let pricing = match_model_pricing(model);
    let total = pricing.input.charge(counts.input)
        + pricing.output.charge(counts.output)
        + pricing.cache_write.charge(counts.cache_creation)
        + pricing.cache_read.charge(counts.cache_read);
    (total * 1e8).round() / 1e8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_pricing_is_proportional() {
        let cost = calculate_cost(
            "claude-sonnet-4-20250514",
            TokenCounts { input: 1000, output: 2000, cache_creation: 0, cache_read: 0 },
        );
        assert!((cost - 0.033).abs() < 1e-9);
    }

    #[test]
    fn tiered_pricing_splits_across_thresholds() {
        let cost = calculate_cost(
            "claude-sonnet-4-5-2025",
            TokenCounts { input: 300_000, output: 0, cache_creation: 0, cache_read: 0 },
        );
        assert!((cost - 1.2).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_falls_back_to_default() {
        let cost = calculate_cost(
            "some-unrecognized-model",
            TokenCounts { input: 1_000_000, output: 0, cache_creation: 0, cache_read: 0 },
        );
        assert!((cost - 3.00).abs() < 1e-9);
    }

    #[test]
    fn cost_is_monotone_in_each_class() {
        let base = calculate_cost(
            "claude-3-5-haiku-20241022",
            TokenCounts { input: 100, output: 0, cache_creation: 0, cache_read: 0 },
        );
        let more = calculate_cost(
            "claude-3-5-haiku-20241022",
            TokenCounts { input: 200, output: 0, cache_creation: 0, cache_read: 0 },
        );
        assert!(more >= base);
    }

    #[test]
    fn matching_is_case_insensitive_and_priority_ordered() {
        let sonnet_4_5 = match_model_pricing("CLAUDE-SONNET-4-5-2025");
        assert!(matches!(sonnet_4_5.input, Price::Tiered(_)));
        let opus_4 = match_model_pricing("claude-opus-4-20250514");
        assert!(matches!(opus_4.input, Price::Flat(p) if p == 15.00));
    }
}
