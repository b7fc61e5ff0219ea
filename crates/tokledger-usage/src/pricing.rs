//! Cost estimation from token counts.

use serde::{Deserialize, Serialize};

use crate::models::TokenCounts;

/// Prices in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
    pub cache_write_per_million: f64,
    pub cache_read_per_million: f64,
}

impl Default for Pricing {
    /// Sonnet-class list prices.
    fn default() -> Self {
        Self::new(3.0, 15.0).with_cache(3.75, 0.30)
    }
}

impl Pricing {
    /// Input and output prices; cache-write at the input price, cache-read at 10%.
    pub fn new(input: f64, output: f64) -> Self {
        Self {
            input_per_million: input,
            output_per_million: output,
            cache_write_per_million: input,
            cache_read_per_million: input * 0.1,
        }
    }

    pub fn with_cache(mut self, write: f64, read: f64) -> Self {
        self.cache_write_per_million = write;
        self.cache_read_per_million = read;
        self
    }

    /// Cost of `counts`, per category and in total.
    pub fn estimate(&self, counts: &TokenCounts) -> CostBreakdown {
        let cost = |tokens: u64, per_million: f64| tokens as f64 * per_million / 1_000_000.0;

        let input = cost(counts.input_tokens, self.input_per_million);
        let output = cost(counts.output_tokens, self.output_per_million);
        let cache_write = cost(counts.cache_creation_tokens, self.cache_write_per_million);
        let cache_read = cost(counts.cache_read_tokens, self.cache_read_per_million);

        CostBreakdown {
            input,
            output,
            cache_write,
            cache_read,
            total: input + output + cache_write + cache_read,
        }
    }
}

/// Estimated cost in USD by category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input: f64,
    pub output: f64,
    pub cache_write: f64,
    pub cache_read: f64,
    pub total: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prices() {
        let pricing = Pricing::default();
        assert_eq!(pricing.input_per_million, 3.0);
        assert_eq!(pricing.output_per_million, 15.0);
        assert_eq!(pricing.cache_write_per_million, 3.75);
        assert_eq!(pricing.cache_read_per_million, 0.30);
    }

    #[test]
    fn test_estimate_one_million_each() {
        let counts = TokenCounts::new(1_000_000, 1_000_000, 1_000_000, 1_000_000);
        let cost = Pricing::default().estimate(&counts);

        assert!((cost.input - 3.0).abs() < 1e-9);
        assert!((cost.output - 15.0).abs() < 1e-9);
        assert!((cost.cache_write - 3.75).abs() < 1e-9);
        assert!((cost.cache_read - 0.30).abs() < 1e-9);
        assert!((cost.total - 22.05).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_zero() {
        let cost = Pricing::default().estimate(&TokenCounts::default());
        assert_eq!(cost, CostBreakdown::default());
    }

    #[test]
    fn test_new_derives_cache_prices() {
        let pricing = Pricing::new(10.0, 30.0);
        assert_eq!(pricing.cache_write_per_million, 10.0);
        assert!((pricing.cache_read_per_million - 1.0).abs() < 1e-9);
    }
}
