//! Embedded pricing defaults
//!
//! Built-in per-million rates used when no external table is supplied,
//! and as the fallback layer underneath a merged external table. Keys
//! are normalized model names or prefixes; the reserved `"default"` key
//! is the last resort before the zero-rate fallback.
//!
//! Cache rates follow the usual provider structure: reads at 10% of the
//! input rate, writes at a 25% premium over it.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use super::ModelPricing;

/// Embedded pricing table (rates as of mid-2025)
pub static EMBEDDED_PRICING: Lazy<HashMap<String, ModelPricing>> = Lazy::new(|| {
    let mut m = HashMap::new();

    m.insert(
        "claude-opus-4".to_string(),
        ModelPricing {
            input_per_million: 15.0,
            output_per_million: 75.0,
            cache_write_per_million: 18.75,
            cache_read_per_million: 1.50,
        },
    );
    m.insert(
        "claude-sonnet-4".to_string(),
        ModelPricing {
            input_per_million: 3.0,
            output_per_million: 15.0,
            cache_write_per_million: 3.75,
            cache_read_per_million: 0.30,
        },
    );
    m.insert(
        "claude-haiku-4".to_string(),
        ModelPricing {
            input_per_million: 1.0,
            output_per_million: 5.0,
            cache_write_per_million: 1.25,
            cache_read_per_million: 0.10,
        },
    );
    m.insert(
        "claude-3-5-sonnet".to_string(),
        ModelPricing {
            input_per_million: 3.0,
            output_per_million: 15.0,
            cache_write_per_million: 3.75,
            cache_read_per_million: 0.30,
        },
    );
    m.insert(
        "gpt-4o".to_string(),
        ModelPricing {
            input_per_million: 2.5,
            output_per_million: 10.0,
            cache_write_per_million: 3.125,
            cache_read_per_million: 0.25,
        },
    );
    m.insert(
        "gpt-4o-mini".to_string(),
        ModelPricing {
            input_per_million: 0.15,
            output_per_million: 0.60,
            cache_write_per_million: 0.1875,
            cache_read_per_million: 0.015,
        },
    );
    m.insert(
        "o1".to_string(),
        ModelPricing {
            input_per_million: 15.0,
            output_per_million: 60.0,
            cache_write_per_million: 18.75,
            cache_read_per_million: 1.50,
        },
    );
    m.insert(
        "deepseek-chat".to_string(),
        ModelPricing {
            input_per_million: 0.27,
            output_per_million: 1.10,
            cache_write_per_million: 0.3375,
            cache_read_per_million: 0.027,
        },
    );

    // Reserved last-resort entry: sonnet-class rates as a reasonable
    // middle of the road for unknown models
    m.insert(
        "default".to_string(),
        ModelPricing {
            input_per_million: 3.0,
            output_per_million: 15.0,
            cache_write_per_million: 3.75,
            cache_read_per_million: 0.30,
        },
    );

    m
});
