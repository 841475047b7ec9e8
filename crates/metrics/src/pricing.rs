//! Approximate per-model pricing used to derive `RequestRecord.cost`.
//!
//! `spec.md` §9 Open Questions: the cached-input-token field is not
//! uniformly reported by all providers, so the recorder treats a missing
//! value as zero rather than guessing. Pricing itself is not part of the
//! spec's data model; this table exists only so `cost` is populated with
//! something plausible rather than always zero.

/// USD per million tokens, `(input, cached_input, output)`.
struct Rate {
    input: f64,
    cached_input: f64,
    output: f64,
}

const RATES: &[(&str, Rate)] = &[
    ("openai/gpt-4o", Rate { input: 2.50, cached_input: 1.25, output: 10.00 }),
    ("openai/gpt-4o-mini", Rate { input: 0.15, cached_input: 0.075, output: 0.60 }),
    ("anthropic/claude-3-5-sonnet", Rate { input: 3.00, cached_input: 0.30, output: 15.00 }),
    ("anthropic/claude-3-5-haiku", Rate { input: 0.80, cached_input: 0.08, output: 4.00 }),
];

/// Falls back to a conservative default rate for unrecognized models so
/// `cost` stays a meaningful (if approximate) signal rather than silently
/// zero for every model not in the static table.
const DEFAULT_RATE: Rate = Rate { input: 1.00, cached_input: 0.50, output: 3.00 };

pub fn estimate_cost(provider: &str, model: &str, input_tokens: u64, cached_input_tokens: u64, output_tokens: u64) -> f64 {
    let key = format!("{provider}/{model}");
    let rate = RATES.iter().find(|(name, _)| *name == key).map(|(_, rate)| rate).unwrap_or(&DEFAULT_RATE);

    let billable_input = input_tokens.saturating_sub(cached_input_tokens);

    (billable_input as f64 * rate.input + cached_input_tokens as f64 * rate.cached_input + output_tokens as f64 * rate.output) / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_uses_its_own_rate() {
        let cost = estimate_cost("openai", "gpt-4o-mini", 1_000_000, 0, 1_000_000);
        assert!((cost - (0.15 + 0.60)).abs() < 1e-9);
    }

    #[test]
    fn cached_tokens_are_billed_at_the_cached_rate() {
        let cost = estimate_cost("openai", "gpt-4o", 1_000_000, 1_000_000, 0);
        assert!((cost - 1.25).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_falls_back_to_default_rate() {
        let cost = estimate_cost("mystery", "model-x", 1_000_000, 0, 0);
        assert!((cost - 1.00).abs() < 1e-9);
    }
}
