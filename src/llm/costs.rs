//! Per-model token pricing.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// (input, output) USD cost per token for a model.
///
/// Unknown models price at zero so cost reporting degrades quietly rather
/// than blocking a call.
pub(crate) fn per_token(model: &str) -> (Decimal, Decimal) {
    // Prices per million tokens, divided down.
    let per_million: (Decimal, Decimal) = if model.contains("opus") {
        (dec!(15.00), dec!(75.00))
    } else if model.contains("sonnet") {
        (dec!(3.00), dec!(15.00))
    } else if model.contains("haiku") {
        (dec!(0.80), dec!(4.00))
    } else if model.contains("gpt-4o-mini") {
        (dec!(0.15), dec!(0.60))
    } else if model.contains("gpt-4o") {
        (dec!(2.50), dec!(10.00))
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    };

    let million = dec!(1000000);
    (per_million.0 / million, per_million.1 / million)
}

/// USD cost of a call given token counts.
pub fn call_cost(model: &str, input_tokens: u32, output_tokens: u32) -> Decimal {
    let (input_rate, output_rate) = per_token(model);
    input_rate * Decimal::from(input_tokens) + output_rate * Decimal::from(output_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_has_nonzero_rates() {
        let (input, output) = per_token("claude-sonnet-4-20250514");
        assert!(input > Decimal::ZERO);
        assert!(output > input);
    }

    #[test]
    fn unknown_model_prices_at_zero() {
        let (input, output) = per_token("mock-model");
        assert_eq!(input, Decimal::ZERO);
        assert_eq!(output, Decimal::ZERO);
    }

    #[test]
    fn call_cost_scales_with_tokens() {
        let small = call_cost("claude-3-5-haiku-latest", 100, 50);
        let large = call_cost("claude-3-5-haiku-latest", 1000, 500);
        assert!(large > small);
    }
}
