//! Per-token prices for known models (USD).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// (model prefix, input per token, output per token). Longest prefixes first.
const MODEL_COSTS: &[(&str, Decimal, Decimal)] = &[
    ("gpt-4o-mini", dec!(0.00000015), dec!(0.0000006)),
    ("gpt-4o", dec!(0.0000025), dec!(0.00001)),
    ("gpt-4.1-mini", dec!(0.0000004), dec!(0.0000016)),
    ("gpt-4.1", dec!(0.000002), dec!(0.000008)),
    ("claude-3-5-haiku", dec!(0.0000008), dec!(0.000004)),
    ("claude-sonnet-4", dec!(0.000003), dec!(0.000015)),
    ("claude-opus-4", dec!(0.000015), dec!(0.000075)),
];

/// Price per token for `model`, zero when unknown.
pub fn model_cost(model: &str) -> (Decimal, Decimal) {
    MODEL_COSTS
        .iter()
        .find(|(prefix, _, _)| model.starts_with(prefix))
        .map(|(_, input, output)| (*input, *output))
        .unwrap_or((Decimal::ZERO, Decimal::ZERO))
}

/// Cost of one call given per-token prices and token counts.
pub fn estimate(cost_per_token: (Decimal, Decimal), input_tokens: u32, output_tokens: u32) -> Decimal {
    let (input, output) = cost_per_token;
    input * Decimal::from(input_tokens) + output * Decimal::from(output_tokens)
}
