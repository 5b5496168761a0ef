//! Cost estimation from configured per-unit rates

use crate::config::ProviderSettings;

/// Round a dollar amount to 6 decimal places.
pub fn round_usd(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Cost of a text call. Missing token counts count as zero.
pub fn text_cost(settings: &ProviderSettings, input: Option<i64>, output: Option<i64>) -> f64 {
    let input = input.unwrap_or(0).max(0) as f64;
    let output = output.unwrap_or(0).max(0) as f64;
    round_usd(
        input / 1000.0 * settings.input_cost_per_1k + output / 1000.0 * settings.output_cost_per_1k,
    )
}

/// Flat cost of one generated image.
pub fn image_cost(settings: &ProviderSettings) -> f64 {
    round_usd(settings.cost_per_image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ProviderKind;

    fn priced(input: f64, output: f64, image: f64) -> ProviderSettings {
        ProviderSettings {
            input_cost_per_1k: input,
            output_cost_per_1k: output,
            cost_per_image: image,
            ..ProviderSettings::defaults(ProviderKind::OpenAi)
        }
    }

    #[test]
    fn text_cost_uses_both_rates() {
        let settings = priced(0.5, 1.5, 0.0);
        assert_eq!(text_cost(&settings, Some(2000), Some(1000)), 2.5);
    }

    #[test]
    fn missing_tokens_count_as_zero() {
        let settings = priced(0.5, 1.5, 0.0);
        assert_eq!(text_cost(&settings, None, Some(1000)), 1.5);
        assert_eq!(text_cost(&settings, None, None), 0.0);
    }

    #[test]
    fn costs_are_rounded_to_six_places() {
        let settings = priced(0.0001234567, 0.0, 0.0400000049);
        assert_eq!(text_cost(&settings, Some(1), None), 0.0);
        assert_eq!(text_cost(&settings, Some(10_000), None), 0.001235);
        assert_eq!(image_cost(&settings), 0.04);
    }
}
