//! Weather compensation for the heating branch.
//!
//! Below freezing the heating target is raised in proportion to how cold it is
//! outside. Above freezing, and whenever the outside sensor has fallen back to
//! its default, the target is left untouched.

use crate::config::ClimateConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compensation {
    pub adjusted_target_c: f32,
    /// What was actually applied, after clamping. Negative only when the raw
    /// target already sits above `max_comp_temp_c`.
    pub offset_c: f32,
}

impl Compensation {
    pub fn none(target_c: f32) -> Self {
        Self {
            adjusted_target_c: target_c,
            offset_c: 0.0,
        }
    }
}

/// Raw offset before clamping: `|outside| × factor`, capped, never negative.
pub fn compensation_offset(outside_temp_c: f32, config: &ClimateConfig) -> f32 {
    if !(outside_temp_c < 0.0) {
        return 0.0;
    }
    (outside_temp_c.abs() * config.weather_comp_factor)
        .min(config.max_compensation_c)
        .max(0.0)
}

pub fn compensate(raw_target_c: f32, outside_temp_c: f32, config: &ClimateConfig) -> Compensation {
    if !(outside_temp_c < 0.0) {
        return Compensation::none(raw_target_c);
    }

    let adjusted_target_c = (raw_target_c + compensation_offset(outside_temp_c, config))
        .clamp(config.min_comp_temp_c, config.max_comp_temp_c);
    Compensation {
        adjusted_target_c,
        offset_c: adjusted_target_c - raw_target_c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_below_with_half_factor_adds_two_degrees() {
        let result = compensate(20.0, -4.0, &ClimateConfig::default());

        assert_eq!(result.offset_c, 2.0);
        assert_eq!(result.adjusted_target_c, 22.0);
    }

    #[test]
    fn no_adjustment_at_or_above_freezing() {
        let config = ClimateConfig::default();

        for outside in [0.0, 0.1, 5.0, 30.0] {
            assert_eq!(compensate(20.0, outside, &config), Compensation::none(20.0));
        }
    }

    #[test]
    fn fallback_outside_value_never_compensates() {
        let config = ClimateConfig::default();

        assert_eq!(compensation_offset(config.outside_fallback_c, &config), 0.0);
    }

    #[test]
    fn colder_never_means_less_compensation() {
        let config = ClimateConfig::default();
        let mut previous = compensation_offset(-0.5, &config);

        for step in 1..200 {
            let outside = -0.5 - step as f32 * 0.25;
            let offset = compensation_offset(outside, &config);
            assert!(offset >= previous, "{outside}: {offset} < {previous}");
            previous = offset;
        }
    }

    #[test]
    fn adjusted_target_stays_within_compensation_bounds() {
        let config = ClimateConfig {
            weather_comp_factor: 1.0,
            max_compensation_c: 10.0,
            min_comp_temp_c: 16.0,
            max_comp_temp_c: 22.0,
            ..ClimateConfig::default()
        };

        for raw in [16.0, 20.0, 25.0] {
            for outside in [-0.1, -3.0, -15.0, -45.0] {
                let adjusted = compensate(raw, outside, &config).adjusted_target_c;
                assert!((16.0..=22.0).contains(&adjusted), "{raw}/{outside}: {adjusted}");
            }
        }
    }

    #[test]
    fn offset_is_capped() {
        let config = ClimateConfig::default();

        assert_eq!(compensation_offset(-30.0, &config), 5.0);
    }

    #[test]
    fn upper_clamp_can_pull_a_high_preset_down() {
        let config = ClimateConfig {
            boost_temp_c: 25.0,
            max_comp_temp_c: 20.0,
            ..ClimateConfig::default()
        };

        let result = compensate(25.0, -2.0, &config);

        assert_eq!(result.adjusted_target_c, 20.0);
        assert_eq!(result.offset_c, -5.0);
    }

    #[test]
    fn lower_clamp_reports_full_applied_raise() {
        let config = ClimateConfig {
            min_comp_temp_c: 20.0,
            ..ClimateConfig::default()
        };

        let result = compensate(16.0, -2.0, &config);

        assert_eq!(result.adjusted_target_c, 20.0);
        assert_eq!(result.offset_c, 4.0);
    }
}
