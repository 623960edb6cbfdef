//! Survivability curves for agents and groups.
//!
//! Both curves are monotone non-increasing in load and bounded below by a
//! configured floor, so a heavily loaded agent is risky but never hopeless.

use crate::config::SurvivabilityConfig;

/// Saturating transform `tanh(ln(x + 1))`, mapping `[0, inf)` onto `[0, 1)`.
///
/// Equivalently `((x+1)^2 - 1) / ((x+1)^2 + 1)`. Negative inputs are treated as 0.
pub fn saturate(x: f64) -> f64 {
    let x = x.max(0.0);
    if x.is_infinite() {
        return 1.0;
    }
    (x + 1.0).ln().tanh()
}

/// Survivability model parameterized by the configured curve constants.
#[derive(Debug, Clone, Copy)]
pub struct SurvivabilityModel {
    config: SurvivabilityConfig,
}

impl SurvivabilityModel {
    pub fn new(config: SurvivabilityConfig) -> Self {
        Self { config }
    }

    /// Group survivability: `max(1 - sig(load / (size * scale)), floor)`.
    pub fn group(&self, group_load: f64, member_count: usize) -> f64 {
        if member_count == 0 {
            return 1.0;
        }
        let per_member = group_load / (member_count as f64 * self.config.group_load_scale);
        (1.0 - saturate(per_member)).max(self.config.group_floor)
    }

    /// Individual survivability: `max(GS * (1 - sig(load / scale)), floor)`.
    pub fn individual(&self, agent_load: f64, group_load: f64, member_count: usize) -> f64 {
        let gs = self.group(group_load, member_count);
        (gs * (1.0 - saturate(agent_load / self.config.load_scale)))
            .max(self.config.individual_floor)
    }

    /// Probability of an overload fault: the complement of individual survivability.
    pub fn overload_fault(&self, agent_load: f64, group_load: f64, member_count: usize) -> f64 {
        1.0 - self.individual(agent_load, group_load, member_count)
    }
}

impl Default for SurvivabilityModel {
    fn default() -> Self {
        Self::new(SurvivabilityConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturate_matches_rational_form() {
        for x in [0.0, 0.1, 1.0, 3.5, 40.0] {
            let y: f64 = x + 1.0;
            let rational = (y * y - 1.0) / (y * y + 1.0);
            assert!((saturate(x) - rational).abs() < 1e-12);
        }
        assert_eq!(saturate(0.0), 0.0);
        assert_eq!(saturate(f64::INFINITY), 1.0);
        assert_eq!(saturate(-4.0), 0.0);
    }

    #[test]
    fn test_idle_agent_is_fully_survivable() {
        let model = SurvivabilityModel::default();
        assert_eq!(model.individual(0.0, 0.0, 4), 1.0);
        assert_eq!(model.overload_fault(0.0, 0.0, 4), 0.0);
    }

    #[test]
    fn test_curves_respect_floors() {
        let model = SurvivabilityModel::default();
        assert_eq!(model.group(1.0e9, 2), 0.6);
        assert_eq!(model.individual(1.0e9, 1.0e9, 2), 0.3);
    }

    #[test]
    fn test_survivability_decreases_with_load() {
        let model = SurvivabilityModel::default();
        let light = model.individual(5.0, 20.0, 4);
        let heavy = model.individual(30.0, 20.0, 4);
        assert!(light > heavy);
    }

    #[test]
    fn test_empty_group_is_neutral() {
        assert_eq!(SurvivabilityModel::default().group(10.0, 0), 1.0);
    }
}
