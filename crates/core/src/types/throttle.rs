//! Throttle budget readings from the Admin API cost extension.

use serde::{Deserialize, Serialize};

/// Point-in-time snapshot of the shop's query-cost bucket.
///
/// Ephemeral: used to pick the next delay, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottleReading {
    pub currently_available: f64,
    pub maximum_available: f64,
    /// Points restored per second.
    pub restore_rate: f64,
    /// Cost actually charged for the call, when reported.
    #[serde(default)]
    pub actual_cost: Option<f64>,
}

impl ThrottleReading {
    /// Whether the available budget is below `low_water_mark`.
    #[must_use]
    pub fn is_below(&self, low_water_mark: f64) -> bool {
        self.currently_available < low_water_mark
    }

    /// Whether less than two seconds of restore remain in the bucket.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.currently_available < self.restore_rate * 2.0
    }

    /// Available budget as a whole percentage of the maximum.
    #[must_use]
    pub fn percent_available(&self) -> f64 {
        if self.maximum_available <= 0.0 {
            return 0.0;
        }
        (self.currently_available / self.maximum_available * 100.0).round()
    }
}

impl std::fmt::Display for ThrottleReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} ({}%) | restore {}/s",
            self.currently_available,
            self.maximum_available,
            self.percent_available(),
            self.restore_rate
        )?;
        match self.actual_cost {
            Some(cost) => write!(f, " | cost {cost}"),
            None => write!(f, " | cost ?"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(available: f64) -> ThrottleReading {
        ThrottleReading {
            currently_available: available,
            maximum_available: 2000.0,
            restore_rate: 100.0,
            actual_cost: Some(10.0),
        }
    }

    #[test]
    fn test_is_below_low_water_mark() {
        assert!(reading(99.0).is_below(100.0));
        assert!(!reading(100.0).is_below(100.0));
    }

    #[test]
    fn test_is_draining() {
        assert!(reading(150.0).is_draining());
        assert!(!reading(200.0).is_draining());
    }

    #[test]
    fn test_percent_available() {
        assert!((reading(500.0).percent_available() - 25.0).abs() < f64::EPSILON);
        let empty = ThrottleReading {
            maximum_available: 0.0,
            ..reading(0.0)
        };
        assert!(empty.percent_available().abs() < f64::EPSILON);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            reading(1000.0).to_string(),
            "1000/2000 (50%) | restore 100/s | cost 10"
        );
    }
}
