use serde::{Deserialize, Serialize};

use super::pool::RotationStrategy;

/// Health snapshot for one pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolReport {
    /// Pool key rendered as `type-GEOGRAPHY`
    pub pool: String,
    pub strategy: RotationStrategy,
    /// Number of proxies in the pool
    pub total: usize,
    /// Proxies currently in a selectable status
    pub selectable: usize,
    /// Mean success rate across the pool (0-1)
    pub avg_success_rate: f64,
}

/// Aggregate health snapshot over every pool
///
/// Computed on demand from the in-memory catalog; never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthReport {
    pub total: usize,
    pub active: usize,
    pub degraded: usize,
    pub blocked: usize,
    pub cooldown: usize,
    pub pools: Vec<PoolReport>,
}

impl HealthReport {
    /// Fraction of proxies currently usable by callers
    pub fn selectable_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.active + self.degraded) as f64 / self.total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selectable_ratio() {
        let report = HealthReport {
            total: 10,
            active: 6,
            degraded: 2,
            blocked: 1,
            cooldown: 1,
            pools: vec![],
        };
        assert!((report.selectable_ratio() - 0.8).abs() < 1e-9);

        let empty = HealthReport::default();
        assert_eq!(empty.selectable_ratio(), 0.0);
    }
}
