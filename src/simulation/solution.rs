use rand::rngs::StdRng;
use rand::Rng;
use std::collections::BTreeMap;

use crate::railway::trains::Train;

/// Sparse timestep-to-target-speed mapping. The active target at time `t` is
/// the last one at or before `t`.
#[derive(Debug, Clone, Default)]
pub struct SpeedTargets {
    pub targets: BTreeMap<usize, f64>,
}

impl SpeedTargets {
    pub fn new(targets: BTreeMap<usize, f64>) -> Self {
        SpeedTargets { targets }
    }

    pub fn target_at(&self, timestep: usize) -> Option<f64> {
        self.targets.range(..=timestep).next_back().map(|(_, &v)| v)
    }

    /// Next timestep strictly after `timestep` at which the target changes.
    pub fn next_change_after(&self, timestep: usize) -> Option<usize> {
        self.targets.range(timestep + 1..).next().map(|(&t, _)| t)
    }
}

/// Compact encoding of one train's routing decisions: a switch direction per
/// traversed edge (scaled lottery over the successor list) and sparse speed
/// targets over the schedule horizon.
#[derive(Debug, Clone)]
pub struct RoutingSolution {
    pub switch_directions: Vec<f64>,
    pub v_targets: SpeedTargets,
}

impl RoutingSolution {
    pub fn new(switch_directions: Vec<f64>, v_targets: SpeedTargets) -> Self {
        RoutingSolution { switch_directions, v_targets }
    }

    /// Uniformly random solution. Reproducible for a fixed rng seed.
    pub fn random(
        n_v_target_vars: usize,
        n_switch_vars: usize,
        n_timesteps: usize,
        train: &Train,
        rng: &mut StdRng,
    ) -> Self {
        let mut switch_directions = Vec::with_capacity(n_switch_vars);
        for _ in 0..n_switch_vars {
            switch_directions.push(rng.gen_range(0.0..1.0));
        }
        let mut targets = BTreeMap::new();
        while targets.len() < n_v_target_vars.min(n_timesteps) {
            let timestep = rng.gen_range(0..n_timesteps);
            let speed = rng.gen_range(-train.max_speed..train.max_speed);
            targets.insert(timestep, speed);
        }
        RoutingSolution { switch_directions, v_targets: SpeedTargets::new(targets) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn test_train() -> Train {
        Train {
            name: "tr1".to_string(),
            length: 100.0,
            max_speed: 30.0,
            acceleration: 2.0,
            deceleration: 1.0,
            tim: true,
        }
    }

    #[test]
    fn test_speed_targets_lookup() {
        use maplit::btreemap;
        let targets = SpeedTargets::new(btreemap! { 10 => 5.0, 20 => -3.0 });

        assert_eq!(targets.target_at(0), None);
        assert_eq!(targets.target_at(10), Some(5.0));
        assert_eq!(targets.target_at(15), Some(5.0));
        assert_eq!(targets.target_at(20), Some(-3.0));
        assert_eq!(targets.target_at(100), Some(-3.0));
        assert_eq!(targets.next_change_after(10), Some(20));
        assert_eq!(targets.next_change_after(20), None);
    }

    #[test]
    fn test_random_solution_is_reproducible() {
        let train = test_train();
        let a = RoutingSolution::random(5, 8, 100, &train, &mut StdRng::seed_from_u64(42));
        let b = RoutingSolution::random(5, 8, 100, &train, &mut StdRng::seed_from_u64(42));
        assert_eq!(a.switch_directions, b.switch_directions);
        assert_eq!(a.v_targets.targets, b.v_targets.targets);

        assert_eq!(a.switch_directions.len(), 8);
        assert!(a.switch_directions.iter().all(|d| (0.0..1.0).contains(d)));
        assert_eq!(a.v_targets.targets.len(), 5);
        assert!(a
            .v_targets
            .targets
            .values()
            .all(|v| v.abs() <= train.max_speed));
    }
}
