//! Receding horizon optimisation of the actuation sequence.

use log::debug;

use prelude::*;
use reference_path::ReferencePolynomial;
use vehicle_model::{Actuation, KinematicBicycle, VehicleState};

use crate::config::CostWeights;
use crate::qp::{DeltaQp, Stage};
use crate::ControlError;

/// Linearise and solve passes per control cycle.
const SOLVE_PASSES: usize = 3;

pub struct TrajectoryOptimizer {
    model: KinematicBicycle,
    N: usize,
    dt: float,
    qp: DeltaQp,
}

/// Outcome of one optimisation: the actuation to apply now and the states
/// the optimiser expects to reach over the rest of the horizon.
pub struct OptimizationResult {
    pub command: Actuation,
    pub predicted: Vec<VehicleState>,
}

impl TrajectoryOptimizer {
    pub fn new(
        model: KinematicBicycle,
        N: usize,
        dt: float,
        weights: CostWeights,
        v_target: float,
    ) -> TrajectoryOptimizer {
        let (u_min, u_max) = model.input_bounds();
        TrajectoryOptimizer {
            model,
            N,
            dt,
            qp: DeltaQp::new(N, weights, v_target, u_min, u_max),
        }
    }

    /// Optimises the actuation sequence from `initial`, starting every cycle
    /// from a zero actuation seed. Each pass rolls the nonlinear model out
    /// under the current nominal sequence, linearises along the rollout and
    /// solves the resulting QP for an improved sequence.
    pub fn solve(
        &self,
        initial: &VehicleState,
        path: &ReferencePolynomial,
    ) -> Result<OptimizationResult, ControlError> {
        let mut u_nominal = vec![Actuation::default(); self.N - 1];

        for pass in 0..SOLVE_PASSES {
            let x_nominal = self.rollout(initial, &u_nominal, path);
            let stages = x_nominal
                .iter()
                .zip(&u_nominal)
                .map(|(x, u)| {
                    let (A, B) = self.model.linearise(self.dt, x, u, path);
                    Stage { A, B }
                })
                .collect::<Vec<_>>();

            u_nominal = self.qp.solve(&x_nominal, &u_nominal, &stages)?;
            debug!(
                "pass {}: steering {:.4} throttle {:.4}",
                pass, u_nominal[0].steering, u_nominal[0].throttle
            );
        }

        let mut predicted = self.rollout(initial, &u_nominal, path);
        predicted.remove(0);

        Ok(OptimizationResult {
            command: u_nominal[0],
            predicted,
        })
    }

    /// Integrates the model over the horizon under the given actuation
    /// sequence. Returns N states, the first being `initial` itself.
    fn rollout(
        &self,
        initial: &VehicleState,
        u_nominal: &[Actuation],
        path: &ReferencePolynomial,
    ) -> Vec<VehicleState> {
        let mut x = *initial;
        let mut states = Vec::with_capacity(self.N);
        states.push(x);
        for u in u_nominal {
            x = self.model.step(self.dt, &x, u, path);
            states.push(x);
        }
        states
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use vehicle_model::VehicleParams;

    fn optimizer(v_target: float) -> TrajectoryOptimizer {
        let weights = CostWeights {
            cte: 6000.0,
            heading_error: 6000.0,
            speed: 1.0,
            steering: 10.0,
            throttle: 10.0,
            steering_gap: 200.0,
            throttle_gap: 10.0,
        };
        let model = KinematicBicycle::new(VehicleParams::default());
        TrajectoryOptimizer::new(model, 10, 0.1, weights, v_target)
    }

    #[test]
    fn straight_path_at_target_speed_needs_no_actuation() {
        let path = ReferencePolynomial::from_coefficients(vec![0.0, 0.0, 0.0, 0.0]);
        let initial = VehicleState {
            speed: 20.0,
            ..VehicleState::default()
        };

        let result = optimizer(20.0).solve(&initial, &path).unwrap();

        assert!(
            result.command.steering.abs() < 1e-6,
            "steering {}",
            result.command.steering
        );
        assert!(
            result.command.throttle.abs() < 1e-6,
            "throttle {}",
            result.command.throttle
        );
        assert_eq!(result.predicted.len(), 9);
        for state in &result.predicted {
            assert!(state.y.abs() < 1e-9);
            assert!(state.cte.abs() < 1e-9);
        }
    }

    #[test]
    fn left_curve_steers_left() {
        // The reference bends upwards ahead of the vehicle. Turning left
        // means a growing heading, which the model reaches through negative
        // steering.
        let path = ReferencePolynomial::from_coefficients(vec![0.0, 0.0, 0.05]);
        let initial = VehicleState {
            speed: 10.0,
            ..VehicleState::default()
        };

        let result = optimizer(10.0).solve(&initial, &path).unwrap();

        assert!(
            result.command.steering < -0.01,
            "steering {}",
            result.command.steering
        );
        let last = result.predicted.last().unwrap();
        assert!(last.y > 0.0, "predicted y {}", last.y);
    }

    #[test]
    fn speed_deficit_opens_the_throttle() {
        let path = ReferencePolynomial::from_coefficients(vec![0.0, 0.0, 0.0, 0.0]);
        let initial = VehicleState {
            speed: 5.0,
            ..VehicleState::default()
        };

        let result = optimizer(40.0).solve(&initial, &path).unwrap();

        assert!(
            result.command.throttle > 0.1,
            "throttle {}",
            result.command.throttle
        );
    }
}
