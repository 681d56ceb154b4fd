//! Sparse QP assembly for one linearisation pass.
//!
//! Decision variables are deviations from the nominal trajectory: N state
//! deltas followed by N-1 actuation deltas. The dynamics enter as equality
//! constraints between consecutive deltas and the actuation box is shifted
//! by the nominal, so the zero vector is always feasible.

use log::{log_enabled, warn, Level::Debug};
use osqp::{CscMatrix, Problem, Settings, Status};

use prelude::*;
use vehicle_model::{Actuation, VehicleState};

use crate::config::CostWeights;
use crate::sparse;
use crate::ControlError;

// State and input dimensions of the kinematic bicycle.
const NS: usize = 6;
const NI: usize = 2;

/// Linearised dynamics over one horizon interval.
pub struct Stage {
    pub A: Matrix<6, 6>,
    pub B: Matrix<6, 2>,
}

/// Quadratic tracking problem around a nominal trajectory. Holds only the
/// fixed description; every `solve` builds and discards a fresh OSQP
/// problem.
pub struct DeltaQp {
    N: usize,
    weights: CostWeights,
    v_target: float,
    u_min: Vector<2>,
    u_max: Vector<2>,
}

impl DeltaQp {
    pub fn new(
        N: usize,
        weights: CostWeights,
        v_target: float,
        u_min: Vector<2>,
        u_max: Vector<2>,
    ) -> DeltaQp {
        assert!(N >= 2);
        DeltaQp {
            N,
            weights,
            v_target,
            u_min,
            u_max,
        }
    }

    /// Solves for the actuation sequence closest to the cost minimum around
    /// the given nominal trajectory. `x_nominal` must hold N states obtained
    /// by rolling the model forward under `u_nominal`, so that the
    /// linearised dynamics have no defect at the nominal.
    pub fn solve(
        &self,
        x_nominal: &[VehicleState],
        u_nominal: &[Actuation],
        stages: &[Stage],
    ) -> Result<Vec<Actuation>, ControlError> {
        let N = self.N;
        assert_eq!(x_nominal.len(), N);
        assert_eq!(u_nominal.len(), N - 1);
        assert_eq!(stages.len(), N - 1);

        let q = self.linear_cost(x_nominal, u_nominal);
        let (a, l, u) = self.constraints(u_nominal, stages);

        let settings = Settings::default()
            .verbose(log_enabled!(Debug))
            .polish(false)
            .adaptive_rho_interval(Some(25))
            .eps_abs(1e-3)
            .eps_rel(1e-3)
            .max_iter(250);

        let mut problem = Problem::new(self.penalty(), &q, a, &l, &u, &settings)
            .map_err(|e| ControlError::SolverDivergence(format!("solver setup failed: {:?}", e)))?;

        let solution = match problem.solve() {
            Status::Solved(solution) | Status::SolvedInaccurate(solution) => solution,
            Status::MaxIterationsReached(solution) => {
                warn!("iteration limit reached before convergence");
                solution
            }
            Status::PrimalInfeasible(_) | Status::PrimalInfeasibleInaccurate(_) => {
                return Err(ControlError::SolverDivergence(
                    "primal problem infeasible".to_owned(),
                ));
            }
            Status::DualInfeasible(_) | Status::DualInfeasibleInaccurate(_) => {
                return Err(ControlError::SolverDivergence(
                    "dual problem infeasible".to_owned(),
                ));
            }
            _ => {
                return Err(ControlError::SolverDivergence(
                    "solver returned no usable iterate".to_owned(),
                ));
            }
        };

        // Add the actuation deltas to the nominal and clip any tolerance
        // overshoot back to the box.
        let deltas = &solution.x()[N * NS..];
        let commands = u_nominal
            .iter()
            .zip(deltas.chunks(NI))
            .map(|(u0, delta)| Actuation {
                steering: min(max(u0.steering + delta[0], self.u_min[0]), self.u_max[0]),
                throttle: min(max(u0.throttle + delta[1], self.u_min[1]), self.u_max[1]),
            })
            .collect();
        Ok(commands)
    }

    /// Quadratic penalty P, upper triangle. Constant for a given horizon and
    /// weight set.
    fn penalty(&self) -> CscMatrix<'static> {
        let N = self.N;
        let M = N - 1;
        let n = N * NS + M * NI;
        let w = &self.weights;

        let mut p = sparse::Builder::with_capacity(n, n, 3 * N + 3 * M * NI);
        for k in 0..N {
            p.set(k * NS + 3, k * NS + 3, w.speed);
            p.set(k * NS + 4, k * NS + 4, w.cte);
            p.set(k * NS + 5, k * NS + 5, w.heading_error);
        }
        // Gap terms couple consecutive actuations into a tridiagonal block.
        let base = N * NS;
        for k in 0..M {
            let neighbours = ((k > 0) as usize + (k + 1 < M) as usize) as float;
            let c = base + k * NI;
            p.set(c, c, w.steering + w.steering_gap * neighbours);
            p.set(c + 1, c + 1, w.throttle + w.throttle_gap * neighbours);
            if k + 1 < M {
                p.set(c, c + NI, -w.steering_gap);
                p.set(c + 1, c + 1 + NI, -w.throttle_gap);
            }
        }
        p.build_csc()
    }

    /// Linear cost term: the cost gradient at the nominal trajectory.
    fn linear_cost(&self, x_nominal: &[VehicleState], u_nominal: &[Actuation]) -> Vec<float> {
        let N = self.N;
        let M = N - 1;
        let w = &self.weights;

        let mut q = vec![0.0; N * NS + M * NI];
        for (k, x) in x_nominal.iter().enumerate() {
            q[k * NS + 3] = w.speed * (x.speed - self.v_target);
            q[k * NS + 4] = w.cte * x.cte;
            q[k * NS + 5] = w.heading_error * x.heading_error;
        }
        let base = N * NS;
        for (k, u0) in u_nominal.iter().enumerate() {
            let mut steering = w.steering * u0.steering;
            let mut throttle = w.throttle * u0.throttle;
            if k > 0 {
                steering += w.steering_gap * (u0.steering - u_nominal[k - 1].steering);
                throttle += w.throttle_gap * (u0.throttle - u_nominal[k - 1].throttle);
            }
            if k + 1 < M {
                steering += w.steering_gap * (u0.steering - u_nominal[k + 1].steering);
                throttle += w.throttle_gap * (u0.throttle - u_nominal[k + 1].throttle);
            }
            q[base + k * NI] = steering;
            q[base + k * NI + 1] = throttle;
        }
        q
    }

    /// Constraint matrix with bounds: the first state delta is pinned to
    /// zero, each following delta must obey the linearised dynamics and
    /// every actuation delta stays inside the shifted box.
    fn constraints(
        &self,
        u_nominal: &[Actuation],
        stages: &[Stage],
    ) -> (CscMatrix<'static>, Vec<float>, Vec<float>) {
        let N = self.N;
        let M = N - 1;
        let n = N * NS + M * NI;
        let m = N * NS + M * NI;

        let nnz = NS + M * (NS * NS + NS * NI + NS) + M * NI;
        let mut a = sparse::Builder::with_capacity(m, n, nnz);
        // The first state is the measured one and cannot move
        for i in 0..NS {
            a.set(i, i, 1.0);
        }
        // A_k dx_k + B_k du_k - dx_{k+1} = 0
        for (k, stage) in stages.iter().enumerate() {
            let row = NS + k * NS;
            for i in 0..NS {
                for j in 0..NS {
                    a.set(row + i, k * NS + j, stage.A[(i, j)]);
                }
                for j in 0..NI {
                    a.set(row + i, N * NS + k * NI + j, stage.B[(i, j)]);
                }
                a.set(row + i, (k + 1) * NS + i, -1.0);
            }
        }
        // Actuation box, shifted by the nominal
        for i in 0..M * NI {
            a.set(N * NS + i, N * NS + i, 1.0);
        }

        let mut l = vec![0.0; m];
        let mut u = vec![0.0; m];
        for (k, u0) in u_nominal.iter().enumerate() {
            let row = N * NS + k * NI;
            l[row] = self.u_min[0] - u0.steering;
            u[row] = self.u_max[0] - u0.steering;
            l[row + 1] = self.u_min[1] - u0.throttle;
            u[row + 1] = self.u_max[1] - u0.throttle;
        }
        (a.build_csc(), l, u)
    }
}
