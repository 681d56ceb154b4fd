//! Model predictive trajectory tracking for the simulated vehicle.
//!
//! Every telemetry frame is handled in isolation: the reported waypoints are
//! transformed into the vehicle frame and fitted with a polynomial, the
//! state is advanced over the actuation latency and a receding horizon
//! optimisation picks the actuation sequence. Only the first actuation is
//! returned; the next frame starts over.

#![allow(non_snake_case)]

use log::warn;
use thiserror::Error;

use prelude::*;
use reference_path::FitError;
use vehicle_model::{Actuation, KinematicBicycle, VehicleParams, VehicleState};

mod config;
pub use crate::config::{Config, CostWeights, ServerConfig, VehicleConfig};

mod mpc;
use crate::mpc::TrajectoryOptimizer;

mod prediction;
mod qp;
mod sparse;

/// Spacing of the sampled reference line sent back for display.
const REFERENCE_SPACING: float = 2.5;
const REFERENCE_POINTS: usize = 25;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("malformed telemetry: {0}")]
    MalformedTelemetry(String),
    #[error("reference fit failed: {0}")]
    ReferenceFit(#[from] FitError),
    #[error("solver diverged: {0}")]
    SolverDivergence(String),
}

/// One telemetry frame from the simulator. Positions and waypoints are in
/// map coordinates, the heading in radians anticlockwise from the map x
/// axis. `steering_angle` uses the wire convention: the physical angle
/// divided by the steering limit times Lf.
#[derive(Clone, Debug)]
pub struct TelemetryFrame {
    pub waypoints_x: Vec<float>,
    pub waypoints_y: Vec<float>,
    pub x: float,
    pub y: float,
    pub heading: float,
    pub speed: float,
    pub steering_angle: float,
    pub throttle: float,
}

/// Controller response for one frame. `steering_angle` is in wire units,
/// `throttle` in [-1, 1]. The two point lists trace the optimised
/// trajectory and the sampled reference in the vehicle frame.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleOutput {
    pub steering_angle: float,
    pub throttle: float,
    pub predicted: Vec<(float, float)>,
    pub reference: Vec<(float, float)>,
    /// Cross track error at the last measured state, for diagnostics.
    pub cte: float,
}

pub struct TrackingController {
    model: KinematicBicycle,
    optimizer: TrajectoryOptimizer,
    latency: float,
    /// Wire steering divisor, the steering limit times Lf.
    steering_scale: float,
    last: Actuation,
    last_cte: float,
}

impl TrackingController {
    pub fn from_config(config: &Config) -> TrackingController {
        let params = VehicleParams {
            Lf: config.vehicle.Lf,
            max_steering: deg2rad(config.vehicle.max_steering_deg),
        };
        let model = KinematicBicycle::new(params);
        let optimizer =
            TrajectoryOptimizer::new(model, config.N, config.dt, config.weights, config.v_target);

        TrackingController {
            model,
            optimizer,
            latency: config.vehicle.latency,
            steering_scale: params.max_steering * params.Lf,
            last: Actuation::default(),
            last_cte: 0.0,
        }
    }

    /// Runs one control cycle. Any failure falls back to holding the last
    /// commanded steering with zero throttle, so a bad frame slows the car
    /// down instead of dropping the connection. The fallback reports the
    /// last measured cross track error.
    pub fn control_cycle(&mut self, telemetry: &TelemetryFrame) -> CycleOutput {
        match self.try_control_cycle(telemetry) {
            Ok(output) => output,
            Err(e) => {
                warn!("control cycle failed, holding last steering: {}", e);
                CycleOutput {
                    steering_angle: self.last.steering / self.steering_scale,
                    throttle: 0.0,
                    predicted: Vec::new(),
                    reference: Vec::new(),
                    cte: self.last_cte,
                }
            }
        }
    }

    pub fn try_control_cycle(
        &mut self,
        telemetry: &TelemetryFrame,
    ) -> Result<CycleOutput, ControlError> {
        validate(telemetry)?;

        let (xs, ys) = reference_path::to_vehicle_frame(
            (telemetry.x, telemetry.y, telemetry.heading),
            &telemetry.waypoints_x,
            &telemetry.waypoints_y,
        );
        let path = reference_path::fit(&xs, &ys)?;

        // In the vehicle frame the pose is the origin and the tracking
        // errors follow directly from the fitted polynomial.
        let (y_ref, _, _) = path.evaluate(0.0);
        let measured = VehicleState {
            x: 0.0,
            y: 0.0,
            heading: 0.0,
            speed: telemetry.speed,
            cte: y_ref,
            heading_error: -path.heading(0.0),
        };
        self.last_cte = measured.cte;

        let previous = Actuation {
            steering: telemetry.steering_angle * self.steering_scale,
            throttle: telemetry.throttle,
        };
        let initial = prediction::predict(&self.model, self.latency, &measured, &previous, &path);

        let result = self.optimizer.solve(&initial, &path)?;
        self.last = result.command;

        Ok(CycleOutput {
            steering_angle: result.command.steering / self.steering_scale,
            throttle: result.command.throttle,
            predicted: result.predicted.iter().map(|s| (s.x, s.y)).collect(),
            reference: (1..REFERENCE_POINTS)
                .map(|i| {
                    let x = REFERENCE_SPACING * i as float;
                    (x, path.evaluate(x).0)
                })
                .collect(),
            cte: measured.cte,
        })
    }
}

fn validate(telemetry: &TelemetryFrame) -> Result<(), ControlError> {
    let scalars = [
        telemetry.x,
        telemetry.y,
        telemetry.heading,
        telemetry.speed,
        telemetry.steering_angle,
        telemetry.throttle,
    ];
    if scalars.iter().any(|v| !v.is_finite()) {
        return Err(ControlError::MalformedTelemetry(
            "non-finite vehicle state".to_owned(),
        ));
    }
    if telemetry.waypoints_x.len() != telemetry.waypoints_y.len() {
        return Err(ControlError::MalformedTelemetry(format!(
            "waypoint coordinate counts differ: {} x, {} y",
            telemetry.waypoints_x.len(),
            telemetry.waypoints_y.len()
        )));
    }
    if telemetry
        .waypoints_x
        .iter()
        .chain(&telemetry.waypoints_y)
        .any(|v| !v.is_finite())
    {
        return Err(ControlError::MalformedTelemetry(
            "non-finite waypoint".to_owned(),
        ));
    }
    Ok(())
}
