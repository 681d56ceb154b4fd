//! Kinematic bicycle model in the error-state form used by the optimiser.
//!
//! The state tracks the vehicle pose and speed together with the
//! cross-track and heading errors relative to a fitted reference
//! polynomial. Propagation is explicit Euler; the error components are
//! recomputed from the reference geometry at each step rather than
//! integrated, which keeps them consistent with the path the optimiser is
//! penalising against.

#![allow(non_snake_case)]

use prelude::*;
use reference_path::ReferencePolynomial;

/// Vehicle state in the planning frame: position, heading, speed,
/// cross-track error and heading error.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VehicleState {
    pub x: float,
    pub y: float,
    pub heading: float,
    pub speed: float,
    pub cte: float,
    pub heading_error: float,
}

impl VehicleState {
    pub fn to_vector(&self) -> Vector<6> {
        Vector::<6>::new(
            self.x,
            self.y,
            self.heading,
            self.speed,
            self.cte,
            self.heading_error,
        )
    }

    pub fn from_vector(x: &Vector<6>) -> VehicleState {
        VehicleState {
            x: x[0],
            y: x[1],
            heading: x[2],
            speed: x[3],
            cte: x[4],
            heading_error: x[5],
        }
    }
}

/// One actuation pair: physical steering angle in radians and normalized
/// acceleration.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Actuation {
    pub steering: float,
    pub throttle: float,
}

impl Actuation {
    pub fn to_vector(&self) -> Vector<2> {
        Vector::<2>::new(self.steering, self.throttle)
    }

    pub fn from_vector(u: &Vector<2>) -> Actuation {
        Actuation {
            steering: u[0],
            throttle: u[1],
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct VehicleParams {
    /// Distance from the centre of mass to the front axle. Relates
    /// steering angle to yaw rate.
    pub Lf: float,
    /// Physical steering limit in radians.
    pub max_steering: float,
}

impl Default for VehicleParams {
    fn default() -> VehicleParams {
        VehicleParams {
            Lf: 2.67,
            max_steering: deg2rad(25.0),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct KinematicBicycle {
    params: VehicleParams,
}

impl KinematicBicycle {
    pub fn new(params: VehicleParams) -> KinematicBicycle {
        KinematicBicycle { params }
    }

    pub fn params(&self) -> &VehicleParams {
        &self.params
    }

    /// Propagates the state over `dt` under constant actuation. Positive
    /// steering turns the vehicle right: heading advances by
    /// -(v/Lf)*steering*dt.
    pub fn step(
        &self,
        dt: float,
        x: &VehicleState,
        u: &Actuation,
        path: &ReferencePolynomial,
    ) -> VehicleState {
        let (sin_heading, cos_heading) = x.heading.sin_cos();
        let (y_ref, slope, _) = path.evaluate(x.x);
        let yaw_rate = -x.speed / self.params.Lf * u.steering;

        VehicleState {
            x: x.x + x.speed * cos_heading * dt,
            y: x.y + x.speed * sin_heading * dt,
            heading: x.heading + yaw_rate * dt,
            speed: x.speed + u.throttle * dt,
            cte: (y_ref - x.y) + x.speed * x.heading_error.sin() * dt,
            heading_error: (x.heading - slope.atan()) + yaw_rate * dt,
        }
    }

    /// Jacobians of `step` with respect to the state and the actuation,
    /// evaluated at (x, u).
    pub fn linearise(
        &self,
        dt: float,
        x: &VehicleState,
        u: &Actuation,
        path: &ReferencePolynomial,
    ) -> (Matrix<6, 6>, Matrix<6, 2>) {
        let (sin_heading, cos_heading) = x.heading.sin_cos();
        let (sin_error, cos_error) = x.heading_error.sin_cos();
        let (_, slope, curvature) = path.evaluate(x.x);
        // d/dx atan(f'(x))
        let d_ref_heading = curvature / (1.0 + slope * slope);

        let v = x.speed;
        let dt_Lf = dt / self.params.Lf;

        #[rustfmt::skip]
        let A = Matrix::<6, 6>::new(
            1.0, 0.0, -v * sin_heading * dt, cos_heading * dt, 0.0, 0.0,
            0.0, 1.0, v * cos_heading * dt, sin_heading * dt, 0.0, 0.0,
            0.0, 0.0, 1.0, -u.steering * dt_Lf, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0,
            slope, -1.0, 0.0, sin_error * dt, 0.0, v * cos_error * dt,
            -d_ref_heading, 0.0, 1.0, -u.steering * dt_Lf, 0.0, 0.0,
        );

        #[rustfmt::skip]
        let B = Matrix::<6, 2>::new(
            0.0, 0.0,
            0.0, 0.0,
            -v * dt_Lf, 0.0,
            0.0, dt,
            0.0, 0.0,
            -v * dt_Lf, 0.0,
        );

        (A, B)
    }

    /// Actuation bounds as (min, max): steering limited by the physical
    /// steering angle, throttle normalized to [-1, 1].
    pub fn input_bounds(&self) -> (Vector<2>, Vector<2>) {
        let min = Vector::<2>::new(-self.params.max_steering, -1.0);
        let max = Vector::<2>::new(self.params.max_steering, 1.0);
        (min, max)
    }
}
