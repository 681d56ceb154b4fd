//! Actuation latency compensation.

use prelude::*;
use reference_path::ReferencePolynomial;
use vehicle_model::{Actuation, KinematicBicycle, VehicleState};

/// Advances the state over the actuation latency under the command the
/// vehicle is still executing, so the optimiser plans from where the car
/// will actually be when the next command takes effect.
pub fn predict(
    model: &KinematicBicycle,
    latency: float,
    state: &VehicleState,
    previous: &Actuation,
    path: &ReferencePolynomial,
) -> VehicleState {
    if latency <= 0.0 {
        return *state;
    }
    model.step(latency, state, previous, path)
}

#[cfg(test)]
mod test {
    use super::*;
    use vehicle_model::VehicleParams;

    fn straight() -> ReferencePolynomial {
        ReferencePolynomial::from_coefficients(vec![0.0, 0.0, 0.0, 0.0])
    }

    #[test]
    fn latency_step_advances_along_the_heading() {
        let model = KinematicBicycle::new(VehicleParams::default());
        let state = VehicleState {
            speed: 10.0,
            ..VehicleState::default()
        };

        let predicted = predict(&model, 0.1, &state, &Actuation::default(), &straight());

        assert!((predicted.x - 1.0).abs() < 1e-12);
        assert!(predicted.y.abs() < 1e-12);
        assert!(predicted.heading.abs() < 1e-12);
        assert!((predicted.speed - 10.0).abs() < 1e-12);
        assert!(predicted.cte.abs() < 1e-12);
        assert!(predicted.heading_error.abs() < 1e-12);
    }

    #[test]
    fn zero_latency_returns_the_state_unchanged() {
        let model = KinematicBicycle::new(VehicleParams::default());
        let state = VehicleState {
            x: 3.0,
            y: -2.0,
            heading: 0.4,
            speed: 17.0,
            cte: 0.3,
            heading_error: -0.1,
        };
        let previous = Actuation {
            steering: 0.2,
            throttle: 0.7,
        };

        assert_eq!(predict(&model, 0.0, &state, &previous, &straight()), state);
    }

    #[test]
    fn previous_steering_rotates_the_prediction() {
        let model = KinematicBicycle::new(VehicleParams::default());
        let state = VehicleState {
            speed: 10.0,
            ..VehicleState::default()
        };
        let previous = Actuation {
            steering: 0.1,
            throttle: 0.0,
        };

        let predicted = predict(&model, 0.1, &state, &previous, &straight());

        let expected = -10.0 / model.params().Lf * 0.1 * 0.1;
        assert!((predicted.heading - expected).abs() < 1e-12);
        assert!(predicted.heading < 0.0);
    }
}
