//! Payload layouts of the simulator's telemetry and steer events.

use serde::{Deserialize, Serialize};

use controller::{CycleOutput, TelemetryFrame};
use prelude::*;

/// Telemetry payload. `ptsx`/`ptsy` are the upcoming track waypoints in map
/// coordinates, `psi` the heading in radians and `steering_angle` the
/// currently executing command in wire units.
#[derive(Debug, Deserialize)]
pub struct Telemetry {
    pub ptsx: Vec<float>,
    pub ptsy: Vec<float>,
    pub x: float,
    pub y: float,
    pub psi: float,
    pub speed: float,
    pub steering_angle: float,
    pub throttle: float,
}

impl Telemetry {
    pub fn into_frame(self) -> TelemetryFrame {
        TelemetryFrame {
            waypoints_x: self.ptsx,
            waypoints_y: self.ptsy,
            x: self.x,
            y: self.y,
            heading: self.psi,
            speed: self.speed,
            steering_angle: self.steering_angle,
            throttle: self.throttle,
        }
    }
}

/// Steer payload. The `mpc` point list draws the optimised trajectory in
/// green, the `next` list the reference line in yellow, both in vehicle
/// frame coordinates.
#[derive(Debug, Serialize)]
pub struct Steer {
    pub steering_angle: float,
    pub throttle: float,
    pub mpc_x: Vec<float>,
    pub mpc_y: Vec<float>,
    pub next_x: Vec<float>,
    pub next_y: Vec<float>,
}

impl Steer {
    pub fn from_output(output: &CycleOutput) -> Steer {
        let (mpc_x, mpc_y) = output.predicted.iter().copied().unzip();
        let (next_x, next_y) = output.reference.iter().copied().unzip();
        Steer {
            steering_angle: output.steering_angle,
            throttle: output.throttle,
            mpc_x,
            mpc_y,
            next_x,
            next_y,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn telemetry_payload_deserializes() {
        let payload = json!({
            "ptsx": [1.0, 2.0],
            "ptsy": [0.5, 0.6],
            "x": 10.0,
            "y": -3.0,
            "psi": 0.2,
            "speed": 35.0,
            "steering_angle": -0.05,
            "throttle": 0.8,
        });

        let telemetry: Telemetry = serde_json::from_value(payload).unwrap();
        let frame = telemetry.into_frame();

        assert_eq!(frame.waypoints_x, vec![1.0, 2.0]);
        assert_eq!(frame.waypoints_y, vec![0.5, 0.6]);
        assert_eq!(frame.heading, 0.2);
        assert_eq!(frame.steering_angle, -0.05);
    }

    #[test]
    fn steer_payload_uses_the_wire_field_names() {
        let output = CycleOutput {
            steering_angle: -0.1,
            throttle: 0.5,
            predicted: vec![(1.0, 0.1), (2.0, 0.3)],
            reference: vec![(2.5, 0.2)],
            cte: 0.1,
        };

        let value = serde_json::to_value(Steer::from_output(&output)).unwrap();

        assert_eq!(value["steering_angle"], json!(-0.1));
        assert_eq!(value["throttle"], json!(0.5));
        assert_eq!(value["mpc_x"], json!([1.0, 2.0]));
        assert_eq!(value["mpc_y"], json!([0.1, 0.3]));
        assert_eq!(value["next_x"], json!([2.5]));
        assert_eq!(value["next_y"], json!([0.2]));
    }
}
