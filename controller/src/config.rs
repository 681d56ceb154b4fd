use std::fs::File;
use std::io::Read;

use serde::Deserialize;

use prelude::*;

static CONFIG_FILE: &str = "controller.toml";

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Horizon step count.
    pub N: usize,
    /// Horizon step duration in seconds.
    pub dt: float,
    /// Target speed in simulator speed units.
    pub v_target: float,
    pub weights: CostWeights,
    pub vehicle: VehicleConfig,
    pub server: ServerConfig,
}

/// The seven cost weights, fixed at construction and shared read-only by
/// every cycle.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct CostWeights {
    pub cte: float,
    pub heading_error: float,
    pub speed: float,
    pub steering: float,
    pub throttle: float,
    pub steering_gap: float,
    pub throttle_gap: float,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct VehicleConfig {
    pub Lf: float,
    pub max_steering_deg: float,
    /// Actuation delay compensated by the state predictor, in seconds.
    pub latency: float,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    /// Injected wire delay before each response, mimicking actuation lag.
    /// A demo-harness property, not the model latency above.
    pub actuation_delay_ms: u64,
}

impl Config {
    /// Loads `controller.toml` from the working directory. Panics on a
    /// missing or invalid file; there is no controller to run without one.
    pub fn load() -> Config {
        let mut config_file = File::open(CONFIG_FILE).expect("unable to open controller.toml");
        let mut config = String::new();
        config_file
            .read_to_string(&mut config)
            .expect("could not read controller.toml");
        Config::parse(&config)
    }

    pub fn parse(raw: &str) -> Config {
        let config: Config = toml::from_str(raw).expect("controller.toml is malformed");
        assert!(config.N >= 2, "N must allow at least one actuation interval");
        assert!(config.dt > 0.0, "dt must be positive");
        assert!(config.vehicle.Lf > 0.0, "Lf must be positive");
        assert!(
            config.vehicle.max_steering_deg > 0.0,
            "max_steering_deg must be positive"
        );
        assert!(config.vehicle.latency >= 0.0, "latency must be non-negative");
        config.weights.validate();
        config
    }
}

impl CostWeights {
    fn validate(&self) {
        let all = [
            self.cte,
            self.heading_error,
            self.speed,
            self.steering,
            self.throttle,
            self.steering_gap,
            self.throttle_gap,
        ];
        assert!(
            all.iter().all(|w| w.is_finite() && *w >= 0.0),
            "cost weights must be finite and non-negative"
        );
    }
}
