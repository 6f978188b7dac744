//! Command-line and simulation configuration for the room server.

use clap::Parser;
use std::time::Duration;

/// Server command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ServerConfig {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    /// Simulation ticks per second; also defines the fixed physics step
    #[arg(short, long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub tick_rate: u32,

    /// Upper bound on physics sub-steps taken in a single tick
    #[arg(long, default_value_t = shared::MAX_SUB_STEPS)]
    pub max_substeps: u32,

    /// Maximum number of simultaneous connections
    #[arg(long, default_value_t = 64)]
    pub max_connections: usize,

    /// Packets queued per connection before snapshots are dropped for it
    #[arg(long, default_value_t = 64)]
    pub outbox_capacity: usize,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn simulation(&self) -> SimulationConfig {
        SimulationConfig::from_tick_rate(self.tick_rate, self.max_substeps)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            tick_rate: 60,
            max_substeps: shared::MAX_SUB_STEPS,
            max_connections: 64,
            outbox_capacity: 64,
        }
    }
}

/// Timing parameters every room is created with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationConfig {
    /// Wall-clock spacing between ticks.
    pub tick_interval: Duration,
    /// Physics step in seconds, equal to `tick_interval`.
    pub fixed_step: f32,
    pub max_substeps: u32,
}

impl SimulationConfig {
    pub fn from_tick_rate(tick_rate: u32, max_substeps: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_interval: Duration::from_secs_f64(1.0 / tick_rate as f64),
            fixed_step: 1.0 / tick_rate as f32,
            max_substeps: max_substeps.max(1),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::from_tick_rate(60, shared::MAX_SUB_STEPS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_defaults_match_sixty_hertz() {
        let config = SimulationConfig::default();
        assert_approx_eq!(config.fixed_step, shared::FIXED_TIME_STEP);
        assert_eq!(config.max_substeps, 3);
        assert_eq!(config.tick_interval.as_micros(), 16_666);
    }

    #[test]
    fn test_parse_arguments() {
        let config = ServerConfig::parse_from([
            "server",
            "-H",
            "0.0.0.0",
            "--port",
            "9000",
            "--tick-rate",
            "30",
            "--max-substeps",
            "5",
        ]);

        assert_eq!(config.address(), "0.0.0.0:9000");
        let simulation = config.simulation();
        assert_approx_eq!(simulation.fixed_step, 1.0 / 30.0);
        assert_eq!(simulation.max_substeps, 5);
    }

    #[test]
    fn test_zero_tick_rate_is_rejected() {
        assert!(ServerConfig::try_parse_from(["server", "--tick-rate", "0"]).is_err());
    }

    #[test]
    fn test_parsed_defaults_match_default_impl() {
        let parsed = ServerConfig::parse_from(["server"]);
        let default = ServerConfig::default();
        assert_eq!(parsed.address(), default.address());
        assert_eq!(parsed.tick_rate, default.tick_rate);
        assert_eq!(parsed.max_connections, default.max_connections);
        assert_eq!(parsed.outbox_capacity, default.outbox_capacity);
    }

    #[test]
    fn test_degenerate_values_are_clamped() {
        let config = SimulationConfig::from_tick_rate(0, 0);
        assert_eq!(config.max_substeps, 1);
        assert_approx_eq!(config.fixed_step, 1.0);
    }
}
