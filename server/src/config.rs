use std::time::Duration;

/// Settings for one authoritative server instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_players: usize,
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// State broadcasts per second; at most `tick_rate`.
    pub sync_rate: u32,
    /// Ticks between forced full snapshots to each client.
    pub full_snapshot_interval: u64,
    pub level_width: i32,
    pub level_height: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7777,
            max_players: 4,
            tick_rate: shared::TICK_RATE,
            sync_rate: 20,
            full_snapshot_interval: 300,
            level_width: shared::level::MIN_LEVEL_WIDTH,
            level_height: shared::level::MIN_LEVEL_HEIGHT,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    /// Ticks between broadcasts.
    pub fn sync_interval(&self) -> u64 {
        (self.tick_rate / self.sync_rate.max(1)).max(1) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 7777);
        assert_eq!(config.max_players, 4);
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.sync_rate, 20);
        assert_eq!(config.sync_interval(), 3);
        assert_eq!(config.address(), "127.0.0.1:7777");
    }

    #[test]
    fn test_sync_interval_never_zero() {
        let config = ServerConfig {
            tick_rate: 30,
            sync_rate: 60,
            ..Default::default()
        };
        assert_eq!(config.sync_interval(), 1);

        let config = ServerConfig {
            sync_rate: 0,
            ..Default::default()
        };
        assert_eq!(config.sync_interval(), 60);
    }

    #[test]
    fn test_tick_duration() {
        let config = ServerConfig::default();
        assert_approx_eq!(config.tick_duration().as_secs_f64(), 1.0 / 60.0);
    }
}
