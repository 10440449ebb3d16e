//! Engine and printer configuration
//!
//! Timing values are plain milliseconds so configuration files stay readable;
//! the accessors convert them to [`Duration`]s.

use std::path::Path;
use std::time::Duration;

use fiscal_protocol::{Brand, FieldLimits, Model};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables of the engine workers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sleep between empty polls of a byte transport
    pub poll_interval_ms: u64,
    /// Read attempts before a reply is abandoned
    pub max_read_attempts: u32,
    /// Longest reply frame accepted
    pub max_frame_len: usize,
    /// Consecutive NAKs retried before the queue is dropped
    pub nak_limit: u32,
    /// Delay before re-sending a NAKed frame
    pub nak_delay_ms: u64,
    /// Recovery attempts before the printer is declared unrecoverable
    pub recovery_cap: u32,
    /// Settle time after the synthetic close sequence
    pub recovery_settle_ms: u64,
    /// Cancel commands issued after rejected JSON replies
    pub cancel_cap: u32,
    /// Bounded wait of one JSON round trip
    pub network_timeout_ms: u64,
    /// Poll interval while waiting for a worker to exit
    pub teardown_poll_ms: u64,
    /// Capacity of the event channel
    pub event_capacity: usize,
    /// Override for the non-fiscal text chunk width
    pub non_fiscal_width: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            max_read_attempts: 150,
            max_frame_len: 1024,
            nak_limit: 3,
            nak_delay_ms: 100,
            recovery_cap: 4,
            recovery_settle_ms: 200,
            cancel_cap: 3,
            network_timeout_ms: 10_000,
            teardown_poll_ms: 100,
            event_capacity: 256,
            non_fiscal_width: None,
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn nak_delay(&self) -> Duration {
        Duration::from_millis(self.nak_delay_ms)
    }

    pub fn recovery_settle(&self) -> Duration {
        Duration::from_millis(self.recovery_settle_ms)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }

    pub fn teardown_poll(&self) -> Duration {
        Duration::from_millis(self.teardown_poll_ms)
    }

    /// Field widths handed to the encoders
    pub fn limits(&self) -> FieldLimits {
        FieldLimits {
            non_fiscal_width: self.non_fiscal_width,
        }
    }

    /// Reject values that would stall or spin a worker
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_read_attempts == 0 {
            return Err(ConfigError::Invalid("max_read_attempts must be positive".into()));
        }
        if self.max_frame_len < 16 {
            return Err(ConfigError::Invalid("max_frame_len is below the smallest reply".into()));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be positive".into()));
        }
        if self.non_fiscal_width == Some(0) {
            return Err(ConfigError::Invalid("non_fiscal_width must be positive".into()));
        }
        Ok(())
    }
}

/// How the printer is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    /// Serial port, `port` is the device path (`/dev/ttyS0`, `COM3`)
    Com,
    /// USB serial adapter, `port` is `vid:pid` in hex
    Usb,
    /// HTTP endpoint, `port` is the base URL
    Network,
}

/// Everything needed to open one printer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterConfig {
    pub brand: Brand,
    pub model: Model,
    pub port_type: PortType,
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_baud_rate() -> u32 {
    9600
}

impl PrinterConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Save configuration as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
