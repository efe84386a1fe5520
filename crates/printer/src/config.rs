//! Printer configuration management

use crate::usb::{DeviceFilter, PermissionGate, TransferTimeouts};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name under the user and system config directories
pub const CONFIG_DIR_NAME: &str = "usb-receipt-print";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrinterConfig {
    #[serde(default)]
    pub general: GeneralSettings,
    #[serde(default)]
    pub usb: UsbSettings,
    #[serde(default)]
    pub permission: PermissionSettings,
    #[serde(default)]
    pub transfer: TransferSettings,
    #[serde(default)]
    pub notifier: NotifierSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralSettings {
    #[serde(default = "GeneralSettings::default_log_level")]
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

impl GeneralSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsbSettings {
    /// VID:PID allow-list ("0x04b8:0x0202", "0x04b8:*"); empty allows all
    #[serde(default)]
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionSettings {
    /// How long to wait for a grant
    #[serde(default = "PermissionSettings::default_timeout_ms")]
    pub timeout_ms: u64,
    /// Re-check interval while waiting
    #[serde(default = "PermissionSettings::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for PermissionSettings {
    fn default() -> Self {
        Self {
            timeout_ms: Self::default_timeout_ms(),
            poll_interval_ms: Self::default_poll_interval_ms(),
        }
    }
}

impl PermissionSettings {
    fn default_timeout_ms() -> u64 {
        1500
    }

    fn default_poll_interval_ms() -> u64 {
        50
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Text payload timeout
    #[serde(default = "TransferSettings::default_payload_timeout_ms")]
    pub payload_timeout_ms: u64,
    /// Raw payload timeout
    #[serde(default = "TransferSettings::default_raw_timeout_ms")]
    pub raw_timeout_ms: u64,
    /// Reset, line feed, feed and cut timeout
    #[serde(default = "TransferSettings::default_control_timeout_ms")]
    pub control_timeout_ms: u64,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            payload_timeout_ms: Self::default_payload_timeout_ms(),
            raw_timeout_ms: Self::default_raw_timeout_ms(),
            control_timeout_ms: Self::default_control_timeout_ms(),
        }
    }
}

impl TransferSettings {
    fn default_payload_timeout_ms() -> u64 {
        1000
    }

    fn default_raw_timeout_ms() -> u64 {
        2000
    }

    fn default_control_timeout_ms() -> u64 {
        500
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotifierSettings {
    /// Command run on failure with the message appended, e.g.
    /// `["notify-send", "Printer Error"]`. Empty logs instead.
    #[serde(default)]
    pub command: Vec<String>,
}

impl PrinterConfig {
    /// Load configuration from file
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![Self::default_path(), Self::system_path()];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: PrinterConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("{}", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join(CONFIG_DIR_NAME).join("config.toml")
        } else {
            PathBuf::from(".config")
                .join(CONFIG_DIR_NAME)
                .join("config.toml")
        }
    }

    /// System-wide configuration file path
    pub fn system_path() -> PathBuf {
        PathBuf::from("/etc").join(CONFIG_DIR_NAME).join("config.toml")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.general.log_level,
                valid_levels.join(", ")
            ));
        }

        for filter in &self.usb.filters {
            Self::validate_filter(filter)?;
        }

        let timeouts = [
            ("permission.timeout_ms", self.permission.timeout_ms),
            ("permission.poll_interval_ms", self.permission.poll_interval_ms),
            ("transfer.payload_timeout_ms", self.transfer.payload_timeout_ms),
            ("transfer.raw_timeout_ms", self.transfer.raw_timeout_ms),
            ("transfer.control_timeout_ms", self.transfer.control_timeout_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(anyhow!("{} must be greater than 0", name));
            }
        }

        if self
            .notifier
            .command
            .first()
            .is_some_and(|program| program.trim().is_empty())
        {
            return Err(anyhow!("notifier.command has an empty program name"));
        }

        Ok(())
    }

    /// Validate a USB device filter pattern (VID:PID)
    pub fn validate_filter(filter: &str) -> Result<()> {
        let parts: Vec<&str> = filter.split(':').collect();
        if parts.len() != 2 {
            return Err(anyhow!(
                "Invalid filter format '{}', expected VID:PID (e.g., '0x04b8:0x0202' or '0x04b8:*')",
                filter
            ));
        }

        let (vid, pid) = (parts[0], parts[1]);

        if vid != "*" {
            Self::validate_hex_id(vid, "VID")?;
        }

        if pid != "*" {
            Self::validate_hex_id(pid, "PID")?;
        }

        Ok(())
    }

    fn validate_hex_id(id: &str, name: &str) -> Result<()> {
        let hex_part = id
            .strip_prefix("0x")
            .or_else(|| id.strip_prefix("0X"))
            .ok_or_else(|| {
                anyhow!(
                    "Invalid {} '{}', must start with '0x' (e.g., '0x04b8')",
                    name,
                    id
                )
            })?;

        if hex_part.is_empty() || hex_part.len() > 4 {
            return Err(anyhow!(
                "Invalid {} '{}', hex part must be 1-4 digits",
                name,
                id
            ));
        }

        u16::from_str_radix(hex_part, 16)
            .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))?;

        Ok(())
    }

    pub fn device_filter(&self) -> DeviceFilter {
        DeviceFilter::new(self.usb.filters.clone())
    }

    pub fn permission_gate(&self) -> PermissionGate {
        PermissionGate::new(
            Duration::from_millis(self.permission.timeout_ms),
            Duration::from_millis(self.permission.poll_interval_ms),
        )
    }

    pub fn transfer_timeouts(&self) -> TransferTimeouts {
        TransferTimeouts {
            payload: Duration::from_millis(self.transfer.payload_timeout_ms),
            raw: Duration::from_millis(self.transfer.raw_timeout_ms),
            control: Duration::from_millis(self.transfer.control_timeout_ms),
        }
    }
}

/// Load configuration from a user-supplied path, expanding `~`
pub fn load_config(path: &str) -> Result<PrinterConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    PrinterConfig::load(Some(path_buf))
}
