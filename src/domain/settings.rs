use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            console_logging_enabled: default_true(),
            file_logging_enabled: default_false(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "myo_stream".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,

    // Advanced BLE Settings
    #[serde(default = "default_control_service_uuid")]
    pub ble_control_service_uuid: String,
    #[serde(default = "default_command_uuid")]
    pub ble_command_char_uuid: String,
    #[serde(default = "default_imu_data_uuid")]
    pub ble_imu_data_char_uuid: String,
    #[serde(default = "default_battery_uuid")]
    pub ble_battery_char_uuid: String,
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,

    // Connect-readiness poll
    #[serde(default = "default_ready_poll_interval_ms")]
    pub ready_poll_interval_ms: u64,
    #[serde(default = "default_ready_max_polls")]
    pub ready_max_polls: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            ble_control_service_uuid: default_control_service_uuid(),
            ble_command_char_uuid: default_command_uuid(),
            ble_imu_data_char_uuid: default_imu_data_uuid(),
            ble_battery_char_uuid: default_battery_uuid(),
            scan_timeout_secs: default_scan_timeout_secs(),
            ready_poll_interval_ms: default_ready_poll_interval_ms(),
            ready_max_polls: default_ready_max_polls(),
        }
    }
}

fn default_control_service_uuid() -> String {
    crate::infrastructure::bluetooth::protocol::CONTROL_SERVICE_UUID.to_string()
}
fn default_command_uuid() -> String {
    crate::infrastructure::bluetooth::protocol::COMMAND_CHAR_UUID.to_string()
}
fn default_imu_data_uuid() -> String {
    crate::infrastructure::bluetooth::protocol::IMU_DATA_CHAR_UUID.to_string()
}
fn default_battery_uuid() -> String {
    crate::infrastructure::bluetooth::protocol::BATTERY_LEVEL_CHAR_UUID.to_string()
}
fn default_scan_timeout_secs() -> u64 {
    10
}
fn default_ready_poll_interval_ms() -> u64 {
    100
}
fn default_ready_max_polls() -> u32 {
    100
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();

        Ok(Self {
            settings,
            settings_path,
        })
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("MyoStream");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &PathBuf) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}
