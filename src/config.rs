use crate::bus::Topics;
use crate::bus::mqtt::MqttSettings;
use crate::controller::Timing;
use crate::detection::{DifferenceSettings, Roi, VoteSettings};
use crate::led::{SegmentLayout, SegmentRange};
use crate::sensor::{RetryPolicy, SensorId};
use crate::thresholds::{SensorDistances, SettingsError, Thresholds};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_BACKGROUND_PATH: &str = "background_frame.jpg";
pub const DEFAULT_SPI_BUS: u8 = 0;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub mqtt: Option<MqttSettings>,
    #[serde(default)]
    pub topics: Option<Topics>,
    #[serde(default)]
    pub sensors: Option<SensorsSection>,
    #[serde(default)]
    pub thresholds: Option<ThresholdsSection>,
    #[serde(default)]
    pub leds: Option<LedsSection>,
    #[serde(default)]
    pub camera: Option<CameraSection>,
    #[serde(default)]
    pub detection: Option<DetectionSection>,
    #[serde(default)]
    pub timing: Option<TimingSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

/// Driver wiring for one distance sensor.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorSettings {
    Ultrasonic { trig_pin: u8, echo_pin: u8 },
    Vl53l1x { i2c_address: u8 },
}

#[derive(Debug, Deserialize, Clone)]
pub struct SensorsSection {
    pub front: Option<SensorSettings>,
    pub left: Option<SensorSettings>,
    pub right: Option<SensorSettings>,
    /// Attempts per sensor and cycle (default: 3)
    pub attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub settle_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ThresholdsSection {
    pub red: Option<SensorDistances>,
    pub orange: Option<SensorDistances>,
    pub brightness: Option<u8>,
    /// Master switch until a settings message says otherwise (default: true)
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedsSection {
    pub spi_bus: Option<u8>,
    pub pixel_count: Option<usize>,
    pub front: Option<SegmentRange>,
    pub left: Option<SegmentRange>,
    pub right: Option<SegmentRange>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraSection {
    pub command: Option<String>,
    pub rotate_180: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionSection {
    pub background_path: Option<PathBuf>,
    pub frames: Option<usize>,
    pub stagger_ms: Option<u64>,
    pub roi: Option<Roi>,
    pub diff_threshold: Option<u8>,
    pub min_area: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimingSection {
    pub active_interval_ms: Option<u64>,
    pub dormant_interval_ms: Option<u64>,
    pub stabilization_ms: Option<u64>,
    pub blink_duration_ms: Option<u64>,
    pub blink_poll_ms: Option<u64>,
    pub blink_toggle_ms: Option<u64>,
    pub restore_settle_ms: Option<u64>,
    pub close_dwell_ms: Option<u64>,
    pub metrics_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid thresholds: {0}")]
    Thresholds(#[from] SettingsError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&contents)?;
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

fn millis(value: Option<u64>, default: Duration) -> Duration {
    value.map(Duration::from_millis).unwrap_or(default)
}

impl Config {
    /// `MQTT_BROKER` and `MQTT_PORT` take precedence over the `[mqtt]` section.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let host = lookup("MQTT_BROKER").filter(|host| !host.trim().is_empty());
        let port = lookup("MQTT_PORT");
        if host.is_none() && port.is_none() {
            return Ok(());
        }
        let mqtt = self.mqtt.get_or_insert_with(MqttSettings::default);
        if let Some(host) = host {
            mqtt.host = host.trim().to_string();
        }
        if let Some(port) = port {
            mqtt.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("MQTT_PORT {port:?} is not a port")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds()?;
        self.led_layout()
            .validate()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        if self.vote_settings().frames == 0 {
            return Err(ConfigError::Invalid("detection.frames must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn mqtt(&self) -> MqttSettings {
        self.mqtt.clone().unwrap_or_default()
    }

    pub fn topics(&self) -> Topics {
        self.topics.clone().unwrap_or_default()
    }

    /// Returns the wiring for a sensor, or `None` when it is not configured.
    pub fn sensor(&self, sensor: SensorId) -> Option<&SensorSettings> {
        let section = self.sensors.as_ref()?;
        match sensor {
            SensorId::Front => section.front.as_ref(),
            SensorId::Left => section.left.as_ref(),
            SensorId::Right => section.right.as_ref(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        let Some(section) = &self.sensors else {
            return defaults;
        };
        RetryPolicy {
            attempts: section.attempts.unwrap_or(defaults.attempts).max(1),
            retry_delay: millis(section.retry_delay_ms, defaults.retry_delay),
            settle_delay: millis(section.settle_delay_ms, defaults.settle_delay),
        }
    }

    /// Initial thresholds, validated like a settings update.
    pub fn thresholds(&self) -> Result<Thresholds, SettingsError> {
        let defaults = Thresholds::default();
        let Some(section) = &self.thresholds else {
            return Ok(defaults);
        };
        Thresholds::new(
            section.red.unwrap_or(defaults.red_distances()),
            section.orange.unwrap_or(defaults.orange_distances()),
            section.brightness.unwrap_or(defaults.brightness()),
        )
    }

    pub fn system_enabled(&self) -> bool {
        self.thresholds
            .as_ref()
            .and_then(|section| section.enabled)
            .unwrap_or(true)
    }

    pub fn spi_bus(&self) -> u8 {
        self.leds
            .as_ref()
            .and_then(|section| section.spi_bus)
            .unwrap_or(DEFAULT_SPI_BUS)
    }

    pub fn led_layout(&self) -> SegmentLayout {
        let defaults = SegmentLayout::default();
        let Some(section) = &self.leds else {
            return defaults;
        };
        SegmentLayout {
            pixel_count: section.pixel_count.unwrap_or(defaults.pixel_count),
            front: section.front.unwrap_or(defaults.front),
            left: section.left.unwrap_or(defaults.left),
            right: section.right.unwrap_or(defaults.right),
        }
    }

    pub fn camera_command(&self) -> &str {
        self.camera
            .as_ref()
            .and_then(|section| section.command.as_deref())
            .unwrap_or(crate::detection::camera::DEFAULT_CAPTURE_COMMAND)
    }

    pub fn camera_rotate_180(&self) -> bool {
        self.camera
            .as_ref()
            .and_then(|section| section.rotate_180)
            .unwrap_or(true)
    }

    pub fn background_path(&self) -> &Path {
        self.detection
            .as_ref()
            .and_then(|section| section.background_path.as_deref())
            .filter(|path| !path.as_os_str().is_empty())
            .unwrap_or(Path::new(DEFAULT_BACKGROUND_PATH))
    }

    pub fn vote_settings(&self) -> VoteSettings {
        let defaults = VoteSettings::default();
        let Some(section) = &self.detection else {
            return defaults;
        };
        VoteSettings {
            frames: section.frames.unwrap_or(defaults.frames),
            stagger: millis(section.stagger_ms, defaults.stagger),
        }
    }

    pub fn difference_settings(&self) -> DifferenceSettings {
        let defaults = DifferenceSettings::default();
        let Some(section) = &self.detection else {
            return defaults;
        };
        DifferenceSettings {
            roi: section.roi.unwrap_or(defaults.roi),
            diff_threshold: section.diff_threshold.unwrap_or(defaults.diff_threshold),
            min_area: section.min_area.unwrap_or(defaults.min_area),
        }
    }

    pub fn timing(&self) -> Timing {
        let defaults = Timing::default();
        let Some(section) = &self.timing else {
            return defaults;
        };
        Timing {
            active_interval: millis(section.active_interval_ms, defaults.active_interval),
            dormant_interval: millis(section.dormant_interval_ms, defaults.dormant_interval),
            stabilization: millis(section.stabilization_ms, defaults.stabilization),
            blink_duration: millis(section.blink_duration_ms, defaults.blink_duration),
            blink_poll: millis(section.blink_poll_ms, defaults.blink_poll),
            blink_toggle: millis(section.blink_toggle_ms, defaults.blink_toggle),
            restore_settle: millis(section.restore_settle_ms, defaults.restore_settle),
            close_dwell: millis(section.close_dwell_ms, defaults.close_dwell),
            metrics_interval: section
                .metrics_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.metrics_interval),
        }
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    const MINIMAL: &str = r#"
[app]
name = "garage-parking-assistant"

[logging]
level = "info"
"#;

    fn write_temp(label: &str, contents: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let unique = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
        let path = std::env::temp_dir().join(format!("garage-config-{label}-{unique}.toml"));
        fs::write(&path, contents)?;
        Ok(path)
    }

    #[test]
    fn shipped_config_loads() -> Result<(), Box<dyn std::error::Error>> {
        let config = load_default()?;
        assert!(config.sensor(SensorId::Front).is_some());
        assert_eq!(config.topics().settings, "garage/parking/settings");
        Ok(())
    }

    #[test]
    fn minimal_config_uses_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let config: Config = toml::from_str(MINIMAL)?;

        assert_eq!(config.thresholds()?, Thresholds::default());
        assert!(config.system_enabled());
        assert_eq!(config.server_port(), DEFAULT_SERVER_PORT);
        assert_eq!(config.background_path(), Path::new(DEFAULT_BACKGROUND_PATH));
        assert_eq!(config.timing(), Timing::default());
        assert_eq!(config.led_layout(), SegmentLayout::default());
        assert!(config.sensor(SensorId::Left).is_none());
        Ok(())
    }

    #[test]
    fn sensor_kinds_are_tagged() -> Result<(), Box<dyn std::error::Error>> {
        let contents = format!(
            "{MINIMAL}\n[sensors.front]\nkind = \"ultrasonic\"\ntrig_pin = 23\necho_pin = 24\n\n[sensors.left]\nkind = \"vl53l1x\"\ni2c_address = 0x30\n"
        );
        let config: Config = toml::from_str(&contents)?;

        assert_eq!(
            config.sensor(SensorId::Front),
            Some(&SensorSettings::Ultrasonic {
                trig_pin: 23,
                echo_pin: 24
            })
        );
        assert_eq!(
            config.sensor(SensorId::Left),
            Some(&SensorSettings::Vl53l1x { i2c_address: 0x30 })
        );
        Ok(())
    }

    #[test]
    fn red_above_orange_is_rejected_at_load() -> Result<(), Box<dyn std::error::Error>> {
        let contents = format!(
            "{MINIMAL}\n[thresholds]\nred = {{ front = 12.0, left = 3.0, right = 3.0 }}\n"
        );
        let path = write_temp("red-above-orange", &contents)?;

        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);

        assert!(matches!(
            result,
            Err(ConfigError::Thresholds(SettingsError::RedAboveOrange { .. }))
        ));
        Ok(())
    }

    #[test]
    fn env_overrides_broker() -> Result<(), Box<dyn std::error::Error>> {
        let mut config: Config = toml::from_str(MINIMAL)?;

        config.apply_env_overrides(|key| match key {
            "MQTT_BROKER" => Some("broker.lan".to_string()),
            "MQTT_PORT" => Some("1884".to_string()),
            _ => None,
        })?;

        let mqtt = config.mqtt();
        assert_eq!(mqtt.host, "broker.lan");
        assert_eq!(mqtt.port, 1884);
        Ok(())
    }

    #[test]
    fn bad_env_port_is_invalid() -> Result<(), Box<dyn std::error::Error>> {
        let mut config: Config = toml::from_str(MINIMAL)?;

        let result = config.apply_env_overrides(|key| (key == "MQTT_PORT").then(|| "abc".to_string()));

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
        Ok(())
    }

    #[test]
    fn missing_config_file_returns_read_error() -> Result<(), Box<dyn std::error::Error>> {
        let unique = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
        let path = std::env::temp_dir().join(format!("garage-config-missing-{unique}.toml"));

        let result = load_from_path(&path);

        assert!(matches!(result, Err(ConfigError::Read(_))));
        Ok(())
    }

    #[test]
    fn invalid_toml_returns_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp("invalid", "not = [valid")?;

        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        Ok(())
    }
}
