use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::channels::{AlarmChannel, EmailChannel, NotificationChannel, SmsChannel};
use crate::dispatch::AlertDispatcher;
use crate::log::DetectionLog;
use crate::profile::{IdentityDirectory, IdentityProfile};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid bind_addr: {0}")]
    InvalidBindAddr(std::net::AddrParseError),
    #[error("confidence_threshold must be within 0..=100")]
    ThresholdOutOfRange,
}

/// Alarm playback settings. The clip path is appended to the player argv.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    pub player: Vec<String>,
    pub clip: String,
    pub max_play_secs: u64,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            player: vec!["aplay".to_string(), "-q".to_string()],
            clip: "./static/alarm.wav".to_string(),
            max_play_secs: 5,
        }
    }
}

/// SMTP settings for the email channel. The app password comes from
/// `VIGIL_EMAIL_PASSWORD` rather than the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub sender: String,
    pub recipient: String,
    pub password: Option<String>,
    pub subject: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 465,
            sender: String::new(),
            recipient: String::new(),
            password: None,
            subject: "Security Alert: Flagged Individual Detected".to_string(),
        }
    }
}

/// Messaging-provider settings for the SMS channel. Credentials come from
/// `VIGIL_SMS_*` environment variables rather than the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    pub api_base: String,
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    pub to_number: String,
    pub cooldown_secs: u64,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.twilio.com/2010-04-01".to_string(),
            account_sid: None,
            auth_token: None,
            from_number: None,
            to_number: String::new(),
            cooldown_secs: 60,
        }
    }
}

/// Full configuration shared by the daemon, the dashboard server, and the
/// CLI. Loaded from TOML with every field defaulted, then overlaid with
/// `VIGIL_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Detection log location.
    pub log_path: String,
    /// Static-asset root the dashboard serves images from.
    pub static_root: String,
    /// Snapshot directory, relative to `static_root`; also the prefix
    /// stored in log rows.
    pub image_subdir: String,
    /// Minimum similarity percentage for an observation to be accepted.
    pub confidence_threshold: i32,
    /// Watch category whose members trigger notifications.
    pub alert_category: String,
    /// Dashboard server bind address.
    pub bind_addr: String,
    /// Detector child process argv; its stdout carries observation events.
    pub detector_command: Vec<String>,
    pub alarm: AlarmConfig,
    pub email: EmailConfig,
    pub sms: SmsConfig,
    pub profiles: Vec<IdentityProfile>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            log_path: "./data/detection_log.csv".to_string(),
            static_root: "./static".to_string(),
            image_subdir: "captured_faces/alerts".to_string(),
            confidence_threshold: 30,
            alert_category: "terrorist".to_string(),
            bind_addr: "127.0.0.1:5000".to_string(),
            detector_command: Vec::new(),
            alarm: AlarmConfig::default(),
            email: EmailConfig::default(),
            sms: SmsConfig::default(),
            profiles: Vec::new(),
        }
    }
}

impl WatchConfig {
    /// Config file location: CLI flag, then `VIGIL_CONFIG`, then `./vigil.toml`.
    pub fn resolve_path(cli: Option<PathBuf>) -> PathBuf {
        cli.or_else(|| env::var("VIGIL_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("./vigil.toml"))
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    /// Environment overrides and validation always apply.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            WatchConfig::default()
        };
        config.apply_env_overrides();
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var("VIGIL_BIND_ADDR") {
            self.bind_addr = value;
        }
        if let Ok(value) = env::var("VIGIL_EMAIL_PASSWORD") {
            self.email.password = Some(value);
        }
        if let Ok(value) = env::var("VIGIL_SMS_ACCOUNT_SID") {
            self.sms.account_sid = Some(value);
        }
        if let Ok(value) = env::var("VIGIL_SMS_AUTH_TOKEN") {
            self.sms.auth_token = Some(value);
        }
        if let Ok(value) = env::var("VIGIL_SMS_FROM_NUMBER") {
            self.sms.from_number = Some(value);
        }
    }

    /// Collapse empty-string credentials to "not configured".
    fn normalize(&mut self) {
        for slot in [
            &mut self.email.password,
            &mut self.sms.account_sid,
            &mut self.sms.auth_token,
            &mut self.sms.from_number,
        ] {
            if slot.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *slot = None;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr
            .parse::<std::net::SocketAddr>()
            .map_err(ConfigError::InvalidBindAddr)?;
        if !(0..=100).contains(&self.confidence_threshold) {
            return Err(ConfigError::ThresholdOutOfRange);
        }
        Ok(())
    }

    /// On-disk snapshot directory.
    pub fn image_dir(&self) -> PathBuf {
        Path::new(&self.static_root).join(&self.image_subdir)
    }

    pub fn detection_log(&self) -> DetectionLog {
        DetectionLog::new(
            &self.log_path,
            self.image_dir(),
            self.image_subdir.trim_matches('/'),
        )
    }

    pub fn directory(&self) -> IdentityDirectory {
        IdentityDirectory::new(self.profiles.clone(), self.alert_category.clone())
    }

    /// Build the three production channels in dispatch order.
    pub fn channels(&self) -> Vec<Arc<dyn NotificationChannel>> {
        let alarm = AlarmChannel::new(
            self.alarm.player.clone(),
            &self.alarm.clip,
            Duration::from_secs(self.alarm.max_play_secs),
        );
        let email = EmailChannel::new(
            &self.email.smtp_host,
            self.email.smtp_port,
            &self.email.sender,
            &self.email.recipient,
            self.email.password.clone(),
            &self.email.subject,
        );
        let sms = SmsChannel::new(
            &self.sms.api_base,
            self.sms.account_sid.clone(),
            self.sms.auth_token.clone(),
            self.sms.from_number.clone(),
            &self.sms.to_number,
            Duration::from_secs(self.sms.cooldown_secs),
        );
        vec![Arc::new(alarm), Arc::new(email), Arc::new(sms)]
    }

    pub fn dispatcher(&self) -> AlertDispatcher {
        AlertDispatcher::new(self.channels())
    }
}
