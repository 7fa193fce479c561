use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;

use crate::domain::services::GroupingMode;
use crate::domain::value_objects::{BackoffPolicy, MediaCandidate, PpeClass, SessionConfig};
use crate::infrastructure::media::describe_file;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "ppe-session",
    version = "0.1.0",
    about = "PPE detection session manager for uploaded videos and live cameras"
)]
pub struct Config {
    /// Base URL of the inference backend
    #[arg(long, env = "PPE_BACKEND_URL", default_value = "http://127.0.0.1:5000")]
    pub backend_url: String,

    /// Video file to upload and analyse
    #[arg(short, long, conflicts_with = "device")]
    pub file: Option<PathBuf>,

    /// Capture device to analyse live (index or device path)
    #[arg(short, long)]
    pub device: Option<String>,

    /// Declared MIME type of the file, guessed from its extension if omitted
    #[arg(long)]
    pub mime_type: Option<String>,

    /// Status server port
    #[arg(long, env = "STATUS_PORT", default_value = "9003")]
    pub status_port: u16,

    /// Silence before the stream counts as degraded, in milliseconds
    #[arg(long, default_value = "5000")]
    pub liveness_timeout_ms: u64,

    /// Time allowed to recover a degraded stream, in milliseconds
    #[arg(long, default_value = "15000")]
    pub reconnect_timeout_ms: u64,

    /// Sliding window of the statistics, in milliseconds
    #[arg(long, default_value = "2000")]
    pub aggregation_window_ms: u64,

    /// PPE classes a subject must wear
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "helmet,jacket,gloves,mask,eyewear,boots,shield"
    )]
    pub required_ppe: Vec<String>,

    /// Reject files larger than this many megabytes
    #[arg(long)]
    pub max_file_size_mb: Option<u64>,

    /// Ignore detections below this confidence
    #[arg(long, default_value = "0.5")]
    pub min_confidence: f32,

    /// Group objects into subjects when their box centres are this close
    #[arg(long)]
    pub proximity: Option<f32>,

    /// Time a stop waits for the backend before forcing, in milliseconds
    #[arg(long, default_value = "3000")]
    pub stop_grace_ms: u64,

    /// Initial stream reconnection delay in milliseconds
    #[arg(long, default_value = "500")]
    pub reconnect_initial_delay_ms: u64,

    /// Maximum stream reconnection delay in milliseconds
    #[arg(long, default_value = "5000")]
    pub reconnect_max_delay_ms: u64,

    /// Reconnection backoff multiplier
    #[arg(long, default_value = "2.0")]
    pub reconnect_multiplier: f64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Minimum allowed port (ports below 1024 are privileged)
const MIN_USER_PORT: u16 = 1024;

const BYTES_PER_MB: u64 = 1024 * 1024;

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.backend_url.starts_with("http://") && !self.backend_url.starts_with("https://") {
            anyhow::bail!("Backend URL must start with http:// or https://");
        }

        match (&self.file, &self.device) {
            (None, None) => anyhow::bail!("Either --file or --device is required"),
            (Some(_), Some(_)) => anyhow::bail!("--file and --device cannot be used together"),
            _ => {}
        }

        Self::validate_port(self.status_port, "status")?;

        if self.required_ppe.is_empty() {
            anyhow::bail!("At least one required PPE class must be given");
        }
        for label in &self.required_ppe {
            PpeClass::from_str(label).map_err(|e| anyhow::anyhow!(e))?;
        }

        if !(0.0..=1.0).contains(&self.min_confidence) {
            anyhow::bail!("Minimum confidence must be within [0, 1]");
        }

        if self.reconnect_max_delay_ms < self.reconnect_initial_delay_ms {
            anyhow::bail!(
                "Maximum reconnection delay ({}) cannot be less than initial delay ({})",
                self.reconnect_max_delay_ms,
                self.reconnect_initial_delay_ms
            );
        }

        Ok(())
    }

    fn validate_port(port: u16, name: &str) -> anyhow::Result<()> {
        if port == 0 {
            anyhow::bail!("Invalid {} port: port cannot be 0", name);
        }
        if port < MIN_USER_PORT {
            anyhow::bail!(
                "Invalid {} port: {} is a privileged port (< {}). Use a port >= {}",
                name,
                port,
                MIN_USER_PORT,
                MIN_USER_PORT
            );
        }
        Ok(())
    }

    pub fn to_backoff_policy(&self) -> crate::domain::errors::Result<BackoffPolicy> {
        BackoffPolicy::new(
            Duration::from_millis(self.reconnect_initial_delay_ms),
            Duration::from_millis(self.reconnect_max_delay_ms),
            self.reconnect_multiplier,
        )
    }

    pub fn to_session_config(&self) -> crate::domain::errors::Result<SessionConfig> {
        let grouping = match self.proximity {
            Some(max_center_distance) => GroupingMode::Proximity {
                max_center_distance,
            },
            None => GroupingMode::PerObject,
        };
        let required = self
            .required_ppe
            .iter()
            .filter_map(|label| PpeClass::from_str(label).ok())
            .map(|class| class.label());

        let config = SessionConfig::default()
            .with_liveness_timeout(Duration::from_millis(self.liveness_timeout_ms))
            .with_reconnect_timeout(Duration::from_millis(self.reconnect_timeout_ms))
            .with_aggregation_window(Duration::from_millis(self.aggregation_window_ms))
            .with_required_ppe_classes(required)
            .with_file_size_limit(self.max_file_size_mb.map(|mb| mb * BYTES_PER_MB))
            .with_min_confidence(self.min_confidence)
            .with_grouping(grouping)
            .with_stop_grace_period(Duration::from_millis(self.stop_grace_ms))
            .with_backoff(self.to_backoff_policy()?);
        config.validate()?;
        Ok(config)
    }

    /// The media input named on the command line
    pub async fn to_media_candidate(&self) -> anyhow::Result<MediaCandidate> {
        if let Some(path) = &self.file {
            return Ok(describe_file(path, self.mime_type.as_deref()).await?);
        }
        match &self.device {
            Some(device) => Ok(MediaCandidate::device(device.clone())),
            None => anyhow::bail!("No media input configured"),
        }
    }
}
