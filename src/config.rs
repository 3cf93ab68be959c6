use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,
    pub owner_id: Option<u64>, // sembrado en la tabla de superadmins al cargar

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub skip_threshold: usize,
    pub fallback_track: String,

    // Paths
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            command_prefix: std::env::var("COMMAND_PREFIX").unwrap_or_else(|_| "!".to_string()),
            owner_id: std::env::var("OWNER_ID")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|id| *id != 0),

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.2".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            skip_threshold: std::env::var("SKIP_THRESHOLD")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            fallback_track: std::env::var("FALLBACK_TRACK")
                .unwrap_or_else(|_| "https://www.youtube.com/watch?v=4kYSc64aU1w".to_string()),

            // Paths
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string())
                .into(),
        };

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(config.pics_dir())?;

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Directory holding the image-reply attachments.
    pub fn pics_dir(&self) -> PathBuf {
        self.data_dir.join("pic")
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Default volume must be between 0.0 and 2.0 (songbird's sane range)
    /// - Queue capacity and skip threshold must be non-zero
    /// - The command prefix must not be empty
    pub fn validate(&self) -> Result<()> {
        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.skip_threshold == 0 {
            anyhow::bail!("Skip threshold must be greater than 0");
        }

        if self.command_prefix.is_empty() {
            anyhow::bail!("Command prefix must not be empty");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes sensitive information like the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Prefix: {} (owner: {})\n  \
            Audio: {}% vol, {} queue slots, {} skip votes\n  \
            Data: {}",
            self.command_prefix,
            self.owner_id
                .map_or("none".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.skip_threshold,
            self.data_dir.display(),
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            command_prefix: "!".to_string(),
            owner_id: None,

            // Audio defaults
            default_volume: 0.2,
            max_queue_size: 100,
            skip_threshold: 3,
            fallback_track: "https://www.youtube.com/watch?v=4kYSc64aU1w".to_string(),

            // Path defaults
            data_dir: "./data".into(),
        }
    }
}
