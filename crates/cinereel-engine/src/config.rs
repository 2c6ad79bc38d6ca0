//! Studio-wide configuration.
//!
//! Every section defaults on its own, so a partial JSON document is enough:
//!
//! ```
//! use cinereel_engine::config::StudioConfig;
//!
//! let config = StudioConfig::from_json_str(r#"{ "recording": { "scan_radius": 16.0 } }"#).unwrap();
//! assert_eq!(config.recording.scan_radius, 16.0);
//! assert!(config.playback.despawn_on_stop);
//! assert_eq!(config.cutscene.arc_length_samples, 60);
//! ```

use serde::{Deserialize, Serialize};

use cinereel_capture::recording::RecordingConfig;

use crate::cutscene::CutsceneConfig;
use crate::playback::PlaybackConfig;
use crate::tick::TickConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    pub tick: TickConfig,
    pub recording: RecordingConfig,
    pub playback: PlaybackConfig,
    pub cutscene: CutsceneConfig,
}

impl StudioConfig {
    /// Parse and validate a configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a value is out of range.
    pub fn from_json_str(json: &str) -> Result<Self, anyhow::Error> {
        let config: StudioConfig = serde_json::from_str(json)
            .map_err(|e| anyhow::anyhow!("invalid studio config: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.tick.is_valid() {
            return Err(anyhow::anyhow!(
                "tick.fixed_dt must be positive and finite, got {}",
                self.tick.fixed_dt
            ));
        }
        if !(self.recording.scan_radius >= 0.0 && self.recording.scan_radius.is_finite()) {
            return Err(anyhow::anyhow!(
                "recording.scan_radius must be non-negative, got {}",
                self.recording.scan_radius
            ));
        }
        if self.cutscene.arc_length_samples == 0 {
            return Err(anyhow::anyhow!("cutscene.arc_length_samples must be at least 1"));
        }
        Ok(())
    }
}
