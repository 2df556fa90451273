use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use url::Url;

pub const DEFAULT_CONTROL_SOCKET_PATH: &str = "/run/signage/control.sock";
const DEFAULT_MEDIA_DIR: &str = "/var/lib/signage/media";
const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000/device";
const DEFAULT_PLACEHOLDER_IMAGE: &str = "/opt/signage/share/placeholder.jpeg";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Backend serving the announcement list for this device.
    pub backend: BackendConfig,
    /// Directory holding downloaded announcement files; relative
    /// `local-path` entries are resolved against it.
    pub media_dir: PathBuf,
    /// Carousel timing.
    pub playback: PlaybackOptions,
    /// Unix domain socket accepting runtime control commands.
    pub control_socket_path: PathBuf,
    /// Image shown while the playlist is empty.
    pub placeholder_image: PathBuf,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            media_dir: PathBuf::from(DEFAULT_MEDIA_DIR),
            playback: PlaybackOptions::default(),
            control_socket_path: PathBuf::from(DEFAULT_CONTROL_SOCKET_PATH),
            placeholder_image: PathBuf::from(DEFAULT_PLACEHOLDER_IMAGE),
        }
    }
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.media_dir.as_os_str().is_empty(),
            "media-dir must not be empty"
        );
        ensure!(
            !self.control_socket_path.as_os_str().is_empty(),
            "control-socket-path must not be empty"
        );
        ensure!(
            self.control_socket_path.file_name().is_some(),
            "control-socket-path must include a socket file name"
        );
        self.backend
            .validate()
            .context("invalid backend configuration")?;
        self.playback.validate()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct BackendConfig {
    pub base_url: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            access_key_id: None,
            secret_access_key: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl BackendConfig {
    /// Parsed base URL, normalised to end with `/` so relative joins append.
    pub fn base_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("backend.base-url {:?} is not a URL", self.base_url))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    fn validate(&self) -> Result<()> {
        let url = self.base_url()?;
        ensure!(
            matches!(url.scheme(), "http" | "https"),
            "backend.base-url must use http or https"
        );
        ensure!(
            self.access_key_id.is_some() == self.secret_access_key.is_some(),
            "backend.access-key-id and backend.secret-access-key must be set together"
        );
        ensure!(
            !self.request_timeout.is_zero(),
            "backend.request-timeout must be positive"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PlaybackOptions {
    /// Dwell time for images whose announcement carries no duration.
    #[serde(with = "humantime_serde")]
    pub image_duration: Duration,
    /// Added to a known video duration before the fallback advance fires,
    /// so a missing end-of-playback report cannot stall the carousel.
    #[serde(with = "humantime_serde")]
    pub video_end_grace: Duration,
}

impl PlaybackOptions {
    const fn default_image_duration() -> Duration {
        Duration::from_millis(3000)
    }

    const fn default_video_end_grace() -> Duration {
        Duration::from_millis(5000)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            !self.image_duration.is_zero(),
            "playback.image-duration must be positive"
        );
        Ok(())
    }
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            image_duration: Self::default_image_duration(),
            video_end_grace: Self::default_video_end_grace(),
        }
    }
}
