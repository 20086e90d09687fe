use std::path::PathBuf;
use std::str::FromStr;

use clap::ValueEnum;
use image::ImageFormat;
use thiserror::Error;

pub const DEFAULT_TOKEN_CACHE: &str = "token.json";
pub const DEFAULT_CLIENT_SECRETS: &str = "credentials.json";
pub const DEFAULT_FALLBACK_CREDENTIALS: &str = "default_credentials.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid format '{0}'. Valid formats are: png, jpg, jpeg")]
    InvalidFormat(String),
}

/// Raster format converted images are written in. Anything outside this set
/// rejects the run before any network or disk activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TargetFormat {
    Png,
    Jpg,
    Jpeg,
}

impl TargetFormat {
    /// File extension used for converted output paths.
    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Png => "png",
            TargetFormat::Jpg => "jpg",
            TargetFormat::Jpeg => "jpeg",
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            TargetFormat::Png => ImageFormat::Png,
            TargetFormat::Jpg | TargetFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

impl FromStr for TargetFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "png" => Ok(TargetFormat::Png),
            "jpg" => Ok(TargetFormat::Jpg),
            "jpeg" => Ok(TargetFormat::Jpeg),
            _ => Err(ConfigError::InvalidFormat(value.to_string())),
        }
    }
}

/// One run's immutable configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub root_folder_id: String,
    pub local_root: PathBuf,
    pub verbose: bool,
    pub format: TargetFormat,
    pub token_cache_path: PathBuf,
    pub client_secrets_path: PathBuf,
    pub fallback_credentials_path: PathBuf,
}

impl RunConfig {
    pub fn new(
        root_folder_id: impl Into<String>,
        local_root: impl Into<PathBuf>,
        verbose: bool,
        format: TargetFormat,
    ) -> Self {
        Self {
            root_folder_id: root_folder_id.into(),
            local_root: local_root.into(),
            verbose,
            format,
            token_cache_path: PathBuf::from(DEFAULT_TOKEN_CACHE),
            client_secrets_path: PathBuf::from(DEFAULT_CLIENT_SECRETS),
            fallback_credentials_path: PathBuf::from(DEFAULT_FALLBACK_CREDENTIALS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_formats_case_insensitively() {
        assert_eq!("png".parse::<TargetFormat>().unwrap(), TargetFormat::Png);
        assert_eq!("JPG".parse::<TargetFormat>().unwrap(), TargetFormat::Jpg);
        assert_eq!("Jpeg".parse::<TargetFormat>().unwrap(), TargetFormat::Jpeg);
    }

    #[test]
    fn rejects_unknown_format() {
        let err = "webp".parse::<TargetFormat>().expect_err("webp is invalid");
        assert!(matches!(err, ConfigError::InvalidFormat(value) if value == "webp"));
    }

    #[test]
    fn jpg_and_jpeg_share_the_jpeg_encoder() {
        assert_eq!(TargetFormat::Jpg.image_format(), ImageFormat::Jpeg);
        assert_eq!(TargetFormat::Jpeg.image_format(), ImageFormat::Jpeg);
        assert_eq!(TargetFormat::Png.image_format(), ImageFormat::Png);
    }

    #[test]
    fn extension_matches_chosen_format() {
        assert_eq!(TargetFormat::Jpg.extension(), "jpg");
        assert_eq!(TargetFormat::Jpeg.extension(), "jpeg");
    }

    #[test]
    fn run_config_defaults_to_conventional_credential_paths() {
        let config = RunConfig::new("root-id", "mirror", false, TargetFormat::Png);
        assert_eq!(config.token_cache_path, PathBuf::from("token.json"));
        assert_eq!(config.client_secrets_path, PathBuf::from("credentials.json"));
        assert_eq!(
            config.fallback_credentials_path,
            PathBuf::from("default_credentials.json")
        );
    }
}
