use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::RefgetError;
use crate::window::DateWindow;

pub const DEFAULT_CONFIG_FILE: &str = "refget-loader.json";
pub const DEFAULT_SEARCH_URL: &str = "https://www.ebi.ac.uk/ena/data/warehouse/search";
pub const DEFAULT_URL_PREFIX: &str = "ftp://ftp.ebi.ac.uk";
pub const DEFAULT_MOUNT_PATH: &str = "/nfs/ftp";
pub const DEFAULT_SUBMIT_COMMAND: &str = "bsub";

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    #[serde(default)]
    pub environment: EnvironmentConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    EnaAssembly(EnaAssemblySourceConfig),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnaAssemblySourceConfig {
    pub processing_dir: Utf8PathBuf,
    pub start_date: String,
    pub number_of_days: u32,
    pub ena_refget_processor_script: String,
    #[serde(default = "default_search_url")]
    pub search_url: String,
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
    #[serde(default = "default_mount_path")]
    pub mount_path: Utf8PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum DestinationConfig {
    #[serde(rename = "aws_s3")]
    AwsS3(UploadDestinationConfig),
}

impl DestinationConfig {
    pub fn type_name(&self) -> &'static str {
        match self {
            DestinationConfig::AwsS3(_) => "aws_s3",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UploadDestinationConfig {
    pub bucket_name: String,
    #[serde(default)]
    pub profile: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EnvironmentConfig {
    #[default]
    Local,
    Ebi {
        #[serde(default = "default_submit_command")]
        submit_command: String,
    },
}

#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub processing_dir: Utf8PathBuf,
    pub start: DateWindow,
    pub number_of_days: u32,
    pub converter_script: String,
    pub search_url: String,
    pub url_prefix: String,
    pub mount_path: Utf8PathBuf,
}

impl ResolvedSource {
    /// Rewrites a remote resource URL to the path it is mounted at locally.
    pub fn local_input_path(&self, url: &str) -> Utf8PathBuf {
        match url.strip_prefix(self.url_prefix.as_str()) {
            Some(rest) => {
                let mut path = self.mount_path.to_string();
                if !rest.starts_with('/') {
                    path.push('/');
                }
                path.push_str(rest);
                Utf8PathBuf::from(path)
            }
            None => Utf8PathBuf::from(url),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config_path: Utf8PathBuf,
    pub source: ResolvedSource,
    pub destination: DestinationConfig,
    pub environment: EnvironmentConfig,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, RefgetError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => Self::default_path().ok_or(RefgetError::MissingConfig)?,
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| RefgetError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| RefgetError::ConfigParse(err.to_string()))?;

        let absolute = fs::canonicalize(&config_path)
            .map_err(|_| RefgetError::ConfigRead(config_path.clone()))?;
        let config_path = Utf8PathBuf::from_path_buf(absolute)
            .map_err(RefgetError::ConfigRead)?;

        Self::resolve_config(config, config_path)
    }

    pub fn resolve_config(
        config: Config,
        config_path: Utf8PathBuf,
    ) -> Result<ResolvedConfig, RefgetError> {
        let source = match config.source {
            SourceConfig::EnaAssembly(source) => {
                if source.number_of_days == 0 {
                    return Err(RefgetError::ConfigParse(
                        "number_of_days must be at least 1".to_string(),
                    ));
                }
                let start = source
                    .start_date
                    .parse::<DateWindow>()
                    .map_err(|_| {
                        RefgetError::ConfigParse(format!(
                            "start_date must use YYYY-MM-DD, got {}",
                            source.start_date
                        ))
                    })?;
                ResolvedSource {
                    processing_dir: source.processing_dir,
                    start,
                    number_of_days: source.number_of_days,
                    converter_script: source.ena_refget_processor_script,
                    search_url: source.search_url,
                    url_prefix: source.url_prefix,
                    mount_path: source.mount_path,
                }
            }
        };

        Ok(ResolvedConfig {
            config_path,
            source,
            destination: config.destination,
            environment: config.environment,
        })
    }

    fn default_path() -> Option<PathBuf> {
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        ProjectDirs::from("org", "ga4gh", "refget-loader")
            .map(|dirs| dirs.config_dir().join("config.json"))
            .filter(|path| path.exists())
    }
}

fn default_search_url() -> String {
    DEFAULT_SEARCH_URL.to_string()
}

fn default_url_prefix() -> String {
    DEFAULT_URL_PREFIX.to_string()
}

fn default_mount_path() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_MOUNT_PATH)
}

fn default_submit_command() -> String {
    DEFAULT_SUBMIT_COMMAND.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<ResolvedConfig, RefgetError> {
        let config: Config =
            serde_json::from_str(json).map_err(|err| RefgetError::ConfigParse(err.to_string()))?;
        ConfigLoader::resolve_config(config, Utf8PathBuf::from("/tmp/config.json"))
    }

    #[test]
    fn parse_config_with_defaults() {
        let resolved = parse(
            r#"{
                "source": {
                    "type": "ena_assembly",
                    "processing_dir": "/data/refget",
                    "start_date": "2019-08-02",
                    "number_of_days": 2,
                    "ena_refget_processor_script": "/opt/process"
                },
                "destination": {"type": "aws_s3", "bucket_name": "refget"}
            }"#,
        )
        .unwrap();

        assert_eq!(resolved.source.number_of_days, 2);
        assert_eq!(resolved.source.start.to_string(), "2019-08-02");
        assert_eq!(resolved.source.search_url, DEFAULT_SEARCH_URL);
        assert_eq!(resolved.environment, EnvironmentConfig::Local);
        assert_eq!(
            resolved.destination,
            DestinationConfig::AwsS3(UploadDestinationConfig {
                bucket_name: "refget".to_string(),
                profile: None,
            })
        );
    }

    #[test]
    fn grid_environment_defaults_to_bsub() {
        let resolved = parse(
            r#"{
                "source": {
                    "type": "ena_assembly",
                    "processing_dir": "/data/refget",
                    "start_date": "2019-08-02",
                    "number_of_days": 1,
                    "ena_refget_processor_script": "/opt/process"
                },
                "destination": {"type": "aws_s3", "bucket_name": "refget", "profile": "p"},
                "environment": {"type": "ebi"}
            }"#,
        )
        .unwrap();
        assert_eq!(
            resolved.environment,
            EnvironmentConfig::Ebi {
                submit_command: "bsub".to_string()
            }
        );
    }

    #[test]
    fn rejects_zero_days() {
        let err = parse(
            r#"{
                "source": {
                    "type": "ena_assembly",
                    "processing_dir": "/data",
                    "start_date": "2019-08-02",
                    "number_of_days": 0,
                    "ena_refget_processor_script": "/opt/process"
                },
                "destination": {"type": "aws_s3", "bucket_name": "refget"}
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, RefgetError::ConfigParse(_)));
    }

    #[test]
    fn maps_ftp_url_to_mount() {
        let resolved = parse(
            r#"{
                "source": {
                    "type": "ena_assembly",
                    "processing_dir": "/data",
                    "start_date": "2019-08-02",
                    "number_of_days": 1,
                    "ena_refget_processor_script": "/opt/process"
                },
                "destination": {"type": "aws_s3", "bucket_name": "refget"}
            }"#,
        )
        .unwrap();
        assert_eq!(
            resolved
                .source
                .local_input_path("ftp://ftp.ebi.ac.uk/pub/databases/ena/wgs/SPQE01.dat.gz"),
            Utf8PathBuf::from("/nfs/ftp/pub/databases/ena/wgs/SPQE01.dat.gz")
        );
    }
}
