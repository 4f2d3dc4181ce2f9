use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment used when neither `--env` nor `APP_ENV` names one.
pub const DEFAULT_ENV: &str = "local";

/// Effective server configuration: typed host sections plus free-form module sections.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Name of the environment this config was loaded for.
    #[serde(default)]
    pub env: String,
    pub server: ServerConfig,
    /// `None` until a file or `-v` provides one; logging then falls back to defaults.
    pub logging: Option<LoggingConfig>,
    #[serde(default)]
    pub jobs: JobsConfig,
    /// `modules.<name>` sections, read through [`AppConfig::module_config`].
    #[serde(default)]
    pub modules: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
    #[serde(default)]
    pub cors_enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct JobsConfig {
    /// Run the in-process worker next to the HTTP server.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Logging configuration - maps targets to their logging settings.
/// Key "default" is the catch-all for logs that don't match an explicit target.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Section {
    pub console_level: String, // "info", "debug", "error", "off"
    #[serde(default)]
    pub file: String, // "logs/modwire.log"; empty disables the file sink
    #[serde(default)]
    pub file_level: String,
    #[serde(default)]
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_backups: Option<usize>, // How many files to keep
    #[serde(default)]
    pub max_size_mb: Option<u64>, // Max size of the file in MB
}

const fn default_timeout_sec() -> u64 {
    30
}

const fn default_body_limit() -> usize {
    2 * 1024 * 1024
}

const fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            timeout_sec: default_timeout_sec(),
            body_limit_bytes: default_body_limit(),
            cors_enabled: false,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Console at `info`, no file sink.
pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "info".to_string(),
            file: String::new(),
            file_level: "debug".to_string(),
            max_age_days: Some(7),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    );
    logging
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: DEFAULT_ENV.to_string(),
            server: ServerConfig::default(),
            logging: Some(default_logging_config()),
            jobs: JobsConfig::default(),
            modules: HashMap::new(),
        }
    }
}

/// Where configuration files come from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// A single YAML file; it must exist.
    File(PathBuf),
    /// `<dir>/base.yaml` then `<dir>/<env>.yaml`, each optional.
    Environment { dir: PathBuf, env: String },
}

impl ConfigSource {
    /// `--config` wins; otherwise the environment from `--env`, then `APP_ENV`, then `local`.
    pub fn from_args(args: &CliArgs, dir: impl Into<PathBuf>) -> Self {
        if let Some(path) = &args.config {
            return ConfigSource::File(PathBuf::from(path));
        }
        let env = args
            .env
            .clone()
            .or_else(|| std::env::var("APP_ENV").ok().filter(|v| !v.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_ENV.to_string());
        ConfigSource::Environment {
            dir: dir.into(),
            env,
        }
    }
}

impl AppConfig {
    /// Layered loading: defaults → YAML file(s) → `APP__` environment variables.
    pub fn load(source: &ConfigSource) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        // Start from a base where `logging` is None so it stays None unless provided.
        let base = AppConfig {
            logging: None,
            ..AppConfig::default()
        };
        let mut figment = Figment::new().merge(Serialized::defaults(base));

        let env_name = match source {
            ConfigSource::File(path) => {
                if !path.is_file() {
                    bail!("Config file not found: {}", path.display());
                }
                figment = figment.merge(Yaml::file(path));
                None
            }
            ConfigSource::Environment { dir, env } => {
                if env.trim().is_empty() || env.contains(['/', '\\']) {
                    bail!("Invalid environment name '{env}'");
                }
                figment = figment
                    .merge(Yaml::file(dir.join("base.yaml")))
                    .merge(Yaml::file(dir.join(format!("{env}.yaml"))));
                Some(env.clone())
            }
        };

        // Example: APP__SERVER__PORT=8087 maps to server.port
        figment = figment.merge(Env::prefixed("APP__").split("__"));

        let mut config: AppConfig = figment
            .extract()
            .with_context(|| "Failed to extract config from figment".to_string())?;
        if let Some(env) = env_name {
            config.env = env;
        }
        Ok(config)
    }

    /// Used by `--print-config`.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// `--port` and `-v`/`-vv` win over every file and environment layer.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(port) = args.port {
            self.server.port = port;
        }

        let logging = self.logging.get_or_insert_with(default_logging_config);
        if let Some(default_section) = logging.get_mut("default") {
            default_section.console_level = match args.verbose {
                0 => default_section.console_level.clone(), // keep
                1 => "debug".to_string(),
                _ => "trace".to_string(),
            };
        }
    }

    /// Typed view of `modules.<name>`. Absent section → `Ok(None)`.
    pub fn module_config<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.modules
            .get(name)
            .map(|raw| {
                serde_json::from_value(raw.clone())
                    .with_context(|| format!("Invalid configuration for module '{name}'"))
            })
            .transpose()
    }

    /// Directory relative log file paths are resolved against.
    pub fn log_base_dir(source: &ConfigSource) -> PathBuf {
        let dir = match source {
            ConfigSource::File(path) => path.parent().map(Path::to_path_buf),
            ConfigSource::Environment { dir, .. } => Some(dir.clone()),
        };
        dir.filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// The subset of CLI flags that affect configuration.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<String>,
    pub env: Option<String>,
    pub port: Option<u16>,
    pub print_config: bool,
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_structure() {
        let config = AppConfig::default();
        assert_eq!(config.env, "local");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.server.body_limit_bytes, 2 * 1024 * 1024);
        assert!(config.jobs.enabled);
        assert!(config.logging.as_ref().unwrap().contains_key("default"));
    }

    #[test]
    fn test_environment_layers_override_base() {
        let tmp = tempdir().unwrap();
        fs::write(
            tmp.path().join("base.yaml"),
            r#"
server:
  host: "0.0.0.0"
  port: 3000
modules:
  notifications:
    from: "noreply@example.com"
"#,
        )
        .unwrap();
        fs::write(
            tmp.path().join("production.yaml"),
            r#"
server:
  port: 8080
  cors_enabled: true
jobs:
  enabled: false
"#,
        )
        .unwrap();

        let source = ConfigSource::Environment {
            dir: tmp.path().to_path_buf(),
            env: "production".into(),
        };
        let config = AppConfig::load(&source).unwrap();
        assert_eq!(config.env, "production");
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert!(config.server.cors_enabled);
        assert!(!config.jobs.enabled);
        assert!(config.logging.is_none());
        assert_eq!(config.modules["notifications"]["from"], "noreply@example.com");
    }

    #[test]
    fn test_missing_environment_files_fall_back_to_defaults() {
        let tmp = tempdir().unwrap();
        let source = ConfigSource::Environment {
            dir: tmp.path().to_path_buf(),
            env: "test".into(),
        };
        let config = AppConfig::load(&source).unwrap();
        assert_eq!(config.env, "test");
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let tmp = tempdir().unwrap();
        let err = AppConfig::load(&ConfigSource::File(tmp.path().join("nope.yaml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_invalid_environment_name_is_rejected() {
        let source = ConfigSource::Environment {
            dir: PathBuf::from("."),
            env: "../etc".into(),
        };
        assert!(AppConfig::load(&source).is_err());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("bad.yaml");
        fs::write(
            &path,
            r#"
server:
  host: "127.0.0.1"
  port: 3000
  colour: "blue"
"#,
        )
        .unwrap();
        assert!(AppConfig::load(&ConfigSource::File(path)).is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = AppConfig::default();
        let args = CliArgs {
            port: Some(4000),
            verbose: 2,
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);

        assert_eq!(config.server.port, 4000);
        let logging = config.logging.as_ref().unwrap();
        assert_eq!(logging["default"].console_level, "trace");
    }

    #[test]
    fn test_cli_verbose_levels_matrix() {
        for (verbose, expected) in [(0, "info"), (1, "debug"), (2, "trace"), (3, "trace")] {
            let mut config = AppConfig::default();
            let args = CliArgs {
                verbose,
                ..CliArgs::default()
            };
            config.apply_cli_overrides(&args);
            assert_eq!(config.logging.as_ref().unwrap()["default"].console_level, expected);
        }
    }

    #[test]
    fn test_source_from_args_prefers_explicit_file() {
        let args = CliArgs {
            config: Some("custom.yaml".into()),
            env: Some("production".into()),
            ..CliArgs::default()
        };
        assert!(matches!(ConfigSource::from_args(&args, "config"), ConfigSource::File(p) if p == Path::new("custom.yaml")));

        let args = CliArgs {
            env: Some("development".into()),
            ..CliArgs::default()
        };
        match ConfigSource::from_args(&args, "config") {
            ConfigSource::Environment { dir, env } => {
                assert_eq!(dir, PathBuf::from("config"));
                assert_eq!(env, "development");
            }
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn test_module_config_typed_view() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Notifications {
            from: String,
        }

        let mut config = AppConfig::default();
        config.modules.insert(
            "notifications".into(),
            serde_json::json!({ "from": "ops@example.com" }),
        );
        config
            .modules
            .insert("broken".into(), serde_json::json!({ "from": 5 }));

        let n: Option<Notifications> = config.module_config("notifications").unwrap();
        assert_eq!(n.unwrap().from, "ops@example.com");
        assert!(config.module_config::<Notifications>("absent").unwrap().is_none());
        assert!(config.module_config::<Notifications>("broken").is_err());
    }

    #[test]
    fn test_to_yaml_roundtrip_basic() {
        let config = AppConfig::default();
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("server:"));
        assert!(yaml.contains("logging:"));

        let roundtrip: AppConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(roundtrip.server.port, config.server.port);
    }

    #[test]
    fn test_log_base_dir() {
        assert_eq!(
            AppConfig::log_base_dir(&ConfigSource::File(PathBuf::from("cfg/app.yaml"))),
            PathBuf::from("cfg")
        );
        assert_eq!(
            AppConfig::log_base_dir(&ConfigSource::File(PathBuf::from("app.yaml"))),
            PathBuf::from(".")
        );
    }
}
