use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pasarport_core::DEFAULT_EXCLUDED_TABLES;
use pasarport_mysql::{DEFAULT_MAX_USAGE_ROWS, DatabaseConfig};
use pasarport_pipeline::{DEFAULT_ALEMBIC_VERSION, DEFAULT_BATCH_SIZE, MigrationOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("{var} is not set (or [{section}].{field} in the config file)")]
    Missing {
        var: String,
        section: &'static str,
        field: &'static str,
    },
    #[error("{var} must be a valid port number, got {value:?}")]
    InvalidPort { var: String, value: String },
}

/// `[source]` / `[target]` tables of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

/// `[migration]` table of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationSection {
    pub batch_size: Option<usize>,
    pub max_usage_rows: Option<u64>,
    /// Added to the built-in exclusions.
    pub exclude_tables: Vec<String>,
    pub clear_target: Option<bool>,
    pub set_alembic_version: Option<bool>,
    pub alembic_version: Option<String>,
    pub seed_settings: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub source: DatabaseSection,
    pub target: DatabaseSection,
    pub migration: MigrationSection,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }
}

/// Values given on the command line; `None` leaves lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub exclude_tables: Vec<String>,
    pub max_usage_rows: Option<u64>,
    pub batch_size: Option<usize>,
    pub no_clear: bool,
    pub skip_alembic: bool,
    pub alembic_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationSettings {
    pub batch_size: usize,
    /// 0 disables the cap.
    pub max_usage_rows: u64,
    pub excluded_tables: BTreeSet<String>,
    pub clear_target: bool,
    pub set_alembic_version: bool,
    pub alembic_version: String,
    pub seed_settings: bool,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_usage_rows: DEFAULT_MAX_USAGE_ROWS,
            excluded_tables: DEFAULT_EXCLUDED_TABLES
                .iter()
                .map(|table| table.to_string())
                .collect(),
            clear_target: true,
            set_alembic_version: true,
            alembic_version: DEFAULT_ALEMBIC_VERSION.to_string(),
            seed_settings: true,
        }
    }
}

impl MigrationSettings {
    fn apply_file(&mut self, section: &MigrationSection) {
        if let Some(batch_size) = section.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(max_usage_rows) = section.max_usage_rows {
            self.max_usage_rows = max_usage_rows;
        }
        self.excluded_tables
            .extend(section.exclude_tables.iter().cloned());
        if let Some(clear_target) = section.clear_target {
            self.clear_target = clear_target;
        }
        if let Some(enabled) = section.set_alembic_version {
            self.set_alembic_version = enabled;
        }
        if let Some(version) = &section.alembic_version {
            self.alembic_version = version.clone();
        }
        if let Some(seed_settings) = section.seed_settings {
            self.seed_settings = seed_settings;
        }
    }

    fn apply_overrides(&mut self, overrides: &Overrides) {
        self.excluded_tables.extend(
            overrides
                .exclude_tables
                .iter()
                .map(|table| table.trim().to_string())
                .filter(|table| !table.is_empty()),
        );
        if let Some(max_usage_rows) = overrides.max_usage_rows {
            self.max_usage_rows = max_usage_rows;
        }
        if let Some(batch_size) = overrides.batch_size {
            self.batch_size = batch_size;
        }
        if overrides.no_clear {
            self.clear_target = false;
        }
        if overrides.skip_alembic {
            self.set_alembic_version = false;
        }
        if let Some(version) = &overrides.alembic_version {
            self.alembic_version = version.clone();
        }
    }

    pub fn engine_options(&self) -> MigrationOptions {
        MigrationOptions {
            batch_size: self.batch_size,
            excluded_tables: self.excluded_tables.clone(),
            clear_target: self.clear_target,
            alembic_version: self
                .set_alembic_version
                .then(|| self.alembic_version.clone()),
            seed_settings: self.seed_settings,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub source: DatabaseConfig,
    pub target: DatabaseConfig,
    pub migration: MigrationSettings,
}

/// Resolve settings from the config file, the environment and the command
/// line, in increasing precedence.
pub fn load<F>(
    config_path: Option<&Path>,
    env: F,
    overrides: &Overrides,
) -> Result<Settings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let file = match config_path {
        Some(path) => FileConfig::read(path)?,
        None => FileConfig::default(),
    };
    resolve(file, env, overrides)
}

pub fn resolve<F>(file: FileConfig, env: F, overrides: &Overrides) -> Result<Settings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let source = database("MARZNESHIN", "source", &file.source, &env)?;
    let target = database("PASARGUARD", "target", &file.target, &env)?;

    let mut migration = MigrationSettings::default();
    migration.apply_file(&file.migration);
    migration.apply_overrides(overrides);

    Ok(Settings {
        source,
        target,
        migration,
    })
}

fn database<F>(
    prefix: &str,
    section_name: &'static str,
    section: &DatabaseSection,
    env: &F,
) -> Result<DatabaseConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |field: &'static str, from_file: Option<&String>| {
        let var = format!("{prefix}_{}", field.to_ascii_uppercase());
        env(&var)
            .or_else(|| from_file.cloned())
            .ok_or(ConfigError::Missing {
                var,
                section: section_name,
                field,
            })
    };

    let port_var = format!("{prefix}_PORT");
    let port = match env(&port_var) {
        Some(value) => value
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort {
                var: port_var.clone(),
                value,
            })?,
        None => section.port.ok_or(ConfigError::Missing {
            var: port_var,
            section: section_name,
            field: "port",
        })?,
    };

    Ok(DatabaseConfig {
        host: lookup("host", section.host.as_ref())?,
        port,
        user: lookup("user", section.user.as_ref())?,
        password: lookup("password", section.password.as_ref())?,
        database: match env(&format!("{prefix}_DB")) {
            Some(database) => database,
            None => section.database.clone().ok_or(ConfigError::Missing {
                var: format!("{prefix}_DB"),
                section: section_name,
                field: "database",
            })?,
        },
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: BTreeMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("MARZNESHIN_HOST", "10.0.0.2"),
            ("MARZNESHIN_PORT", "3306"),
            ("MARZNESHIN_USER", "marz"),
            ("MARZNESHIN_PASSWORD", "secret"),
            ("MARZNESHIN_DB", "marzneshin"),
            ("PASARGUARD_HOST", "10.0.0.3"),
            ("PASARGUARD_PORT", "3307"),
            ("PASARGUARD_USER", "pg"),
            ("PASARGUARD_PASSWORD", ""),
            ("PASARGUARD_DB", "pasarguard"),
        ]
    }

    #[test]
    fn environment_supplies_connections() {
        let settings = resolve(
            FileConfig::default(),
            env_of(&full_env()),
            &Overrides::default(),
        )
        .expect("settings");
        assert_eq!(settings.source.to_string(), "marz@10.0.0.2:3306/marzneshin");
        assert_eq!(settings.target.port, 3307);
        assert_eq!(settings.target.password, "");
        assert_eq!(settings.migration, MigrationSettings::default());
    }

    #[test]
    fn missing_variable_is_named() {
        let mut vars = full_env();
        vars.retain(|(key, _)| *key != "PASARGUARD_DB");
        let err = resolve(FileConfig::default(), env_of(&vars), &Overrides::default())
            .expect_err("missing database");
        assert!(err.to_string().contains("PASARGUARD_DB"));
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut vars = full_env();
        vars.push(("MARZNESHIN_PORT", "mysql"));
        vars.retain(|(key, value)| *key != "MARZNESHIN_PORT" || *value == "mysql");
        let err = resolve(FileConfig::default(), env_of(&vars), &Overrides::default())
            .expect_err("invalid port");
        assert!(matches!(err, ConfigError::InvalidPort { .. }));
    }

    #[test]
    fn layers_apply_in_order() {
        let file = FileConfig::parse(
            r#"
            [source]
            host = "file-host"
            port = 3310
            user = "file-user"
            password = "pw"
            database = "marz"

            [target]
            host = "target"
            port = 3306
            user = "root"
            password = "pw"
            database = "pasarguard"

            [migration]
            batch_size = 250
            max_usage_rows = 5000
            exclude_tables = ["node_stats"]
            "#,
        )
        .expect("parse config");

        let overrides = Overrides {
            exclude_tables: vec!["node_usages".into(), " ".into()],
            batch_size: Some(500),
            no_clear: true,
            skip_alembic: true,
            ..Overrides::default()
        };
        let settings =
            resolve(file, env_of(&[("MARZNESHIN_HOST", "env-host")]), &overrides).expect("settings");

        assert_eq!(settings.source.host, "env-host");
        assert_eq!(settings.source.port, 3310);
        assert_eq!(settings.migration.batch_size, 500);
        assert_eq!(settings.migration.max_usage_rows, 5000);
        assert!(settings.migration.excluded_tables.contains("node_stats"));
        assert!(settings.migration.excluded_tables.contains("node_usages"));
        assert!(settings.migration.excluded_tables.contains("jwt"));
        assert!(!settings.migration.excluded_tables.contains(""));

        let options = settings.migration.engine_options();
        assert!(!options.clear_target);
        assert!(options.alembic_version.is_none());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(FileConfig::parse("[migration]\nbatchsize = 10\n").is_err());
    }
}
