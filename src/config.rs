// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the optional configuration file that sflctl reads
//! at startup. Every field has a default, so an empty or missing file is
//! equivalent to the built-in behavior.

use crate::store::FormatPreference;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

/// Configuration file layout.
///
/// # General Layout
///
/// Settings are split into two sections. The `[store]` section tells where
/// shared file list stores live and which format generation to use. The
/// `[reload]` section names the processes that must be restarted for the
/// sidebar to pick up changes.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Store location settings.
    pub store: StoreSettings,

    /// Reload settings.
    pub reload: ReloadSettings,
}

impl Settings {
    /// Load settings from file at path.
    ///
    /// A missing file yields default settings.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file content is invalid.
    /// - Return [`ConfigError::ShellExpansion`] if store directory expansion
    ///   fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(data) => data.parse(),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no configuration at {:?}, use defaults", path.display());
                Ok(Self::default())
            }
            Err(err) => Err(ConfigError::Read {
                source: err,
                path: path.into(),
            }),
        }
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on store directory field.
        if let Some(directory) = settings.store.directory.take() {
            settings.store.directory = Some(PathBuf::from(
                shellexpand::full(directory.to_string_lossy().as_ref())
                    .map_err(ConfigError::ShellExpansion)?
                    .into_owned(),
            ));
        }

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Store location settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Directory holding shared file list stores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Store format generation to use.
    pub format: FormatPreference,
}

/// Reload settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReloadSettings {
    /// Process name of the shared file list daemon.
    pub daemon: String,

    /// Process name of the file manager.
    pub finder: String,

    /// Always restart the file manager along with the daemon.
    pub always_force: bool,
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self {
            daemon: "sharedfilelistd".into(),
            finder: "Finder".into(),
            always_force: false,
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("BLAH", "/Users/blah")])]
    fn deserialize_settings() -> anyhow::Result<()> {
        let result: Settings = r#"
            [store]
            directory = "$BLAH/sfl"
            format = "legacy"

            [reload]
            finder = "Path Finder"
            always_force = true
        "#
        .parse()?;

        let expect = Settings {
            store: StoreSettings {
                directory: Some("/Users/blah/sfl".into()),
                format: FormatPreference::Legacy,
            },
            reload: ReloadSettings {
                daemon: "sharedfilelistd".into(),
                finder: "Path Finder".into(),
                always_force: true,
            },
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn deserialize_empty_settings() -> anyhow::Result<()> {
        let result: Settings = "".parse()?;
        assert_eq!(result, Settings::default());

        Ok(())
    }

    #[test]
    fn reject_unknown_format() {
        let result = "[store]\nformat = \"sfl9\"\n".parse::<Settings>();
        assert!(matches!(result, Err(ConfigError::Deserialize(_))));
    }

    #[test]
    fn serialize_settings() {
        let result = Settings {
            store: StoreSettings {
                directory: Some("/Users/blah/sfl".into()),
                format: FormatPreference::Current,
            },
            reload: ReloadSettings::default(),
        }
        .to_string();

        let expect = indoc! {r#"
            [store]
            directory = "/Users/blah/sfl"
            format = "current"

            [reload]
            daemon = "sharedfilelistd"
            finder = "Finder"
            always_force = false
        "#};

        assert_eq!(result, expect);
    }

    #[test]
    fn load_missing_file_yields_defaults() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let result = Settings::load(dir.path().join("config.toml"))?;
        assert_eq!(result, Settings::default());

        Ok(())
    }
}
