// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::RowkitConfigLayer;
use crate::sections::{DatabaseConfigLayer, LogFormat, LoggingConfigLayer};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<RowkitConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<RowkitConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(RowkitConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/rowkit/rowkit.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<RowkitConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(RowkitConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: RowkitConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: ROWKIT_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<RowkitConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(RowkitConfigLayer {
			database: Some(load_database_from_env()?),
			logging: Some(load_logging_from_env()?),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parse_value<T: FromStr>(name: &str, raw: &str, type_name: &str) -> Result<T, ConfigError> {
	raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
		key: name.to_string(),
		message: format!("invalid {type_name} value '{raw}'"),
	})
}

fn env_u32(name: &str) -> Result<Option<u32>, ConfigError> {
	env_var(name)
		.map(|v| parse_value(name, &v, "u32"))
		.transpose()
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
	env_var(name)
		.map(|v| parse_value(name, &v, "u64"))
		.transpose()
}

fn load_database_from_env() -> Result<DatabaseConfigLayer, ConfigError> {
	Ok(DatabaseConfigLayer {
		url: env_var("ROWKIT_DATABASE_URL"),
		max_connections: env_u32("ROWKIT_DATABASE_MAX_CONNECTIONS")?,
		busy_timeout_ms: env_u64("ROWKIT_DATABASE_BUSY_TIMEOUT_MS")?,
	})
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	let format = env_var("ROWKIT_LOG_FORMAT")
		.map(|v| {
			v.parse::<LogFormat>()
				.map_err(|message| ConfigError::InvalidValue {
					key: "ROWKIT_LOG_FORMAT".to_string(),
					message,
				})
		})
		.transpose()?;

	Ok(LoggingConfigLayer {
		level: env_var("ROWKIT_LOG_LEVEL"),
		format,
	})
}
