use serde::Deserialize;
use spm_ipc::DaemonPaths;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const APP_NAME: &str = "spm";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("cannot read {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("cannot parse {path}: {source}")]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GlobalConfig {
	#[serde(default)]
	pub daemon: DaemonConfig,
	#[serde(default)]
	pub logs: LogsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
	pub state_dir: Option<PathBuf>,
	pub socket: Option<PathBuf>,
	pub pid_file: Option<PathBuf>,
	#[serde(default = "default_stop_timeout")]
	pub stop_timeout_secs: u64,
}

impl Default for DaemonConfig {
	fn default() -> Self {
		Self {
			state_dir: None,
			socket: None,
			pid_file: None,
			stop_timeout_secs: default_stop_timeout(),
		}
	}
}

fn default_stop_timeout() -> u64 {
	10
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogsConfig {
	#[serde(default = "default_level")]
	pub level: String,
	pub dir: Option<PathBuf>,
	#[serde(default = "default_max_size")]
	pub max_size_bytes: u64,
}

impl Default for LogsConfig {
	fn default() -> Self {
		Self {
			level: default_level(),
			dir: None,
			max_size_bytes: default_max_size(),
		}
	}
}

fn default_level() -> String {
	"info".to_string()
}
fn default_max_size() -> u64 {
	10 * 1024 * 1024
}

impl GlobalConfig {
	/// Config rooted at `dir`: state, logs and PID files all land below it.
	pub fn with_state_dir(dir: impl Into<PathBuf>) -> Self {
		let mut config = Self::default();
		config.daemon.state_dir = Some(dir.into());
		config
	}

	pub fn daemon_paths(&self) -> DaemonPaths {
		let mut paths = DaemonPaths::new(APP_NAME);
		if let Some(dir) = &self.daemon.state_dir {
			paths = paths.with_state_dir(dir);
		}
		if let Some(socket) = &self.daemon.socket {
			paths = paths.with_socket(socket);
		}
		if let Some(pid) = &self.daemon.pid_file {
			paths = paths.with_pid_file(pid);
		}
		paths
	}

	pub fn state_dir(&self) -> PathBuf {
		self.daemon_paths().state_dir()
	}

	pub fn log_dir(&self) -> PathBuf {
		self.logs
			.dir
			.clone()
			.unwrap_or_else(|| self.state_dir().join("logs"))
	}

	pub fn pid_dir(&self) -> PathBuf {
		self.state_dir().join("pids")
	}

	pub fn stop_timeout(&self) -> Duration {
		Duration::from_secs(self.daemon.stop_timeout_secs)
	}
}

pub fn default_config_path() -> PathBuf {
	DaemonPaths::new(APP_NAME).config_dir().join("config.toml")
}

/// Read the global config. A missing file yields the defaults.
pub fn load_global_config(path: &Path) -> Result<GlobalConfig, ConfigError> {
	let content = match std::fs::read_to_string(path) {
		Ok(c) => c,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(GlobalConfig::default()),
		Err(source) => {
			return Err(ConfigError::Io {
				path: path.to_path_buf(),
				source,
			})
		}
	};
	toml::from_str(&content).map_err(|source| ConfigError::Parse {
		path: path.to_path_buf(),
		source,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_when_sections_missing() {
		let config: GlobalConfig = toml::from_str("").unwrap();
		assert_eq!(config.daemon.stop_timeout_secs, 10);
		assert_eq!(config.logs.level, "info");
		assert_eq!(config.logs.max_size_bytes, 10 * 1024 * 1024);
		assert!(config.daemon.socket.is_none());
	}

	#[test]
	fn overrides_are_applied() {
		let config: GlobalConfig = toml::from_str(
			r#"
			[daemon]
			state_dir = "/var/lib/spm"
			socket = "/run/spm.sock"
			stop_timeout_secs = 3

			[logs]
			level = "debug"
			"#,
		)
		.unwrap();
		assert_eq!(config.stop_timeout(), Duration::from_secs(3));
		assert_eq!(config.daemon_paths().socket_path(), PathBuf::from("/run/spm.sock"));
		assert_eq!(config.daemon_paths().pid_path(), PathBuf::from("/var/lib/spm/daemon.pid"));
		assert_eq!(config.log_dir(), PathBuf::from("/var/lib/spm/logs"));
		assert_eq!(config.pid_dir(), PathBuf::from("/var/lib/spm/pids"));
		assert_eq!(config.logs.level, "debug");
	}

	#[test]
	fn missing_file_is_default() {
		let config = load_global_config(Path::new("/nonexistent/spm/config.toml")).unwrap();
		assert_eq!(config.daemon.stop_timeout_secs, 10);
	}

	#[test]
	fn bad_toml_is_a_parse_error() {
		let path = std::env::temp_dir().join(format!("spm-bad-config-{}.toml", std::process::id()));
		std::fs::write(&path, "[daemon\nstop_timeout_secs = ").unwrap();
		let err = load_global_config(&path).unwrap_err();
		assert!(matches!(err, ConfigError::Parse { .. }));
		let _ = std::fs::remove_file(&path);
	}
}
