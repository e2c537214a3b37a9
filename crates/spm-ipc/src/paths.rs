use std::path::PathBuf;

/// Filesystem locations shared by the daemon and its clients.
///
/// Everything lives under the state directory unless an explicit override is
/// set, so a client and a daemon built from the same config agree on where the
/// socket is.
#[derive(Debug, Clone)]
pub struct DaemonPaths {
	pub app_name: String,
	state_dir: Option<PathBuf>,
	socket: Option<PathBuf>,
	pid_file: Option<PathBuf>,
}

impl DaemonPaths {
	pub fn new(app_name: impl Into<String>) -> Self {
		Self {
			app_name: app_name.into(),
			state_dir: None,
			socket: None,
			pid_file: None,
		}
	}

	pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.state_dir = Some(dir.into());
		self
	}

	pub fn with_socket(mut self, path: impl Into<PathBuf>) -> Self {
		self.socket = Some(path.into());
		self
	}

	pub fn with_pid_file(mut self, path: impl Into<PathBuf>) -> Self {
		self.pid_file = Some(path.into());
		self
	}

	pub fn state_dir(&self) -> PathBuf {
		if let Some(dir) = &self.state_dir {
			return dir.clone();
		}
		if let Ok(dir) = std::env::var("XDG_STATE_HOME") {
			PathBuf::from(dir).join(&self.app_name)
		} else if let Some(home) = home_dir() {
			home.join(".local").join("state").join(&self.app_name)
		} else {
			PathBuf::from("/tmp").join(&self.app_name)
		}
	}

	pub fn config_dir(&self) -> PathBuf {
		if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
			PathBuf::from(dir).join(&self.app_name)
		} else if let Some(home) = home_dir() {
			home.join(".config").join(&self.app_name)
		} else {
			PathBuf::from("/tmp").join(&self.app_name).join("config")
		}
	}

	pub fn socket_path(&self) -> PathBuf {
		self.socket
			.clone()
			.unwrap_or_else(|| self.state_dir().join("daemon.sock"))
	}

	pub fn pid_path(&self) -> PathBuf {
		self.pid_file
			.clone()
			.unwrap_or_else(|| self.state_dir().join("daemon.pid"))
	}

	/// Where a backgrounded daemon sends its stderr.
	pub fn daemon_log_path(&self) -> PathBuf {
		self.state_dir().join("logs").join("daemon.log")
	}
}

fn home_dir() -> Option<PathBuf> {
	std::env::var("HOME").ok().map(PathBuf::from)
}
