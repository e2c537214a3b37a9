use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, MutexGuard};

use crate::config::GlobalConfig;
use crate::output::LogSink;
use crate::procfile::ProcessDef;
use crate::project::full_name;
use crate::protocol::ProcInfo;

/// How long to wait for a SIGKILLed group to be reaped.
const KILL_WAIT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
	#[default]
	Stopped,
	Running,
}

impl fmt::Display for ProcessState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProcessState::Stopped => f.write_str("stopped"),
			ProcessState::Running => f.write_str("running"),
		}
	}
}

#[derive(Debug, Error)]
pub enum ProcessError {
	#[error("failed to spawn {name}: {source}")]
	Spawn {
		name: String,
		#[source]
		source: io::Error,
	},
	#[error("failed to signal {name} (pid {pid}): {source}")]
	Signal {
		name: String,
		pid: u32,
		#[source]
		source: Errno,
	},
	#[error("{0} is not running")]
	NotRunning(String),
	#[error("{0} is no longer supervised")]
	Retired(String),
}

/// One supervised child.
///
/// Identity and configuration are immutable; the mutable part sits behind a
/// per-process mutex so a transition (check state, act, record) is one
/// critical section.
pub struct Process {
	pub full_name: String,
	pub name: String,
	pub project: String,
	def: ProcessDef,
	work_dir: PathBuf,
	pid_path: PathBuf,
	output: LogSink,
	inner: Mutex<ProcessInner>,
}

#[derive(Default)]
struct ProcessInner {
	state: ProcessState,
	pid: u32,
	start_at: Option<SystemTime>,
	stop_at: Option<SystemTime>,
	child: Option<Child>,
	retired: bool,
}

impl Process {
	pub fn new(project: &str, def: ProcessDef, work_dir: &Path, config: &GlobalConfig) -> Self {
		let pid_path = config
			.pid_dir()
			.join(project)
			.join(format!("{}.pid", def.name));
		let output = LogSink::new(&config.log_dir(), project, &def.name, config.logs.max_size_bytes);

		Self {
			full_name: full_name(project, &def.name),
			name: def.name.clone(),
			project: project.to_string(),
			def,
			work_dir: work_dir.to_path_buf(),
			pid_path,
			output,
			inner: Mutex::new(ProcessInner::default()),
		}
	}

	pub fn command(&self) -> &str {
		&self.def.command
	}

	pub fn pid_path(&self) -> &Path {
		&self.pid_path
	}

	pub fn output(&self) -> &LogSink {
		&self.output
	}

	/// Enter the process's critical section.
	pub async fn lock(&self) -> Lifecycle<'_> {
		Lifecycle {
			process: self,
			inner: self.inner.lock().await,
		}
	}

	pub async fn is_running(&self) -> bool {
		self.lock().await.is_running().await
	}

	pub async fn info(&self) -> ProcInfo {
		self.lock().await.info()
	}

	pub async fn flush(&self) -> io::Result<()> {
		self.output.flush().await
	}
}

/// A locked process. Every state transition goes through here.
pub struct Lifecycle<'a> {
	process: &'a Process,
	inner: MutexGuard<'a, ProcessInner>,
}

impl Lifecycle<'_> {
	pub fn state(&self) -> ProcessState {
		self.inner.state
	}

	pub fn pid(&self) -> u32 {
		self.inner.pid
	}

	pub fn start_at(&self) -> Option<SystemTime> {
		self.inner.start_at
	}

	pub fn stop_at(&self) -> Option<SystemTime> {
		self.inner.stop_at
	}

	pub fn info(&self) -> ProcInfo {
		ProcInfo {
			pid: self.inner.pid,
			name: self.process.full_name.clone(),
			start_at: unix_millis(self.inner.start_at),
			stop_at: unix_millis(self.inner.stop_at),
			status: self.inner.state,
		}
	}

	/// Liveness as the OS sees it. A child that died behind our back is
	/// recorded as stopped.
	pub async fn is_running(&mut self) -> bool {
		if self.inner.state != ProcessState::Running {
			return false;
		}

		let pid = self.inner.pid;
		let alive = match self.inner.child.as_mut() {
			Some(child) => match child.try_wait() {
				Ok(None) => true,
				Ok(Some(status)) => {
					let msg = format!("[spm] {} exited ({})\n", self.process.full_name, status);
					self.process.output.write(msg.as_bytes()).await;
					tracing::info!("{} exited on its own ({})", self.process.full_name, status);
					false
				}
				Err(_) => pid_alive(pid),
			},
			None => pid_alive(pid),
		};

		if !alive {
			self.mark_stopped();
		}
		alive
	}

	/// Mark the process as leaving the registry. Later starts are refused,
	/// so nothing can spawn a child the supervisor no longer tracks.
	pub fn retire(&mut self) {
		self.inner.retired = true;
	}

	pub async fn start(&mut self) -> Result<u32, ProcessError> {
		let process = self.process;
		if self.inner.retired {
			return Err(ProcessError::Retired(process.full_name.clone()));
		}
		let mut cmd = Command::new("sh");
		cmd.arg("-c")
			.arg(&process.def.command)
			.current_dir(&process.work_dir)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.process_group(0);

		for (key, val) in &process.def.env {
			cmd.env(key, val);
		}

		let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
			name: process.full_name.clone(),
			source,
		})?;
		let pid = child.id().ok_or_else(|| ProcessError::Spawn {
			name: process.full_name.clone(),
			source: io::Error::other("child exited before its pid was read"),
		})?;

		if let Some(stdout) = child.stdout.take() {
			tokio::spawn(pipe_output(stdout, process.output.clone()));
		}
		if let Some(stderr) = child.stderr.take() {
			tokio::spawn(pipe_output(stderr, process.output.clone()));
		}

		write_pid_file(&process.pid_path, pid);

		self.inner.state = ProcessState::Running;
		self.inner.pid = pid;
		self.inner.start_at = Some(SystemTime::now());
		self.inner.child = Some(child);

		let msg = format!("[spm] started {} (pid {})\n", process.full_name, pid);
		process.output.write(msg.as_bytes()).await;
		Ok(pid)
	}

	/// Terminate the process group: SIGTERM, up to `grace` to exit, then
	/// SIGKILL. A zero grace goes straight to SIGKILL.
	pub async fn stop(&mut self, grace: Duration) -> Result<(), ProcessError> {
		if !self.is_running().await {
			return Err(ProcessError::NotRunning(self.process.full_name.clone()));
		}

		let pid = self.inner.pid;
		let first = if grace.is_zero() { Signal::SIGKILL } else { Signal::SIGTERM };
		self.signal_group(first)?;

		let budget = if grace.is_zero() { KILL_WAIT } else { grace };
		if !self.wait_exit(budget).await {
			tracing::warn!(
				"{} (pid {}) still alive after {:?}, sending SIGKILL",
				self.process.full_name,
				pid,
				budget
			);
			self.signal_group(Signal::SIGKILL)?;
			if !self.wait_exit(KILL_WAIT).await {
				tracing::error!("{} (pid {}) did not exit after SIGKILL", self.process.full_name, pid);
			}
		}

		let msg = format!("[spm] stopped {} (pid {})\n", self.process.full_name, pid);
		self.process.output.write(msg.as_bytes()).await;
		self.mark_stopped();
		Ok(())
	}

	fn signal_group(&self, signal: Signal) -> Result<(), ProcessError> {
		let pid = self.inner.pid;
		match killpg(Pid::from_raw(pid as i32), signal) {
			Ok(()) | Err(Errno::ESRCH) => Ok(()),
			Err(source) => Err(ProcessError::Signal {
				name: self.process.full_name.clone(),
				pid,
				source,
			}),
		}
	}

	async fn wait_exit(&mut self, budget: Duration) -> bool {
		let pid = self.inner.pid;
		match self.inner.child.as_mut() {
			Some(child) => tokio::time::timeout(budget, child.wait()).await.is_ok(),
			None => {
				let deadline = tokio::time::Instant::now() + budget;
				while pid_alive(pid) {
					if tokio::time::Instant::now() >= deadline {
						return false;
					}
					tokio::time::sleep(POLL_INTERVAL).await;
				}
				true
			}
		}
	}

	fn mark_stopped(&mut self) {
		self.inner.state = ProcessState::Stopped;
		self.inner.pid = 0;
		self.inner.stop_at = Some(SystemTime::now());
		self.inner.child = None;

		match std::fs::remove_file(&self.process.pid_path) {
			Ok(()) => {}
			Err(e) if e.kind() == io::ErrorKind::NotFound => {}
			Err(e) => tracing::warn!("failed to remove {}: {}", self.process.pid_path.display(), e),
		}
	}
}

fn pid_alive(pid: u32) -> bool {
	pid > 0 && kill(Pid::from_raw(pid as i32), None).is_ok()
}

fn write_pid_file(path: &Path, pid: u32) {
	if let Some(parent) = path.parent() {
		let _ = std::fs::create_dir_all(parent);
	}
	if let Err(e) = std::fs::write(path, pid.to_string()) {
		tracing::warn!("failed to write {}: {}", path.display(), e);
	}
}

pub(crate) fn unix_millis(t: Option<SystemTime>) -> i64 {
	t.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
		.map(|d| d.as_millis() as i64)
		.unwrap_or(0)
}

async fn pipe_output<R: tokio::io::AsyncRead + Unpin>(mut reader: R, output: LogSink) {
	let mut buf = [0u8; 4096];
	loop {
		match reader.read(&mut buf).await {
			Ok(0) => break,
			Ok(n) => output.write(&buf[..n]).await,
			Err(_) => break,
		}
	}
}
