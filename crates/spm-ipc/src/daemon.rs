use std::fs::OpenOptions;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::watch;

use crate::paths::DaemonPaths;

#[derive(Debug, Error)]
pub enum DaemonError {
	#[error("I/O error at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("daemon already running (pid {0})")]
	AlreadyRunning(u32),
	#[error("failed to start daemon: {0}")]
	Spawn(#[source] io::Error),
	#[error("daemon did not start listening on {0}")]
	StartTimeout(PathBuf),
}

fn io_err(path: impl Into<PathBuf>, source: io::Error) -> DaemonError {
	DaemonError::Io {
		path: path.into(),
		source,
	}
}

/// Why the daemon's main loop woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
	Interrupt,
	Terminate,
	/// SIGQUIT: leave children running, only tear down the daemon itself.
	Quit,
	/// A client asked for shutdown over the socket.
	Requested,
}

impl ShutdownReason {
	pub fn stops_children(self) -> bool {
		!matches!(self, ShutdownReason::Quit)
	}
}

/// Cloneable trigger for the daemon's shutdown channel.
#[derive(Clone)]
pub struct ShutdownHandle {
	tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
	pub fn shutdown(&self) {
		self.tx.send_replace(true);
	}

	pub fn is_triggered(&self) -> bool {
		*self.tx.borrow()
	}
}

/// Process-wide daemon state, built once at startup and passed down.
pub struct RuntimeContext {
	pub paths: DaemonPaths,
	pub pid: u32,
	pub started_at: SystemTime,
	shutdown_tx: Arc<watch::Sender<bool>>,
	shutdown_rx: watch::Receiver<bool>,
}

impl RuntimeContext {
	pub fn new(paths: DaemonPaths) -> Self {
		let (tx, rx) = watch::channel(false);
		Self {
			paths,
			pid: std::process::id(),
			started_at: SystemTime::now(),
			shutdown_tx: Arc::new(tx),
			shutdown_rx: rx,
		}
	}

	pub fn shutdown_handle(&self) -> ShutdownHandle {
		ShutdownHandle {
			tx: Arc::clone(&self.shutdown_tx),
		}
	}

	/// Create the state directory and claim the PID file.
	///
	/// The returned guard removes the PID file and socket when dropped, on
	/// every exit path of the daemon's main function.
	pub fn prepare(&self) -> Result<DaemonGuard, DaemonError> {
		if let Some(pid) = crate::client::read_pid(&self.paths) {
			if pid != self.pid && crate::client::pid_alive(&self.paths) {
				return Err(DaemonError::AlreadyRunning(pid));
			}
		}

		let state_dir = self.paths.state_dir();
		std::fs::create_dir_all(&state_dir).map_err(|e| io_err(&state_dir, e))?;

		let pid_path = self.paths.pid_path();
		std::fs::write(&pid_path, self.pid.to_string()).map_err(|e| io_err(&pid_path, e))?;

		tracing::info!("daemon started (pid {})", self.pid);
		Ok(DaemonGuard {
			paths: self.paths.clone(),
		})
	}

	/// Block until a termination signal arrives or shutdown is requested.
	pub async fn wait_for_shutdown(&self) -> ShutdownReason {
		let mut rx = self.shutdown_rx.clone();
		let mut interrupt = install(SignalKind::interrupt());
		let mut terminate = install(SignalKind::terminate());
		let mut quit = install(SignalKind::quit());

		let reason = tokio::select! {
			_ = recv(&mut interrupt) => ShutdownReason::Interrupt,
			_ = recv(&mut terminate) => ShutdownReason::Terminate,
			_ = recv(&mut quit) => ShutdownReason::Quit,
			_ = rx.wait_for(|stop| *stop) => ShutdownReason::Requested,
		};
		tracing::info!("shutting down ({:?})", reason);
		reason
	}
}

fn install(kind: SignalKind) -> Option<Signal> {
	match signal(kind) {
		Ok(s) => Some(s),
		Err(e) => {
			tracing::warn!("cannot install handler for {:?}: {}", kind, e);
			None
		}
	}
}

async fn recv(sig: &mut Option<Signal>) {
	match sig {
		Some(s) => {
			s.recv().await;
		}
		None => std::future::pending::<()>().await,
	}
}

/// Removes the daemon's socket and PID file when dropped.
pub struct DaemonGuard {
	paths: DaemonPaths,
}

impl DaemonGuard {
	pub fn cleanup(&self) {
		for path in [self.paths.socket_path(), self.paths.pid_path()] {
			match std::fs::remove_file(&path) {
				Ok(()) => {}
				Err(e) if e.kind() == io::ErrorKind::NotFound => {}
				Err(e) => tracing::warn!("failed to remove {}: {}", path.display(), e),
			}
		}
	}
}

impl Drop for DaemonGuard {
	fn drop(&mut self) {
		self.cleanup();
	}
}

/// Re-execute the current binary detached from the caller's terminal.
///
/// The child gets its own process group so the caller's Ctrl-C does not
/// reach it; stderr is appended to the daemon log.
pub fn spawn_background(paths: &DaemonPaths, args: &[String]) -> Result<(), DaemonError> {
	let log_path = paths.daemon_log_path();
	if let Some(parent) = log_path.parent() {
		std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
	}
	let log = OpenOptions::new()
		.create(true)
		.append(true)
		.open(&log_path)
		.map_err(|e| io_err(&log_path, e))?;

	let binary = find_current_binary();
	std::process::Command::new(&binary)
		.args(args)
		.stdin(Stdio::null())
		.stdout(Stdio::null())
		.stderr(Stdio::from(log))
		.process_group(0)
		.spawn()
		.map_err(DaemonError::Spawn)?;
	Ok(())
}

/// Poll the socket until the daemon answers or the budget runs out.
pub fn wait_until_running(paths: &DaemonPaths, budget: Duration) -> Result<(), DaemonError> {
	let step = Duration::from_millis(100);
	let mut waited = Duration::ZERO;
	while waited < budget {
		if crate::client::is_running(paths) {
			return Ok(());
		}
		std::thread::sleep(step);
		waited += step;
	}
	if crate::client::is_running(paths) {
		Ok(())
	} else {
		Err(DaemonError::StartTimeout(paths.socket_path()))
	}
}

fn find_current_binary() -> PathBuf {
	std::env::current_exe().unwrap_or_else(|_| PathBuf::from("spm"))
}
