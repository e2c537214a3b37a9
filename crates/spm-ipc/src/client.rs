use std::io;
use std::marker::PhantomData;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::frame::{self, FrameError};
use crate::paths::DaemonPaths;

/// Errors from daemon client operations.
#[derive(Debug, Error)]
pub enum ClientError {
	/// Daemon is not running (socket missing or refusing connections).
	#[error("daemon not running")]
	NotRunning,
	#[error("io error: {0}")]
	Io(#[from] io::Error),
	#[error("serialize error: {0}")]
	Serialize(String),
	#[error("deserialize error: {0}")]
	Deserialize(String),
	#[error("protocol error: {0}")]
	Protocol(String),
}

impl From<FrameError> for ClientError {
	fn from(e: FrameError) -> Self {
		match e {
			FrameError::Io(e) => ClientError::Io(e),
			other => ClientError::Protocol(other.to_string()),
		}
	}
}

/// Blocking client for one request/response exchange with the daemon.
///
/// The daemon closes the connection after answering, so `send` consumes the
/// client.
pub struct DaemonClient<Req, Resp> {
	stream: UnixStream,
	_phantom: PhantomData<(Req, Resp)>,
}

impl<Req, Resp> DaemonClient<Req, Resp>
where
	Req: Serialize,
	Resp: DeserializeOwned,
{
	pub fn connect(paths: &DaemonPaths) -> Result<Self, ClientError> {
		let stream =
			UnixStream::connect(paths.socket_path()).map_err(|_| ClientError::NotRunning)?;
		Ok(Self {
			stream,
			_phantom: PhantomData,
		})
	}

	pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<(), ClientError> {
		self.stream.set_read_timeout(timeout)?;
		self.stream.set_write_timeout(timeout)?;
		Ok(())
	}

	/// Send a request and wait for the answer.
	///
	/// `Ok(None)` means the daemon closed the connection without a response
	/// frame, which it does when a request touched nothing.
	pub fn send(mut self, request: &Req) -> Result<Option<Resp>, ClientError> {
		let data = serde_json::to_vec(request).map_err(|e| ClientError::Serialize(e.to_string()))?;
		frame::write_frame(&mut self.stream, &data)?;

		let payload = match frame::read_frame(&mut self.stream)? {
			Some(p) => p,
			None => return Ok(None),
		};
		if payload.is_empty() {
			return Ok(None);
		}

		serde_json::from_slice(&payload)
			.map(Some)
			.map_err(|e| ClientError::Deserialize(e.to_string()))
	}
}

/// Check if a daemon is running (socket is connectable).
pub fn is_running(paths: &DaemonPaths) -> bool {
	UnixStream::connect(paths.socket_path()).is_ok()
}

/// Read the PID of a running daemon from its PID file.
pub fn read_pid(paths: &DaemonPaths) -> Option<u32> {
	std::fs::read_to_string(paths.pid_path())
		.ok()
		.and_then(|s| s.trim().parse().ok())
}

/// Whether the PID file points at a live process.
pub fn pid_alive(paths: &DaemonPaths) -> bool {
	use nix::sys::signal::kill;
	use nix::unistd::Pid;
	match read_pid(paths) {
		Some(pid) if pid > 0 => kill(Pid::from_raw(pid as i32), None).is_ok(),
		_ => false,
	}
}
