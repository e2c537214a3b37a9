use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

const RING_BUFFER_SIZE: usize = 64 * 1024;

/// Captured stdout/stderr of one process.
///
/// Bytes go to a buffered log file (rotated once it passes `max_size`) and to
/// an in-memory ring that keeps the most recent output for `spm log`.
#[derive(Clone)]
pub struct LogSink {
	ring: Arc<Mutex<VecDeque<u8>>>,
	writer: Arc<Mutex<LogWriter>>,
}

struct LogWriter {
	file: Option<BufWriter<File>>,
	path: PathBuf,
	bytes_written: u64,
	max_size: u64,
}

impl LogSink {
	pub fn new(log_dir: &Path, project: &str, process: &str, max_size: u64) -> Self {
		let path = log_dir.join(project).join(format!("{}.log", process));
		let file = open_append(&path);
		let bytes_written = file
			.as_ref()
			.and_then(|f| f.get_ref().metadata().ok())
			.map(|m| m.len())
			.unwrap_or(0);

		Self {
			ring: Arc::new(Mutex::new(VecDeque::with_capacity(RING_BUFFER_SIZE))),
			writer: Arc::new(Mutex::new(LogWriter {
				file,
				path,
				bytes_written,
				max_size,
			})),
		}
	}

	pub async fn path(&self) -> PathBuf {
		self.writer.lock().await.path.clone()
	}

	pub async fn write(&self, data: &[u8]) {
		{
			let mut ring = self.ring.lock().await;
			let overflow = (ring.len() + data.len()).saturating_sub(RING_BUFFER_SIZE);
			let n = overflow.min(ring.len());
			ring.drain(..n);
			let keep = data.len().min(RING_BUFFER_SIZE);
			ring.extend(&data[data.len() - keep..]);
		}

		self.writer.lock().await.write(data);
	}

	pub async fn snapshot(&self) -> Vec<u8> {
		let ring = self.ring.lock().await;
		ring.iter().copied().collect()
	}

	/// Last `lines` lines of captured output.
	pub async fn tail(&self, lines: usize) -> String {
		let snapshot = self.snapshot().await;
		let text = String::from_utf8_lossy(&snapshot);
		let all: Vec<&str> = text.lines().collect();
		let start = all.len().saturating_sub(lines);
		all[start..].join("\n")
	}

	pub async fn flush(&self) -> io::Result<()> {
		let mut writer = self.writer.lock().await;
		match writer.file.as_mut() {
			Some(file) => file.flush(),
			None => Ok(()),
		}
	}
}

impl LogWriter {
	fn write(&mut self, data: &[u8]) {
		let Some(file) = self.file.as_mut() else {
			return;
		};
		if let Err(e) = file.write_all(data) {
			tracing::warn!("failed to write {}: {}", self.path.display(), e);
			return;
		}
		self.bytes_written += data.len() as u64;
		if self.max_size > 0 && self.bytes_written >= self.max_size {
			self.rotate();
		}
	}

	fn rotate(&mut self) {
		if let Some(mut file) = self.file.take() {
			let _ = file.flush();
		}

		let mut rotated = self.path.clone().into_os_string();
		rotated.push(".1");
		if let Err(e) = fs::rename(&self.path, &rotated) {
			tracing::warn!("failed to rotate {}: {}", self.path.display(), e);
		}

		self.file = open_append(&self.path);
		self.bytes_written = 0;
	}
}

fn open_append(path: &Path) -> Option<BufWriter<File>> {
	if let Some(parent) = path.parent() {
		let _ = fs::create_dir_all(parent);
	}
	match OpenOptions::new().create(true).append(true).open(path) {
		Ok(f) => Some(BufWriter::new(f)),
		Err(e) => {
			tracing::warn!("cannot open log file {}: {}", path.display(), e);
			None
		}
	}
}
