use std::future::Future;
use std::io;
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};

use crate::frame;
use crate::paths::DaemonPaths;

/// Bind the daemon socket, replacing a stale socket file left by a previous run.
pub fn bind(paths: &DaemonPaths) -> io::Result<UnixListener> {
	let socket_path = paths.socket_path();
	if let Some(parent) = socket_path.parent() {
		std::fs::create_dir_all(parent)?;
	}
	if socket_path.exists() {
		std::fs::remove_file(&socket_path)?;
	}
	let listener = UnixListener::bind(&socket_path)?;
	tracing::info!("listening on {}", socket_path.display());
	Ok(listener)
}

pub async fn run_socket_server<Req, Resp, F, Fut>(paths: &DaemonPaths, handler: F)
where
	Req: DeserializeOwned + Send + 'static,
	Resp: Serialize + Send + 'static,
	F: Fn(Req) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Option<Resp>> + Send,
{
	let listener = match bind(paths) {
		Ok(l) => l,
		Err(e) => {
			tracing::error!("failed to bind socket {}: {}", paths.socket_path().display(), e);
			return;
		}
	};
	serve(listener, handler).await;
}

/// Accept connections forever, one task per connection.
///
/// The handler returns `None` when it has nothing to report; the connection
/// is then closed without a response frame.
pub async fn serve<Req, Resp, F, Fut>(listener: UnixListener, handler: F)
where
	Req: DeserializeOwned + Send + 'static,
	Resp: Serialize + Send + 'static,
	F: Fn(Req) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Option<Resp>> + Send,
{
	let handler = Arc::new(handler);

	loop {
		let (stream, _) = match listener.accept().await {
			Ok(s) => s,
			Err(e) => {
				tracing::error!("accept error: {}", e);
				continue;
			}
		};

		let handler = Arc::clone(&handler);
		tokio::spawn(async move {
			handle_connection::<Req, Resp, _, _>(stream, handler).await;
		});
	}
}

async fn handle_connection<Req, Resp, F, Fut>(mut stream: UnixStream, handler: Arc<F>)
where
	Req: DeserializeOwned + Send + 'static,
	Resp: Serialize + Send + 'static,
	F: Fn(Req) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Option<Resp>> + Send,
{
	let payload = match frame::read_frame_async(&mut stream).await {
		Ok(Some(p)) => p,
		Ok(None) => return,
		Err(e) => {
			tracing::warn!("bad request frame: {}", e);
			return;
		}
	};

	let request: Req = match serde_json::from_slice(&payload) {
		Ok(r) => r,
		Err(e) => {
			tracing::warn!("invalid request: {}", e);
			return;
		}
	};

	if let Some(response) = handler(request).await {
		match serde_json::to_vec(&response) {
			Ok(data) => {
				if let Err(e) = frame::write_frame_async(&mut stream, &data).await {
					tracing::warn!("failed to write response: {}", e);
				}
			}
			Err(e) => tracing::error!("failed to serialize response: {}", e),
		}
	}

	let _ = stream.shutdown().await;
}
