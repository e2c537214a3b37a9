use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use owo_colors::OwoColorize;
use spm_core::control::handle_action;
use spm_core::{Action, ActionMsg, GlobalConfig, ResponseCode, Supervisor};
use spm_ipc::{DaemonError, RuntimeContext, ShutdownReason};
use tracing_subscriber::EnvFilter;

use crate::client::fail;
use crate::display;

/// Grace period for the reply to a shutdown request to reach the client.
const SHUTDOWN_REPLY_GRACE: Duration = Duration::from_millis(100);

/// Run the supervisor on this thread until it is told to stop. `initial`
/// is dispatched once the socket is up (used by `start --foreground`).
pub fn run_blocking(config: GlobalConfig, config_path: PathBuf, initial: Option<ActionMsg>) {
	init_tracing(&config);

	let runtime = match tokio::runtime::Runtime::new() {
		Ok(rt) => rt,
		Err(e) => fail(e),
	};
	if let Err(e) = runtime.block_on(run(config, config_path, initial)) {
		tracing::error!("{}", e);
		fail(e);
	}
}

fn init_tracing(config: &GlobalConfig) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logs.level));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();
}

async fn run(
	config: GlobalConfig,
	config_path: PathBuf,
	initial: Option<ActionMsg>,
) -> Result<(), DaemonError> {
	let ctx = RuntimeContext::new(config.daemon_paths());
	let _guard = ctx.prepare()?;
	let listener = spm_ipc::server::bind(&ctx.paths).map_err(|source| DaemonError::Io {
		path: ctx.paths.socket_path(),
		source,
	})?;

	let sv = Supervisor::new(config, Some(config_path));
	let shutdown = ctx.shutdown_handle();

	let started_ms = ctx
		.started_at
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as i64)
		.unwrap_or(0);
	println!(
		"{}\n",
		format!("Spm supervisor started at {}", display::format_time(started_ms))
			.yellow()
			.bold()
	);

	let server = {
		let sv = Arc::clone(&sv);
		let shutdown = shutdown.clone();
		tokio::spawn(spm_ipc::server::serve(listener, move |msg: ActionMsg| {
			let sv = Arc::clone(&sv);
			let shutdown = shutdown.clone();
			async move { handle_action(&sv, &shutdown, msg).await }
		}))
	};
	tracing::info!("spm supervisor pid {}", ctx.pid);

	if let Some(msg) = initial {
		let sv = Arc::clone(&sv);
		let shutdown = shutdown.clone();
		tokio::spawn(async move {
			let action = msg.action;
			match handle_action(&sv, &shutdown, msg).await {
				Some(resp) if resp.code == ResponseCode::Failure => tracing::error!("{}", resp.message),
				Some(resp) if !resp.processes.is_empty() => {
					for info in &resp.processes {
						println!("{}", display::record_line(action, info, true));
					}
				}
				_ => println!("{}", Action::Start.empty_message()),
			}
		});
	}

	let reason = ctx.wait_for_shutdown().await;
	tracing::info!("shutdown: {:?}", reason);
	if reason == ShutdownReason::Requested {
		tokio::time::sleep(SHUTDOWN_REPLY_GRACE).await;
	}
	server.abort();

	if reason.stops_children() {
		sv.shutdown().await;
	} else {
		tracing::warn!("leaving {} processes untouched", sv.procs().len().await);
	}

	tracing::info!("supervisor daemon stopped");
	Ok(())
}
