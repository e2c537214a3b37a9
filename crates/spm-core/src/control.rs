use std::fmt::Write as _;
use std::path::Path;

use spm_ipc::ShutdownHandle;

use crate::procfile::{load_procfile_option, ProcfileOption};
use crate::protocol::{split_pattern, Action, ActionMsg, ResponseCode, ResponseMsg, WILDCARD};
use crate::supervisor::{qualify, Supervisor};

pub const DEFAULT_LOG_LINES: usize = 100;

/// Serve one request. `None` closes the connection without a reply, which
/// the client reads as an empty result.
pub async fn handle_action(
	sv: &Supervisor,
	shutdown: &ShutdownHandle,
	msg: ActionMsg,
) -> Option<ResponseMsg> {
	tracing::debug!("{} '{}' in {}", msg.action, msg.processes, msg.workdir);

	match msg.action {
		Action::Start | Action::Stop | Action::Status | Action::Restart | Action::Kill => {
			let opts = match load_options(&msg) {
				Ok(opts) => opts,
				Err(resp) => return Some(resp),
			};
			let names = split_pattern(&msg.processes);
			let infos = sv.batch_do(msg.action, &opts, &names, &msg.projects).await?;
			Some(ResponseMsg::for_action(msg.action, infos))
		}
		Action::Reload => {
			let changed = match load_options(&msg) {
				Ok(opts) => sv
					.update_app(false, &opts)
					.await
					.map(|(_, created)| created)
					.unwrap_or_default(),
				Err(_) => Vec::new(),
			};
			let infos = sv.reload(&changed).await;
			let mut resp = ResponseMsg::for_action(Action::Reload, infos);
			resp.code = ResponseCode::Reload;
			Some(resp)
		}
		Action::Shutdown => {
			tracing::info!("shutdown requested by client");
			shutdown.shutdown();
			Some(ResponseMsg {
				code: ResponseCode::Shutdown,
				message: Action::Shutdown.success_message().to_string(),
				processes: Vec::new(),
			})
		}
		Action::Log => {
			let opts = match load_options(&msg) {
				Ok(opts) => opts,
				Err(resp) => return Some(resp),
			};
			Some(read_logs(sv, &opts, &msg).await?)
		}
		Action::Run => Some(ResponseMsg::error("run is not supported by this daemon")),
	}
}

fn load_options(msg: &ActionMsg) -> Result<ProcfileOption, ResponseMsg> {
	let procfile = (!msg.procfile.is_empty()).then(|| Path::new(&msg.procfile));
	load_procfile_option(Path::new(&msg.workdir), procfile).map_err(|e| {
		tracing::warn!("{}", e);
		ResponseMsg::error(e.to_string())
	})
}

async fn read_logs(sv: &Supervisor, opts: &ProcfileOption, msg: &ActionMsg) -> Option<ResponseMsg> {
	let (project, _) = sv.update_app(true, opts).await?;
	let lines = msg
		.cmdline
		.first()
		.and_then(|n| n.parse().ok())
		.unwrap_or(DEFAULT_LOG_LINES);

	let names = split_pattern(&msg.processes);
	let targets = if names.iter().any(|n| n == WILDCARD) {
		let scope = if msg.projects.is_empty() { project.name.as_str() } else { msg.projects.as_str() };
		if scope == WILDCARD {
			sv.procs().names().await
		} else {
			match sv.projects().get(scope).await {
				Some(p) => p.proc_names().iter().map(|n| qualify(&p.name, n)).collect(),
				None => Vec::new(),
			}
		}
	} else {
		names.iter().map(|n| qualify(&project.name, n)).collect()
	};

	let mut message = String::new();
	let mut processes = Vec::new();
	for name in targets {
		let Some(process) = sv.procs().get(&name).await else {
			continue;
		};
		let tail = process.output().tail(lines).await;
		let _ = writeln!(message, "==> {} <==", name);
		if !tail.is_empty() {
			let _ = writeln!(message, "{}", tail);
		}
		processes.push(process.info().await);
	}

	if processes.is_empty() {
		return Some(ResponseMsg::for_action(Action::Log, processes));
	}
	Some(ResponseMsg {
		code: ResponseCode::Normal,
		message,
		processes,
	})
}
