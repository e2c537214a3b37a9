use std::fmt::Display;
use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

use spm_core::{Action, ActionMsg, GlobalConfig, ProcInfo, ResponseCode, ResponseMsg};
use spm_ipc::client::is_running;
use spm_ipc::daemon::{spawn_background, wait_until_running};
use spm_ipc::{ClientError, DaemonClient};

use crate::display;
use crate::Cli;

const DAEMON_START_BUDGET: Duration = Duration::from_secs(5);

pub fn fail(err: impl Display) -> ! {
	eprintln!("ERROR: {}", err);
	std::process::exit(1);
}

/// Build the request for `action` from the global flags.
pub fn request(cli: &Cli, action: Action, processes: &[String]) -> ActionMsg {
	let workdir = cli
		.workdir
		.clone()
		.or_else(|| std::env::current_dir().ok())
		.unwrap_or_default();
	let workdir = workdir.canonicalize().unwrap_or(workdir);

	let mut msg = ActionMsg::new(action).with_processes(processes);
	msg.workdir = workdir.display().to_string();
	msg.procfile = cli
		.procfile
		.as_ref()
		.map(|p| p.display().to_string())
		.unwrap_or_default();
	msg.projects = cli.project.clone().unwrap_or_default();
	msg
}

fn send(config: &GlobalConfig, msg: &ActionMsg) -> Option<ResponseMsg> {
	let paths = config.daemon_paths();
	let client = match DaemonClient::<ActionMsg, ResponseMsg>::connect(&paths) {
		Ok(c) => c,
		Err(ClientError::NotRunning) => {
			fail("Supervisor has not started. Please check supervisor daemon.")
		}
		Err(e) => fail(e),
	};
	match client.send(msg) {
		Ok(resp) => resp,
		Err(e) => fail(e),
	}
}

/// Records of a reply; a closed connection means nothing was touched.
fn records(config: &GlobalConfig, msg: &ActionMsg) -> Vec<ProcInfo> {
	match send(config, msg) {
		None => Vec::new(),
		Some(resp) if resp.code == ResponseCode::Failure => fail(resp.message),
		Some(resp) => resp.processes,
	}
}

fn colored() -> bool {
	std::io::stdout().is_terminal()
}

fn print_records(action: Action, infos: &[ProcInfo]) {
	if infos.is_empty() {
		println!("{}", action.empty_message());
		return;
	}
	let colored = colored();
	for info in infos {
		println!("{}", display::record_line(action, info, colored));
	}
}

pub fn cmd_start(cli: &Cli, config: &GlobalConfig, config_path: &Path, processes: &[String]) {
	let paths = config.daemon_paths();
	if !is_running(&paths) {
		eprintln!("starting supervisor...");
		let args = vec![
			"--config".to_string(),
			config_path.display().to_string(),
			"daemon".to_string(),
		];
		if let Err(e) = spawn_background(&paths, &args) {
			fail(e);
		}
		if let Err(e) = wait_until_running(&paths, DAEMON_START_BUDGET) {
			fail(e);
		}
	}

	let infos = records(config, &request(cli, Action::Start, processes));
	print_records(Action::Start, &infos);
}

pub fn cmd_action(cli: &Cli, config: &GlobalConfig, action: Action, processes: &[String]) {
	let infos = records(config, &request(cli, action, processes));
	print_records(action, &infos);
}

pub fn cmd_log(cli: &Cli, config: &GlobalConfig, lines: usize, processes: &[String]) {
	let mut msg = request(cli, Action::Log, processes);
	msg.cmdline = vec![lines.to_string()];
	match send(config, &msg) {
		None => println!("{}", Action::Log.empty_message()),
		Some(resp) if resp.code == ResponseCode::Failure => fail(resp.message),
		Some(resp) => print!("{}", resp.message),
	}
}

pub fn cmd_reload(cli: &Cli, config: &GlobalConfig) {
	let infos = records(config, &request(cli, Action::Reload, &[]));
	print_records(Action::Reload, &infos);
}

pub fn cmd_shutdown(cli: &Cli, config: &GlobalConfig) {
	match send(config, &request(cli, Action::Shutdown, &[])) {
		Some(resp) if resp.code == ResponseCode::Failure => fail(resp.message),
		Some(resp) => println!("{}", resp.message),
		None => println!("{}", Action::Shutdown.success_message()),
	}
}
