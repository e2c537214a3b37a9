mod client;
mod daemon;
mod display;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use spm_core::config::{default_config_path, load_global_config};
use spm_core::control::DEFAULT_LOG_LINES;
use spm_core::Action;

#[derive(Debug, Parser)]
#[command(name = "spm", version, about = "Process supervisor driven by Procfiles")]
pub struct Cli {
	/// Project directory (defaults to the current directory)
	#[arg(short = 'w', long = "workdir", global = true)]
	pub workdir: Option<PathBuf>,

	/// Procfile to use instead of <workdir>/Procfile
	#[arg(short = 'f', long, global = true)]
	pub procfile: Option<PathBuf>,

	/// Project that `*` refers to; `*` means every project
	#[arg(long, global = true)]
	pub project: Option<String>,

	/// Global config file
	#[arg(long, global = true)]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Start processes, launching the supervisor when it isn't running
	Start {
		/// Run the supervisor in the foreground
		#[arg(short = 'F', long)]
		foreground: bool,
		processes: Vec<String>,
	},
	/// Stop processes
	Stop { processes: Vec<String> },
	/// Show process status
	Status { processes: Vec<String> },
	/// Stop then start processes
	Restart { processes: Vec<String> },
	/// SIGKILL processes without a grace period
	Kill { processes: Vec<String> },
	/// Show recent output of processes
	Log {
		#[arg(short = 'n', long, default_value_t = DEFAULT_LOG_LINES)]
		lines: usize,
		processes: Vec<String>,
	},
	/// Re-read the Procfile and the global config
	Reload,
	/// Stop every process and the supervisor
	Shutdown,
	/// Print the version
	Version,
	/// Run the supervisor in the foreground (used internally)
	#[command(hide = true)]
	Daemon,
}

fn main() {
	let cli = Cli::parse();
	let config_path = cli.config.clone().unwrap_or_else(default_config_path);
	let config = match load_global_config(&config_path) {
		Ok(c) => c,
		Err(e) => client::fail(e),
	};

	match &cli.command {
		Command::Version => println!("spm v{}", env!("CARGO_PKG_VERSION")),
		Command::Daemon => daemon::run_blocking(config, config_path, None),
		Command::Start { foreground, processes } => {
			if *foreground && !spm_ipc::client::is_running(&config.daemon_paths()) {
				let msg = client::request(&cli, Action::Start, processes);
				daemon::run_blocking(config, config_path, Some(msg));
			} else {
				client::cmd_start(&cli, &config, &config_path, processes);
			}
		}
		Command::Stop { processes } => client::cmd_action(&cli, &config, Action::Stop, processes),
		Command::Status { processes } => client::cmd_action(&cli, &config, Action::Status, processes),
		Command::Restart { processes } => client::cmd_action(&cli, &config, Action::Restart, processes),
		Command::Kill { processes } => client::cmd_action(&cli, &config, Action::Kill, processes),
		Command::Log { lines, processes } => client::cmd_log(&cli, &config, *lines, processes),
		Command::Reload => client::cmd_reload(&cli, &config),
		Command::Shutdown => client::cmd_shutdown(&cli, &config),
	}
}
