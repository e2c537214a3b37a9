use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;

use crate::config::{load_global_config, GlobalConfig};
use crate::process::Process;
use crate::procfile::ProcfileOption;
use crate::project::{full_name, Project};
use crate::protocol::{Action, ProcInfo, WILDCARD};
use crate::table::{ProcTable, ProjectTable};

/// Owner of both registries and every lifecycle decision.
pub struct Supervisor {
	pub started_at: SystemTime,
	pub pid: u32,
	config: RwLock<GlobalConfig>,
	config_path: Option<PathBuf>,
	projects: ProjectTable,
	procs: ProcTable,
	reconcile: Mutex<()>,
}

impl Supervisor {
	pub fn new(config: GlobalConfig, config_path: Option<PathBuf>) -> Arc<Self> {
		Arc::new(Self {
			started_at: SystemTime::now(),
			pid: std::process::id(),
			config: RwLock::new(config),
			config_path,
			projects: ProjectTable::new(),
			procs: ProcTable::new(),
			reconcile: Mutex::new(()),
		})
	}

	pub fn config(&self) -> GlobalConfig {
		self.config
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}

	fn stop_timeout(&self) -> Duration {
		self.config().stop_timeout()
	}

	pub fn projects(&self) -> &ProjectTable {
		&self.projects
	}

	pub fn procs(&self) -> &ProcTable {
		&self.procs
	}

	async fn project_of(&self, process: &Process) -> Option<Arc<Project>> {
		self.projects.get(&process.project).await
	}

	async fn set_enabled(&self, process: &Process, on: bool) {
		if let Some(project) = self.project_of(process).await {
			project.set_enabled(&process.name, on);
		}
	}

	pub async fn status(&self, name: &str) -> Option<Arc<Process>> {
		let process = self.procs.get(name).await?;
		if process.is_running().await {
			self.set_enabled(&process, true).await;
		}
		Some(process)
	}

	pub async fn start(&self, name: &str) -> Option<Arc<Process>> {
		let process = self.procs.get(name).await?;

		let started = {
			let mut lc = process.lock().await;
			if lc.is_running().await {
				tracing::warn!("{} already running with pid {}", process.full_name, lc.pid());
				true
			} else {
				match lc.start().await {
					Ok(pid) => {
						tracing::info!("started {} (pid {})", process.full_name, pid);
						true
					}
					Err(e) => {
						tracing::error!("{}", e);
						false
					}
				}
			}
		};

		self.set_enabled(&process, started).await;
		started.then_some(process)
	}

	/// Stop a process the user wants running. A process whose enabled flag
	/// is clear is left alone.
	pub async fn stop(&self, name: &str) -> Option<Arc<Process>> {
		let process = self.procs.get(name).await?;
		let project = self.project_of(&process).await;
		let grace = self.stop_timeout();

		let stopped = {
			let mut lc = process.lock().await;
			if !lc.is_running().await {
				tracing::info!("{} is stopped", process.full_name);
				true
			} else if !project.as_ref().is_some_and(|p| p.enabled(&process.name)) {
				tracing::debug!("{} is not enabled, not stopping it", process.full_name);
				false
			} else {
				match lc.stop(grace).await {
					Ok(()) => {
						tracing::info!("stopped {}", process.full_name);
						true
					}
					Err(e) => {
						tracing::error!("{}", e);
						false
					}
				}
			}
		};

		if !stopped {
			return None;
		}
		if let Some(project) = project {
			project.set_enabled(&process.name, false);
		}
		Some(process)
	}

	/// SIGKILL the process group with no grace period.
	pub async fn kill(&self, name: &str) -> Option<Arc<Process>> {
		let process = self.procs.get(name).await?;

		let killed = {
			let mut lc = process.lock().await;
			if !lc.is_running().await {
				true
			} else {
				match lc.stop(Duration::ZERO).await {
					Ok(()) => {
						tracing::info!("killed {}", process.full_name);
						true
					}
					Err(e) => {
						tracing::error!("{}", e);
						false
					}
				}
			}
		};

		if !killed {
			return None;
		}
		self.set_enabled(&process, false).await;
		Some(process)
	}

	pub async fn restart(&self, name: &str) -> Option<Arc<Process>> {
		self.stop(name).await;
		self.start(name).await
	}

	pub async fn output(&self, name: &str, lines: usize) -> Option<String> {
		let process = self.procs.get(name).await?;
		Some(process.output().tail(lines).await)
	}

	/// Declared processes of `pattern` (a project name), optionally only the
	/// enabled ones. Unknown project yields nothing.
	async fn project_procs(&self, pattern: &str, enabled_only: bool) -> Vec<String> {
		let Some(project) = self.projects.get(pattern).await else {
			return Vec::new();
		};
		project
			.proc_names()
			.into_iter()
			.filter(|name| !enabled_only || project.enabled(name))
			.map(|name| full_name(&project.name, &name))
			.collect()
	}

	pub async fn status_all(&self, pattern: &str) -> Vec<Arc<Process>> {
		let names = if pattern == WILDCARD {
			self.procs.names().await
		} else {
			self.project_procs(pattern, false).await
		};
		let mut procs = Vec::new();
		for name in names {
			if let Some(p) = self.status(&name).await {
				procs.push(p);
			}
		}
		procs
	}

	/// Start a project's processes. Across every project (`*`) only enabled
	/// processes are started, so a global stop then start resumes what ran.
	pub async fn start_all(&self, pattern: &str) -> Vec<Arc<Process>> {
		let names = if pattern == WILDCARD {
			let mut names = Vec::new();
			for (name, p) in self.procs.iter().await {
				if let Some(project) = self.project_of(&p).await {
					if project.enabled(&p.name) {
						names.push(name);
					}
				}
			}
			names
		} else {
			self.project_procs(pattern, false).await
		};
		let mut procs = Vec::new();
		for name in names {
			if let Some(p) = self.start(&name).await {
				procs.push(p);
			}
		}
		procs
	}

	/// Stop a project's enabled processes. Across every project (`*`) each
	/// running process is stopped and its enabled flag kept.
	pub async fn stop_all(&self, pattern: &str) -> Vec<Arc<Process>> {
		if pattern != WILDCARD {
			let mut procs = Vec::new();
			for name in self.project_procs(pattern, true).await {
				if let Some(p) = self.stop(&name).await {
					procs.push(p);
				}
			}
			return procs;
		}

		let grace = self.stop_timeout();
		let mut procs = Vec::new();
		for (_, process) in self.procs.iter().await {
			let mut lc = process.lock().await;
			if !lc.is_running().await {
				continue;
			}
			let result = lc.stop(grace).await;
			drop(lc);
			match result {
				Ok(()) => {
					tracing::info!("stopped {}", process.full_name);
					procs.push(process);
				}
				Err(e) => tracing::error!("{}", e),
			}
		}
		procs
	}

	pub async fn restart_all(&self, pattern: &str) -> Vec<Arc<Process>> {
		self.stop_all(pattern).await;
		self.start_all(pattern).await
	}

	pub async fn kill_all(&self, pattern: &str) -> Vec<Arc<Process>> {
		let names = if pattern == WILDCARD {
			self.procs.names().await
		} else {
			self.project_procs(pattern, false).await
		};
		let mut procs = Vec::new();
		for name in names {
			let Some(process) = self.procs.get(&name).await else {
				continue;
			};
			if !process.is_running().await {
				continue;
			}
			if let Some(p) = self.kill(&name).await {
				procs.push(p);
			}
		}
		procs
	}

	/// Single-process variant of `action`. Actions without a per-process
	/// handler touch nothing.
	pub async fn apply(&self, action: Action, name: &str) -> Option<Arc<Process>> {
		match action {
			Action::Start => self.start(name).await,
			Action::Stop => self.stop(name).await,
			Action::Restart => self.restart(name).await,
			Action::Status => self.status(name).await,
			Action::Kill => self.kill(name).await,
			Action::Run | Action::Log | Action::Shutdown | Action::Reload => None,
		}
	}

	pub async fn apply_all(&self, action: Action, pattern: &str) -> Vec<Arc<Process>> {
		match action {
			Action::Start => self.start_all(pattern).await,
			Action::Stop => self.stop_all(pattern).await,
			Action::Restart => self.restart_all(pattern).await,
			Action::Status => self.status_all(pattern).await,
			Action::Kill => self.kill_all(pattern).await,
			Action::Run | Action::Log | Action::Shutdown | Action::Reload => Vec::new(),
		}
	}

	/// Register the project behind `opts` if needed, then run `action` on
	/// `names`. A `*` among the names targets `scope`, or the request's own
	/// project when no scope is given. Bare names belong to that project.
	///
	/// `None` means the project could not be registered.
	pub async fn batch_do(
		&self,
		action: Action,
		opts: &ProcfileOption,
		names: &[String],
		scope: &str,
	) -> Option<Vec<ProcInfo>> {
		let Some((project, _)) = self.update_app(true, opts).await else {
			tracing::error!("cannot find project in work directory {}", opts.work_dir.display());
			return None;
		};

		let touched = if names.iter().any(|n| n == WILDCARD) {
			let scope = if scope.is_empty() { project.name.as_str() } else { scope };
			self.apply_all(action, scope).await
		} else {
			let mut touched = Vec::new();
			for name in names {
				if let Some(p) = self.apply(action, &qualify(&project.name, name)).await {
					touched.push(p);
				}
			}
			touched
		};

		let mut infos = Vec::with_capacity(touched.len());
		for p in touched {
			infos.push(p.info().await);
		}
		Some(infos)
	}

	/// Reconcile the registered project named by `opts` with the definition
	/// in `opts`.
	///
	/// Forced: register the project when it's unknown (rejecting an empty
	/// definition), leave a known one as is. Not forced: drop processes that
	/// left the definition unless still running, register new ones disabled
	/// and return them.
	pub async fn update_app(
		&self,
		force: bool,
		opts: &ProcfileOption,
	) -> Option<(Arc<Project>, Vec<Arc<Process>>)> {
		let _guard = self.reconcile.lock().await;
		let existing = self.projects.get(&opts.app_name).await;

		match (force, existing) {
			(true, None) => {
				if opts.processes.is_empty() || opts.work_dir.as_os_str().is_empty() {
					return None;
				}
				let project = Arc::new(Project::from_option(opts));
				self.projects.set(&project.name, Arc::clone(&project)).await;

				let config = self.config();
				for def in opts.processes.values() {
					let process = Arc::new(Process::new(&opts.app_name, def.clone(), &opts.work_dir, &config));
					let name = process.full_name.clone();
					self.procs.add(&name, process).await;
				}
				tracing::info!(
					"registered project {} ({} processes) from {}",
					project.name,
					opts.processes.len(),
					opts.procfile.display()
				);
				Some((project, Vec::new()))
			}
			(true, Some(project)) => Some((project, Vec::new())),
			(false, Some(project)) => {
				for name in project.proc_names() {
					if opts.processes.contains_key(&name) {
						continue;
					}
					let fname = full_name(&project.name, &name);
					let Some(process) = self.procs.get(&fname).await else {
						project.remove_name(&name);
						continue;
					};
					// Held until the entry is gone; a start queued behind it
					// sees a retired process and spawns nothing.
					let mut lc = process.lock().await;
					if lc.is_running().await {
						tracing::info!("{} left the Procfile but is running, keeping it", fname);
						continue;
					}
					lc.retire();
					self.procs.del(&fname).await;
					project.remove_name(&name);
					drop(lc);
					tracing::info!("removed {}", fname);
				}

				let config = self.config();
				let mut created = Vec::new();
				for (name, def) in &opts.processes {
					let fname = full_name(&project.name, name);
					if self.procs.get(&fname).await.is_some() {
						continue;
					}
					let process = Arc::new(Process::new(&project.name, def.clone(), &project.work_dir, &config));
					if self.procs.add(&fname, Arc::clone(&process)).await {
						project.add_name(name);
						project.set_enabled(name, false);
						tracing::info!("added {}", fname);
						created.push(process);
					}
				}
				Some((project, created))
			}
			(false, None) => None,
		}
	}

	/// Re-read the global config and report the processes reconciliation
	/// created.
	pub async fn reload(&self, changed: &[Arc<Process>]) -> Vec<ProcInfo> {
		tracing::info!("reloading configuration");
		if let Some(path) = &self.config_path {
			match load_global_config(path) {
				Ok(config) => {
					*self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
				}
				Err(e) => tracing::warn!("keeping previous configuration: {}", e),
			}
		}

		let mut infos = Vec::with_capacity(changed.len());
		for p in changed {
			infos.push(p.info().await);
		}
		infos
	}

	/// Stop everything and flush output. Errors are logged, never returned.
	pub async fn shutdown(&self) {
		let stopped = self.stop_all(WILDCARD).await;
		for (name, process) in self.procs.iter().await {
			if let Err(e) = process.flush().await {
				tracing::warn!("failed to flush output of {}: {}", name, e);
			}
		}
		tracing::info!("shutdown supervisor, stopped {} processes", stopped.len());
	}
}

/// Names from the command line may omit the project.
pub fn qualify(project: &str, name: &str) -> String {
	if name.contains("::") {
		name.to_string()
	} else {
		full_name(project, name)
	}
}
