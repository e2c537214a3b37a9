use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use crate::procfile::ProcfileOption;

/// `project::name`, the key a process is registered under.
pub fn full_name(project: &str, name: &str) -> String {
	format!("{}::{}", project, name)
}

/// The processes of one Procfile, grouped under the app name.
///
/// Each declared name carries an enabled flag: set once the user has asked
/// for the process to run, cleared once it has been stopped on purpose.
pub struct Project {
	pub name: String,
	pub work_dir: PathBuf,
	pub procfile: PathBuf,
	members: Mutex<Members>,
}

#[derive(Default)]
struct Members {
	names: Vec<String>,
	enabled: HashMap<String, bool>,
}

impl Project {
	pub fn from_option(opts: &ProcfileOption) -> Self {
		let names: Vec<String> = opts.processes.keys().cloned().collect();
		let enabled = names.iter().map(|n| (n.clone(), false)).collect();
		Self {
			name: opts.app_name.clone(),
			work_dir: opts.work_dir.clone(),
			procfile: opts.procfile.clone(),
			members: Mutex::new(Members { names, enabled }),
		}
	}

	fn members(&self) -> std::sync::MutexGuard<'_, Members> {
		self.members.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Declared names, in registration order.
	pub fn proc_names(&self) -> Vec<String> {
		self.members().names.clone()
	}

	pub fn contains(&self, name: &str) -> bool {
		self.members().enabled.contains_key(name)
	}

	pub fn enabled(&self, name: &str) -> bool {
		self.members().enabled.get(name).copied().unwrap_or(false)
	}

	/// Returns false (and changes nothing) for a name the project doesn't declare.
	pub fn set_enabled(&self, name: &str, on: bool) -> bool {
		match self.members().enabled.get_mut(name) {
			Some(flag) => {
				*flag = on;
				true
			}
			None => false,
		}
	}

	pub fn add_name(&self, name: &str) -> bool {
		let mut m = self.members();
		if m.enabled.contains_key(name) {
			return false;
		}
		m.names.push(name.to_string());
		m.enabled.insert(name.to_string(), false);
		true
	}

	pub fn remove_name(&self, name: &str) -> bool {
		let mut m = self.members();
		if m.enabled.remove(name).is_none() {
			return false;
		}
		m.names.retain(|n| n != name);
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn project() -> Project {
		let opts = ProcfileOption::new("app", "/srv/app")
			.with_process("web", "sleep 60")
			.with_process("worker", "sleep 60");
		Project::from_option(&opts)
	}

	#[test]
	fn starts_with_every_flag_off() {
		let p = project();
		assert_eq!(p.name, "app");
		assert_eq!(p.proc_names(), vec!["web", "worker"]);
		assert!(!p.enabled("web"));
		assert!(!p.enabled("worker"));
	}

	#[test]
	fn unknown_names_are_ignored() {
		let p = project();
		assert!(!p.set_enabled("ghost", true));
		assert!(!p.contains("ghost"));
		assert!(!p.enabled("ghost"));
	}

	#[test]
	fn add_and_remove_keep_flags_in_sync() {
		let p = project();
		assert!(p.add_name("cron"));
		assert!(!p.add_name("cron"));
		assert!(p.set_enabled("cron", true));
		assert!(p.enabled("cron"));

		assert!(p.remove_name("web"));
		assert!(!p.remove_name("web"));
		assert!(!p.set_enabled("web", true));
		assert_eq!(p.proc_names(), vec!["worker", "cron"]);
	}

	#[test]
	fn full_name_joins_with_double_colon() {
		assert_eq!(full_name("app", "web"), "app::web");
	}
}
