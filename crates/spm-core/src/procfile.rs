use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_PROCFILE: &str = "Procfile";
const ENV_FILE: &str = ".env";

#[derive(Debug, Error)]
pub enum ProcfileError {
	#[error("no working directory given")]
	MissingWorkDir,
	#[error("cannot read {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("{0} declares no processes")]
	Empty(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDef {
	pub name: String,
	pub command: String,
	#[serde(default)]
	pub env: BTreeMap<String, String>,
}

/// Everything the supervisor needs to register one project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcfileOption {
	pub app_name: String,
	pub work_dir: PathBuf,
	pub procfile: PathBuf,
	pub processes: BTreeMap<String, ProcessDef>,
}

impl ProcfileOption {
	pub fn new(app_name: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
		let work_dir = work_dir.into();
		Self {
			app_name: app_name.into(),
			procfile: work_dir.join(DEFAULT_PROCFILE),
			work_dir,
			processes: BTreeMap::new(),
		}
	}

	pub fn with_process(mut self, name: &str, command: &str) -> Self {
		self.processes.insert(
			name.to_string(),
			ProcessDef {
				name: name.to_string(),
				command: command.to_string(),
				env: BTreeMap::new(),
			},
		);
		self
	}
}

/// Parse `name: command` lines. Blank lines and `#` comments are skipped, as
/// are names that could not be addressed from the command line.
pub fn parse_procfile(content: &str) -> Vec<(String, String)> {
	let mut entries: Vec<(String, String)> = Vec::new();
	for line in content.lines() {
		let line = line.trim();
		if line.is_empty() || line.starts_with('#') {
			continue;
		}
		let Some((name, cmd)) = line.split_once(':') else {
			tracing::warn!("skipping malformed Procfile line: {}", line);
			continue;
		};
		let name = name.trim();
		let cmd = cmd.trim();
		if !valid_name(name) || cmd.is_empty() {
			tracing::warn!("skipping Procfile entry '{}'", name);
			continue;
		}
		entries.retain(|(n, _)| n != name);
		entries.push((name.to_string(), cmd.to_string()));
	}
	entries
}

fn valid_name(name: &str) -> bool {
	!name.is_empty()
		&& name
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// Parse a dotenv-style file: `KEY=VALUE`, optional `export ` prefix and
/// surrounding quotes.
pub fn parse_env(content: &str) -> BTreeMap<String, String> {
	let mut env = BTreeMap::new();
	for line in content.lines() {
		let line = line.trim();
		if line.is_empty() || line.starts_with('#') {
			continue;
		}
		let line = line.strip_prefix("export ").unwrap_or(line);
		if let Some((key, value)) = line.split_once('=') {
			let value = value.trim();
			let value = value
				.strip_prefix('"')
				.and_then(|v| v.strip_suffix('"'))
				.or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
				.unwrap_or(value);
			env.insert(key.trim().to_string(), value.to_string());
		}
	}
	env
}

/// Load the Procfile of `work_dir` (or an explicit one) into a
/// [`ProcfileOption`]. The app name is the working directory's name.
pub fn load_procfile_option(
	work_dir: &Path,
	procfile: Option<&Path>,
) -> Result<ProcfileOption, ProcfileError> {
	if work_dir.as_os_str().is_empty() {
		return Err(ProcfileError::MissingWorkDir);
	}

	let procfile = match procfile {
		Some(p) if p.is_absolute() => p.to_path_buf(),
		Some(p) => work_dir.join(p),
		None => work_dir.join(DEFAULT_PROCFILE),
	};
	let content = std::fs::read_to_string(&procfile).map_err(|source| ProcfileError::Io {
		path: procfile.clone(),
		source,
	})?;

	let env = std::fs::read_to_string(work_dir.join(ENV_FILE))
		.map(|c| parse_env(&c))
		.unwrap_or_default();

	let processes: BTreeMap<String, ProcessDef> = parse_procfile(&content)
		.into_iter()
		.map(|(name, command)| {
			let def = ProcessDef {
				name: name.clone(),
				command,
				env: env.clone(),
			};
			(name, def)
		})
		.collect();

	if processes.is_empty() {
		return Err(ProcfileError::Empty(procfile));
	}

	Ok(ProcfileOption {
		app_name: app_name_for(work_dir),
		work_dir: work_dir.to_path_buf(),
		procfile,
		processes,
	})
}

pub fn app_name_for(work_dir: &Path) -> String {
	work_dir
		.file_name()
		.map(|n| n.to_string_lossy().to_string())
		.unwrap_or_else(|| "root".to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_entries_and_skips_noise() {
		let entries = parse_procfile(
			"# services\nweb: python -m http.server 3000\n\nworker:  celery -A app worker  \nnot a process\n",
		);
		assert_eq!(
			entries,
			vec![
				("web".to_string(), "python -m http.server 3000".to_string()),
				("worker".to_string(), "celery -A app worker".to_string()),
			]
		);
	}

	#[test]
	fn command_may_contain_colons() {
		let entries = parse_procfile("web: redis-server --bind 127.0.0.1:6379");
		assert_eq!(entries[0].1, "redis-server --bind 127.0.0.1:6379");
	}

	#[test]
	fn rejects_unaddressable_names() {
		let entries = parse_procfile("a|b: echo\nx;y: echo\nok: echo\n: echo\nempty:\n");
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].0, "ok");
	}

	#[test]
	fn later_duplicate_wins() {
		let entries = parse_procfile("web: one\nweb: two\n");
		assert_eq!(entries, vec![("web".to_string(), "two".to_string())]);
	}

	#[test]
	fn env_file_parsing() {
		let env = parse_env("# comment\nPORT=3000\nexport NAME=\"spm\"\nQUOTED='a b'\n");
		assert_eq!(env.get("PORT").map(String::as_str), Some("3000"));
		assert_eq!(env.get("NAME").map(String::as_str), Some("spm"));
		assert_eq!(env.get("QUOTED").map(String::as_str), Some("a b"));
	}

	#[test]
	fn load_from_directory() {
		let dir = std::env::temp_dir().join(format!("spm-procfile-{}", std::process::id()));
		let _ = std::fs::create_dir_all(&dir);
		std::fs::write(dir.join("Procfile"), "web: sleep 60\n").unwrap();
		std::fs::write(dir.join(".env"), "PORT=8080\n").unwrap();

		let opts = load_procfile_option(&dir, None).unwrap();
		assert_eq!(opts.app_name, app_name_for(&dir));
		assert_eq!(opts.procfile, dir.join("Procfile"));
		let web = &opts.processes["web"];
		assert_eq!(web.command, "sleep 60");
		assert_eq!(web.env.get("PORT").map(String::as_str), Some("8080"));

		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn empty_workdir_and_missing_file() {
		assert!(matches!(
			load_procfile_option(Path::new(""), None),
			Err(ProcfileError::MissingWorkDir)
		));
		assert!(matches!(
			load_procfile_option(Path::new("/nonexistent/spm"), None),
			Err(ProcfileError::Io { .. })
		));
	}
}
