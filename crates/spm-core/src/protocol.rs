use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::process::ProcessState;

pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
	Run,
	Log,
	Kill,
	Start,
	Stop,
	Status,
	Restart,
	Shutdown,
	Reload,
}

impl Action {
	/// Separator the client uses when joining several process names.
	pub fn separator(self) -> char {
		match self {
			Action::Start => ';',
			_ => '|',
		}
	}

	pub fn success_message(self) -> &'static str {
		match self {
			Action::Run => "Run command successfully",
			Action::Log => "Read process output successfully",
			Action::Kill => "Kill processes successfully",
			Action::Start => "Start processes successfully",
			Action::Stop => "Stop processes successfully",
			Action::Status => "Check processes status successfully",
			Action::Restart => "Restart processes successfully",
			Action::Shutdown => "Supervisor is shutting down",
			Action::Reload => "Reload configuration successfully",
		}
	}

	pub fn empty_message(self) -> &'static str {
		match self {
			Action::Start => "No processes to start.",
			Action::Stop => "No processes to stop.",
			Action::Restart => "No processes to restart.",
			Action::Kill => "No processes to kill.",
			Action::Reload => "No processes changed.",
			_ => "No processes found.",
		}
	}
}

impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Action::Run => "run",
			Action::Log => "log",
			Action::Kill => "kill",
			Action::Start => "start",
			Action::Stop => "stop",
			Action::Status => "status",
			Action::Restart => "restart",
			Action::Shutdown => "shutdown",
			Action::Reload => "reload",
		};
		f.write_str(s)
	}
}

impl FromStr for Action {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"run" => Ok(Action::Run),
			"log" => Ok(Action::Log),
			"kill" => Ok(Action::Kill),
			"start" => Ok(Action::Start),
			"stop" => Ok(Action::Stop),
			"status" => Ok(Action::Status),
			"restart" => Ok(Action::Restart),
			"shutdown" => Ok(Action::Shutdown),
			"reload" => Ok(Action::Reload),
			other => Err(format!("unknown action: {}", other)),
		}
	}
}

/// Client request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMsg {
	pub action: Action,
	#[serde(default)]
	pub workdir: String,
	#[serde(default)]
	pub procfile: String,
	/// Scope of a `*` pattern; empty means the request's own project.
	#[serde(default)]
	pub projects: String,
	#[serde(default)]
	pub processes: String,
	#[serde(default)]
	pub cmdline: Vec<String>,
}

impl ActionMsg {
	pub fn new(action: Action) -> Self {
		Self {
			action,
			workdir: String::new(),
			procfile: String::new(),
			projects: String::new(),
			processes: WILDCARD.to_string(),
			cmdline: Vec::new(),
		}
	}

	pub fn with_processes(mut self, names: &[String]) -> Self {
		self.processes = join_pattern(self.action, names);
		self
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum ResponseCode {
	Normal,
	Shutdown,
	Reload,
	Failure,
}

impl From<ResponseCode> for i32 {
	fn from(code: ResponseCode) -> i32 {
		match code {
			ResponseCode::Normal => 0,
			ResponseCode::Shutdown => 1,
			ResponseCode::Reload => 2,
			ResponseCode::Failure => 3,
		}
	}
}

impl TryFrom<i32> for ResponseCode {
	type Error = String;

	fn try_from(code: i32) -> Result<Self, String> {
		match code {
			0 => Ok(ResponseCode::Normal),
			1 => Ok(ResponseCode::Shutdown),
			2 => Ok(ResponseCode::Reload),
			3 => Ok(ResponseCode::Failure),
			other => Err(format!("unknown response code {}", other)),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcInfo {
	pub pid: u32,
	pub name: String,
	/// Unix milliseconds, 0 if never started.
	pub start_at: i64,
	/// Unix milliseconds, 0 if never stopped.
	pub stop_at: i64,
	pub status: ProcessState,
}

/// Daemon reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMsg {
	pub code: ResponseCode,
	pub message: String,
	#[serde(default)]
	pub processes: Vec<ProcInfo>,
}

impl ResponseMsg {
	pub fn for_action(action: Action, processes: Vec<ProcInfo>) -> Self {
		let message = if processes.is_empty() {
			action.empty_message()
		} else {
			action.success_message()
		};
		Self {
			code: ResponseCode::Normal,
			message: message.to_string(),
			processes,
		}
	}

	pub fn error(message: impl Into<String>) -> Self {
		Self {
			code: ResponseCode::Failure,
			message: message.into(),
			processes: Vec::new(),
		}
	}
}

/// Join names for the wire; no names means every process.
pub fn join_pattern(action: Action, names: &[String]) -> String {
	match names {
		[] => WILDCARD.to_string(),
		[one] => one.clone(),
		many => many.join(&action.separator().to_string()),
	}
}

/// Split a wire pattern into names, accepting either separator.
pub fn split_pattern(pattern: &str) -> Vec<String> {
	pattern
		.split([';', '|'])
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.map(str::to_string)
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn action_wire_names() {
		assert_eq!(serde_json::to_string(&Action::Restart).unwrap(), "\"restart\"");
		assert_eq!("reload".parse::<Action>().unwrap(), Action::Reload);
		assert!("explode".parse::<Action>().is_err());
		assert_eq!(Action::Status.to_string(), "status");
	}

	#[test]
	fn response_code_is_an_integer() {
		let msg = ResponseMsg::error("boom");
		let json = serde_json::to_value(&msg).unwrap();
		assert_eq!(json["code"], 3);
		assert!(serde_json::from_str::<ResponseMsg>(r#"{"code":9,"message":""}"#).is_err());
	}

	#[test]
	fn request_fields_on_the_wire() {
		let msg = ActionMsg {
			action: Action::Stop,
			workdir: "/srv/app".into(),
			procfile: "/srv/app/Procfile".into(),
			projects: String::new(),
			processes: "web|worker".into(),
			cmdline: vec![],
		};
		let json = serde_json::to_value(&msg).unwrap();
		for key in ["action", "workdir", "procfile", "projects", "processes", "cmdline"] {
			assert!(json.get(key).is_some(), "missing {}", key);
		}
		let back: ActionMsg = serde_json::from_value(json).unwrap();
		assert_eq!(back, msg);
	}

	#[test]
	fn join_uses_per_action_separator() {
		let names = vec!["web".to_string(), "worker".to_string()];
		assert_eq!(join_pattern(Action::Start, &names), "web;worker");
		assert_eq!(join_pattern(Action::Stop, &names), "web|worker");
		assert_eq!(join_pattern(Action::Status, &names[..1]), "web");
		assert_eq!(join_pattern(Action::Restart, &[]), "*");
	}

	#[test]
	fn split_accepts_both_separators() {
		assert_eq!(split_pattern("web;worker"), vec!["web", "worker"]);
		assert_eq!(split_pattern("web| worker |"), vec!["web", "worker"]);
		assert_eq!(split_pattern("*"), vec!["*"]);
		assert!(split_pattern("").is_empty());
	}

	#[test]
	fn empty_response_message() {
		let resp = ResponseMsg::for_action(Action::Stop, vec![]);
		assert_eq!(resp.code, ResponseCode::Normal);
		assert_eq!(resp.message, "No processes to stop.");
		assert!(resp.processes.is_empty());
	}
}
