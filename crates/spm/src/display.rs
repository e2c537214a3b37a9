use std::time::{SystemTime, UNIX_EPOCH};

use owo_colors::OwoColorize;
use spm_core::{Action, ProcInfo, ProcessState};

/// RFC 3339 (UTC) for a Unix-millisecond timestamp.
pub fn format_time(millis: i64) -> String {
	let secs = millis.max(0) as u64 / 1000;
	let days = (secs / 86400) as i64;
	let time_of_day = secs % 86400;
	let (hour, minute, second) = (time_of_day / 3600, (time_of_day % 3600) / 60, time_of_day % 60);

	let z = days + 719468;
	let era = if z >= 0 { z } else { z - 146096 } / 146097;
	let doe = (z - era * 146097) as u64;
	let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
	let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
	let mp = (5 * doy + 2) / 153;
	let d = doy - (153 * mp + 2) / 5 + 1;
	let m = if mp < 10 { mp + 3 } else { mp - 9 };
	let y = yoe as i64 + era * 400 + i64::from(m <= 2);

	format!("{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z", y, m, d, hour, minute, second)
}

pub fn now_millis() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as i64)
		.unwrap_or(0)
}

fn state_label(state: ProcessState, colored: bool) -> String {
	match (state, colored) {
		(ProcessState::Running, true) => state.green().to_string(),
		(ProcessState::Stopped, true) => state.red().to_string(),
		(_, false) => state.to_string(),
	}
}

/// One output line for a record returned by `action`.
pub fn record_line(action: Action, info: &ProcInfo, colored: bool) -> String {
	let status = state_label(info.status, colored);
	match action {
		Action::Start => format!(
			"{} {}\t[PID {}] {}",
			format_time(info.start_at),
			info.name,
			info.pid,
			status
		),
		Action::Stop => format!("[{}] Stopped {}\t[PID {}]", format_time(info.stop_at), info.name, info.pid),
		Action::Kill => format!("[{}] Killed {}", format_time(info.stop_at), info.name),
		Action::Restart => format!(
			"[{}] Restarted {}\t[PID {}]",
			format_time(info.start_at),
			info.name,
			info.pid
		),
		Action::Reload => format!("[{}] Load {}\t{}", format_time(now_millis()), info.name, status),
		Action::Status | Action::Log | Action::Run | Action::Shutdown => {
			format!("{}\t\t{}\t\tPID: {}", info.name, status, info.pid)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn info(status: ProcessState, pid: u32) -> ProcInfo {
		ProcInfo {
			pid,
			name: "app::web".to_string(),
			start_at: 1_771_027_200_000,
			stop_at: 1_771_027_265_500,
			status,
		}
	}

	#[test]
	fn formats_epoch_and_known_dates() {
		assert_eq!(format_time(0), "1970-01-01T00:00:00Z");
		assert_eq!(format_time(1_771_027_200_000), "2026-02-14T00:00:00Z");
		assert_eq!(format_time(951_782_400_000), "2000-02-29T00:00:00Z");
		assert_eq!(format_time(-5), "1970-01-01T00:00:00Z");
	}

	#[test]
	fn status_line() {
		let line = record_line(Action::Status, &info(ProcessState::Running, 42), false);
		assert_eq!(line, "app::web\t\trunning\t\tPID: 42");
	}

	#[test]
	fn stop_line_uses_stop_time() {
		let line = record_line(Action::Stop, &info(ProcessState::Stopped, 0), false);
		assert_eq!(line, "[2026-02-14T00:01:05Z] Stopped app::web\t[PID 0]");
	}

	#[test]
	fn start_line_carries_status() {
		let line = record_line(Action::Start, &info(ProcessState::Running, 7), false);
		assert_eq!(line, "2026-02-14T00:00:00Z app::web\t[PID 7] running");
		let colored = record_line(Action::Start, &info(ProcessState::Running, 7), true);
		assert!(colored.contains("\u{1b}["));
	}
}
