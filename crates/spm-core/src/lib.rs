//! # spm-core
//!
//! The supervisor engine behind `spm`: registries of processes and projects,
//! lifecycle orchestration, Procfile reconciliation and the control protocol
//! spoken over the daemon socket.
//!
//! ```rust,no_run
//! use spm_core::{GlobalConfig, ProcfileOption, Supervisor};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sup = Supervisor::new(GlobalConfig::default(), None);
//! let opts = ProcfileOption::new("app", "/srv/app").with_process("web", "python -m http.server");
//! sup.update_app(true, &opts).await;
//! sup.start("app::web").await;
//! # }
//! ```

pub mod config;
pub mod control;
pub mod output;
pub mod process;
pub mod procfile;
pub mod project;
pub mod protocol;
pub mod supervisor;
pub mod table;

pub use config::GlobalConfig;
pub use output::LogSink;
pub use process::{Process, ProcessError, ProcessState};
pub use procfile::{ProcessDef, ProcfileError, ProcfileOption};
pub use project::Project;
pub use protocol::{Action, ActionMsg, ProcInfo, ResponseCode, ResponseMsg};
pub use supervisor::Supervisor;
pub use table::{ProcTable, ProjectTable};
