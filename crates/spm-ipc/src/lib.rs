pub mod paths;
pub mod frame;
pub mod server;
pub mod client;
pub mod daemon;

pub use paths::DaemonPaths;
pub use client::{DaemonClient, ClientError};
pub use frame::FrameError;
pub use daemon::{RuntimeContext, DaemonGuard, DaemonError, ShutdownHandle, ShutdownReason};
