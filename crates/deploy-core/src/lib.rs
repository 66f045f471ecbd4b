pub mod backend;
pub mod checker;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod installer;
pub mod registry;
pub mod report;
pub mod task;

pub use backend::{CommandOutput, Inventory, PlaybookOutcome, PlaybookStatus, RemoteBackend, RemoteNode};
pub use checker::{CheckResult, CheckStatus, CheckSummary, Checker, CheckerManager};
pub use config::Config;
pub use error::{DeployError, Result, Stage};
pub use events::{Event, EventKind};
pub use executor::{DeploymentExecutor, ExecutorControl, ExecutorSettings};
pub use installer::{InstallContext, Installer, InstallerRegistry, StageReport};
pub use registry::{TaskRegistry, TaskStatistics};
pub use report::RunReport;
pub use task::{Task, TaskId, TaskStatus};
