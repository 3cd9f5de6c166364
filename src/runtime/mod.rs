//! 服务宿主运行时
//!
//! 管理单个服务进程的生命周期：启动、运行、优雅/强制停止、崩溃处理以及被监控进程的退出监视
//!
//! # 使用示例
//!
//! ```rust,no_run
//! use flare_service_host::runtime::{HostContext, HostedService, ServiceArguments, ServiceHost};
//!
//! struct Orders;
//!
//! #[async_trait::async_trait]
//! impl HostedService for Orders {
//!     async fn on_start(&self, ctx: &HostContext) -> anyhow::Result<()> {
//!         tracing::info!(instance = %ctx.identity.instance_name, "orders ready");
//!         Ok(())
//!     }
//!
//!     async fn on_stop(&self) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     let args = ServiceArguments::from_command_line()?;
//!     let host = ServiceHost::builder(Orders).with_name("orders").build();
//!     host.run_blocking(args)?;
//!     std::process::exit(host.exit_code());
//! }
//! ```

pub mod config;
pub mod console;
pub mod host;
pub mod process;
pub mod service;
pub mod signal;
pub mod trigger;

pub use config::{ConsoleOutputMode, ServiceArguments, StartupMode};
pub use console::Console;
pub use host::{HostState, ServiceHost, ServiceHostBuilder, StopResult};
pub use process::{ProcessMonitor, ProcfsProcessMonitor};
pub use service::{ApplicationIdentity, HostContext, HostedService};
pub use signal::{Completion, StopGate};
pub use trigger::{ConsoleStopTrigger, SignalStopTrigger, StopTrigger};
