//! 面向操作员的控制台输出
//!
//! 只是可观察的文本，不是可解析的协议

use colored::Colorize;
use std::time::Duration;

use super::config::ConsoleOutputMode;
use super::host::StopResult;
use super::service::ApplicationIdentity;

/// 控制台输出
#[derive(Debug, Clone, Copy)]
pub struct Console {
    mode: ConsoleOutputMode,
}

impl Console {
    pub fn new(mode: ConsoleOutputMode) -> Self {
        Self { mode }
    }

    fn colored(&self) -> bool {
        self.mode == ConsoleOutputMode::Color
    }

    /// 启动横幅
    pub fn startup_banner(&self, identity: &ApplicationIdentity) {
        let title = format!("{} {}", identity.name, identity.version);
        let detail = format!(
            "instance: {}  host: {}  run: {}",
            identity.instance_name, identity.host_name, identity.run_id
        );
        if self.colored() {
            println!("{}", "=".repeat(60).cyan());
            println!("{}", title.bold().cyan());
            println!("{}", detail.dimmed());
            println!("{}", "=".repeat(60).cyan());
        } else {
            println!("{}", "=".repeat(60));
            println!("{title}");
            println!("{detail}");
            println!("{}", "=".repeat(60));
        }
    }

    /// 交互模式按键提示
    pub fn interactive_hint(&self, hint: &str) {
        if self.colored() {
            println!("{}", hint.yellow());
        } else {
            println!("{hint}");
        }
    }

    /// 停止超时警告
    pub fn shutdown_timeout_warning(&self, deadline: Duration) {
        let message = format!(
            "WARNING: the service did not stop within {}s, shutting down forcefully.",
            deadline.as_secs_f64()
        );
        if self.colored() {
            println!("{}", message.bold().red());
        } else {
            println!("{message}");
        }
    }

    /// 停止完成横幅
    pub fn shutdown_complete(&self, identity: &ApplicationIdentity, result: StopResult) {
        let message = format!("{} stopped ({result})", identity.name);
        if self.colored() {
            let line = match result {
                StopResult::Graceful => message.green(),
                StopResult::Force => message.yellow(),
                StopResult::None => message.normal(),
            };
            println!("{}", line.bold());
        } else {
            println!("{message}");
        }
    }
}
