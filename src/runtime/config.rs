//! 服务启动参数

use clap::{Parser, ValueEnum};
use std::time::Duration;

/// 启动模式
///
/// 只影响停止的触发方式，内部状态机在两种模式下完全相同
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Default)]
pub enum StartupMode {
    /// 服务模式（非交互）：只能通过 `stop()` 停止
    #[default]
    Service,
    /// 命令行交互模式：后台任务读取控制台输入，按约定按键触发停止
    #[value(alias = "command-line-interactive", alias = "cli")]
    Interactive,
}

/// 控制台输出模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Default)]
pub enum ConsoleOutputMode {
    /// 彩色输出
    #[default]
    Color,
    /// 纯文本输出
    Plain,
}

/// 服务启动参数（解析后不可变）
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "flare-service", about = "Flare service host")]
pub struct ServiceArguments {
    /// 实例名称
    #[arg(long, env = "SERVICE_INSTANCE_NAME")]
    pub instance_name: Option<String>,

    /// 启动模式
    #[arg(long, value_enum, env = "SERVICE_STARTUP_MODE", default_value_t = StartupMode::Service)]
    pub startup_mode: StartupMode,

    /// 控制台输出模式
    #[arg(long = "console-output", value_enum, env = "SERVICE_CONSOLE_OUTPUT", default_value_t = ConsoleOutputMode::Color)]
    pub console_output: ConsoleOutputMode,

    /// 被监控进程 ID，该进程退出时服务自动停止
    #[arg(long, env = "SERVICE_PROCESS_ID_TO_WAIT_FOR")]
    pub process_id_to_wait_for: Option<u32>,

    /// 停止前等待时间（秒）
    #[arg(long, env = "SERVICE_PRE_STOP_WAIT_SECONDS", default_value_t = 0)]
    pub pre_stop_wait_seconds: u64,

    /// 排空时间（秒），超过后强制停止
    #[arg(long, env = "SERVICE_DRAIN_TIMEOUT_SECONDS", default_value_t = 10)]
    pub drain_timeout_seconds: u64,

    /// 崩溃处理时等待优雅停止的上限（秒）
    #[arg(long, env = "SERVICE_CRASH_WAIT_SECONDS", default_value_t = 10)]
    pub crash_wait_seconds: u64,
}

impl Default for ServiceArguments {
    fn default() -> Self {
        Self {
            instance_name: None,
            startup_mode: StartupMode::Service,
            console_output: ConsoleOutputMode::Color,
            process_id_to_wait_for: None,
            pre_stop_wait_seconds: 0,
            drain_timeout_seconds: 10,
            crash_wait_seconds: 10,
        }
    }
}

impl ServiceArguments {
    /// 创建默认参数
    pub fn new() -> Self {
        Self::default()
    }

    /// 从进程命令行和环境变量解析
    pub fn from_command_line() -> Result<Self, clap::Error> {
        Self::try_parse()
    }

    /// 设置实例名称
    pub fn with_instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = Some(name.into());
        self
    }

    /// 设置启动模式
    pub fn with_startup_mode(mut self, mode: StartupMode) -> Self {
        self.startup_mode = mode;
        self
    }

    /// 设置控制台输出模式
    pub fn with_console_output(mut self, mode: ConsoleOutputMode) -> Self {
        self.console_output = mode;
        self
    }

    /// 设置被监控进程
    pub fn with_process_id_to_wait_for(mut self, pid: u32) -> Self {
        self.process_id_to_wait_for = Some(pid);
        self
    }

    /// 设置停止前等待时间
    pub fn with_pre_stop_wait_seconds(mut self, seconds: u64) -> Self {
        self.pre_stop_wait_seconds = seconds;
        self
    }

    /// 设置排空时间
    pub fn with_drain_timeout_seconds(mut self, seconds: u64) -> Self {
        self.drain_timeout_seconds = seconds;
        self
    }

    /// 设置崩溃等待上限
    pub fn with_crash_wait_seconds(mut self, seconds: u64) -> Self {
        self.crash_wait_seconds = seconds;
        self
    }

    pub fn pre_stop_wait(&self) -> Duration {
        Duration::from_secs(self.pre_stop_wait_seconds)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_seconds)
    }

    /// 停止钩子的截止时间 = 停止前等待 + 排空时间
    pub fn stop_deadline(&self) -> Duration {
        self.pre_stop_wait() + self.drain_timeout()
    }

    pub fn crash_wait(&self) -> Duration {
        Duration::from_secs(self.crash_wait_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_line_flags() {
        let args = ServiceArguments::try_parse_from([
            "svc",
            "--instance-name",
            "orders-1",
            "--startup-mode",
            "interactive",
            "--console-output",
            "plain",
            "--process-id-to-wait-for",
            "4242",
            "--pre-stop-wait-seconds",
            "2",
            "--drain-timeout-seconds",
            "5",
        ])
        .expect("valid arguments");

        assert_eq!(args.instance_name.as_deref(), Some("orders-1"));
        assert_eq!(args.startup_mode, StartupMode::Interactive);
        assert_eq!(args.console_output, ConsoleOutputMode::Plain);
        assert_eq!(args.process_id_to_wait_for, Some(4242));
        assert_eq!(args.stop_deadline(), Duration::from_secs(7));
    }

    #[test]
    fn interactive_mode_accepts_long_alias() {
        let args = ServiceArguments::try_parse_from(["svc", "--startup-mode", "command-line-interactive"])
            .expect("valid arguments");
        assert_eq!(args.startup_mode, StartupMode::Interactive);
    }

    #[test]
    fn defaults_match_builder() {
        let args = ServiceArguments::new().with_drain_timeout_seconds(1);
        assert_eq!(args.stop_deadline(), Duration::from_secs(1));
        assert_eq!(args.crash_wait(), Duration::from_secs(10));
        assert_eq!(args.startup_mode, StartupMode::Service);
    }
}
