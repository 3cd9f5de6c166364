//! 日志初始化
//!
//! `RUST_LOG` 控制过滤级别（默认 `info`），`LOG_FORMAT=json` 输出 JSON 行

use tracing_subscriber::{EnvFilter, fmt};

use crate::runtime::ConsoleOutputMode;

/// 安装全局 tracing 订阅者；重复调用不会覆盖已有的订阅者
pub fn init_logging(mode: ConsoleOutputMode) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let result = if json {
        fmt().with_env_filter(filter).with_target(true).json().try_init()
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_ansi(mode == ConsoleOutputMode::Color)
            .compact()
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("Global tracing subscriber already installed");
    }
}
