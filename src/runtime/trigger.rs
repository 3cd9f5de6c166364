//! 外部停止触发器
//!
//! 把"谁来请求停止"从状态机中抽离出来：控制台按键、系统信号或管理端点都只是一个触发器

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

/// 停止触发器 trait
#[async_trait]
pub trait StopTrigger: Send + Sync {
    /// 等待停止请求；返回即表示应当调用 `stop()`
    async fn wait(&self);

    /// 展示给操作员的提示
    fn hint(&self) -> Option<String> {
        None
    }
}

/// 控制台交互触发器
///
/// Ctrl+C，或者输入 `q` / `quit` 并回车
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleStopTrigger;

impl ConsoleStopTrigger {
    fn is_quit_command(line: &str) -> bool {
        matches!(line.trim().to_ascii_lowercase().as_str(), "q" | "quit" | "stop")
    }
}

#[async_trait]
impl StopTrigger for ConsoleStopTrigger {
    async fn wait(&self) {
        let quit_command = async {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if Self::is_quit_command(&line) => return,
                    Ok(Some(_)) => continue,
                    // 输入流关闭：只剩 Ctrl+C 可以触发
                    Ok(None) | Err(_) => std::future::pending::<()>().await,
                }
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown key combination received (Ctrl+C)");
            }
            () = quit_command => {
                tracing::info!("Shutdown command received from console");
            }
        }
    }

    fn hint(&self) -> Option<String> {
        Some("Press [Ctrl+C] or type 'q' and [Enter] to stop the service gracefully.".to_string())
    }
}

/// 系统信号触发器（Ctrl+C / SIGTERM）
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalStopTrigger;

#[async_trait]
impl StopTrigger for SignalStopTrigger {
    async fn wait(&self) {
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {
                            tracing::info!("Shutdown signal received (Ctrl+C)");
                        }
                        _ = sigterm.recv() => {
                            tracing::info!("Shutdown signal received (SIGTERM)");
                        }
                    }
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install SIGTERM handler, falling back to Ctrl+C only");
                }
            }
        }

        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received (Ctrl+C)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quit_commands_are_case_insensitive() {
        assert!(ConsoleStopTrigger::is_quit_command("q"));
        assert!(ConsoleStopTrigger::is_quit_command("  QUIT \n"));
        assert!(!ConsoleStopTrigger::is_quit_command("query"));
    }
}
