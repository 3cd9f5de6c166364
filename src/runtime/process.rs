//! 被监控进程

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// 进程监控 trait
///
/// 服务宿主在启动时检查被监控进程是否存在，并在其退出时自动停止服务
#[async_trait]
pub trait ProcessMonitor: Send + Sync {
    /// 进程当前是否存在
    fn exists(&self, pid: u32) -> bool;

    /// 等待进程退出
    async fn wait_for_exit(&self, pid: u32);
}

/// 基于 `/proc` 轮询的进程监控
#[derive(Debug, Clone)]
pub struct ProcfsProcessMonitor {
    root: PathBuf,
    poll_interval: Duration,
}

impl ProcfsProcessMonitor {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/proc"),
            poll_interval: Duration::from_secs(1),
        }
    }

    /// 设置轮询间隔
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn process_path(&self, pid: u32) -> PathBuf {
        self.root.join(pid.to_string())
    }
}

impl Default for ProcfsProcessMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessMonitor for ProcfsProcessMonitor {
    fn exists(&self, pid: u32) -> bool {
        self.process_path(pid).exists()
    }

    async fn wait_for_exit(&self, pid: u32) {
        let path = self.process_path(pid);
        let mut timer = tokio::time::interval(self.poll_interval);
        loop {
            timer.tick().await;
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                tracing::info!(pid, "Monitored process exited");
                return;
            }
        }
    }
}
