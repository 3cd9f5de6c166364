//! 被托管服务与运行上下文

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use super::config::ServiceArguments;
use crate::discovery::DiscoveryClient;

/// 被托管的服务
///
/// 宿主在 `Starting` 阶段调用 `on_start`，在 `Stopping` 阶段以截止时间约束调用 `on_stop`
#[async_trait]
pub trait HostedService: Send + Sync + 'static {
    /// 启动钩子；返回错误时本次运行直接结束，不进入 Running
    async fn on_start(&self, ctx: &HostContext) -> anyhow::Result<()>;

    /// 停止钩子；超过截止时间未完成时结果记为强制停止
    async fn on_stop(&self) -> anyhow::Result<()>;
}

/// 应用标识，每次运行初始化一次
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationIdentity {
    pub name: String,
    pub instance_name: String,
    pub version: String,
    pub host_name: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl ApplicationIdentity {
    /// 根据启动参数生成；未指定实例名时使用 `<name>-<run_id 前 8 位>`
    pub fn new(name: impl Into<String>, version: impl Into<String>, args: &ServiceArguments) -> Self {
        let name = name.into();
        let run_id = Uuid::new_v4();
        let instance_name = args
            .instance_name
            .clone()
            .unwrap_or_else(|| format!("{}-{}", name, &run_id.simple().to_string()[..8]));
        let host_name = std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string());

        Self {
            name,
            instance_name,
            version: version.into(),
            host_name,
            run_id,
            started_at: Utc::now(),
        }
    }
}

/// 传给启动钩子的运行上下文
///
/// 显式传递，不使用进程级全局状态；发现客户端在本次运行结束时被释放
#[derive(Debug, Clone)]
pub struct HostContext {
    pub identity: ApplicationIdentity,
    pub arguments: ServiceArguments,
    pub discovery: Arc<DiscoveryClient>,
}
