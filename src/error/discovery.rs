//! 服务发现错误类型

use thiserror::Error;

use super::code::ErrorCode;

/// 服务发现 / 负载均衡错误
#[derive(Error, Debug, Clone)]
pub enum DiscoveryError {
    /// 节点源后端不可达（注册中心不可用）
    ///
    /// 与"没有已知实例"严格区分，不会被当作空节点列表处理
    #[error("discovery unavailable for deployment {deployment}: {reason}")]
    Unavailable { deployment: String, reason: String },

    /// 没有可路由的节点（可恢复，由调用方决定重试策略）
    #[error("no available nodes for deployment {deployment}")]
    NoAvailableNodes { deployment: String },

    /// 所属的 DiscoveryClient 或 LoadBalancer 已释放
    #[error("discovery client has been disposed")]
    Disposed,

    /// 配置错误
    #[error("discovery configuration error: {0}")]
    Config(String),

    /// 当前线程不在 tokio 运行时中，无法启动后台刷新 / 探测任务
    #[error("a tokio runtime is required to create load balancers")]
    RuntimeUnavailable,
}

impl DiscoveryError {
    /// 创建后端不可达错误
    pub fn unavailable(deployment: impl ToString, reason: impl Into<String>) -> Self {
        DiscoveryError::Unavailable {
            deployment: deployment.to_string(),
            reason: reason.into(),
        }
    }

    /// 创建无可用节点错误
    pub fn no_available_nodes(deployment: impl ToString) -> Self {
        DiscoveryError::NoAvailableNodes {
            deployment: deployment.to_string(),
        }
    }

    /// 对应的错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            DiscoveryError::Unavailable { .. } => ErrorCode::DiscoveryUnavailable,
            DiscoveryError::NoAvailableNodes { .. } => ErrorCode::NoAvailableNodes,
            DiscoveryError::Disposed => ErrorCode::Disposed,
            DiscoveryError::Config(_) => ErrorCode::ConfigurationError,
            DiscoveryError::RuntimeUnavailable => ErrorCode::ServiceUnavailable,
        }
    }
}
