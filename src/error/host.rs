//! 服务宿主错误类型

use thiserror::Error;

use super::code::ErrorCode;

/// 服务宿主（生命周期控制器）错误
#[derive(Error, Debug)]
pub enum HostError {
    /// 非法操作，例如在已停止的宿主上调用 `stop()`，或在非 Stopped 状态调用 `run()`
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// 不支持的运行环境（需要 64 位）
    #[error("unsupported runtime: a 64-bit process is required")]
    UnsupportedRuntime,

    /// 配置的被监控进程不存在
    #[error("monitored process {0} was not found")]
    MonitoredProcessNotFound(u32),

    /// 启动钩子失败
    #[error("service start hook failed: {0:#}")]
    StartFailed(#[source] anyhow::Error),

    /// 运行时构建等 I/O 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    /// 创建非法操作错误
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        HostError::InvalidOperation(msg.into())
    }

    /// 对应的错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            HostError::InvalidOperation(_) => ErrorCode::InvalidOperation,
            HostError::UnsupportedRuntime => ErrorCode::UnsupportedRuntime,
            HostError::MonitoredProcessNotFound(_) => ErrorCode::MonitoredProcessNotFound,
            HostError::StartFailed(_) => ErrorCode::StartFailed,
            HostError::Io(_) => ErrorCode::InternalError,
        }
    }
}
