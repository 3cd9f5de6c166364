//! 错误代码和错误类别定义
//!
//! 错误代码按类别分组，每个类别占用 100 个代码范围：
//! - 6000-6099: 系统相关错误
//! - 6100-6199: 服务发现相关错误
//! - 6200-6299: 服务宿主（生命周期）相关错误
//! - 6300-6399: 配置相关错误

use serde::{Deserialize, Serialize};
use std::fmt;

/// 错误代码枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum ErrorCode {
    // ============================================================
    // 系统相关错误 (6000-6099)
    // ============================================================
    InternalError = 6000,
    ServiceUnavailable = 6001,

    // ============================================================
    // 服务发现相关错误 (6100-6199)
    // ============================================================
    DiscoveryUnavailable = 6100,
    NoAvailableNodes = 6101,
    Disposed = 6102,

    // ============================================================
    // 服务宿主相关错误 (6200-6299)
    // ============================================================
    InvalidOperation = 6200,
    UnsupportedRuntime = 6201,
    MonitoredProcessNotFound = 6202,
    StartFailed = 6203,

    // ============================================================
    // 配置相关错误 (6300-6399)
    // ============================================================
    ConfigurationError = 6300,
}

impl ErrorCode {
    /// 获取错误代码的数值
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// 获取错误代码的字符串表示
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::DiscoveryUnavailable => "DISCOVERY_UNAVAILABLE",
            ErrorCode::NoAvailableNodes => "NO_AVAILABLE_NODES",
            ErrorCode::Disposed => "DISPOSED",
            ErrorCode::InvalidOperation => "INVALID_OPERATION",
            ErrorCode::UnsupportedRuntime => "UNSUPPORTED_RUNTIME",
            ErrorCode::MonitoredProcessNotFound => "MONITORED_PROCESS_NOT_FOUND",
            ErrorCode::StartFailed => "START_FAILED",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
        }
    }

    /// 获取错误代码的类别（用于错误分类）
    pub fn category(&self) -> ErrorCategory {
        match self.as_u32() {
            6100..=6199 => ErrorCategory::Discovery,
            6200..=6299 => ErrorCategory::Lifecycle,
            6300..=6399 => ErrorCategory::Configuration,
            _ => ErrorCategory::System,
        }
    }

    /// 判断是否为可重试的错误
    ///
    /// 重试与退避由调用方负责，这里只给出分类建议
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::ServiceUnavailable
                | ErrorCode::DiscoveryUnavailable
                | ErrorCode::NoAvailableNodes
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.as_str(), self.as_u32())
    }
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    System,
    Discovery,
    Lifecycle,
    Configuration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::System => write!(f, "SYSTEM"),
            ErrorCategory::Discovery => write!(f, "DISCOVERY"),
            ErrorCategory::Lifecycle => write!(f, "LIFECYCLE"),
            ErrorCategory::Configuration => write!(f, "CONFIGURATION"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_code_ranges() {
        assert_eq!(ErrorCode::NoAvailableNodes.category(), ErrorCategory::Discovery);
        assert_eq!(ErrorCode::InvalidOperation.category(), ErrorCategory::Lifecycle);
        assert_eq!(ErrorCode::ConfigurationError.category(), ErrorCategory::Configuration);
        assert_eq!(ErrorCode::ServiceUnavailable.category(), ErrorCategory::System);
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(ErrorCode::NoAvailableNodes.is_retryable());
        assert!(ErrorCode::DiscoveryUnavailable.is_retryable());
        assert!(!ErrorCode::InvalidOperation.is_retryable());
        assert!(!ErrorCode::Disposed.is_retryable());
    }
}
