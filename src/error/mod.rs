//! Flare Service Host 错误处理模块
//!
//! 提供统一的错误代码分类，以及服务发现与服务宿主两类类型化错误

pub mod code;
pub mod discovery;
pub mod host;

pub use code::{ErrorCategory, ErrorCode};
pub use discovery::DiscoveryError;
pub use host::HostError;

/// 服务发现结果类型
pub type DiscoveryResult<T> = std::result::Result<T, DiscoveryError>;

/// 服务宿主结果类型
pub type HostResult<T> = std::result::Result<T, HostError>;
