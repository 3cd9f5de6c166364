//! 节点源抽象和实现

pub mod config;
pub mod local;

pub use config::ConfigNodeSource;
pub use local::LocalNodeSource;

use async_trait::async_trait;

use crate::discovery::node::{DeploymentIdentifier, Node};
use crate::error::DiscoveryResult;

/// 节点源 trait
///
/// 枚举某个部署当前的候选实例。所有节点源（本地、静态配置、注册中心）都需要实现这个 trait
/// 注意：由于需要动态分发（dyn），使用 async-trait
///
/// - 空结果合法，表示"没有已知实例"，不是错误
/// - 后端不可达时必须返回 `DiscoveryError::Unavailable`，不能返回空列表
/// - 动态实现应在后台刷新，并在调用方无需同步的前提下支持并发读取
#[async_trait]
pub trait NodeSource: Send + Sync {
    /// 获取部署的当前节点列表
    async fn get_nodes(&self, deployment: &DeploymentIdentifier) -> DiscoveryResult<Vec<Node>>;

    /// 节点源类型名称（用于日志）
    fn name(&self) -> &str;
}
