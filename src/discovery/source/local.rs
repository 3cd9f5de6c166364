//! 本地单节点源

use async_trait::async_trait;

use crate::discovery::node::{DeploymentIdentifier, Node};
use crate::discovery::source::NodeSource;
use crate::error::DiscoveryResult;

/// 本地节点源
///
/// 对任何部署都返回同一个固定节点，用于本地开发，也是测试的正确性基线。
/// 与 `AlwaysReachable` 搭配构成最小可用组合
#[derive(Debug, Clone)]
pub struct LocalNodeSource {
    node: Node,
}

impl LocalNodeSource {
    /// 使用 `localhost` 作为固定节点
    pub fn new() -> Self {
        Self {
            node: Node::new("localhost", None),
        }
    }

    /// 使用指定节点
    pub fn with_node(node: Node) -> Self {
        Self { node }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }
}

impl Default for LocalNodeSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeSource for LocalNodeSource {
    async fn get_nodes(&self, _deployment: &DeploymentIdentifier) -> DiscoveryResult<Vec<Node>> {
        Ok(vec![self.node.clone()])
    }

    fn name(&self) -> &str {
        "local"
    }
}
