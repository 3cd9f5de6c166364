//! 静态配置节点源

use async_trait::async_trait;
use std::collections::HashMap;

use crate::discovery::config::DiscoveryConfig;
use crate::discovery::node::{DeploymentIdentifier, Node};
use crate::discovery::source::NodeSource;
use crate::error::DiscoveryResult;

/// 静态配置节点源
///
/// 从 `DiscoveryConfig` 中每个部署的 `hosts` 列表读取节点。
/// 未配置的部署返回空列表
#[derive(Debug, Clone)]
pub struct ConfigNodeSource {
    config: DiscoveryConfig,
    // 启动时解析一次，之后只读
    parsed: HashMap<String, Vec<Node>>,
}

impl ConfigNodeSource {
    /// 创建新的静态配置节点源
    pub fn new(config: DiscoveryConfig) -> Self {
        let parsed = config
            .deployments
            .iter()
            .map(|(key, deployment)| (key.clone(), deployment.nodes()))
            .collect();
        Self { config, parsed }
    }
}

#[async_trait]
impl NodeSource for ConfigNodeSource {
    async fn get_nodes(&self, deployment: &DeploymentIdentifier) -> DiscoveryResult<Vec<Node>> {
        let nodes = self
            .parsed
            .get(&deployment.to_string())
            .or_else(|| self.parsed.get(&deployment.service_name))
            .cloned()
            .unwrap_or_default();

        if nodes.is_empty() && self.config.deployment(deployment).is_none() {
            tracing::debug!(deployment = %deployment, "No static hosts configured for deployment");
        }
        Ok(nodes)
    }

    fn name(&self) -> &str {
        "config"
    }
}
