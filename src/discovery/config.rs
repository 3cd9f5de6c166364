//! 服务发现配置

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::discovery::node::{DeploymentIdentifier, Node};
use crate::error::DiscoveryError;

/// 服务发现配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// 负载均衡器刷新节点视图的间隔（毫秒）
    pub refresh_interval_ms: u64,

    /// 默认路由策略
    pub strategy: TrafficRoutingStrategy,

    /// 默认可达性检查配置；未设置时 `load_balancer()` 使用客户端的默认检查
    pub reachability: Option<ReachabilityConfig>,

    /// 按部署覆盖的配置，键为部署标识的字符串形式或服务名
    pub deployments: HashMap<String, DeploymentConfig>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 30_000,
            strategy: TrafficRoutingStrategy::default(),
            reachability: None,
            deployments: HashMap::new(),
        }
    }
}

impl DiscoveryConfig {
    /// 从 TOML 文件加载
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Self, DiscoveryError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DiscoveryError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// 从 TOML 字符串解析
    pub fn from_toml_str(content: &str) -> Result<Self, DiscoveryError> {
        toml::from_str(content).map_err(|e| DiscoveryError::Config(e.to_string()))
    }

    /// 设置刷新间隔
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval_ms = interval.as_millis() as u64;
        self
    }

    /// 设置默认可达性检查配置
    pub fn with_reachability(mut self, reachability: ReachabilityConfig) -> Self {
        self.reachability = Some(reachability);
        self
    }

    /// 添加部署配置
    pub fn with_deployment(mut self, key: impl Into<String>, deployment: DeploymentConfig) -> Self {
        self.deployments.insert(key.into(), deployment);
        self
    }

    /// 查找部署配置：先按完整标识匹配，再按服务名匹配
    pub fn deployment(&self, id: &DeploymentIdentifier) -> Option<&DeploymentConfig> {
        self.deployments
            .get(&id.to_string())
            .or_else(|| self.deployments.get(&id.service_name))
    }

    /// 某个部署的刷新间隔
    pub fn refresh_interval_for(&self, id: &DeploymentIdentifier) -> Duration {
        let ms = self
            .deployment(id)
            .and_then(|d| d.refresh_interval_ms)
            .unwrap_or(self.refresh_interval_ms);
        Duration::from_millis(ms.max(1))
    }

    /// 某个部署的路由策略
    pub fn strategy_for(&self, id: &DeploymentIdentifier) -> TrafficRoutingStrategy {
        self.deployment(id)
            .and_then(|d| d.strategy)
            .unwrap_or(self.strategy)
    }

    /// 某个部署的可达性检查配置：部署覆盖优先，其次是全局配置
    pub fn reachability_for(&self, id: &DeploymentIdentifier) -> Option<ReachabilityConfig> {
        self.deployment(id)
            .and_then(|d| d.reachability.clone())
            .or_else(|| self.reachability.clone())
    }
}

/// 单个部署的配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// 静态节点列表（`host[:port]`）
    pub hosts: Vec<String>,

    /// 路由策略覆盖
    pub strategy: Option<TrafficRoutingStrategy>,

    /// 刷新间隔覆盖（毫秒）
    pub refresh_interval_ms: Option<u64>,

    /// 可达性检查覆盖
    pub reachability: Option<ReachabilityConfig>,
}

impl DeploymentConfig {
    /// 使用静态节点列表创建
    pub fn with_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// 解析静态节点列表，忽略无法解析的条目
    pub fn nodes(&self) -> Vec<Node> {
        self.hosts
            .iter()
            .filter_map(|h| {
                let node = Node::parse(h);
                if node.is_none() {
                    tracing::warn!(host = %h, "Ignoring malformed host entry");
                }
                node
            })
            .collect()
    }
}

/// 流量路由策略
///
/// 值类型，作为负载均衡器缓存键的一部分；轮转 / 亲和状态由各策略构建的路由器自行持有
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrafficRoutingStrategy {
    /// 轮询
    #[default]
    RoundRobin,
    /// 随机
    Random,
    /// 粘滞：只要上次选中的节点仍是候选，就继续使用它
    Sticky,
    /// 一致性哈希：按亲和键选择，无键时退化为轮询
    ConsistentHash,
}

impl std::str::FromStr for TrafficRoutingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "round_robin" | "roundrobin" => Ok(TrafficRoutingStrategy::RoundRobin),
            "random" => Ok(TrafficRoutingStrategy::Random),
            "sticky" => Ok(TrafficRoutingStrategy::Sticky),
            "consistent_hash" | "consistenthash" => Ok(TrafficRoutingStrategy::ConsistentHash),
            _ => Err(format!("Unknown traffic routing strategy: {}", s)),
        }
    }
}

/// 探测协议
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProbeProtocol {
    /// TCP 连接探测
    #[default]
    Tcp,
    /// 不主动探测，只依赖调用结果反馈
    None,
}

/// 可达性检查配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(default)]
pub struct ReachabilityConfig {
    /// 探测协议
    pub protocol: ProbeProtocol,

    /// 探测间隔（毫秒）
    pub interval_ms: u64,

    /// 单次探测超时（毫秒）
    pub timeout_ms: u64,

    /// 失败阈值（连续失败多少次后标记为不可达）
    pub failure_threshold: u32,

    /// 恢复阈值（不可达节点连续成功多少次后恢复健康）
    pub recovery_threshold: u32,
}

impl Default for ReachabilityConfig {
    fn default() -> Self {
        Self {
            protocol: ProbeProtocol::Tcp,
            interval_ms: 10_000,
            timeout_ms: 3_000,
            failure_threshold: 3,
            recovery_threshold: 2,
        }
    }
}

impl ReachabilityConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_per_deployment_overrides() {
        let config = DiscoveryConfig::from_toml_str(
            r#"
            refresh_interval_ms = 5000
            strategy = "random"

            [reachability]
            failure_threshold = 5

            [deployments.orders]
            hosts = ["10.0.0.1:8080", "10.0.0.2:8080"]
            strategy = "sticky"

            [deployments."billing-prod"]
            hosts = ["billing:9000"]
            refresh_interval_ms = 250
            "#,
        )
        .expect("valid config");

        let orders = DeploymentIdentifier::new("orders");
        assert_eq!(config.strategy_for(&orders), TrafficRoutingStrategy::Sticky);
        assert_eq!(config.refresh_interval_for(&orders), Duration::from_millis(5000));
        assert_eq!(config.deployment(&orders).map(|d| d.nodes().len()), Some(2));
        let reachability = config.reachability_for(&orders).expect("global reachability");
        assert_eq!(reachability.failure_threshold, 5);
        assert_eq!(reachability.timeout_ms, 3_000);

        let billing = DeploymentIdentifier::new("billing").with_environment("prod");
        assert_eq!(config.strategy_for(&billing), TrafficRoutingStrategy::Random);
        assert_eq!(config.refresh_interval_for(&billing), Duration::from_millis(250));
    }

    #[test]
    fn reachability_is_opt_in() {
        let orders = DeploymentIdentifier::new("orders");
        assert_eq!(DiscoveryConfig::default().reachability_for(&orders), None);

        let config = DiscoveryConfig::default().with_deployment(
            "orders",
            DeploymentConfig {
                reachability: Some(ReachabilityConfig {
                    failure_threshold: 1,
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        assert_eq!(config.reachability_for(&orders).map(|r| r.failure_threshold), Some(1));
        assert_eq!(config.reachability_for(&DeploymentIdentifier::new("billing")), None);
    }

    #[test]
    fn strategy_from_str_accepts_aliases() {
        assert_eq!("round-robin".parse(), Ok(TrafficRoutingStrategy::RoundRobin));
        assert_eq!("ConsistentHash".parse(), Ok(TrafficRoutingStrategy::ConsistentHash));
        assert!("weighted".parse::<TrafficRoutingStrategy>().is_err());
    }
}
