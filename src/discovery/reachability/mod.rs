//! 可达性检查
//!
//! 判断节点当前是否可以安全路由。路由决策只读取缓存的判定结果，
//! 从不等待探测；探测在后台独立运行，调用结果通过反馈钩子提前降级节点。

pub mod probe;

pub use probe::{Prober, ProbingReachabilityCheck, TcpProber};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::discovery::node::{DeploymentIdentifier, Node};

/// 节点健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// 健康
    #[default]
    Healthy,
    /// 可疑：出现过失败但未达到阈值，仍可路由
    Suspect,
    /// 不可达：不参与路由（除非所有节点都不可达）
    Unreachable,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Suspect => write!(f, "suspect"),
            HealthStatus::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// 调用结果（由负载均衡器反馈给可达性检查）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallOutcome {
    /// 调用成功
    Success,
    /// 调用超时
    Timeout,
    /// 连接被拒绝
    Refused,
}

/// 跟踪者标识
///
/// 每个负载均衡器持有一个；同一部署可以被多个负载均衡器（不同策略）同时跟踪
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackerId(Uuid);

impl TrackerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TrackerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TrackerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 可达性检查 trait
///
/// 实现必须是非阻塞的：`status` / `is_reachable` 只读取缓存结果
pub trait ReachabilityCheck: Send + Sync {
    /// 节点当前的缓存健康状态
    fn status(&self, node: &Node) -> HealthStatus;

    /// 节点当前是否可路由
    fn is_reachable(&self, node: &Node) -> bool {
        self.status(node) != HealthStatus::Unreachable
    }

    /// 调用结果反馈
    fn report_outcome(&self, node: &Node, outcome: CallOutcome);

    /// 负载均衡器刷新后告知当前节点集合，用于确定探测范围
    fn track(&self, _tracker: TrackerId, _deployment: &DeploymentIdentifier, _nodes: &[Node]) {}

    /// 负载均衡器释放时解除关联；只清理不再被任何跟踪者覆盖的节点
    fn detach(&self, _tracker: TrackerId) {}
}

/// 永远可达的检查
///
/// 与 `LocalNodeSource` 搭配作为最小参考组合，从不把节点标记为不可达
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReachable;

impl ReachabilityCheck for AlwaysReachable {
    fn status(&self, _node: &Node) -> HealthStatus {
        HealthStatus::Healthy
    }

    fn report_outcome(&self, _node: &Node, _outcome: CallOutcome) {}
}
