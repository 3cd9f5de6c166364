//! 负载均衡器
//!
//! 为单个部署组合节点源、可达性检查与路由策略：
//! - 后台按固定间隔（或显式失效时）刷新节点视图
//! - 新视图以不可变快照整体发布，读者永远不会看到半更新的状态
//! - 选择节点时只读取最近一次发布的快照和缓存的健康判定，不做任何 I/O（首次加载除外）

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery::config::TrafficRoutingStrategy;
use crate::discovery::node::{DeploymentIdentifier, Node};
use crate::discovery::reachability::{CallOutcome, HealthStatus, ReachabilityCheck, TrackerId};
use crate::discovery::source::NodeSource;
use crate::discovery::strategy::TrafficRouter;
use crate::error::{DiscoveryError, DiscoveryResult};

/// 节点视图快照
#[derive(Debug, Clone, Default)]
pub struct NodeSnapshot {
    /// 排序去重后的节点列表
    pub nodes: Vec<Node>,
    /// 刷新时间；`None` 表示尚未成功加载过
    pub refreshed_at: Option<DateTime<Utc>>,
    /// 单调递增的版本号
    pub generation: u64,
}

impl NodeSnapshot {
    pub fn is_loaded(&self) -> bool {
        self.refreshed_at.is_some()
    }
}

/// 负载均衡器与后台刷新任务共享的状态
struct BalancerShared {
    deployment: DeploymentIdentifier,
    source: Arc<dyn NodeSource>,
    reachability: Arc<dyn ReachabilityCheck>,
    tracker: TrackerId,
    snapshot: watch::Sender<Arc<NodeSnapshot>>,
    // 串行化刷新，避免旧结果覆盖新结果
    refresh_lock: tokio::sync::Mutex<()>,
    // 保护 track / detach 与释放之间的顺序
    disposed: Mutex<bool>,
    invalidated: Notify,
}

impl BalancerShared {
    async fn refresh(&self) -> DiscoveryResult<Arc<NodeSnapshot>> {
        self.refresh_inner(false).await
    }

    /// 只在尚未加载过时刷新；并发的首次调用只会触发一次成功加载
    async fn load_once(&self) -> DiscoveryResult<Arc<NodeSnapshot>> {
        self.refresh_inner(true).await
    }

    async fn refresh_inner(&self, only_if_unloaded: bool) -> DiscoveryResult<Arc<NodeSnapshot>> {
        let _guard = self.refresh_lock.lock().await;
        if only_if_unloaded {
            let current = self.current();
            if current.is_loaded() {
                return Ok(current);
            }
        }

        let mut nodes = match self.source.get_nodes(&self.deployment).await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(
                    deployment = %self.deployment,
                    source = %self.source.name(),
                    error = %e,
                    "Failed to refresh nodes, keeping previous snapshot"
                );
                return Err(e);
            }
        };
        nodes.sort();
        nodes.dedup();

        let disposed = self.disposed.lock();
        if *disposed {
            return Err(DiscoveryError::Disposed);
        }
        self.reachability.track(self.tracker, &self.deployment, &nodes);

        let previous = self.snapshot.borrow().clone();
        if previous.nodes != nodes {
            info!(
                deployment = %self.deployment,
                node_count = nodes.len(),
                previous_count = previous.nodes.len(),
                "Node set changed"
            );
        }
        let next = Arc::new(NodeSnapshot {
            nodes,
            refreshed_at: Some(Utc::now()),
            generation: previous.generation + 1,
        });
        self.snapshot.send_replace(next.clone());
        Ok(next)
    }

    fn current(&self) -> Arc<NodeSnapshot> {
        self.snapshot.borrow().clone()
    }
}

/// 负载均衡器
///
/// 由 `DiscoveryClient` 按 (部署标识, 可达性检查, 路由策略) 惰性创建并缓存，
/// 生命周期与所属客户端一致
pub struct LoadBalancer {
    shared: Arc<BalancerShared>,
    strategy: TrafficRoutingStrategy,
    router: Box<dyn TrafficRouter>,
    refresh_interval: Duration,
    cancel_token: CancellationToken,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl LoadBalancer {
    /// 创建负载均衡器并启动后台刷新任务
    ///
    /// 必须在 tokio 运行时上下文中调用
    pub fn new(
        deployment: DeploymentIdentifier,
        source: Arc<dyn NodeSource>,
        reachability: Arc<dyn ReachabilityCheck>,
        strategy: TrafficRoutingStrategy,
        refresh_interval: Duration,
    ) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(NodeSnapshot::default()));
        let shared = Arc::new(BalancerShared {
            deployment,
            source,
            reachability,
            tracker: TrackerId::new(),
            snapshot,
            refresh_lock: tokio::sync::Mutex::new(()),
            disposed: Mutex::new(false),
            invalidated: Notify::new(),
        });

        let balancer = Self {
            shared,
            strategy,
            router: strategy.router(),
            refresh_interval,
            cancel_token: CancellationToken::new(),
            refresh_task: Mutex::new(None),
        };
        balancer.start_refresh_task();

        info!(
            deployment = %balancer.shared.deployment,
            strategy = ?strategy,
            refresh_interval_ms = refresh_interval.as_millis() as u64,
            "Load balancer created"
        );
        balancer
    }

    /// 启动后台刷新任务
    fn start_refresh_task(&self) {
        let shared = self.shared.clone();
        let cancel_token = self.cancel_token.clone();
        let interval = self.refresh_interval;

        let handle = tokio::spawn(async move {
            // 立即加载一次，不等待第一次 interval；首次选择已经加载过时跳过
            let _ = shared.load_once().await;

            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        debug!(deployment = %shared.deployment, "Refresh task shutting down");
                        return;
                    }
                    _ = tokio::time::sleep(interval) => {}
                    _ = shared.invalidated.notified() => {
                        debug!(deployment = %shared.deployment, "Node view invalidated");
                    }
                }
                let _ = shared.refresh().await;
            }
        });
        *self.refresh_task.lock() = Some(handle);
    }

    /// 选择一个节点
    ///
    /// 候选 = 节点源中的节点 ∩ 可达性检查判定为可达的节点；
    /// 候选为空时退回到未过滤的全部节点（宁可选一个可能有问题的路由，也不要没有路由）；
    /// 全部节点也为空时返回 `NoAvailableNodes`
    pub async fn pick_node(&self) -> DiscoveryResult<Node> {
        self.pick(None).await
    }

    /// 按亲和键选择节点（用于 `ConsistentHash` 等策略）
    pub async fn pick_node_for(&self, affinity_key: &str) -> DiscoveryResult<Node> {
        self.pick(Some(affinity_key)).await
    }

    async fn pick(&self, affinity_key: Option<&str>) -> DiscoveryResult<Node> {
        if self.is_disposed() {
            return Err(DiscoveryError::Disposed);
        }

        let snapshot = self.ensure_loaded().await?;
        let deployment = &self.shared.deployment;

        let reachable: Vec<Node> = snapshot
            .nodes
            .iter()
            .filter(|node| self.shared.reachability.is_reachable(node))
            .cloned()
            .collect();

        let candidates: &[Node] = if reachable.is_empty() {
            if !snapshot.nodes.is_empty() {
                debug!(
                    deployment = %deployment,
                    node_count = snapshot.nodes.len(),
                    "No reachable nodes, falling back to the full node set"
                );
            }
            &snapshot.nodes
        } else {
            &reachable
        };

        if candidates.is_empty() {
            return Err(DiscoveryError::no_available_nodes(deployment));
        }

        self.router
            .pick(candidates, affinity_key)
            .ok_or_else(|| DiscoveryError::no_available_nodes(deployment))
    }

    /// 首次使用时等待初始加载；之后只读取已发布的快照
    async fn ensure_loaded(&self) -> DiscoveryResult<Arc<NodeSnapshot>> {
        let snapshot = self.shared.current();
        if snapshot.is_loaded() {
            return Ok(snapshot);
        }
        self.shared.load_once().await
    }

    /// 反馈调用结果，交给可达性检查；不做任何重试
    pub fn report_call_outcome(&self, node: &Node, outcome: CallOutcome) {
        debug!(
            deployment = %self.shared.deployment,
            node = %node,
            outcome = ?outcome,
            "Call outcome reported"
        );
        self.shared.reachability.report_outcome(node, outcome);
    }

    /// 显式刷新节点视图
    pub async fn refresh(&self) -> DiscoveryResult<Arc<NodeSnapshot>> {
        if self.is_disposed() {
            return Err(DiscoveryError::Disposed);
        }
        self.shared.refresh().await
    }

    /// 使当前视图失效，唤醒后台任务立即刷新
    pub fn invalidate(&self) {
        self.shared.invalidated.notify_one();
    }

    /// 当前节点快照
    pub fn snapshot(&self) -> Arc<NodeSnapshot> {
        self.shared.current()
    }

    /// 当前节点列表
    pub fn nodes(&self) -> Vec<Node> {
        self.shared.current().nodes.clone()
    }

    /// 当前节点健康状态（诊断用）
    pub fn node_health(&self) -> Vec<(Node, HealthStatus)> {
        self.shared
            .current()
            .nodes
            .iter()
            .map(|node| (node.clone(), self.shared.reachability.status(node)))
            .collect()
    }

    /// 订阅节点快照变化
    pub fn subscribe(&self) -> watch::Receiver<Arc<NodeSnapshot>> {
        self.shared.snapshot.subscribe()
    }

    pub fn deployment(&self) -> &DeploymentIdentifier {
        &self.shared.deployment
    }

    pub fn strategy(&self) -> TrafficRoutingStrategy {
        self.strategy
    }

    pub fn is_disposed(&self) -> bool {
        *self.shared.disposed.lock()
    }

    /// 释放：停止刷新任务并与可达性检查解除关联（幂等）
    pub fn dispose(&self) {
        {
            let mut disposed = self.shared.disposed.lock();
            if *disposed {
                return;
            }
            *disposed = true;
            self.shared.reachability.detach(self.shared.tracker);
        }

        self.cancel_token.cancel();
        if let Some(handle) = self.refresh_task.lock().take() {
            handle.abort();
        }
        info!(deployment = %self.shared.deployment, "Load balancer disposed");
    }
}

impl Drop for LoadBalancer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.refresh_task.lock().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for LoadBalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadBalancer")
            .field("deployment", &self.shared.deployment)
            .field("strategy", &self.strategy)
            .field("generation", &self.shared.current().generation)
            .finish()
    }
}
