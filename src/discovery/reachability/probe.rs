//! 主动探测的可达性检查
//!
//! 通过两种方式维护节点健康状态：
//! 1. 后台周期性探测（默认 TCP 连接探测）
//! 2. 负载均衡器反馈的调用结果

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery::config::{ProbeProtocol, ReachabilityConfig};
use crate::discovery::node::{DeploymentIdentifier, Node};
use crate::discovery::reachability::{CallOutcome, HealthStatus, ReachabilityCheck, TrackerId};

/// 探测器 trait
#[async_trait]
pub trait Prober: Send + Sync {
    /// 探测节点，返回是否成功
    async fn probe(&self, node: &Node) -> bool;
}

/// TCP 连接探测器
#[derive(Debug, Clone)]
pub struct TcpProber {
    /// 节点未声明端口时使用的端口
    default_port: u16,
}

impl TcpProber {
    pub fn new(default_port: u16) -> Self {
        Self { default_port }
    }
}

impl Default for TcpProber {
    fn default() -> Self {
        Self::new(80)
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, node: &Node) -> bool {
        let port = node.port.unwrap_or(self.default_port);
        tokio::net::TcpStream::connect((node.hostname.as_str(), port))
            .await
            .is_ok()
    }
}

/// 单个节点的探测状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct NodeHealthState {
    status: HealthStatus,
    consecutive_failures: u32,
    consecutive_successes: u32,
}

impl NodeHealthState {
    /// 记录一次成功
    fn record_success(&mut self, config: &ReachabilityConfig) {
        self.consecutive_failures = 0;
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.status = match self.status {
            HealthStatus::Unreachable
                if self.consecutive_successes < config.recovery_threshold.max(1) =>
            {
                HealthStatus::Unreachable
            }
            _ => HealthStatus::Healthy,
        };
    }

    /// 记录一次失败；`hard` 表示直接标记为不可达
    fn record_failure(&mut self, config: &ReachabilityConfig, hard: bool) {
        self.consecutive_successes = 0;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.status = if hard
            || self.status == HealthStatus::Unreachable
            || self.consecutive_failures >= config.failure_threshold.max(1)
        {
            HealthStatus::Unreachable
        } else {
            HealthStatus::Suspect
        };
    }
}

/// 探测表，由检查本身和后台探测任务共享
struct ProbeTable {
    config: ReachabilityConfig,
    prober: Arc<dyn Prober>,
    states: DashMap<Node, NodeHealthState>,
    tracked: DashMap<TrackerId, (DeploymentIdentifier, Vec<Node>)>,
}

impl ProbeTable {
    fn apply(&self, node: &Node, success: bool, hard: bool) {
        let mut entry = self.states.entry(node.clone()).or_default();
        let before = entry.status;
        if success {
            entry.record_success(&self.config);
        } else {
            entry.record_failure(&self.config, hard);
        }
        let after = entry.status;
        drop(entry);

        if before != after {
            match after {
                HealthStatus::Unreachable => {
                    warn!(node = %node, from = %before, "Node marked unreachable")
                }
                _ => info!(node = %node, from = %before, to = %after, "Node health changed"),
            }
        }
    }

    /// 所有被跟踪节点的并集
    fn tracked_nodes(&self) -> Vec<Node> {
        let mut seen = HashSet::new();
        for entry in self.tracked.iter() {
            for node in &entry.value().1 {
                seen.insert(node.clone());
            }
        }
        seen.into_iter().collect()
    }

    /// 清理不再被任何部署跟踪的节点状态
    fn prune(&self) {
        let live: HashSet<Node> = self.tracked_nodes().into_iter().collect();
        self.states.retain(|node, _| live.contains(node));
    }

    async fn probe_round(&self) {
        let nodes = self.tracked_nodes();
        if nodes.is_empty() {
            return;
        }

        let timeout = self.config.timeout();
        let probes = nodes.iter().map(|node| async move {
            let ok = matches!(
                tokio::time::timeout(timeout, self.prober.probe(node)).await,
                Ok(true)
            );
            (node, ok)
        });

        for (node, ok) in futures::future::join_all(probes).await {
            debug!(node = %node, success = ok, "Probe finished");
            self.apply(node, ok, false);
        }
    }
}

/// 主动探测的可达性检查
///
/// 后台任务在 `start()` 后按 `interval` 对所有被跟踪节点并发探测；
/// 调用结果反馈可在下一次探测之前降级节点：超时计为普通失败，连接被拒绝直接标记为不可达
pub struct ProbingReachabilityCheck {
    table: Arc<ProbeTable>,
    cancel_token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ProbingReachabilityCheck {
    /// 使用 TCP 探测器创建（不启动后台探测）
    pub fn new(config: ReachabilityConfig) -> Self {
        Self::with_prober(config, Arc::new(TcpProber::default()))
    }

    /// 使用自定义探测器创建（不启动后台探测）
    pub fn with_prober(config: ReachabilityConfig, prober: Arc<dyn Prober>) -> Self {
        Self {
            table: Arc::new(ProbeTable {
                config,
                prober,
                states: DashMap::new(),
                tracked: DashMap::new(),
            }),
            cancel_token: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    /// 创建并立即启动后台探测
    pub fn spawn(config: ReachabilityConfig, prober: Arc<dyn Prober>) -> Arc<Self> {
        let check = Arc::new(Self::with_prober(config, prober));
        check.start();
        check
    }

    /// 启动后台探测循环（幂等；协议为 `None` 时不启动）
    pub fn start(&self) {
        if self.table.config.protocol == ProbeProtocol::None {
            debug!("Probe protocol is none, relying on call outcome feedback only");
            return;
        }

        let mut handle = self.handle.lock();
        if handle.is_some() || self.cancel_token.is_cancelled() {
            return;
        }

        let table = self.table.clone();
        let cancel_token = self.cancel_token.clone();

        *handle = Some(tokio::spawn(async move {
            let mut timer = tokio::time::interval(table.config.interval());
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        debug!("Reachability probe loop shutting down");
                        return;
                    }
                    _ = timer.tick() => {
                        table.probe_round().await;
                    }
                }
            }
        }));
    }

    /// 停止后台探测
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }

    /// 立即执行一轮探测
    pub async fn probe_now(&self) {
        self.table.probe_round().await;
    }

    pub fn config(&self) -> &ReachabilityConfig {
        &self.table.config
    }
}

impl ReachabilityCheck for ProbingReachabilityCheck {
    fn status(&self, node: &Node) -> HealthStatus {
        self.table
            .states
            .get(node)
            .map(|s| s.status)
            .unwrap_or_default()
    }

    fn report_outcome(&self, node: &Node, outcome: CallOutcome) {
        match outcome {
            CallOutcome::Success => self.table.apply(node, true, false),
            CallOutcome::Timeout => self.table.apply(node, false, false),
            CallOutcome::Refused => self.table.apply(node, false, true),
        }
    }

    fn track(&self, tracker: TrackerId, deployment: &DeploymentIdentifier, nodes: &[Node]) {
        self.table
            .tracked
            .insert(tracker, (deployment.clone(), nodes.to_vec()));
        self.table.prune();
    }

    fn detach(&self, tracker: TrackerId) {
        if let Some((_, (deployment, _))) = self.table.tracked.remove(&tracker) {
            debug!(deployment = %deployment, tracker = %tracker, "Tracker detached");
        }
        self.table.prune();
    }
}

impl Drop for ProbingReachabilityCheck {
    fn drop(&mut self) {
        self.shutdown();
    }
}
