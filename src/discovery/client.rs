//! 服务发现客户端
//!
//! 按 (部署标识, 可达性检查, 路由策略) 缓存负载均衡器，保证同一进程内每个键最多创建一个实例

use dashmap::DashMap;
use parking_lot::RwLock;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{error, info};

use crate::discovery::config::{DiscoveryConfig, ReachabilityConfig, TrafficRoutingStrategy};
use crate::discovery::load_balancer::LoadBalancer;
use crate::discovery::node::{DeploymentIdentifier, Node};
use crate::discovery::reachability::{
    AlwaysReachable, Prober, ProbingReachabilityCheck, ReachabilityCheck, TcpProber,
};
use crate::discovery::source::{LocalNodeSource, NodeSource};
use crate::error::{DiscoveryError, DiscoveryResult};

/// 负载均衡器缓存键
///
/// 可达性检查按实例身份（`Arc` 指针）区分；被缓存的负载均衡器持有该 `Arc`，地址不会被复用
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LoadBalancerKey {
    deployment: DeploymentIdentifier,
    reachability: usize,
    strategy: TrafficRoutingStrategy,
}

impl LoadBalancerKey {
    fn new(
        deployment: &DeploymentIdentifier,
        reachability: &Arc<dyn ReachabilityCheck>,
        strategy: TrafficRoutingStrategy,
    ) -> Self {
        Self {
            deployment: deployment.clone(),
            reachability: Arc::as_ptr(reachability) as *const () as usize,
            strategy,
        }
    }
}

/// 服务发现客户端
pub struct DiscoveryClient {
    source: Arc<dyn NodeSource>,
    config: DiscoveryConfig,
    default_reachability: Arc<dyn ReachabilityCheck>,
    prober: Arc<dyn Prober>,
    balancers: DashMap<LoadBalancerKey, Arc<LoadBalancer>>,
    // 按配置共享探测检查，使同一配置的部署得到相同的缓存键
    probing_checks: DashMap<ReachabilityConfig, Arc<ProbingReachabilityCheck>>,
    // 创建时持读锁，释放时持写锁，避免释放后仍有负载均衡器被插入
    disposed: RwLock<bool>,
}

impl DiscoveryClient {
    /// 创建新的服务发现客户端
    pub fn new(source: Arc<dyn NodeSource>, config: DiscoveryConfig) -> Self {
        info!(source = %source.name(), "Discovery client created");
        Self {
            source,
            config,
            default_reachability: Arc::new(AlwaysReachable),
            prober: Arc::new(TcpProber::default()),
            balancers: DashMap::new(),
            probing_checks: DashMap::new(),
            disposed: RwLock::new(false),
        }
    }

    /// 最小参考组合：本地单节点源 + 永远可达
    pub fn local() -> Self {
        Self::new(Arc::new(LocalNodeSource::new()), DiscoveryConfig::default())
    }

    /// 设置 `load_balancer()` 在没有可达性配置时使用的默认检查
    pub fn with_default_reachability(mut self, reachability: Arc<dyn ReachabilityCheck>) -> Self {
        self.default_reachability = reachability;
        self
    }

    /// 设置按配置创建的探测检查所使用的探测器（默认 TCP）
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = prober;
        self
    }

    /// 获取或创建负载均衡器
    ///
    /// 相同的键总是返回同一个实例；并发首次访问时也只会创建一个。
    /// 负载均衡器会启动后台刷新任务，因此必须在 tokio 运行时中调用，否则返回 `RuntimeUnavailable`
    pub fn create_load_balancer(
        &self,
        deployment: &DeploymentIdentifier,
        reachability: Arc<dyn ReachabilityCheck>,
        strategy: TrafficRoutingStrategy,
    ) -> DiscoveryResult<Arc<LoadBalancer>> {
        let disposed = self.disposed.read();
        if *disposed {
            return Err(DiscoveryError::Disposed);
        }
        ensure_runtime()?;
        Ok(self.get_or_create(deployment, reachability, strategy))
    }

    /// 使用配置中的路由策略和可达性检查获取负载均衡器
    ///
    /// 部署（或全局）配置了 `reachability` 时，使用按该配置共享的 `ProbingReachabilityCheck`；
    /// 否则使用默认检查
    pub fn load_balancer(&self, deployment: &DeploymentIdentifier) -> DiscoveryResult<Arc<LoadBalancer>> {
        let disposed = self.disposed.read();
        if *disposed {
            return Err(DiscoveryError::Disposed);
        }
        ensure_runtime()?;

        let reachability: Arc<dyn ReachabilityCheck> = match self.config.reachability_for(deployment) {
            Some(config) => self.probing_check(config),
            None => self.default_reachability.clone(),
        };
        Ok(self.get_or_create(deployment, reachability, self.config.strategy_for(deployment)))
    }

    fn probing_check(&self, config: ReachabilityConfig) -> Arc<ProbingReachabilityCheck> {
        self.probing_checks
            .entry(config.clone())
            .or_insert_with(|| {
                info!(
                    protocol = ?config.protocol,
                    interval_ms = config.interval_ms,
                    failure_threshold = config.failure_threshold,
                    "Reachability probing started"
                );
                ProbingReachabilityCheck::spawn(config, self.prober.clone())
            })
            .clone()
    }

    /// 调用方持有 `disposed` 读锁
    fn get_or_create(
        &self,
        deployment: &DeploymentIdentifier,
        reachability: Arc<dyn ReachabilityCheck>,
        strategy: TrafficRoutingStrategy,
    ) -> Arc<LoadBalancer> {
        let key = LoadBalancerKey::new(deployment, &reachability, strategy);
        self.balancers
            .entry(key)
            .or_insert_with(|| {
                Arc::new(LoadBalancer::new(
                    deployment.clone(),
                    self.source.clone(),
                    reachability,
                    strategy,
                    self.config.refresh_interval_for(deployment),
                ))
            })
            .clone()
    }

    /// 直接查询节点源（绕过负载均衡器，诊断用）
    pub async fn get_nodes(&self, deployment: &DeploymentIdentifier) -> DiscoveryResult<Vec<Node>> {
        if self.is_disposed() {
            return Err(DiscoveryError::Disposed);
        }
        self.source.get_nodes(deployment).await
    }

    /// 当前缓存的负载均衡器数量
    pub fn load_balancer_count(&self) -> usize {
        self.balancers.len()
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn is_disposed(&self) -> bool {
        *self.disposed.read()
    }

    /// 释放所有负载均衡器（幂等）
    ///
    /// 单个负载均衡器释放失败只记录日志，不影响其余资源的释放
    pub fn dispose(&self) {
        let mut disposed = self.disposed.write();
        if *disposed {
            return;
        }
        *disposed = true;

        let keys: Vec<LoadBalancerKey> = self.balancers.iter().map(|e| e.key().clone()).collect();
        let count = keys.len();
        for key in keys {
            if let Some((key, balancer)) = self.balancers.remove(&key) {
                if catch_unwind(AssertUnwindSafe(|| balancer.dispose())).is_err() {
                    error!(deployment = %key.deployment, "Load balancer disposal panicked");
                }
            }
        }
        for entry in self.probing_checks.iter() {
            entry.value().shutdown();
        }
        self.probing_checks.clear();
        info!(load_balancers = count, "Discovery client disposed");
    }
}

fn ensure_runtime() -> DiscoveryResult<()> {
    tokio::runtime::Handle::try_current()
        .map(|_| ())
        .map_err(|_| DiscoveryError::RuntimeUnavailable)
}

impl Drop for DiscoveryClient {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for DiscoveryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryClient")
            .field("source", &self.source.name())
            .field("load_balancers", &self.balancers.len())
            .finish()
    }
}
