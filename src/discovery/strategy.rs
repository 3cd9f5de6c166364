//! 流量路由策略
//!
//! 每个 `TrafficRoutingStrategy` 构建一个自己持有状态的 `TrafficRouter`。
//! 在状态与输入相同的情况下选择结果是确定的（随机策略除外）

use parking_lot::Mutex;
use rand::Rng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::discovery::config::TrafficRoutingStrategy;
use crate::discovery::node::Node;

/// 路由器 trait
///
/// 从候选节点中选择一个；候选为空时返回 `None`，由负载均衡器转换为 `NoAvailableNodes`
pub trait TrafficRouter: Send + Sync {
    /// 选择节点
    ///
    /// # 参数
    /// * `candidates` - 候选节点（顺序稳定）
    /// * `affinity_key` - 亲和键（如请求 ID），只有部分策略使用
    fn pick(&self, candidates: &[Node], affinity_key: Option<&str>) -> Option<Node>;
}

impl TrafficRoutingStrategy {
    /// 构建持有独立状态的路由器
    pub fn router(&self) -> Box<dyn TrafficRouter> {
        match self {
            TrafficRoutingStrategy::RoundRobin => Box::new(RoundRobinRouter::default()),
            TrafficRoutingStrategy::Random => Box::new(RandomRouter),
            TrafficRoutingStrategy::Sticky => Box::new(StickyRouter::default()),
            TrafficRoutingStrategy::ConsistentHash => Box::new(ConsistentHashRouter::default()),
        }
    }
}

/// 轮询
#[derive(Debug, Default)]
pub struct RoundRobinRouter {
    cursor: AtomicUsize,
}

impl TrafficRouter for RoundRobinRouter {
    fn pick(&self, candidates: &[Node], _affinity_key: Option<&str>) -> Option<Node> {
        if candidates.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::AcqRel);
        candidates.get(index % candidates.len()).cloned()
    }
}

/// 随机
#[derive(Debug, Default)]
pub struct RandomRouter;

impl TrafficRouter for RandomRouter {
    fn pick(&self, candidates: &[Node], _affinity_key: Option<&str>) -> Option<Node> {
        if candidates.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..candidates.len());
        candidates.get(index).cloned()
    }
}

/// 粘滞：上次选中的节点仍在候选中时继续使用，否则轮转到下一个
#[derive(Debug, Default)]
pub struct StickyRouter {
    current: Mutex<Option<Node>>,
    fallback: RoundRobinRouter,
}

impl TrafficRouter for StickyRouter {
    fn pick(&self, candidates: &[Node], affinity_key: Option<&str>) -> Option<Node> {
        let mut current = self.current.lock();
        if let Some(node) = current.as_ref() {
            if candidates.contains(node) {
                return Some(node.clone());
            }
        }
        let next = self.fallback.pick(candidates, affinity_key)?;
        *current = Some(next.clone());
        Some(next)
    }
}

/// 一致性哈希（rendezvous hashing）
///
/// 同一亲和键总是落在同一节点上，节点增减只影响落在该节点上的键
#[derive(Debug, Default)]
pub struct ConsistentHashRouter {
    fallback: RoundRobinRouter,
}

impl ConsistentHashRouter {
    fn weight(key: &str, node: &Node) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        node.hostname.hash(&mut hasher);
        node.port.hash(&mut hasher);
        hasher.finish()
    }
}

impl TrafficRouter for ConsistentHashRouter {
    fn pick(&self, candidates: &[Node], affinity_key: Option<&str>) -> Option<Node> {
        match affinity_key {
            Some(key) => candidates
                .iter()
                .max_by_key(|node| Self::weight(key, node))
                .cloned(),
            None => self.fallback.pick(candidates, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(names: &[&str]) -> Vec<Node> {
        names.iter().map(|n| Node::new(*n, Some(80))).collect()
    }

    #[test]
    fn round_robin_cycles_in_order() {
        let router = TrafficRoutingStrategy::RoundRobin.router();
        let candidates = nodes(&["a", "b", "c"]);
        let picked: Vec<String> = (0..4)
            .filter_map(|_| router.pick(&candidates, None))
            .map(|n| n.hostname)
            .collect();
        assert_eq!(picked, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn every_strategy_returns_none_for_empty_candidates() {
        for strategy in [
            TrafficRoutingStrategy::RoundRobin,
            TrafficRoutingStrategy::Random,
            TrafficRoutingStrategy::Sticky,
            TrafficRoutingStrategy::ConsistentHash,
        ] {
            assert!(strategy.router().pick(&[], Some("key")).is_none(), "{:?}", strategy);
        }
    }

    #[test]
    fn random_picks_a_candidate() {
        let router = RandomRouter;
        let candidates = nodes(&["a", "b", "c"]);
        for _ in 0..20 {
            let node = router.pick(&candidates, None).expect("candidate");
            assert!(candidates.contains(&node));
        }
    }

    #[test]
    fn sticky_keeps_node_until_it_disappears() {
        let router = StickyRouter::default();
        let all = nodes(&["a", "b", "c"]);
        let first = router.pick(&all, None).expect("node");
        assert_eq!(router.pick(&all, None), Some(first.clone()));
        assert_eq!(router.pick(&all, None), Some(first.clone()));

        let without_first: Vec<Node> = all.iter().filter(|n| **n != first).cloned().collect();
        let second = router.pick(&without_first, None).expect("node");
        assert_ne!(second, first);
        assert_eq!(router.pick(&all, None), Some(second));
    }

    #[test]
    fn consistent_hash_is_stable_per_key() {
        let router = ConsistentHashRouter::default();
        let all = nodes(&["a", "b", "c", "d"]);
        let chosen = router.pick(&all, Some("request-42")).expect("node");
        for _ in 0..5 {
            assert_eq!(router.pick(&all, Some("request-42")), Some(chosen.clone()));
        }

        // 移除其他节点不影响该键的落点
        let reduced: Vec<Node> = all
            .iter()
            .filter(|n| **n == chosen || n.hostname == "a")
            .cloned()
            .collect();
        assert_eq!(router.pick(&reduced, Some("request-42")), Some(chosen));
    }
}
