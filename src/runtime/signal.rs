//! 宿主同步原语
//!
//! - `StopGate`：停止闸门，已触发 ⇔ 服务未在运行
//! - `Completion`：一次性完成信号，最多被赋值一次，可被任意多个等待者在任意时刻订阅

use std::future::Future;
use tokio::sync::watch;

/// 停止闸门
///
/// 初始为已触发状态；每次运行在服务计为已启动之前被复位一次
#[derive(Debug)]
pub struct StopGate {
    signaled: watch::Sender<bool>,
}

impl StopGate {
    /// 创建处于已触发状态的闸门
    pub fn new() -> Self {
        let (signaled, _) = watch::channel(true);
        Self { signaled }
    }

    pub fn is_signaled(&self) -> bool {
        *self.signaled.borrow()
    }

    /// 触发闸门；只有从未触发变为触发的那次调用返回 `true`
    pub fn signal(&self) -> bool {
        self.signaled.send_if_modified(|signaled| {
            if *signaled {
                false
            } else {
                *signaled = true;
                true
            }
        })
    }

    /// 复位闸门；只有从触发变为未触发的那次调用返回 `true`
    pub fn reset(&self) -> bool {
        self.signaled.send_if_modified(|signaled| {
            if *signaled {
                *signaled = false;
                true
            } else {
                false
            }
        })
    }

    /// 等待闸门被触发
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static + use<> {
        let mut rx = self.signaled.subscribe();
        async move {
            let _ = rx.wait_for(|signaled| *signaled).await;
        }
    }
}

impl Default for StopGate {
    fn default() -> Self {
        Self::new()
    }
}

/// 一次性完成信号
///
/// 以单次赋值的方式实现，而不是可复用的标志位：晚到的订阅者也能拿到结果，
/// 不存在"先完成后订阅"的竞态
#[derive(Debug)]
pub struct Completion<T> {
    value: watch::Sender<Option<T>>,
}

impl<T> Completion<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let (value, _) = watch::channel(None);
        Self { value }
    }

    /// 赋值；已经赋过值时返回 `false`，原值保持不变
    pub fn resolve(&self, value: T) -> bool {
        let mut value = Some(value);
        self.value.send_if_modified(|slot| {
            if slot.is_some() {
                false
            } else {
                *slot = value.take();
                true
            }
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.value.borrow().is_some()
    }

    /// 当前值（未完成时为 `None`）
    pub fn get(&self) -> Option<T> {
        self.value.borrow().clone()
    }

    /// 等待完成；信号在完成前被丢弃时返回 `None`
    pub fn wait(&self) -> impl Future<Output = Option<T>> + Send + 'static + use<T> {
        let mut rx = self.value.subscribe();
        async move {
            let value = rx.wait_for(Option::is_some).await.ok().and_then(|v| v.clone());
            value
        }
    }
}

impl<T> Default for Completion<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn gate_starts_signaled_and_transitions_once() {
        let gate = StopGate::new();
        assert!(gate.is_signaled());
        assert!(!gate.signal());
        assert!(gate.reset());
        assert!(!gate.reset());
        assert!(gate.signal());
        assert!(!gate.signal());
    }

    #[tokio::test]
    async fn gate_wait_returns_after_signal() {
        let gate = StopGate::new();
        gate.reset();
        let waiter = gate.wait();
        let handle = tokio::spawn(waiter);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        gate.signal();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("gate wait should finish")
            .expect("task should not panic");
    }

    #[tokio::test]
    async fn gate_waiter_outlives_the_gate() {
        let waiter = {
            let gate = StopGate::new();
            gate.reset();
            gate.wait()
        };
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("dropped gate should release waiters");
    }

    #[tokio::test]
    async fn completion_resolves_at_most_once() {
        let completion = Completion::new();
        let early = completion.wait();
        assert!(completion.resolve(1));
        assert!(!completion.resolve(2));
        assert_eq!(early.await, Some(1));
        assert_eq!(completion.wait().await, Some(1));
        assert_eq!(completion.get(), Some(1));
    }

    #[tokio::test]
    async fn dropped_completion_wakes_waiters_with_none() {
        let completion: Completion<u8> = Completion::new();
        let waiter = completion.wait();
        drop(completion);
        assert_eq!(waiter.await, None);
    }
}
