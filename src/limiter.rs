use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinSet;

/// FIFO gate admitting at most `concurrency` tasks at a time
///
/// A slot is handed directly from a finishing task to the oldest live waiter,
/// so a newcomer can never overtake a queued task.
#[derive(Clone)]
pub struct Limiter {
    state: Arc<Mutex<State>>,
}

struct State {
    concurrency: usize,
    active: usize,
    waiting: VecDeque<oneshot::Sender<()>>,
}

/// Occupied slot; dropping it admits the next waiter
pub struct Permit {
    state: Arc<Mutex<State>>,
}

impl Limiter {
    /// A concurrency of zero is treated as one
    pub fn new(concurrency: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                concurrency: concurrency.max(1),
                active: 0,
                waiting: VecDeque::new(),
            })),
        }
    }

    pub async fn acquire(&self) -> Permit {
        let rx = {
            let mut state = self.state.lock();
            if state.active < state.concurrency {
                state.active += 1;
                return Permit {
                    state: self.state.clone(),
                };
            }
            let (tx, rx) = oneshot::channel();
            state.waiting.push_back(tx);
            rx
        };

        let mut waiter = Waiter {
            rx: Some(rx),
            state: self.state.clone(),
        };
        if let Some(rx) = waiter.rx.as_mut() {
            // The sender lives in the queue until a slot is handed over
            let _ = rx.await;
        }
        waiter.rx = None;
        Permit {
            state: self.state.clone(),
        }
    }

    /// Runs `task` once a slot is free, releasing the slot however it ends
    pub async fn run<F: Future>(&self, task: F) -> F::Output {
        let _permit = self.acquire().await;
        task.await
    }

    /// Spawns every task behind the gate and returns their outputs in submission order
    ///
    /// Slots of tasks that panicked or were cancelled are `None`.
    pub async fn run_all<T, F>(&self, tasks: impl IntoIterator<Item = F>) -> Vec<Option<T>>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let mut set = JoinSet::new();
        let mut count = 0;
        for (index, task) in tasks.into_iter().enumerate() {
            let permit = self.acquire().await;
            set.spawn(async move {
                let _permit = permit;
                (index, task.await)
            });
            count = index + 1;
        }

        let mut outputs: Vec<Option<T>> = (0..count).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, output)) => outputs[index] = Some(output),
                Err(e) if e.is_panic() => log::error!("Limited task panicked: {e:?}"),
                Err(e) => log::error!("Limited task failed: {e:?}"),
            }
        }
        outputs
    }

    pub fn active(&self) -> usize {
        self.state.lock().active
    }

    pub fn queued(&self) -> usize {
        self.state.lock().waiting.len()
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        release(&self.state);
    }
}

/// Pending acquisition; if dropped mid-wait it gives back a slot it was already handed
struct Waiter {
    rx: Option<oneshot::Receiver<()>>,
    state: Arc<Mutex<State>>,
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            if rx.try_recv().is_ok() {
                release(&self.state);
            }
        }
    }
}

fn release(state: &Mutex<State>) {
    let mut state = state.lock();
    while let Some(next) = state.waiting.pop_front() {
        if next.send(()).is_ok() {
            return;
        }
    }
    state.active -= 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_zero_concurrency_runs_one_at_a_time() {
        let limiter = Limiter::new(0);
        let first = limiter.acquire().await;
        assert_eq!(limiter.active(), 1);

        let second = tokio::spawn({
            let limiter = limiter.clone();
            async move { limiter.run(async { 7 }).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(limiter.queued(), 1);

        drop(first);
        assert_eq!(second.await.unwrap(), 7);
        assert_eq!(limiter.active(), 0);
    }

    #[tokio::test]
    async fn test_waiters_admitted_in_order() {
        let limiter = Limiter::new(1);
        let gate = limiter.acquire().await;
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..3 {
            let order = order.clone();
            handles.push(tokio::spawn({
                let limiter = limiter.clone();
                async move {
                    limiter.run(async { order.lock().push(i) }).await;
                }
            }));
            // Queue each waiter before spawning the next
            while limiter.queued() < i + 1 {
                tokio::task::yield_now().await;
            }
        }

        drop(gate);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_releases_its_place() {
        let limiter = Limiter::new(1);
        let gate = limiter.acquire().await;

        let abandoned = tokio::spawn({
            let limiter = limiter.clone();
            async move { limiter.run(async {}).await }
        });
        while limiter.queued() == 0 {
            tokio::task::yield_now().await;
        }
        abandoned.abort();
        let _ = abandoned.await;

        drop(gate);
        assert_eq!(limiter.active(), 0);
        assert_eq!(limiter.run(async { 1 }).await, 1);
    }

    #[tokio::test]
    async fn test_run_all_bounds_concurrency_and_keeps_order() {
        let limiter = Limiter::new(3);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..10u64).map(|i| {
            let current = current.clone();
            let peak = peak.clone();
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                // Later tasks finish first
                tokio::time::sleep(Duration::from_millis(30 - i * 3)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                i
            }
        });
        let outputs = limiter.run_all(tasks).await;

        assert_eq!(outputs, (0..10).map(Some).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(limiter.active(), 0);
    }

    #[tokio::test]
    async fn test_run_all_isolates_panics() {
        let limiter = Limiter::new(2);
        let tasks = (0..3).map(|i| async move {
            if i == 1 {
                panic!("boom");
            }
            i
        });
        let outputs = limiter.run_all(tasks).await;
        assert_eq!(outputs, vec![Some(0), None, Some(2)]);
        assert_eq!(limiter.active(), 0);
    }
}
