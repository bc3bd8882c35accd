use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Run `job` over `items` with at most `workers` jobs in flight.
///
/// A fixed set of worker tasks pulls items from a shared queue, so one slow
/// item only ever occupies one slot. Workers stop taking new items once
/// `cancel` fires; jobs already running are expected to observe the token
/// themselves. Results come back in completion order.
pub async fn run_bounded<T, R, F, Fut>(
    items: Vec<T>,
    workers: usize,
    cancel: &CancellationToken,
    job: F,
) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let total = items.len();
    let workers = workers.clamp(1, total.max(1));
    let queue = Arc::new(Mutex::new(VecDeque::from(items)));
    let job = Arc::new(job);
    let mut set = JoinSet::new();

    for _ in 0..workers {
        let queue = queue.clone();
        let job = job.clone();
        let cancel = cancel.clone();
        set.spawn(async move {
            let mut done = Vec::new();
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let next = queue.lock().await.pop_front();
                let Some(item) = next else {
                    break;
                };
                done.push(job(item).await);
            }
            done
        });
    }

    let mut out = Vec::with_capacity(total);
    while let Some(res) = set.join_next().await {
        match res {
            Ok(mut done) => out.append(&mut done),
            Err(e) => warn!(error = %e, "worker task failed"),
        }
    }
    out
}
