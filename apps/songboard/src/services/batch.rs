//! Bounded fan-out over independent async operations.

use futures::future::join_all;
use std::future::Future;

/// Runs `f` over `items` in chunks of `batch_size`.
///
/// Every future of a chunk settles before the next chunk starts, so at most
/// `batch_size` operations are in flight. Results keep the input order.
pub async fn run_batched<T, F, Fut, R>(items: Vec<T>, batch_size: usize, f: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let batch_size = batch_size.max(1);
    let mut results = Vec::with_capacity(items.len());
    let mut items = items.into_iter().peekable();

    while items.peek().is_some() {
        let batch: Vec<Fut> = items.by_ref().take(batch_size).map(&f).collect();
        results.extend(join_all(batch).await);
    }

    results
}

/// Like [`run_batched`] for fallible operations.
///
/// The batch containing the first failure still settles completely, but no
/// further batch is started and the first error is returned.
pub async fn try_run_batched<T, F, Fut, R, E>(
    items: Vec<T>,
    batch_size: usize,
    f: F,
) -> Result<Vec<R>, E>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let batch_size = batch_size.max(1);
    let mut results = Vec::with_capacity(items.len());
    let mut items = items.into_iter().peekable();

    while items.peek().is_some() {
        let batch: Vec<Fut> = items.by_ref().take(batch_size).map(&f).collect();
        let mut first_error = None;
        for outcome in join_all(batch).await {
            match outcome {
                Ok(value) => results.push(value),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_try_run_batched_stops_after_failing_batch() {
        let started = Arc::new(AtomicUsize::new(0));

        let outcome: Result<Vec<i32>, String> = run_try(Arc::clone(&started)).await;

        assert_eq!(outcome, Err("bad 4".to_string()));
        // Batch [1, 2] and [3, 4] ran; [5, 6] never started.
        assert_eq!(started.load(Ordering::SeqCst), 4);
    }

    async fn run_try(started: Arc<AtomicUsize>) -> Result<Vec<i32>, String> {
        try_run_batched(vec![1, 2, 3, 4, 5, 6], 2, |n| {
            let started = Arc::clone(&started);
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                if n == 4 {
                    Err("bad 4".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await
    }

    #[tokio::test]
    async fn test_try_run_batched_collects_successes() {
        let outcome: Result<Vec<i32>, ()> =
            try_run_batched(vec![3, 2, 1], 2, |n| async move { Ok(n) }).await;
        assert_eq!(outcome, Ok(vec![3, 2, 1]));
    }

    #[tokio::test]
    async fn test_preserves_input_order() {
        let results = run_batched((1..=7).collect(), 3, |n: u32| async move { n * 10 }).await;
        assert_eq!(results, vec![10, 20, 30, 40, 50, 60, 70]);
    }

    #[tokio::test]
    async fn test_never_exceeds_batch_size() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        run_batched((0..23).collect::<Vec<u32>>(), 5, |_| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert_eq!(peak.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_later_batches() {
        let results = run_batched(vec![1, 2, 3, 4], 2, |n: i32| async move {
            if n == 1 {
                Err("boom")
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(results.len(), 4);
        assert!(results[0].is_err());
        assert_eq!(results[3], Ok(4));
    }

    #[tokio::test]
    async fn test_zero_batch_size_treated_as_one() {
        let results = run_batched(vec!['a', 'b'], 0, |c| async move { c }).await;
        assert_eq!(results, vec!['a', 'b']);
    }
}
