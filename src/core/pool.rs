//! Worker pool
//!
//! A fixed-size rayon pool plus a shared cancellation flag. Units of work
//! run largest first, results come back in submission order, and a panic
//! inside one unit surfaces as [`EngineError::WorkerPanicked`] instead of
//! tearing the process down.

use crate::core::config::EngineConfig;
use crate::core::error::{EngineError, Result};
use rayon::prelude::*;
use std::any::Any;
use std::cmp::Reverse;
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Elements a long-running unit of work handles between token checks
pub const POLL_STRIDE: usize = 1 << 16;

/// Shared flag polled by every unit of work
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once the token has been tripped
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Fixed-size pool of worker threads
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    token: CancellationToken,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self> {
        Self::with_token(threads, CancellationToken::new())
    }

    pub fn with_token(threads: usize, token: CancellationToken) -> Result<Self> {
        if threads == 0 {
            return Err(EngineError::InvalidParameter("worker pool needs at least one thread".into()));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("pileup-worker-{}", i))
            .build()
            .map_err(|e| EngineError::InvalidParameter(format!("cannot build worker pool: {}", e)))?;
        Ok(Self { pool, token })
    }

    pub fn from_config(config: &EngineConfig, token: CancellationToken) -> Result<Self> {
        Self::with_token(config.threads, token)
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Run `op` inside the pool so nested rayon iterators use its threads
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.pool.install(op)
    }

    /// Execute every task, largest first, and return results in input order
    ///
    /// Blocks until all tasks finish. The first error (including a panic or
    /// a tripped token) discards all partial results.
    pub fn run_sized<T, R, S, F>(&self, tasks: Vec<T>, size_of: S, f: F) -> Result<Vec<R>>
    where
        T: Send,
        R: Send,
        S: Fn(&T) -> usize,
        F: Fn(T) -> Result<R> + Sync + Send,
    {
        self.token.check()?;
        let mut indexed: Vec<(usize, T)> = tasks.into_iter().enumerate().collect();
        indexed.sort_by_key(|(_, task)| Reverse(size_of(task)));

        let token = &self.token;
        let f = &f;
        let mut results: Vec<(usize, R)> = self.pool.install(|| {
            indexed
                .into_par_iter()
                .with_max_len(1)
                .map(|(idx, task)| {
                    token.check()?;
                    match catch_unwind(AssertUnwindSafe(|| f(task))) {
                        Ok(result) => result.map(|value| (idx, value)),
                        Err(payload) => {
                            let message = panic_message(payload);
                            log::error!("Worker task {} panicked: {}", idx, message);
                            Err(EngineError::WorkerPanicked(message))
                        }
                    }
                })
                .collect::<Result<Vec<_>>>()
        })?;

        results.sort_unstable_by_key(|(idx, _)| *idx);
        Ok(results.into_iter().map(|(_, value)| value).collect())
    }

    /// [`run_sized`](Self::run_sized) with every task weighted equally
    pub fn run<T, R, F>(&self, tasks: Vec<T>, f: F) -> Result<Vec<R>>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> Result<R> + Sync + Send,
    {
        self.run_sized(tasks, |_| 0, f)
    }
}

/// Split `[0, len)` into near-equal consecutive chunks of at most `max_chunk`
///
/// The chunk count is `ceil(len / max_chunk)`; chunk sizes differ by at
/// most one, the larger ones first, and none exceeds `max_chunk`. The split
/// depends only on `len` and `max_chunk`.
///
/// # Examples
/// ```
/// use pileup_engine::core::split_bounds;
///
/// assert_eq!(split_bounds(10, 4), vec![0..4, 4..7, 7..10]);
/// assert_eq!(split_bounds(5, 100), vec![0..5]);
/// assert!(split_bounds(0, 4).is_empty());
/// ```
pub fn split_bounds(len: usize, max_chunk: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let max_chunk = max_chunk.max(1);
    let count = len.div_ceil(max_chunk);
    let (base, extra) = (len / count, len % count);

    let mut bounds = Vec::with_capacity(count);
    let mut start = 0;
    for i in 0..count {
        let end = start + base + usize::from(i < extra);
        bounds.push(start..end);
        start = end;
    }
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_results_in_submission_order() {
        let pool = WorkerPool::new(4).unwrap();
        let tasks: Vec<usize> = (0..50).collect();
        let out = pool.run_sized(tasks, |t| *t % 7, |t| Ok(t * 2)).unwrap();
        assert_eq!(out, (0..50).map(|t| t * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_panic_becomes_error() {
        let pool = WorkerPool::new(2).unwrap();
        let result = pool.run(vec![1, 2, 3], |t| {
            if t == 2 {
                panic!("boom");
            }
            Ok(t)
        });
        match result {
            Err(EngineError::WorkerPanicked(msg)) => assert_eq!(msg, "boom"),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_error_discards_results() {
        let pool = WorkerPool::new(2).unwrap();
        let result: Result<Vec<i32>> = pool.run(vec![1, 2, 3], |t| {
            if t == 3 {
                Err(EngineError::InvalidParameter("three".into()))
            } else {
                Ok(t)
            }
        });
        assert!(matches!(result, Err(EngineError::InvalidParameter(_))));
    }

    #[test]
    fn test_cancelled_pool_runs_nothing() {
        let token = CancellationToken::new();
        let pool = WorkerPool::with_token(2, token.clone()).unwrap();
        token.cancel();
        let ran = AtomicUsize::new(0);
        let result = pool.run(vec![1, 2, 3], |_| {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_single_thread_runs_largest_first() {
        let pool = WorkerPool::new(1).unwrap();
        let order = std::sync::Mutex::new(Vec::new());
        pool.run_sized(vec![1usize, 5, 3], |t| *t, |t| {
            order.lock().unwrap().push(t);
            Ok(())
        })
        .unwrap();
        assert_eq!(order.into_inner().unwrap(), vec![5, 3, 1]);
    }

    #[test]
    fn test_split_bounds_cover_exactly() {
        for len in 1..200 {
            for max_chunk in 1..40 {
                let bounds = split_bounds(len, max_chunk);
                assert_eq!(bounds.first().unwrap().start, 0);
                assert_eq!(bounds.last().unwrap().end, len);
                assert_eq!(bounds.len(), len.div_ceil(max_chunk));
                for pair in bounds.windows(2) {
                    assert_eq!(pair[0].end, pair[1].start);
                    assert!(pair[0].len() >= pair[1].len());
                }
                assert!(bounds.iter().all(|r| r.len() <= max_chunk));
            }
        }
    }

    #[test]
    fn test_split_bounds_last_chunk_within_limit() {
        assert_eq!(split_bounds(22, 5), vec![0..5, 5..10, 10..14, 14..18, 18..22]);
    }
}
