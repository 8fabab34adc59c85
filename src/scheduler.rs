//! Bounded-concurrency work scheduling for translation jobs.
//! Jobs run in waves of at most K futures; each wave's results are handed
//! to the caller before the next wave starts, which drives progressive display.

use std::future::Future;

use futures_util::future::join_all;
use tracing::debug;

/// Caps for grouping blocks into one batch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_items: usize,
    pub max_chars: usize,
}

/// Group `items` in order into batches that respect `limits`.
/// An item longer than `max_chars` on its own still gets its own batch.
pub fn plan_batches<T>(
    items: Vec<T>,
    limits: BatchLimits,
    len: impl Fn(&T) -> usize,
) -> Vec<Vec<T>> {
    let max_items = limits.max_items.max(1);
    let mut batches: Vec<Vec<T>> = Vec::new();
    let mut current: Vec<T> = Vec::new();
    let mut chars = 0;

    for item in items {
        let size = len(&item);
        let full = current.len() >= max_items || chars + size > limits.max_chars;
        if !current.is_empty() && full {
            batches.push(std::mem::take(&mut current));
            chars = 0;
        }
        chars += size;
        current.push(item);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Run `worker` over `items`, at most `bound` at a time.
///
/// Items are taken in order in fixed waves; `on_wave` receives a wave's
/// results (in item order) once every future in it has settled.
pub async fn run_in_waves<T, R, F, Fut>(
    items: Vec<T>,
    bound: usize,
    worker: F,
    mut on_wave: impl FnMut(Vec<R>),
) where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let bound = bound.max(1);
    let total = items.len();
    let mut items = items.into_iter().peekable();
    let mut wave = 0;
    while items.peek().is_some() {
        let futures: Vec<Fut> = items.by_ref().take(bound).map(&worker).collect();
        debug!(wave, size = futures.len(), total, "wave started");
        on_wave(join_all(futures).await);
        wave += 1;
    }
}
