use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use tracing::debug;

use crate::signal::StopSignal;

/// Run `job` over `items` on at most `workers` threads. Workers stop taking
/// new items once `stop` is raised; items already started run to the end.
pub fn for_each_bounded<T, F>(items: Vec<T>, workers: usize, stop: &StopSignal, job: F)
where
    T: Send,
    F: Fn(T) + Sync,
{
    let workers = workers.max(1).min(items.len());
    if workers == 0 {
        return;
    }
    debug!(items = items.len(), workers, "starting worker pool");

    let queue = Mutex::new(items.into_iter());
    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                loop {
                    if stop.is_raised() {
                        break;
                    }
                    let next = lock_shared(&queue).next();
                    match next {
                        Some(item) => job(item),
                        None => break,
                    }
                }
            });
        }
    });
}

/// Lock state shared between workers, recovering from poisoning.
pub fn lock_shared<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
