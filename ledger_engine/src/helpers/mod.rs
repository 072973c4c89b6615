mod backoff;
mod keyed_lock;

pub use backoff::calculate_backoff;
pub use keyed_lock::{KeyedLock, KeyedLockGuard};
