use std::time::Duration;

use rand::Rng;

/// Exponential backoff with up to 10% jitter. Attempt 0 yields no delay; attempt `n` yields roughly
/// `base * 2^(n-1)`, capped at `max`.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let base_ms = base.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    let factor = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(factor).min(max_ms);
    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 { rand::thread_rng().gen_range(0..jitter_range) } else { 0 };
    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(1000);
        assert_eq!(calculate_backoff(0, base, max), Duration::ZERO);
        let b1 = calculate_backoff(1, base, max);
        assert!(b1 >= base && b1 < Duration::from_millis(110));
        let b3 = calculate_backoff(3, base, max);
        assert!(b3 >= Duration::from_millis(400) && b3 < Duration::from_millis(440));
        let capped = calculate_backoff(40, base, max);
        assert!(capped >= max && capped < Duration::from_millis(1100));
    }
}
