//! Monotonic clock for the token-bucket refill path.

/// Current `CLOCK_MONOTONIC` reading in nanoseconds.
///
/// Real-time clock jumps must not refill buckets, so the wall clock is never
/// consulted here.
#[inline(always)]
pub fn now_ns() -> u64 {
    unsafe {
        let mut ts = std::mem::MaybeUninit::uninit();
        libc::clock_gettime(libc::CLOCK_MONOTONIC, ts.as_mut_ptr());
        let ts = ts.assume_init();
        (ts.tv_sec as u64) * 1_000_000_000 + (ts.tv_nsec as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_monotonic() {
        let a = now_ns();
        let b = now_ns();
        assert!(b >= a);
    }
}
