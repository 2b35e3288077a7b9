// src/utils/system.rs: System functions

use rand::RngCore;
use sysinfo::System;

/// Determines the number of cores usable for external tools: physical
/// cores capped by the requested thread count, never below one.
pub fn detect_cores(args_threads: usize) -> usize {
    let physical_cores = System::physical_core_count().unwrap_or(1);
    physical_cores.min(args_threads).max(1)
}

/// Subsampling seed for the whole run. Optional fixed seed for
/// reproducibility, otherwise OS entropy.
pub fn subsampling_seed(seed: Option<u64>) -> u64 {
    seed.unwrap_or_else(|| rand::rng().next_u64())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_cores_capped_by_request() {
        assert_eq!(detect_cores(1), 1);
        assert!(detect_cores(1024) >= 1);
    }

    #[test]
    fn test_fixed_seed_is_passed_through() {
        assert_eq!(subsampling_seed(Some(100)), 100);
    }
}
