#![allow(dead_code)]

pub use expr_threshold_core::test_utils::{mixture, normal_sample};

/// Low-quality cells near 0.2 and a healthy population near 3.0.
pub fn qc_bimodal() -> Vec<f64> {
    mixture(&[(0.2, 0.3, 2000), (3.0, 0.5, 2000)])
}
