//! Test helper utilities and common testing patterns

use std::time::Duration;
use tokio::time::sleep;

/// Test environment setup utilities
pub struct TestEnv;

impl TestEnv {
    /// Wait for a condition to be true with timeout
    ///
    /// Useful when a background loop has to catch up with a change
    /// made by the test.
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }

        false
    }
}

/// Assertion helpers for common testing patterns
pub struct TestAssertions;

impl TestAssertions {
    /// Assert that a collection contains exactly the expected items (order independent)
    pub fn assert_contains_exactly<T: PartialEq + std::fmt::Debug>(actual: &[T], expected: &[T]) {
        assert_eq!(
            actual.len(),
            expected.len(),
            "Collections have different lengths. Actual: {:?}, Expected: {:?}",
            actual,
            expected
        );

        for expected_item in expected {
            assert!(
                actual.contains(expected_item),
                "Expected item {:?} not found in actual collection {:?}",
                expected_item,
                actual
            );
        }
    }
}
