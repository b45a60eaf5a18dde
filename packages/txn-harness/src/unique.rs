//! Unique test data, so concurrent runs against one database never collide.

use ulid::Ulid;

/// `{prefix}-{ulid}`
///
/// ```
/// use txn_harness::unique::unique_str;
///
/// let a = unique_str("appointment");
/// let b = unique_str("appointment");
/// assert_ne!(a, b);
/// assert!(a.starts_with("appointment-"));
/// ```
pub fn unique_str(prefix: &str) -> String {
    format!("{}-{}", prefix, Ulid::new())
}
