//! Testing utilities for powchain crates.
pub mod block;
pub mod logger;

/// Assert that an expression matches a pattern, printing the value if it doesn't.
///
/// ```
/// use powchain_test::assert_matches;
///
/// assert_matches!(Some(42), Some(n) if n > 40);
/// ```
#[macro_export]
macro_rules! assert_matches {
    ($left:expr, $pattern:pat $(if $guard:expr)? $(,)?) => {
        match $left {
            $pattern $(if $guard)? => {}
            ref left => panic!(
                "assertion failed: `{:?}` does not match `{}`",
                left,
                stringify!($pattern $(if $guard)?)
            ),
        }
    };
}
