pub use similar_asserts;

/// Asserts two values are equal, printing a labelled line diff of their
/// pretty debug representation on failure.
///
/// ```ignore
/// utils::diff::assert_eq!(have: stats, want: expected);
/// ```
#[macro_export]
macro_rules! assert_eq {
    (
        $left_label:ident:
        $left:expr,
        $right_label:ident:
        $right:expr $(,)?
    ) => {{
        $crate::assert_eq!($left_label: $left, $right_label: $right, "{}", "");
    }};
    (
        $left_label:ident:
        $left:expr,
        $right_label:ident:
        $right:expr,
        $($arg:tt)+
    ) => {{
        match (&($left), &($right)) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    let left = format!("{left_val:#?}");
                    let right = format!("{right_val:#?}");
                    let diff = $crate::diff::similar_asserts::SimpleDiff::from_str(
                        &left,
                        &right,
                        stringify!($left_label),
                        stringify!($right_label),
                    );
                    panic!(
                        "assertion failed: `({} == {})` {}\n\n{}",
                        stringify!($left_label),
                        stringify!($right_label),
                        format_args!($($arg)+),
                        diff,
                    );
                }
            }
        }
    }};
}

pub use assert_eq;
