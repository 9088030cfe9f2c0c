//! Numeric-aware ("natural") ordering of names.
//!
//! Comic pages carry no explicit page number; reading order is the order of
//! their file names with digit runs compared by value, so `page2` comes before
//! `page10`. Letters compare case-insensitively.

use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

/// Compare two names in natural order.
///
/// Names that are equal under natural comparison (`Page1` vs `page01`) fall
/// back to a plain byte comparison so the result is a total order.
///
/// # Examples
///
/// ```
/// use mediarelay_common::natural::natural_cmp;
///
/// let mut pages = vec!["page10.jpg", "page2.jpg", "page1.jpg", "page9.jpg"];
/// pages.sort_by(|a, b| natural_cmp(a, b));
/// assert_eq!(pages, ["page1.jpg", "page2.jpg", "page9.jpg", "page10.jpg"]);
/// ```
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_key_cmp(a, b).then_with(|| a.cmp(b))
}

fn natural_key_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let x_run = take_digits(&mut left);
                let y_run = take_digits(&mut right);
                let ord = cmp_digit_runs(&x_run, &y_run);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                left.next();
                right.next();
                let ord = Iterator::cmp(x.to_lowercase(), y.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(c);
        chars.next();
    }
    run
}

// Compare by value without parsing, so arbitrarily long runs cannot overflow.
fn cmp_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(names: &[&str]) -> Vec<String> {
        let mut names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        names.sort_by(|a, b| natural_cmp(a, b));
        names
    }

    #[test]
    fn test_numeric_runs_compare_by_value() {
        assert_eq!(
            sorted(&["page1.jpg", "page10.jpg", "page2.jpg", "page9.jpg"]),
            ["page1.jpg", "page2.jpg", "page9.jpg", "page10.jpg"]
        );
    }

    #[test]
    fn test_case_insensitive_letters() {
        assert_eq!(natural_cmp("Page2", "page10"), Ordering::Less);
        assert_eq!(natural_cmp("b", "A"), Ordering::Greater);
    }

    #[test]
    fn test_leading_zeros() {
        assert_eq!(
            sorted(&["p010.png", "p9.png", "p001.png"]),
            ["p001.png", "p9.png", "p010.png"]
        );
        // Equal by value, tie broken deterministically
        assert_ne!(natural_cmp("p01", "p1"), Ordering::Equal);
    }

    #[test]
    fn test_multiple_numeric_groups() {
        assert_eq!(
            sorted(&["ch2_p10", "ch10_p1", "ch2_p2"]),
            ["ch2_p2", "ch2_p10", "ch10_p1"]
        );
    }

    #[test]
    fn test_prefix_orders_first() {
        assert_eq!(natural_cmp("page", "page1"), Ordering::Less);
        assert_eq!(natural_cmp("", "a"), Ordering::Less);
    }

    #[test]
    fn test_huge_numbers_do_not_overflow() {
        assert_eq!(
            natural_cmp("x99999999999999999999999", "x100000000000000000000000"),
            Ordering::Less
        );
    }
}
