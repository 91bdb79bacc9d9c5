//! Deterministic version ordering for artifact version strings.
//!
//! Versions split into numeric and alphabetic runs at `.`/`-`/`_` boundaries
//! and at digit/letter transitions; numeric runs compare numerically (so
//! `1.9 < 1.10`), alphabetic runs compare lexicographically (ASCII,
//! case-insensitive), a numeric run orders after an alphabetic run at the
//! same position, and a version that is a strict prefix of another orders
//! first.
//!
//! This is NOT full Maven qualifier ordering: `1.0` sorts before
//! `1.0-alpha` here, where Maven would sort the qualified version first.
//! The ordering is deterministic and documented; do not "fix" it in place.

use std::cmp::Ordering;

/// One comparable run within a version string.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Number(String),
    Text(String),
}

/// Compare two version strings under the documented ordering.
#[must_use]
pub fn compare(a: &str, b: &str) -> Ordering {
    let sa = segments(a);
    let sb = segments(b);

    for (x, y) in sa.iter().zip(sb.iter()) {
        let ord = match (x, y) {
            (Segment::Number(n), Segment::Number(m)) => compare_numeric(n, m),
            (Segment::Text(s), Segment::Text(t)) => {
                s.to_ascii_lowercase().cmp(&t.to_ascii_lowercase())
            }
            // A numeric run outranks an alphabetic one at the same position.
            (Segment::Number(_), Segment::Text(_)) => Ordering::Greater,
            (Segment::Text(_), Segment::Number(_)) => Ordering::Less,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    sa.len().cmp(&sb.len())
}

/// Pick the latest version among `versions` under [`compare`].
pub fn latest<'a, I>(versions: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    versions.into_iter().max_by(|a, b| compare(a, b))
}

/// Numeric comparison on digit runs of arbitrary length.
///
/// Leading zeros are insignificant (`09` == `9`); runs too long for any
/// integer type compare by trimmed length, then digit-by-digit.
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn segments(version: &str) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_numeric = false;

    let mut flush = |buf: &mut String, numeric: bool, out: &mut Vec<Segment>| {
        if !buf.is_empty() {
            let taken = std::mem::take(buf);
            out.push(if numeric {
                Segment::Number(taken)
            } else {
                Segment::Text(taken)
            });
        }
    };

    for ch in version.chars() {
        if matches!(ch, '.' | '-' | '_') {
            flush(&mut current, current_numeric, &mut out);
            continue;
        }
        let numeric = ch.is_ascii_digit();
        if !current.is_empty() && numeric != current_numeric {
            flush(&mut current, current_numeric, &mut out);
        }
        current_numeric = numeric;
        current.push(ch);
    }
    flush(&mut current, current_numeric, &mut out);
    out
}
