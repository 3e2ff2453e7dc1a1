//! Release tag naming.
//!
//! Tags look like `vYYYY.M.D` (no zero padding) for the first release of a
//! day and `vYYYY.M.D-N` for later ones.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};

/// The unsuffixed tag for `day`.
pub fn base_tag(day: NaiveDate) -> String {
    format!("v{}.{}.{}", day.year(), day.month(), day.day())
}

/// The tag to create after `latest`.
///
/// - no previous tag, or one from another day: the base tag
/// - the base tag itself: `base-1`
/// - `base-N`: `base-(N+1)`
///
/// A `base-…` suffix that is not an integer yields the base tag again rather
/// than failing; callers that must avoid collisions use [`allocate`].
pub fn next_after(latest: Option<&str>, today: NaiveDate) -> String {
    let base = base_tag(today);
    let Some(latest) = latest else {
        return base;
    };
    if latest == base {
        return format!("{base}-1");
    }
    match latest.strip_prefix(&format!("{base}-")) {
        Some(suffix) => match suffix.parse::<u64>() {
            Ok(n) => format!("{base}-{}", n + 1),
            Err(_) => base,
        },
        None => base,
    }
}

/// Counter of a tag for `today`: 0 for the base tag, N for `base-N`.
/// `None` for tags of other days and suffixes that are not integers.
pub fn day_counter(tag: &str, today: NaiveDate) -> Option<u64> {
    let base = base_tag(today);
    if tag == base {
        return Some(0);
    }
    tag.strip_prefix(&format!("{base}-"))?.parse().ok()
}

/// The smallest unused tag name for `today` given the existing tags.
///
/// Pure: without a tag being created in between, repeated calls return the
/// same name. Agrees with [`next_after`] whenever today's tags form a
/// gap-free sequence.
pub fn allocate<S: AsRef<str>>(existing: &[S], today: NaiveDate) -> String {
    let used: BTreeSet<u64> = existing
        .iter()
        .filter_map(|t| day_counter(t.as_ref(), today))
        .collect();
    let free = (0u64..)
        .find(|n| !used.contains(n))
        .unwrap_or(0);
    if free == 0 {
        base_tag(today)
    } else {
        format!("{}-{}", base_tag(today), free)
    }
}

/// Parses any release tag into its day and counter, for ordering tags.
pub fn parse(tag: &str) -> Option<(NaiveDate, u64)> {
    let rest = tag.strip_prefix('v')?;
    let (date, counter) = match rest.split_once('-') {
        Some((date, n)) => (date, n.parse().ok()?),
        None => (rest, 0),
    };
    let mut parts = date.splitn(3, '.');
    let year = parts.next()?.parse().ok()?;
    let month = parts.next()?.parse().ok()?;
    let day = parts.next()?.parse().ok()?;
    Some((NaiveDate::from_ymd_opt(year, month, day)?, counter))
}
