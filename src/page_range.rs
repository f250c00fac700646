//! Page-set algebra shared by extract, remove, merge and organize.
//!
//! Page numbers entered by people ("1,3-5,7", "10-", "all") are normalised
//! into a [`PageSet`]: sorted, distinct, 1-based and bounded by the page count
//! of the document they refer to. Malformed tokens are skipped rather than
//! failing the whole selection, matching what users expect from print
//! dialogs. Whether an *empty* result is acceptable is decided by the caller.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::PageRangeError;

static SINGLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)$").expect("static regex"));
static RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)?\s*-\s*(\d+)?$").expect("static regex"));

/// An ordered set of distinct 1-based page numbers of a `total`-page document.
///
/// Invariant: every member lies in `1..=total`. Operations return new sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PageSetRepr")]
pub struct PageSet {
    pages: Vec<u32>,
    total: u32,
}

/// Wire form of [`PageSet`]; normalised through [`PageSet::from_pages`].
#[derive(Deserialize)]
struct PageSetRepr {
    pages: Vec<u32>,
    total: u32,
}

impl From<PageSetRepr> for PageSet {
    fn from(repr: PageSetRepr) -> Self {
        PageSet::from_pages(repr.pages, repr.total)
    }
}

impl PageSet {
    /// The empty selection.
    pub fn empty(total: u32) -> Self {
        Self {
            pages: Vec::new(),
            total,
        }
    }

    /// Every page of the document.
    pub fn all(total: u32) -> Self {
        Self {
            pages: (1..=total).collect(),
            total,
        }
    }

    /// Build from arbitrary numbers; out-of-bounds pages are dropped.
    pub fn from_pages(pages: impl IntoIterator<Item = u32>, total: u32) -> Self {
        let mut pages: Vec<u32> = pages
            .into_iter()
            .filter(|&p| p >= 1 && p <= total)
            .collect();
        pages.sort_unstable();
        pages.dedup();
        Self { pages, total }
    }

    /// Parse a human-entered selection.
    ///
    /// Tokens are comma separated: `n`, `a-b`, `a-` (to the end), `-b` (from
    /// the start) or `all`. Reversed ranges are normalised, ranges are clamped
    /// to the document, single pages outside it are dropped, and tokens that
    /// do not parse are skipped.
    pub fn parse(spec: &str, total: u32) -> Self {
        let mut pages = Vec::new();
        for raw in spec.split(',') {
            let token = raw.trim();
            if token.is_empty() {
                continue;
            }
            match parse_token(token, total) {
                Some((start, end)) => pages.extend(start..=end),
                None => debug!("Ignoring page token '{}' (total={})", token, total),
            }
        }
        Self::from_pages(pages, total)
    }

    /// Pages of the document that are *not* in this set.
    pub fn complement(&self) -> Self {
        let capacity = (self.total as usize).saturating_sub(self.pages.len());
        let mut pages = Vec::with_capacity(capacity);
        let mut members = self.pages.iter().peekable();
        for p in 1..=self.total {
            if members.peek() == Some(&&p) {
                members.next();
            } else {
                pages.push(p);
            }
        }
        Self {
            pages,
            total: self.total,
        }
    }

    /// Pages to keep when the caller asked to remove `spec`.
    ///
    /// A selection that matches no page is an error, as is an empty
    /// keep-set: neither may pass as a successful removal.
    pub fn pages_to_keep_after_removing(spec: &str, total: u32) -> Result<Self, PageRangeError> {
        let removed = Self::parse(spec, total);
        if removed.is_empty() {
            return Err(PageRangeError::Empty {
                spec: spec.to_string(),
                total,
            });
        }
        let keep = removed.complement();
        if keep.is_empty() {
            return Err(PageRangeError::RemovesAllPages {
                spec: spec.to_string(),
                total,
            });
        }
        Ok(keep)
    }

    /// Render as minimal comma-joined `a` / `a-b` tokens, e.g. `"1,3-5,7"`.
    pub fn to_range_string(&self) -> String {
        self.runs()
            .into_iter()
            .map(|(a, b)| {
                if a == b {
                    a.to_string()
                } else {
                    format!("{a}-{b}")
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Maximal runs of consecutive pages as inclusive `(start, end)` pairs.
    pub fn runs(&self) -> Vec<(u32, u32)> {
        let mut runs: Vec<(u32, u32)> = Vec::new();
        for &p in &self.pages {
            match runs.last_mut() {
                Some((_, end)) if *end + 1 == p => *end = p,
                _ => runs.push((p, p)),
            }
        }
        runs
    }

    pub fn pages(&self) -> &[u32] {
        &self.pages
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.iter().copied()
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn contains(&self, page: u32) -> bool {
        self.pages.binary_search(&page).is_ok()
    }
}

impl fmt::Display for PageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_range_string())
    }
}

/// Complement of `set` against `1..=total`.
///
/// `total` replaces the set's own context, so a set can be re-scoped.
pub fn complement(set: &PageSet, total: u32) -> PageSet {
    PageSet::from_pages(set.iter(), total).complement()
}

/// Inclusive bounds of a token, already clamped to `1..=total`.
fn parse_token(token: &str, total: u32) -> Option<(u32, u32)> {
    if total == 0 {
        return None;
    }
    if token.eq_ignore_ascii_case("all") || token == "*" {
        return Some((1, total));
    }
    if let Some(caps) = SINGLE.captures(token) {
        let page: u32 = caps[1].parse().ok()?;
        return (page >= 1 && page <= total).then_some((page, page));
    }
    let caps = RANGE.captures(token)?;
    let start = caps.get(1).map(|m| range_bound(m.as_str()));
    let end = caps.get(2).map(|m| range_bound(m.as_str()));
    let (a, b) = match (start, end) {
        (None, None) => return None,
        (Some(a), None) => (a, u64::from(total)),
        (None, Some(b)) => (1, b),
        (Some(a), Some(b)) => (a, b),
    };
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let lo = u32::try_from(lo.max(1)).ok()?;
    let hi = u32::try_from(hi.min(u64::from(total))).ok()?;
    (lo <= hi).then_some((lo, hi))
}

/// A run of digits as a range bound; too many digits saturate.
fn range_bound(digits: &str) -> u64 {
    digits.parse().unwrap_or(u64::MAX)
}

/// One output page of an organize operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagePlacement {
    /// 1-based source page.
    pub page: u32,
    /// Clockwise rotation added to the page's own, in degrees.
    pub rotation: i64,
}

/// Ordered output layout for the organize operation.
///
/// Unlike [`PageSet`] the order is the caller's and pages may repeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLayout {
    placements: Vec<PagePlacement>,
    total: u32,
}

impl PageLayout {
    /// Parse tokens `page[:rotation]` or `a-b[:rotation]`, e.g. `"3,1:90,4-6:180"`.
    ///
    /// Tokens that do not parse or fall outside the document are skipped.
    /// A rotation that is not a multiple of 90 rejects the whole layout, as
    /// does a layout with no pages.
    pub fn parse(spec: &str, total: u32) -> Result<Self, PageRangeError> {
        let mut placements = Vec::new();
        for raw in spec.split(',') {
            let token = raw.trim();
            if token.is_empty() {
                continue;
            }
            let (pages_part, rotation) = match token.split_once(':') {
                Some((p, r)) => match r.trim().parse::<i64>() {
                    Ok(deg) if deg % 90 == 0 => (p.trim(), deg),
                    Ok(deg) => {
                        return Err(PageRangeError::InvalidRotation {
                            token: token.to_string(),
                            degrees: deg,
                        })
                    }
                    Err(_) => {
                        debug!("Ignoring layout token '{}'", token);
                        continue;
                    }
                },
                None => (token, 0),
            };
            match parse_token(pages_part, total) {
                Some((start, end)) => placements
                    .extend((start..=end).map(|page| PagePlacement { page, rotation })),
                None => debug!("Ignoring layout token '{}' (total={})", token, total),
            }
        }
        if placements.is_empty() {
            return Err(PageRangeError::Empty {
                spec: spec.to_string(),
                total,
            });
        }
        Ok(Self { placements, total })
    }

    pub fn placements(&self) -> &[PagePlacement] {
        &self.placements
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }
}

/// Normalise a rotation in degrees to one of 0, 90, 180, 270.
pub fn normalize_rotation(degrees: i64) -> i64 {
    degrees.rem_euclid(360)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_mixed_tokens() {
        let set = PageSet::parse("1,3-5,7", 10);
        assert_eq!(set.pages(), &[1, 3, 4, 5, 7]);
        assert_eq!(set.to_range_string(), "1,3-5,7");
    }

    #[test]
    fn parse_skips_garbage_and_clamps() {
        let set = PageSet::parse(" 2 , x, 0, 9-12, 4-abc, , 11", 10);
        assert_eq!(set.pages(), &[2, 9, 10]);
    }

    #[test]
    fn parse_normalises_reversed_and_open_ranges() {
        assert_eq!(PageSet::parse("5-3", 10).pages(), &[3, 4, 5]);
        assert_eq!(PageSet::parse("8-", 10).pages(), &[8, 9, 10]);
        assert_eq!(PageSet::parse("-2", 10).pages(), &[1, 2]);
        assert_eq!(PageSet::parse("all", 3).pages(), &[1, 2, 3]);
        assert!(PageSet::parse("-", 10).is_empty());
    }

    #[test]
    fn parse_collapses_duplicates() {
        assert_eq!(PageSet::parse("3,1,3,2-3", 5).pages(), &[1, 2, 3]);
    }

    #[test]
    fn parse_against_empty_document() {
        assert!(PageSet::parse("1-5", 0).is_empty());
    }

    #[test]
    fn complement_scenario() {
        let set = PageSet::from_pages([2], 3);
        assert_eq!(set.complement().pages(), &[1, 3]);
        assert_eq!(complement(&set, 3).pages(), &[1, 3]);
    }

    #[test]
    fn complement_rescopes_to_new_total() {
        let set = PageSet::from_pages([1, 2, 9], 10);
        assert_eq!(complement(&set, 4).pages(), &[3, 4]);
    }

    #[test]
    fn removing_every_page_is_an_error() {
        let err = PageSet::pages_to_keep_after_removing("1-3", 3).unwrap_err();
        assert!(matches!(err, PageRangeError::RemovesAllPages { total: 3, .. }));

        let keep = PageSet::pages_to_keep_after_removing("2", 3).unwrap();
        assert_eq!(keep.pages(), &[1, 3]);
    }

    #[test]
    fn removing_nothing_is_an_error() {
        for spec in ["abc", "99", "0"] {
            let err = PageSet::pages_to_keep_after_removing(spec, 3).unwrap_err();
            assert!(
                matches!(err, PageRangeError::Empty { total: 3, .. }),
                "{spec}: {err:?}"
            );
        }
    }

    #[test]
    fn oversized_bounds_clamp_to_the_document() {
        assert_eq!(PageSet::parse("3-99999999999", 5).pages(), &[3, 4, 5]);
        assert_eq!(PageSet::parse("99999999999999999999999-4", 5).pages(), &[4, 5]);
        assert!(PageSet::parse("99999999999", 5).is_empty());
    }

    #[test]
    fn deserialising_restores_the_bounds() {
        let set: PageSet = serde_json::from_str(r#"{"pages":[3,1,2,1],"total":1}"#).unwrap();
        assert_eq!(set.pages(), &[1]);
        assert!(set.complement().is_empty());
    }

    #[test]
    fn range_string_of_empty_set() {
        assert_eq!(PageSet::empty(5).to_range_string(), "");
        assert_eq!(PageSet::all(1).to_range_string(), "1");
    }

    #[test]
    fn layout_keeps_order_duplicates_and_rotation() {
        let layout = PageLayout::parse("3, 1:90, 3, 5-6:-90, 42", 6).unwrap();
        let got: Vec<(u32, i64)> = layout
            .placements()
            .iter()
            .map(|p| (p.page, p.rotation))
            .collect();
        assert_eq!(got, vec![(3, 0), (1, 90), (3, 0), (5, -90), (6, -90)]);
    }

    #[test]
    fn layout_rejects_odd_rotation_and_empty() {
        assert!(matches!(
            PageLayout::parse("1:45", 3),
            Err(PageRangeError::InvalidRotation { degrees: 45, .. })
        ));
        assert!(matches!(
            PageLayout::parse("7,8", 3),
            Err(PageRangeError::Empty { total: 3, .. })
        ));
    }

    #[test]
    fn rotation_normalisation() {
        assert_eq!(normalize_rotation(-90), 270);
        assert_eq!(normalize_rotation(450), 90);
        assert_eq!(normalize_rotation(0), 0);
    }

    fn page_set_strategy() -> impl Strategy<Value = (Vec<u32>, u32)> {
        (1u32..60).prop_flat_map(|total| (proptest::collection::vec(1..=total, 0..40), Just(total)))
    }

    proptest! {
        #[test]
        fn reparse_of_rendered_string_is_identity((pages, total) in page_set_strategy()) {
            let set = PageSet::from_pages(pages, total);
            let reparsed = PageSet::parse(&set.to_range_string(), total);
            prop_assert_eq!(reparsed, set);
        }

        #[test]
        fn double_complement_is_identity((pages, total) in page_set_strategy()) {
            let set = PageSet::from_pages(pages, total);
            prop_assert_eq!(complement(&complement(&set, total), total), set);
        }

        #[test]
        fn complement_partitions_document((pages, total) in page_set_strategy()) {
            let set = PageSet::from_pages(pages, total);
            let rest = set.complement();
            prop_assert_eq!(set.len() + rest.len(), total as usize);
            prop_assert!(rest.iter().all(|p| !set.contains(p)));
        }

        #[test]
        fn parse_never_leaves_bounds(spec in "[0-9, -]{0,24}", total in 0u32..30) {
            let set = PageSet::parse(&spec, total);
            prop_assert!(set.iter().all(|p| p >= 1 && p <= total));
            prop_assert!(set.pages().windows(2).all(|w| w[0] < w[1]));
        }
    }
}
