//! Picks the newest acceptable chart version from a registry listing.

use std::cmp::Ordering;

use semver::Version;
use tracing::warn;

use super::constraint::{parse_version, Constraint};

/// Outcome of resolving a chart against its candidate versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A strictly newer version that satisfies the constraint.
    Upgrade(Version),
    /// Nothing newer is acceptable; the steady state for an up to date chart.
    NoNewVersion,
}

impl Resolution {
    /// Returns the upgrade target, if any.
    pub fn upgrade(&self) -> Option<&Version> {
        match self {
            Resolution::Upgrade(v) => Some(v),
            Resolution::NoNewVersion => None,
        }
    }
}

/// Returns the greatest candidate that is newer than `current` and satisfies
/// `constraint`.
///
/// "Newer" is semver precedence, so build metadata never makes a candidate
/// newer. Candidates of equal precedence are ordered by their build metadata,
/// which keeps the result independent of candidate order. Unparsable
/// candidates are skipped with a warning.
pub fn resolve<S: AsRef<str>>(
    current: &Version,
    candidates: &[S],
    constraint: &Constraint,
) -> Resolution {
    let mut best: Option<Version> = None;
    for candidate in candidates {
        let candidate = candidate.as_ref();
        let version = match parse_version(candidate) {
            Ok(version) => version,
            Err(e) => {
                warn!(candidate, error = %e, "Skipping unparsable chart version");
                continue;
            }
        };
        if version.cmp_precedence(current) != Ordering::Greater || !constraint.check(&version) {
            continue;
        }
        let replaces = match &best {
            None => true,
            Some(best) => match version.cmp_precedence(best) {
                Ordering::Greater => true,
                Ordering::Equal => version > *best,
                Ordering::Less => false,
            },
        };
        if replaces {
            best = Some(version);
        }
    }

    match best {
        Some(version) => Resolution::Upgrade(version),
        None => Resolution::NoNewVersion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    /// All permutations of `items`, via Heap's algorithm.
    fn permutations(items: &[&'static str]) -> Vec<Vec<&'static str>> {
        fn heap(k: usize, items: &mut Vec<&'static str>, out: &mut Vec<Vec<&'static str>>) {
            if k <= 1 {
                out.push(items.clone());
                return;
            }
            heap(k - 1, items, out);
            for i in 0..k - 1 {
                if k % 2 == 0 {
                    items.swap(i, k - 1);
                } else {
                    items.swap(0, k - 1);
                }
                heap(k - 1, items, out);
            }
        }
        let mut items = items.to_vec();
        let mut out = Vec::new();
        let k = items.len();
        heap(k, &mut items, &mut out);
        out
    }

    #[test]
    fn test_range_filter_scenario() {
        let constraint = Constraint::parse(">=1.0.0 <2.0.0").unwrap();
        let result = resolve(&v("1.2.0"), &["1.3.0", "2.0.0", "1.2.1"], &constraint);
        assert_eq!(result, Resolution::Upgrade(v("1.3.0")));
    }

    #[test]
    fn test_order_independence() {
        let constraint = Constraint::parse(">=1.0.0 <2.0.0").unwrap();
        let candidates = ["1.3.0", "2.0.0", "1.2.1", "garbage", "1.9.9", "0.1.0"];
        let all = permutations(&candidates);
        assert_eq!(all.len(), 720);
        for permutation in all {
            let result = resolve(&v("1.2.0"), &permutation, &constraint);
            assert_eq!(result, Resolution::Upgrade(v("1.9.9")), "{:?}", permutation);
        }
    }

    #[test]
    fn test_build_metadata_is_not_newer() {
        let result = resolve(&v("1.2.0"), &["1.2.0+build.7"], &Constraint::default());
        assert_eq!(result, Resolution::NoNewVersion);

        let result = resolve(&v("1.2.0+build.1"), &["1.2.0", "1.2.0+build.9"], &Constraint::default());
        assert_eq!(result, Resolution::NoNewVersion);
    }

    #[test]
    fn test_equal_precedence_candidates_are_order_independent() {
        let candidates = ["1.3.0+b", "1.3.0+a", "1.3.0", "1.2.1"];
        let mut results: Vec<_> = permutations(&candidates)
            .into_iter()
            .map(|p| resolve(&v("1.2.0"), &p, &Constraint::default()))
            .collect();
        results.dedup();
        assert_eq!(results, vec![Resolution::Upgrade(v("1.3.0+b"))]);
    }

    #[test]
    fn test_no_new_version_when_all_older() {
        let result = resolve(
            &v("2.0.0"),
            &["1.0.0", "2.0.0", "1.9.9"],
            &Constraint::default(),
        );
        assert_eq!(result, Resolution::NoNewVersion);
    }

    #[test]
    fn test_no_new_version_when_constraint_rejects() {
        let constraint = Constraint::parse("~1.2.0").unwrap();
        let result = resolve(&v("1.2.5"), &["1.3.0", "2.0.0", "1.2.4"], &constraint);
        assert_eq!(result, Resolution::NoNewVersion);
    }

    #[test]
    fn test_empty_candidates() {
        let none: [&str; 0] = [];
        assert_eq!(
            resolve(&v("1.0.0"), &none, &Constraint::default()),
            Resolution::NoNewVersion
        );
    }

    #[test]
    fn test_unparsable_candidates_are_skipped() {
        let result = resolve(
            &v("1.0.0"),
            &["latest", "", "1.1.0", "not.a.version"],
            &Constraint::default(),
        );
        assert_eq!(result, Resolution::Upgrade(v("1.1.0")));
    }

    #[test]
    fn test_lenient_candidates() {
        let result = resolve(&v("1.0.0"), &["v1.4", "1.3.0"], &Constraint::default());
        assert_eq!(result, Resolution::Upgrade(v("1.4.0")));
    }

    #[test]
    fn test_upgrade_accessor() {
        assert_eq!(Resolution::Upgrade(v("1.0.0")).upgrade(), Some(&v("1.0.0")));
        assert_eq!(Resolution::NoNewVersion.upgrade(), None);
    }
}
