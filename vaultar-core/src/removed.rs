//! Removed-file derivation: paths present in the prior run's
//! digest index but absent from the current run's index are files that
//! were deleted since the prior run.
//!
//! Both indexes are already sorted by path, so a single linear merge walk
//! (mergesort's merge step, not a second sort) finds every prior-only path
//! in one pass over each index — no hashing, no full materialization of
//! either side.

use crate::error::Result;
use crate::index::DigestIndex;

pub struct RemovedDeriver;

impl RemovedDeriver {
    /// Returns every path present in `prior` but not in `current`, in
    /// ascending path order.
    pub fn derive(prior: &DigestIndex, current: &DigestIndex) -> Result<Vec<String>> {
        let mut prior_iter = prior.iter()?;
        let mut current_iter = current.iter()?;

        let mut removed = Vec::new();
        let mut p = prior_iter.next().transpose()?;
        let mut c = current_iter.next().transpose()?;

        loop {
            match (&p, &c) {
                (None, _) => break,
                (Some((pp, _)), None) => {
                    removed.push(pp.clone());
                    p = prior_iter.next().transpose()?;
                }
                (Some((pp, _)), Some((cp, _))) => {
                    if pp < cp {
                        removed.push(pp.clone());
                        p = prior_iter.next().transpose()?;
                    } else if pp > cp {
                        c = current_iter.next().transpose()?;
                    } else {
                        p = prior_iter.next().transpose()?;
                        c = current_iter.next().transpose()?;
                    }
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index;

    fn build_index(dir: &std::path::Path, name: &str, entries: Vec<(&str, &str)>) -> DigestIndex {
        let path = dir.join(name);
        index::build(
            &path,
            entries
                .into_iter()
                .map(|(p, h)| (p.to_string(), h.to_string())),
            index::DEFAULT_MEMORY_BUDGET,
        )
        .unwrap();
        DigestIndex::open(&path).unwrap()
    }

    #[test]
    fn finds_paths_removed_since_prior_run() {
        let dir = tempfile::tempdir().unwrap();
        let prior = build_index(
            dir.path(),
            "prior",
            vec![("a.txt", "1"), ("b.txt", "2"), ("c.txt", "3")],
        );
        let current = build_index(dir.path(), "current", vec![("a.txt", "1"), ("c.txt", "9")]);

        let removed = RemovedDeriver::derive(&prior, &current).unwrap();
        assert_eq!(removed, vec!["b.txt".to_string()]);
    }

    #[test]
    fn nothing_removed_when_current_is_superset() {
        let dir = tempfile::tempdir().unwrap();
        let prior = build_index(dir.path(), "prior", vec![("a.txt", "1")]);
        let current = build_index(
            dir.path(),
            "current",
            vec![("a.txt", "1"), ("b.txt", "2")],
        );

        let removed = RemovedDeriver::derive(&prior, &current).unwrap();
        assert!(removed.is_empty());
    }
}
