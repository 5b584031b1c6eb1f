//! Change detection against the prior run's digest index.

use crate::index::DigestIndex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// Present in the prior index under the same path, same digest.
    Unchanged,
    /// Present in the prior index under the same path, different digest.
    Changed,
    /// Absent from the prior index.
    New,
}

/// Classifies a freshly-computed `(path, hex)` pair against an optional
/// prior run's index. With no prior index every file is `New` — this is
/// the full-backup case.
pub struct ChangeDetector<'a> {
    prior: Option<&'a DigestIndex>,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(prior: Option<&'a DigestIndex>) -> Self {
        Self { prior }
    }

    pub fn classify(&self, path: &str, hex: &str) -> crate::error::Result<ChangeKind> {
        let Some(index) = self.prior else {
            return Ok(ChangeKind::New);
        };
        match index.lookup(path)? {
            None => Ok(ChangeKind::New),
            Some(prior_hex) if prior_hex == hex => Ok(ChangeKind::Unchanged),
            Some(_) => Ok(ChangeKind::Changed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index;

    fn build_index(dir: &std::path::Path, entries: Vec<(&str, &str)>) -> DigestIndex {
        let path = dir.join("index");
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
    fn no_prior_index_means_everything_is_new() {
        let detector = ChangeDetector::new(None);
        assert_eq!(
            detector.classify("a.txt", "deadbeef").unwrap(),
            ChangeKind::New
        );
    }

    #[test]
    fn classifies_unchanged_changed_and_new() {
        let dir = tempfile::tempdir().unwrap();
        let idx = build_index(dir.path(), vec![("a.txt", "111"), ("b.txt", "222")]);
        let detector = ChangeDetector::new(Some(&idx));

        assert_eq!(detector.classify("a.txt", "111").unwrap(), ChangeKind::Unchanged);
        assert_eq!(detector.classify("b.txt", "999").unwrap(), ChangeKind::Changed);
        assert_eq!(detector.classify("c.txt", "333").unwrap(), ChangeKind::New);
    }
}
