//! The sorted digest index: `<path>\0<hex>\n` records sorted by
//! path, built once per run via [`sort::external_sort`] and then consulted
//! by record-boundary binary search rather than loaded wholesale into
//! memory — the prior run's index can be arbitrarily larger than the
//! available heap.

pub mod sort;

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use sort::Record;

use crate::error::Result;

/// Default phase-1 in-memory batch size for building a new index (spec
/// §4.4 "16 MiB").
pub const DEFAULT_MEMORY_BUDGET: usize = 16 * 1024 * 1024;

/// Build a sorted digest index file at `out_path` from an arbitrary stream
/// of `(path, hex)` pairs (typically the live walk's digests).
pub fn build(
    out_path: &Path,
    mut entries: impl Iterator<Item = (String, String)>,
    memory_budget_bytes: usize,
) -> Result<()> {
    let mut out = std::fs::File::create(out_path)?;
    sort::external_sort(
        || Ok(entries.next().map(|(path, hex)| Record { path, hex })),
        memory_budget_bytes,
        &mut out,
    )
}

/// A previously-built, path-sorted digest index, opened for random-access
/// lookup. The file itself is the only state kept open; records are read
/// back on demand so opening an index costs O(1) memory.
pub struct DigestIndex {
    path: PathBuf,
    len: u64,
}

impl DigestIndex {
    pub fn open(path: &Path) -> Result<Self> {
        let len = std::fs::metadata(path)?.len();
        Ok(Self {
            path: path.to_path_buf(),
            len,
        })
    }

    /// Binary search over byte offsets: probe the midpoint, scan forward to
    /// the start of the next `\n`-terminated record (so reads never start
    /// mid-record), and compare. O(log n) file reads, no full read.
    pub fn lookup(&self, path: &str) -> Result<Option<String>> {
        let mut file = std::fs::File::open(&self.path)?;
        let mut lo: u64 = 0;
        let mut hi: u64 = self.len;

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let rec_start = record_start_at_or_after(&mut file, mid)?;
            if rec_start >= self.len {
                hi = mid;
                continue;
            }
            let rec = read_record_at(&mut file, rec_start)?;
            match rec {
                None => {
                    hi = mid;
                }
                Some((rec_path, hex, rec_end)) => {
                    if rec_path == path {
                        return Ok(Some(hex));
                    } else if rec_path.as_str() < path {
                        lo = rec_end;
                    } else {
                        hi = rec_start;
                    }
                }
            }
        }
        Ok(None)
    }

    /// Iterate every record in ascending path order (used by the removed-
    /// file deriver's linear merge).
    pub fn iter(&self) -> Result<impl Iterator<Item = Result<(String, String)>>> {
        let file = std::fs::File::open(&self.path)?;
        Ok(LineRecords {
            reader: std::io::BufReader::new(file),
        })
    }
}

struct LineRecords {
    reader: std::io::BufReader<std::fs::File>,
}

impl Iterator for LineRecords {
    type Item = Result<(String, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        use std::io::BufRead;
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => {
                let line = line.strip_suffix('\n').unwrap_or(&line);
                match line.split_once('\0') {
                    Some((path, hex)) => Some(Ok((path.to_string(), hex.to_string()))),
                    None => None,
                }
            }
            Err(e) => Some(Err(e.into())),
        }
    }
}

/// Find the offset of the first byte after the next `\n` at-or-after
/// `from` (i.e. the start of the record `from` falls inside or after).
fn record_start_at_or_after(file: &mut std::fs::File, from: u64) -> Result<u64> {
    if from == 0 {
        return Ok(0);
    }
    file.seek(SeekFrom::Start(from))?;
    let mut buf = [0u8; 1];
    let mut pos = from;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            return Ok(pos);
        }
        pos += 1;
        if buf[0] == b'\n' {
            return Ok(pos);
        }
    }
}

/// Read one `path\0hex\n` record starting exactly at `offset`, returning
/// `(path, hex, offset_of_next_record)`.
fn read_record_at(file: &mut std::fs::File, offset: u64) -> Result<Option<(String, String, u64)>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut reader = std::io::BufReader::new(file);
    let mut line = String::new();
    use std::io::BufRead;
    let n = reader.read_line(&mut line)?;
    if n == 0 {
        return Ok(None);
    }
    let end = offset + n as u64;
    let line = line.strip_suffix('\n').unwrap_or(&line);
    match line.split_once('\0') {
        Some((path, hex)) => Ok(Some((path.to_string(), hex.to_string(), end))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_present_and_absent_paths() {
        let dir = tempfile::tempdir().unwrap();
        let idx_path = dir.path().join("index");

        let entries = vec![
            ("a".to_string(), "aaa".to_string()),
            ("m".to_string(), "mmm".to_string()),
            ("z".to_string(), "zzz".to_string()),
        ];
        build(&idx_path, entries.into_iter(), DEFAULT_MEMORY_BUDGET).unwrap();

        let idx = DigestIndex::open(&idx_path).unwrap();
        assert_eq!(idx.lookup("m").unwrap(), Some("mmm".to_string()));
        assert_eq!(idx.lookup("a").unwrap(), Some("aaa".to_string()));
        assert_eq!(idx.lookup("z").unwrap(), Some("zzz".to_string()));
        assert_eq!(idx.lookup("q").unwrap(), None);
        assert_eq!(idx.lookup("").unwrap(), None);
    }

    #[test]
    fn iter_yields_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        let idx_path = dir.path().join("index");
        let entries = vec![
            ("c".to_string(), "3".to_string()),
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ];
        build(&idx_path, entries.into_iter(), DEFAULT_MEMORY_BUDGET).unwrap();

        let idx = DigestIndex::open(&idx_path).unwrap();
        let got: Vec<_> = idx
            .iter()
            .unwrap()
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(got, vec!["a", "b", "c"]);
    }
}
