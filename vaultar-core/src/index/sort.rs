//! External merge sort used to produce the sorted digest index.
//!
//! Phase 1: records are accumulated in memory up to a bounded budget, sorted
//! in place with a hand-rolled median-of-three quicksort, and spilled to a
//! `tempfile`-backed run. Phase 2: a k-way merge reads one buffered record
//! per run and pulls the smallest through a `BinaryHeap`, so peak memory is
//! O(number of runs) rather than O(total records).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io::{BufRead, BufReader, BufWriter, Write};

use tempfile::NamedTempFile;

use crate::error::Result;

/// One `path\0hex` record, as stored in the digest index.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    pub path: String,
    pub hex: String,
}

impl Record {
    fn to_line(&self) -> String {
        format!("{}\0{}\n", self.path, self.hex)
    }

    fn from_line(line: &str) -> Option<Record> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let (path, hex) = line.split_once('\0')?;
        Some(Record {
            path: path.to_string(),
            hex: hex.to_string(),
        })
    }
}

/// Ordered by `path` alone: the index is keyed on path, and paths are
/// unique within a single run by construction (one digest per walked file).
impl Ord for Record {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path.cmp(&other.path)
    }
}
impl PartialOrd for Record {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// In-place median-of-three quicksort, insertion-sort fallback below the
/// cutoff. Spec-mandated rather than `slice::sort`, so phase-1 runs have a
/// reproducible, non-allocating sort step.
pub fn quicksort(records: &mut [Record]) {
    const INSERTION_CUTOFF: usize = 16;
    if records.len() <= INSERTION_CUTOFF {
        insertion_sort(records);
        return;
    }
    let pivot_idx = median_of_three(records);
    records.swap(pivot_idx, records.len() - 1);
    let pivot_pos = partition(records);
    let (left, rest) = records.split_at_mut(pivot_pos);
    let right = &mut rest[1..];
    quicksort(left);
    quicksort(right);
}

fn insertion_sort(records: &mut [Record]) {
    for i in 1..records.len() {
        let mut j = i;
        while j > 0 && records[j - 1] > records[j] {
            records.swap(j - 1, j);
            j -= 1;
        }
    }
}

fn median_of_three(records: &[Record]) -> usize {
    let lo = 0;
    let mid = records.len() / 2;
    let hi = records.len() - 1;
    let (a, b, c) = (&records[lo], &records[mid], &records[hi]);
    if (a <= b && b <= c) || (c <= b && b <= a) {
        mid
    } else if (b <= a && a <= c) || (c <= a && a <= b) {
        lo
    } else {
        hi
    }
}

fn partition(records: &mut [Record]) -> usize {
    let pivot_last = records.len() - 1;
    let mut store = 0;
    for i in 0..pivot_last {
        if records[i] <= records[pivot_last] {
            records.swap(i, store);
            store += 1;
        }
    }
    records.swap(store, pivot_last);
    store
}

/// A phase-1 run: a sorted batch spilled to a temp file.
struct Run {
    file: BufReader<NamedTempFile>,
    next: Option<Record>,
}

impl Run {
    fn advance(&mut self) -> Result<()> {
        let mut line = String::new();
        let n = self.file.read_line(&mut line)?;
        self.next = if n == 0 { None } else { Record::from_line(&line) };
        Ok(())
    }
}

/// Heap entry: reverse-ordered by record so `BinaryHeap` (a max-heap) pops
/// the smallest pending record first.
struct HeapItem {
    record: Record,
    run_idx: usize,
}
impl Eq for HeapItem {}
impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record
    }
}
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        other.record.cmp(&self.record)
    }
}
impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sorts an unbounded stream of records into `out`, spilling to temp files
/// as needed so memory use stays bounded by `memory_budget_bytes`.
///
/// `records` is consumed incrementally: `next_record` is called until it
/// returns `None`, accumulating an in-memory batch no larger than the
/// budget (by rough byte-size estimate) before each batch is sorted and
/// spilled. The spilled runs are then merged into `out` in one k-way pass.
pub fn external_sort(
    mut next_record: impl FnMut() -> Result<Option<Record>>,
    memory_budget_bytes: usize,
    out: &mut impl Write,
) -> Result<()> {
    let mut runs: Vec<NamedTempFile> = Vec::new();
    let mut batch: Vec<Record> = Vec::new();
    let mut batch_bytes = 0usize;

    loop {
        match next_record()? {
            Some(rec) => {
                batch_bytes += rec.path.len() + rec.hex.len() + 2;
                batch.push(rec);
                if batch_bytes >= memory_budget_bytes {
                    spill(&mut batch, &mut runs)?;
                    batch_bytes = 0;
                }
            }
            None => break,
        }
    }
    if !batch.is_empty() {
        spill(&mut batch, &mut runs)?;
    }

    merge_runs(runs, out)
}

fn spill(batch: &mut Vec<Record>, runs: &mut Vec<NamedTempFile>) -> Result<()> {
    quicksort(batch);
    let mut tmp = NamedTempFile::new()?;
    {
        let mut w = BufWriter::new(&mut tmp);
        for rec in batch.iter() {
            w.write_all(rec.to_line().as_bytes())?;
        }
        w.flush()?;
    }
    runs.push(tmp);
    batch.clear();
    Ok(())
}

fn merge_runs(runs: Vec<NamedTempFile>, out: &mut impl Write) -> Result<()> {
    if runs.is_empty() {
        return Ok(());
    }
    let mut opened: Vec<Run> = Vec::with_capacity(runs.len());
    for mut tmp in runs {
        use std::io::Seek;
        tmp.as_file_mut().seek(std::io::SeekFrom::Start(0))?;
        let mut run = Run {
            file: BufReader::new(tmp),
            next: None,
        };
        run.advance()?;
        opened.push(run);
    }

    let mut heap = BinaryHeap::new();
    for (idx, run) in opened.iter().enumerate() {
        if let Some(rec) = &run.next {
            heap.push(HeapItem {
                record: rec.clone(),
                run_idx: idx,
            });
        }
    }

    let mut w = BufWriter::new(out);
    while let Some(HeapItem { record, run_idx }) = heap.pop() {
        w.write_all(record.to_line().as_bytes())?;
        opened[run_idx].advance()?;
        if let Some(rec) = opened[run_idx].next.clone() {
            heap.push(HeapItem {
                record: rec,
                run_idx,
            });
        }
    }
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quicksort_orders_by_path() {
        let mut records = vec![
            Record { path: "c".into(), hex: "3".into() },
            Record { path: "a".into(), hex: "1".into() },
            Record { path: "b".into(), hex: "2".into() },
        ];
        quicksort(&mut records);
        let paths: Vec<_> = records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["a", "b", "c"]);
    }

    #[test]
    fn quicksort_handles_duplicates_and_small_slices() {
        let mut records = vec![
            Record { path: "x".into(), hex: "1".into() },
            Record { path: "x".into(), hex: "2".into() },
        ];
        quicksort(&mut records);
        assert_eq!(records[0].path, "x");
        assert_eq!(records[1].path, "x");

        let mut empty: Vec<Record> = vec![];
        quicksort(&mut empty);
        assert!(empty.is_empty());

        let mut one = vec![Record { path: "only".into(), hex: "1".into() }];
        quicksort(&mut one);
        assert_eq!(one.len(), 1);
    }

    #[test]
    fn external_sort_merges_multiple_runs_in_order() {
        let input = vec!["d", "b", "a", "c", "e", "f"];
        let mut iter = input.into_iter().enumerate();
        let mut out = Vec::new();

        external_sort(
            || {
                Ok(iter.next().map(|(i, p)| Record {
                    path: p.to_string(),
                    hex: format!("{i:02x}"),
                }))
            },
            // tiny budget forces multiple spilled runs
            20,
            &mut out,
        )
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        let paths: Vec<_> = text.lines().map(|l| l.split('\0').next().unwrap()).collect();
        assert_eq!(paths, vec!["a", "b", "c", "d", "e", "f"]);
    }
}
