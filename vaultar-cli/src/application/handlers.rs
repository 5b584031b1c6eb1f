use std::path::PathBuf;

use vaultar_core::archive::ArchiveReader;
use vaultar_core::options::{CipherId, Compression, DigestAlgorithm, Options};
use vaultar_core::orchestrator::{run, RunInputs};
use vaultar_core::{config, crypto, Result, VaultarError};
use zeroize::Zeroizing;

use crate::ui::{password, progress};

#[allow(clippy::too_many_arguments)]
fn merge_cli_overrides(
    mut opts: Options,
    compressor: Option<String>,
    checksum: Option<String>,
    directories: Vec<PathBuf>,
    encryption: Option<String>,
    output: Option<PathBuf>,
    exclude: Vec<PathBuf>,
    verbose: bool,
) -> Result<Options> {
    if let Some(c) = compressor {
        opts.compression = Compression::parse(&c)?;
    }
    if let Some(c) = checksum {
        opts.digest_algorithm = DigestAlgorithm::parse(&c)?;
    }
    if !directories.is_empty() {
        opts.directories = directories;
    }
    if let Some(e) = encryption {
        opts.cipher = Some(CipherId::parse(&e)?);
    }
    if let Some(o) = output {
        opts.output_directory = Some(o);
    }
    for x in exclude {
        opts.exclude.insert(x);
    }
    // A bare CLI invocation never turns verbose back off; disabling it
    // requires an explicit `configure` without `-v`.
    if verbose {
        opts.verbose = true;
    }
    Ok(opts)
}

/// Sums the size of every file that would currently be walked, for sizing
/// the verbose-mode progress bar up front. Mirrors the same exclusion
/// rules the real ingestion walk applies.
fn estimate_total_bytes(opts: &Options) -> u64 {
    let exclusion_set = config::exclusion_set(opts);
    let walker = vaultar_core::walk::FileWalker::new(&opts.directories, &exclusion_set);
    let mut total = 0u64;
    walker.walk(|entry| total += entry.metadata.len(), |_, _| {});
    total
}

fn load_base_options() -> Result<Options> {
    match config::default_config_path().and_then(|p| config::load(&p)) {
        Ok(opts) => Ok(opts),
        Err(_) => Ok(Options::default()),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn handle_backup(
    compressor: Option<String>,
    checksum: Option<String>,
    directories: Vec<PathBuf>,
    encryption: Option<String>,
    output: Option<PathBuf>,
    password_arg: Option<String>,
    exclude: Vec<PathBuf>,
    verbose: bool,
    quiet: bool,
) -> Result<()> {
    let base = load_base_options()?;
    let opts = merge_cli_overrides(
        base, compressor, checksum, directories, encryption, output, exclude, verbose,
    )?;

    if opts.directories.is_empty() {
        return Err(VaultarError::Config(
            "no directories configured; pass -d or run `configure` first".into(),
        ));
    }

    let pw = match (&opts.cipher, password_arg, opts.password.clone()) {
        (Some(_), Some(pw), _) => Some(Zeroizing::new(pw.into_bytes())),
        (Some(_), None, Some(saved)) => Some(Zeroizing::new(saved.into_bytes())),
        (Some(_), None, None) => Some(password::prompt_with_confirmation("backup password")?),
        (None, _, _) => None,
    };

    // In verbose mode, show a byte-count bar over the total size of the
    // walk instead of the content-free spinner; otherwise the spinner alone
    // is enough to show the run hasn't hung.
    let byte_bar = if opts.verbose {
        Some(progress::byte_progress(quiet, estimate_total_bytes(&opts)))
    } else {
        None
    };
    let spinner = if byte_bar.is_none() {
        Some(progress::spinner(quiet, "scanning and ingesting files"))
    } else {
        None
    };
    let on_bytes_archived: Option<Box<dyn FnMut(u64)>> = byte_bar.as_ref().map(|bar| {
        let bar = bar.clone();
        Box::new(move |n: u64| bar.inc(n)) as Box<dyn FnMut(u64)>
    });

    let report = run(RunInputs {
        options: opts,
        password: pw,
        on_bytes_archived,
    });
    if let Some(bar) = &byte_bar {
        bar.finish_and_clear();
    }
    if let Some(bar) = &spinner {
        bar.finish_and_clear();
    }

    let report = report?;
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    eprintln!(
        "backup: wrote {} ({} included of {} scanned: {} new, {} changed, {} unchanged, {} removed, {} failed)",
        report.archive_path.display(),
        report.stats.files_included(),
        report.stats.files_scanned,
        report.stats.files_new,
        report.stats.files_changed,
        report.stats.files_unchanged,
        report.stats.files_removed,
        report.stats.files_failed,
    );
    Ok(())
}

pub fn handle_restore(
    archive: PathBuf,
    output: PathBuf,
    encryption: Option<String>,
    checksum: Option<String>,
    password_arg: Option<String>,
) -> Result<()> {
    std::fs::create_dir_all(&output)?;

    let source_archive = if let Some(cipher_name) = &encryption {
        let cipher = CipherId::parse(cipher_name)?;
        let digest_algorithm = match checksum {
            Some(c) => DigestAlgorithm::parse(&c)?,
            None => DigestAlgorithm::default(),
        };
        let mut pw = match password_arg {
            Some(pw) => Zeroizing::new(pw.into_bytes()),
            None => password::prompt_once("archive password")?,
        };
        let decrypted = tempfile::NamedTempFile::new()?;
        let decrypted_path = decrypted.path().to_path_buf();
        drop(decrypted);
        crypto::decrypt_file(
            &archive,
            &decrypted_path,
            cipher,
            digest_algorithm,
            1,
            &mut pw,
        )?;
        decrypted_path
    } else {
        archive.clone()
    };

    let restored = ArchiveReader::unpack_files(&source_archive, Compression::None, &output)?;

    if encryption.is_some() {
        let _ = std::fs::remove_file(&source_archive);
    }

    eprintln!(
        "restore: extracted {restored} file(s) from {} to {}",
        archive.display(),
        output.display()
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn handle_configure(
    compressor: Option<String>,
    checksum: Option<String>,
    directories: Vec<PathBuf>,
    encryption: Option<String>,
    output: Option<PathBuf>,
    exclude: Vec<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let base = load_base_options()?;
    let opts = merge_cli_overrides(
        base, compressor, checksum, directories, encryption, output, exclude, verbose,
    )?;

    let config_path = config::default_config_path()?;
    config::save(&config_path, &opts)?;
    eprintln!("configure: wrote {}", config_path.display());
    Ok(())
}
