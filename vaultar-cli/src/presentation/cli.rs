use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about = "vaultar: incremental encrypted filesystem backups", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Suppress per-file progress output.
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a backup of the configured (or given) directories.
    Backup {
        /// Compression filter applied to the archive stream.
        #[arg(short = 'c', long, value_name = "none|gzip|bzip2|xz|lz4")]
        compressor: Option<String>,

        /// Per-file content digest algorithm.
        #[arg(short = 'C', long = "checksum", value_name = "md5|sha1|sha256|sha512")]
        checksum: Option<String>,

        /// Root directories to back up. May be repeated.
        #[arg(short = 'd', long = "directories", value_name = "path", num_args = 1..)]
        directories: Vec<PathBuf>,

        /// Symmetric cipher, e.g. aes-256-cbc. Omit for an unencrypted archive.
        #[arg(short = 'e', long = "encryption", value_name = "cipher-name")]
        encryption: Option<String>,

        /// Output directory for the finished archive.
        #[arg(short = 'o', long, value_name = "dir")]
        output: Option<PathBuf>,

        /// Password (discouraged; prefer the interactive prompt).
        #[arg(short = 'p', long)]
        password: Option<String>,

        /// Directories to exclude from the walk. May be repeated.
        #[arg(short = 'x', long = "exclude", value_name = "path", num_args = 1..)]
        exclude: Vec<PathBuf>,

        /// Show a byte-count progress bar while archiving.
        #[arg(short = 'v', long)]
        verbose: bool,
    },

    /// Restore an archive (optionally encrypted) to a destination directory.
    Restore {
        /// The archive to restore from.
        archive: PathBuf,

        /// Destination directory. Files restore to their recorded absolute
        /// paths under this root.
        #[arg(short = 'o', long)]
        output: PathBuf,

        /// Symmetric cipher the archive was encrypted with.
        #[arg(short = 'e', long = "encryption", value_name = "cipher-name")]
        encryption: Option<String>,

        /// Digest algorithm the archive was backed up with (must match the
        /// `-C` used for the original backup when the archive is encrypted).
        #[arg(short = 'C', long = "checksum", value_name = "md5|sha1|sha256|sha512")]
        checksum: Option<String>,

        /// Password (discouraged; prefer the interactive prompt).
        #[arg(short = 'p', long)]
        password: Option<String>,
    },

    /// Edit and persist the default run configuration ($HOME/.vaultar).
    Configure {
        #[arg(short = 'c', long, value_name = "none|gzip|bzip2|xz|lz4")]
        compressor: Option<String>,

        #[arg(short = 'C', long = "checksum", value_name = "md5|sha1|sha256|sha512")]
        checksum: Option<String>,

        #[arg(short = 'd', long = "directories", value_name = "path", num_args = 1..)]
        directories: Vec<PathBuf>,

        #[arg(short = 'e', long = "encryption", value_name = "cipher-name")]
        encryption: Option<String>,

        #[arg(short = 'o', long, value_name = "dir")]
        output: Option<PathBuf>,

        #[arg(short = 'x', long = "exclude", value_name = "path", num_args = 1..)]
        exclude: Vec<PathBuf>,

        /// Persist "show a byte-count progress bar" as the default.
        #[arg(short = 'v', long)]
        verbose: bool,
    },
}
