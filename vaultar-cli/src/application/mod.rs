pub mod handlers;

use vaultar_core::Result;
use clap::Parser;

use crate::presentation::cli::{Cli, Commands};

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let quiet = cli.quiet;

    match cli.command {
        Commands::Backup {
            compressor,
            checksum,
            directories,
            encryption,
            output,
            password,
            exclude,
            verbose,
        } => handlers::handle_backup(
            compressor, checksum, directories, encryption, output, password, exclude, verbose,
            quiet,
        ),
        Commands::Restore {
            archive,
            output,
            encryption,
            checksum,
            password,
        } => handlers::handle_restore(archive, output, encryption, checksum, password),
        Commands::Configure {
            compressor,
            checksum,
            directories,
            encryption,
            output,
            exclude,
            verbose,
        } => handlers::handle_configure(
            compressor, checksum, directories, encryption, output, exclude, verbose,
        ),
    }
}
