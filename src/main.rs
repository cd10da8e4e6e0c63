//! Main entry point for the rasar CLI application.
//!
//! Lists and extracts archives from the local filesystem or remote HTTP
//! URLs, and packs directories into new archives.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use rasar::asar::{pack_directory, unpacked_dir_for, ExtractOptions, PackOptions};
use rasar::cli::{is_http_url, normalize_path, Command};
use rasar::{AsarExtractor, CipherConfig, Cli, HttpRangeReader, LocalFileReader, NodeKind, ReadAt};

/// What to do with an opened archive.
enum Task<'a> {
    List { long: bool },
    Extract { dir: &'a str, overwrite: bool },
    Cat { path: &'a str },
}

fn log_filter(cli: &Cli) -> EnvFilter {
    // --quiet silences everything, --verbose shows info (or RUST_LOG),
    // otherwise only warnings such as skipped entries are shown
    if cli.quiet {
        EnvFilter::new("off")
    } else if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    } else {
        EnvFilter::new("warn")
    }
}

fn init_tracing(cli: &Cli) {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);
    let cipher = cli.cipher_config()?;

    match &cli.command {
        Command::List { archive, long } => {
            open_archive(archive, &cli, cipher, Task::List { long: *long }).await
        }
        Command::Extract {
            archive,
            dir,
            overwrite,
        } => {
            let task = Task::Extract {
                dir,
                overwrite: *overwrite,
            };
            open_archive(archive, &cli, cipher, task).await
        }
        Command::Cat { archive, path } => {
            open_archive(archive, &cli, cipher, Task::Cat { path }).await
        }
        Command::Pack {
            dir,
            archive,
            unpack,
            ..
        } => {
            let src = PathBuf::from(normalize_path(dir));
            let archive = PathBuf::from(normalize_path(archive));
            let options = PackOptions {
                unpack: unpack.clone(),
            };
            let summary = pack_directory(&src, &archive, &options, &cipher)
                .await
                .with_context(|| {
                    format!("couldn't pack {} into {}", src.display(), archive.display())
                })?;

            if !cli.quiet {
                println!(
                    "packed {} files, {} directories ({} unpacked) into {} ({})",
                    summary.files,
                    summary.directories,
                    summary.unpacked,
                    archive.display(),
                    format_size(summary.bytes_written)
                );
            }
            Ok(())
        }
    }
}

/// Open a local or remote archive and run `task` on it.
async fn open_archive(
    archive: &str,
    cli: &Cli,
    cipher: CipherConfig,
    task: Task<'_>,
) -> Result<()> {
    if is_http_url(archive) {
        // Remote archive via HTTP Range requests; unpacked files are not reachable
        let reader = Arc::new(HttpRangeReader::new(archive.to_string()).await?);
        process_archive(reader.clone(), cipher, None, task, cli.quiet).await?;

        if !cli.quiet {
            eprintln!(
                "\nTotal bytes transferred: {}",
                format_size(reader.transferred_bytes())
            );
        }
    } else {
        let path = PathBuf::from(normalize_path(archive));
        let reader = LocalFileReader::new(&path)
            .with_context(|| format!("couldn't open {}", path.display()))?;
        let reader = Arc::new(reader);
        process_archive(reader, cipher, Some(unpacked_dir_for(&path)), task, cli.quiet).await?;
    }
    Ok(())
}

async fn process_archive<R: ReadAt + 'static>(
    reader: Arc<R>,
    cipher: CipherConfig,
    unpacked_dir: Option<PathBuf>,
    task: Task<'_>,
    quiet: bool,
) -> Result<()> {
    let extractor = AsarExtractor::open(reader, cipher).await?;

    match task {
        Task::List { long } => {
            list_entries(&extractor, long);
            Ok(())
        }
        Task::Extract { dir, overwrite } => {
            let dest = PathBuf::from(normalize_path(dir));
            let options = ExtractOptions {
                overwrite,
                unpacked_dir,
            };
            let summary = extractor.extract_all(&dest, &options).await?;
            if !quiet {
                println!(
                    "extracted {} files, {} directories into {} ({} skipped)",
                    summary.files,
                    summary.directories,
                    dest.display(),
                    summary.skipped
                );
            }
            Ok(())
        }
        Task::Cat { path } => {
            let entry = extractor.file(path)?;
            extractor.extract_to_stdout(entry).await?;
            Ok(())
        }
    }
}

/// Print archive contents, one `/`-rooted path per line.
///
/// The long format adds size and flags (`d` directory, `x` executable,
/// `u` unpacked) and a totals line.
fn list_entries<R: ReadAt>(extractor: &AsarExtractor<R>, long: bool) {
    if !long {
        for (path, _) in extractor.list_entries() {
            println!("/{}", path);
        }
        return;
    }

    println!("{:>12}  {:5}  Name", "Size", "Flags");
    println!("{}", "-".repeat(40));

    let mut total_size = 0u64;
    let mut file_count = 0usize;
    for (path, node) in extractor.list_entries() {
        let flags = node.flags();
        let marks = format!(
            "{}{}{}",
            if node.kind() == NodeKind::Directory { 'd' } else { '-' },
            if flags.contains(rasar::Flags::EXECUTABLE) { 'x' } else { '-' },
            if flags.contains(rasar::Flags::UNPACKED) { 'u' } else { '-' },
        );
        println!("{:>12}  {:5}  /{}", node.size(), marks, path);

        if node.kind() == NodeKind::File {
            total_size += node.size();
            file_count += 1;
        }
    }

    println!("{}", "-".repeat(40));
    println!("{:>12}  {:5}  {} files", total_size, "", file_count);
}

/// Format a byte size into a human-readable string.
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_show_unless_quiet() {
        let cli = Cli::parse_from(["rasar", "l", "app.asar"]);
        assert_eq!(log_filter(&cli).to_string(), "warn");

        let cli = Cli::parse_from(["rasar", "l", "app.asar", "-q"]);
        assert_eq!(log_filter(&cli).to_string(), "off");
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(500), "500 bytes");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }
}
