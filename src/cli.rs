use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use crate::asar::{CipherConfig, DEFAULT_SALT};

#[derive(Parser, Debug)]
#[command(name = "rasar")]
#[command(version)]
#[command(about = "Pack, list and extract asar archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  rasar pack app/ app.asar --unpack '*.node'   pack app/, leaving native modules unpacked\n  \
  rasar l app.asar                             list archive contents\n  \
  rasar x https://example.com/app.asar out/    extract a remote archive into out/\n  \
  rasar cat app.asar package.json              print one file")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Show log output (RUST_LOG is honoured)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Quiet mode, no summaries or logs
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Password for encrypted archive contents
    #[arg(long, env = "RASAR_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// Key derivation salt used with --password
    #[arg(long, global = true)]
    pub salt: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List contents of an archive
    #[command(visible_alias = "l")]
    List {
        /// Archive path or HTTP URL
        archive: String,

        /// Show size and flags of every entry
        #[arg(short = 'l', long)]
        long: bool,
    },

    /// Extract contents of an archive into a directory
    #[command(visible_alias = "x")]
    Extract {
        /// Archive path or HTTP URL
        archive: String,

        /// Destination directory
        dir: String,

        /// Overwrite existing files
        #[arg(short = 'o', long)]
        overwrite: bool,
    },

    /// Write one file of an archive to stdout
    Cat {
        /// Archive path or HTTP URL
        archive: String,

        /// Path of the file inside the archive
        path: String,
    },

    /// Create an archive from a directory
    #[command(visible_alias = "p")]
    Pack {
        /// Source directory
        dir: String,

        /// Archive to create
        archive: String,

        /// Encrypt file contents (needs --password)
        #[arg(short = 'e', long)]
        encrypt: bool,

        /// Leave files matching GLOB out of the archive, copied to <archive>.unpacked/
        #[arg(long, value_name = "GLOB")]
        unpack: Vec<String>,
    },
}

impl Cli {
    /// Cipher settings: enabled for packing with `-e`, or for reading whenever a password is set.
    pub fn cipher_config(&self) -> Result<CipherConfig> {
        let wanted = match &self.command {
            Command::Pack { encrypt, .. } => *encrypt,
            _ => self.password.is_some(),
        };
        if !wanted {
            return Ok(CipherConfig::disabled());
        }

        let Some(password) = &self.password else {
            bail!("encryption needs --password or RASAR_PASSWORD");
        };
        let salt = self
            .salt
            .as_deref()
            .map(str::as_bytes)
            .unwrap_or(DEFAULT_SALT);
        Ok(CipherConfig::from_password(password, salt))
    }
}

pub fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Local paths may be given with backslashes.
pub fn normalize_path(s: &str) -> String {
    s.replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        let cli = Cli::parse_from(["rasar", "x", "app.asar", "out", "-o"]);
        assert!(matches!(cli.command, Command::Extract { overwrite: true, .. }));

        let cli = Cli::parse_from(["rasar", "p", "src", "app.asar", "--unpack", "*.node"]);
        let Command::Pack { unpack, encrypt, .. } = &cli.command else {
            panic!("expected pack");
        };
        assert_eq!(unpack, &["*.node"]);
        assert!(!encrypt);
    }

    #[test]
    fn cat_takes_an_entry_path() {
        let cli = Cli::parse_from(["rasar", "cat", "app.asar", "sub/b.txt", "-q"]);
        let Command::Cat { archive, path } = &cli.command else {
            panic!("expected cat");
        };
        assert_eq!((archive.as_str(), path.as_str()), ("app.asar", "sub/b.txt"));
        assert!(cli.quiet);
    }

    #[test]
    fn encryption_requires_a_password() {
        let cli = Cli::parse_from(["rasar", "p", "src", "app.asar", "-e"]);
        if cli.password.is_none() {
            assert!(cli.cipher_config().is_err());
        }

        let cli = Cli::parse_from(["rasar", "p", "src", "app.asar", "-e", "--password", "pw"]);
        assert!(cli.cipher_config().unwrap().is_enabled());

        let cli = Cli::parse_from(["rasar", "l", "app.asar", "--password", "pw"]);
        assert!(cli.cipher_config().unwrap().is_enabled());
    }

    #[test]
    fn url_and_path_helpers() {
        assert!(is_http_url("https://example.com/app.asar"));
        assert!(!is_http_url("app.asar"));
        assert_eq!(normalize_path("a\\b\\c.asar"), "a/b/c.asar");
    }
}
