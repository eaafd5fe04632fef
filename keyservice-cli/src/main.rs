//! keyservice command-line tool.
//!
//! # Usage
//!
//! ```bash
//! # Seal a plaintext JSON key map into a key-store file
//! keyservice seal --source keys.json --keystore keys.store --secret "$SECRET"
//!
//! # Encrypt and decrypt payloads
//! keyservice encrypt --keystore keys.store --key db-password "hunter2"
//! keyservice decrypt --keystore keys.store --key db-password "<payload>"
//!
//! # Expand $$payload$$ tokens in a config file (`-` reads stdin)
//! keyservice decrypt-embedded --keystore keys.store --key db-password app.json
//! ```
//!
//! `--secret` and `--seed-key` may also come from `KEYSERVICE_SECRET` and
//! `KEYSERVICE_SEED_KEY`. Logs go to stderr and honour `RUST_LOG`.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use keyservice_core::storage::keystore::{seal_keystore, write_keystore};
use keyservice_core::{
    BlobCache, DiskCache, FileKeyStore, Key, KeyService, KeyServiceConfig, NoCache,
};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Key store and payload tool for keyservice
#[derive(Parser, Debug)]
#[command(name = "keyservice")]
#[command(version)]
struct Cli {
    /// Log level used when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seal a plaintext JSON key map into an encrypted key-store file
    Seal {
        /// Plaintext key map: {"id": {"n": version, "v": value, "o": previous}}
        #[arg(long)]
        source: PathBuf,

        /// Key-store file to write
        #[arg(long, env = "KEYSERVICE_KEYSTORE")]
        keystore: PathBuf,

        /// Secret protecting the key-store file
        #[arg(long, env = "KEYSERVICE_SECRET", hide_env_values = true)]
        secret: String,
    },

    /// Encrypt a value under the current version of a key
    Encrypt {
        #[command(flatten)]
        service: ServiceArgs,

        /// Text to encrypt, `-` for stdin
        #[arg(allow_hyphen_values = true)]
        value: String,
    },

    /// Decrypt a payload
    Decrypt {
        #[command(flatten)]
        service: ServiceArgs,

        /// Payload to decrypt, `-` for stdin
        #[arg(allow_hyphen_values = true)]
        payload: String,
    },

    /// Replace every $$payload$$ token in a file with its plaintext
    DecryptEmbedded {
        #[command(flatten)]
        service: ServiceArgs,

        /// File to expand, `-` for stdin
        #[arg(default_value = "-")]
        input: String,
    },
}

#[derive(Args, Debug)]
struct ServiceArgs {
    /// Encrypted key-store file
    #[arg(long, env = "KEYSERVICE_KEYSTORE")]
    keystore: PathBuf,

    /// Secret protecting the key-store file
    #[arg(long, env = "KEYSERVICE_SECRET", hide_env_values = true)]
    secret: String,

    /// Per-deployment seed key used for payload signatures
    #[arg(long, env = "KEYSERVICE_SEED_KEY", hide_env_values = true)]
    seed_key: String,

    /// Key id to encrypt or decrypt with
    #[arg(long)]
    key: String,

    /// Use the disk cache configured through KEYSERVICE_CACHE_* variables
    #[arg(long)]
    disk_cache: bool,
}

impl ServiceArgs {
    fn open(&self) -> Result<KeyService> {
        if self.secret.is_empty() {
            bail!("secret must not be empty");
        }
        if self.seed_key.is_empty() {
            bail!("seed key must not be empty");
        }

        let storage = FileKeyStore::open(&self.keystore, &self.secret)
            .with_context(|| format!("cannot open key store {}", self.keystore.display()))?;
        let mut config = KeyServiceConfig::from_env()?;
        // The process exits right after one command; a detached cache
        // writer would be killed before it finishes.
        config.warm_cache_in_background = false;
        let cache: Arc<dyn BlobCache> = if self.disk_cache {
            Arc::new(DiskCache::from_config(&config))
        } else {
            Arc::new(NoCache)
        };

        Ok(KeyService::with_config(&self.seed_key, Arc::new(storage), cache, &config))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Seal {
            source,
            keystore,
            secret,
        } => seal(&source, &keystore, &secret),
        Command::Encrypt { service, value } => {
            let value = read_arg(&value)?;
            let payload = service.open()?.encrypt(value, &service.key)?;
            println!("{payload}");
            Ok(())
        }
        Command::Decrypt { service, payload } => {
            let payload = read_arg(&payload)?;
            let plaintext = service.open()?.decrypt(payload.trim(), &service.key)?;
            println!("{plaintext}");
            Ok(())
        }
        Command::DecryptEmbedded { service, input } => {
            let content = read_input(&input)?;
            let expanded = service
                .open()?
                .decrypt_embedded_string(&content, &service.key)?;
            print!("{expanded}");
            Ok(())
        }
    }
}

fn seal(source: &Path, keystore: &Path, secret: &str) -> Result<()> {
    if secret.is_empty() {
        bail!("secret must not be empty");
    }

    let json = fs::read(source)
        .with_context(|| format!("cannot read key source {}", source.display()))?;
    let keys: HashMap<String, Key> = serde_json::from_slice(&json)
        .with_context(|| format!("{} is not a valid key map", source.display()))?;

    let sealed = seal_keystore(&json, secret.as_bytes())?;
    write_keystore(keystore, &sealed)
        .with_context(|| format!("cannot write key store {}", keystore.display()))?;

    info!("sealed {} keys into {}", keys.len(), keystore.display());
    Ok(())
}

/// A literal argument, or stdin without its trailing newline for `-`.
fn read_arg(arg: &str) -> Result<String> {
    if arg != "-" {
        return Ok(arg.to_string());
    }
    let mut value = read_input(arg)?;
    if value.ends_with('\n') {
        value.pop();
        if value.ends_with('\r') {
            value.pop();
        }
    }
    Ok(value)
}

/// File contents, or all of stdin for `-`.
fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut content = String::new();
        io::stdin()
            .read_to_string(&mut content)
            .context("cannot read stdin")?;
        return Ok(content);
    }
    fs::read_to_string(input).with_context(|| format!("cannot read {input}"))
}
