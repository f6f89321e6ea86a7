//! lockbox: per-user encrypted private object store CLI
//!
//! Profile commands:
//!   register <user>          - create a profile and keyring
//!   passwd <user>            - change a user's password (documents untouched)
//!   deregister <user> --yes  - delete a profile, its keyring and documents
//!
//! Document commands:
//!   put <user> <path> [-i FILE]  - encrypt and store stdin or FILE
//!   get <user> <path> [-o FILE]  - decrypt to stdout or FILE
//!   ls <user> [prefix]           - list documents
//!   rm <user> <path>             - delete a document
//!
//! Passwords come from LOCKBOX_PASSWORD (and LOCKBOX_NEW_PASSWORD for
//! `passwd`) or an interactive prompt.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use lockbox_core::config::{BackendKind, LockboxConfig};
use lockbox_core::{PrivatePath, UserId, UserPassword};
use lockbox_private::{Lockbox, UserAuth};
use lockbox_storage::{build_operator, check_health, OpendalBackend, S3Credentials, StorageBackend};
use secrecy::SecretString;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

/// Plaintext bytes moved per read/write call by `put` and `get`.
const IO_BLOCK_SIZE: usize = 64 * 1024;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "lockbox",
    version,
    about = "Per-user encrypted private object store",
    long_about = "lockbox: register users and store, list, read and remove their encrypted documents"
)]
struct Cli {
    /// Path to lockbox.toml configuration file
    #[arg(long, short = 'c', env = "LOCKBOX_CONFIG", default_value = "/etc/lockbox/config.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "LOCKBOX_LOG")]
    log: Option<String>,

    /// Log format; overrides [log] format
    #[arg(long, env = "LOCKBOX_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a new user
    Register { user: String },

    /// Change a user's password
    Passwd { user: String },

    /// Remove a user's profile, keyring and all of their documents
    Deregister {
        user: String,
        /// Confirm the removal
        #[arg(long)]
        yes: bool,
    },

    /// Encrypt and store a document
    Put {
        user: String,
        /// Logical path inside the user's private store (e.g. folder1/secret.txt)
        path: String,
        /// Read from this file instead of stdin
        #[arg(long, short = 'i')]
        input: Option<PathBuf>,
    },

    /// Decrypt and print a document
    Get {
        user: String,
        path: String,
        /// Write to this file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// List a user's documents
    Ls {
        user: String,
        /// Folder to list (default: everything)
        prefix: Option<String>,
    },

    /// Delete a document
    Rm { user: String, path: String },

    /// Show storage status
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded = load_config(&cli.config).await?;
    let config = loaded.clone().unwrap_or_default();

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli
        .log_format
        .or_else(|| LogFormat::from_str(&config.log.format, true).ok())
        .unwrap_or(LogFormat::Text);
    init_logging(&level, format);

    if loaded.is_none() {
        warn!("config file not found: {}  (using defaults)", cli.config.display());
    }
    config
        .validate()
        .with_context(|| format!("invalid config: {}", cli.config.display()))?;

    match cli.command {
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
        Commands::Status => cmd_status(&config).await,
        Commands::Register { user } => cmd_register(&open_lockbox(&config)?, &user).await,
        Commands::Passwd { user } => cmd_passwd(&open_lockbox(&config)?, &user).await,
        Commands::Deregister { user, yes } => {
            cmd_deregister(&open_lockbox(&config)?, &user, yes).await
        }
        Commands::Put { user, path, input } => {
            cmd_put(&open_lockbox(&config)?, &user, &path, input.as_deref()).await
        }
        Commands::Get { user, path, output } => {
            cmd_get(&open_lockbox(&config)?, &user, &path, output.as_deref()).await
        }
        Commands::Ls { user, prefix } => {
            cmd_ls(&open_lockbox(&config)?, &user, prefix.as_deref()).await
        }
        Commands::Rm { user, path } => cmd_rm(&open_lockbox(&config)?, &user, &path).await,
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries document bytes for `get`, so logs go to stderr
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

/// `Ok(None)` when the file does not exist.
async fn load_config(path: &Path) -> Result<Option<LockboxConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config: {}", path.display()))?;
    toml::from_str(&content)
        .map(Some)
        .with_context(|| format!("parsing config: {}", path.display()))
}

// ── Storage and store construction ────────────────────────────────────────────

/// S3 credentials from the standard environment variables.
fn s3_credentials_from_env() -> Result<S3Credentials> {
    let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
        .or_else(|_| std::env::var("LOCKBOX_ACCESS_KEY_ID"))
        .context(
            "S3 credentials not set\n\
             Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables.\n\
             Example:\n\
             \texport AWS_ACCESS_KEY_ID=your-key\n\
             \texport AWS_SECRET_ACCESS_KEY=your-secret",
        )?;
    let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
        .or_else(|_| std::env::var("LOCKBOX_SECRET_ACCESS_KEY"))
        .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;

    Ok(S3Credentials {
        access_key_id,
        secret_access_key: SecretString::from(secret_access_key),
    })
}

fn open_backend(config: &LockboxConfig) -> Result<Arc<dyn StorageBackend>> {
    let credentials = match config.storage.backend {
        BackendKind::S3 => Some(s3_credentials_from_env()?),
        BackendKind::Fs | BackendKind::Memory => None,
    };
    let op = build_operator(&config.storage, credentials.as_ref())
        .context("building storage operator")?;
    Ok(Arc::new(OpendalBackend::new(op)))
}

fn open_lockbox(config: &LockboxConfig) -> Result<Lockbox> {
    if config.storage.backend == BackendKind::Memory {
        warn!("memory backend selected: nothing outlives this process");
    }
    let backend = open_backend(config)?;
    Lockbox::new(config, backend).context("initialising lockbox")
}

// ── Passwords and identities ──────────────────────────────────────────────────

/// Password from `env_var`, or prompt for it. With `confirm`, prompt twice.
fn read_password(env_var: &str, prompt: &str, confirm: bool) -> Result<UserPassword> {
    if let Ok(password) = std::env::var(env_var) {
        return Ok(UserPassword::new(password));
    }

    let first = rpassword::prompt_password(prompt).context("reading password")?;
    if confirm {
        let second = rpassword::prompt_password("Confirm password: ").context("reading password")?;
        if first != second {
            anyhow::bail!("passwords do not match");
        }
    }
    if first.is_empty() {
        anyhow::bail!("password must not be empty");
    }
    Ok(UserPassword::new(first))
}

fn parse_user(user: &str) -> Result<UserId> {
    UserId::new(user).context("invalid user id")
}

fn parse_path(path: &str) -> Result<PrivatePath> {
    PrivatePath::parse(path).context("invalid document path")
}

async fn unlock(lockbox: &Lockbox, user: &str) -> Result<UserAuth> {
    let user = parse_user(user)?;
    let password = read_password("LOCKBOX_PASSWORD", "Password: ", false)?;
    let auth = lockbox
        .profiles()
        .unlock(&user, &password)
        .await
        .context("unlocking profile")?;
    password.clear();
    Ok(auth)
}

// ── Profile commands ──────────────────────────────────────────────────────────

async fn cmd_register(lockbox: &Lockbox, user: &str) -> Result<()> {
    let user_id = parse_user(user)?;
    let password = read_password("LOCKBOX_PASSWORD", "New password: ", true)?;
    lockbox
        .profiles()
        .register(&user_id, &password)
        .await
        .context("registering profile")?;
    password.clear();

    println!("registered {user}");
    Ok(())
}

async fn cmd_passwd(lockbox: &Lockbox, user: &str) -> Result<()> {
    let auth = unlock(lockbox, user).await?;
    let new_password = read_password("LOCKBOX_NEW_PASSWORD", "New password: ", true)?;
    lockbox
        .profiles()
        .update_password(&auth, &new_password)
        .await
        .context("updating password")?;
    new_password.clear();

    println!("password changed for {user}");
    Ok(())
}

async fn cmd_deregister(lockbox: &Lockbox, user: &str, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!(
            "deregister deletes every document of '{user}' and cannot be undone; re-run with --yes"
        );
    }
    let user_id = parse_user(user)?;
    lockbox
        .profiles()
        .remove(&user_id)
        .await
        .context("removing profile")?;

    println!("deregistered {user}");
    Ok(())
}

// ── Document commands ─────────────────────────────────────────────────────────

async fn cmd_put(lockbox: &Lockbox, user: &str, path: &str, input: Option<&Path>) -> Result<()> {
    let logical = parse_path(path)?;
    let auth = unlock(lockbox, user).await?;

    let mut reader: Box<dyn AsyncRead + Unpin + Send> = match input {
        Some(file) => Box::new(
            tokio::fs::File::open(file)
                .await
                .with_context(|| format!("opening {}", file.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };

    // An early return drops the handle, which aborts the write.
    let mut handle = lockbox.private().write(&auth, &logical).await?;
    let mut buf = vec![0u8; IO_BLOCK_SIZE];
    let mut total: u64 = 0;
    loop {
        let n = reader.read(&mut buf).await.context("reading input")?;
        if n == 0 {
            break;
        }
        handle.write(&buf[..n]).await?;
        total += n as u64;
    }
    let resource = handle.close().await?;

    info!(bytes = total, "document stored");
    eprintln!("stored {} ({})", resource.logical, fmt_bytes(total));
    Ok(())
}

async fn cmd_get(lockbox: &Lockbox, user: &str, path: &str, output: Option<&Path>) -> Result<()> {
    let logical = parse_path(path)?;
    let auth = unlock(lockbox, user).await?;
    let mut handle = lockbox.private().read(&auth, &logical).await?;

    match output {
        Some(file) => {
            // Land in a sibling file first so a failed read never leaves
            // partial plaintext under the requested name.
            let partial = partial_path(file);
            let mut writer = tokio::fs::File::create(&partial)
                .await
                .with_context(|| format!("creating {}", partial.display()))?;
            let copied = copy_to(&mut handle, &mut writer).await;

            match copied {
                Ok(total) => {
                    tokio::fs::rename(&partial, file)
                        .await
                        .with_context(|| format!("moving into place: {}", file.display()))?;
                    eprintln!("wrote {} ({})", file.display(), fmt_bytes(total));
                    Ok(())
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(&partial).await;
                    Err(e.context("reading document"))
                }
            }
        }
        None => {
            let mut stdout = tokio::io::stdout();
            copy_to(&mut handle, &mut stdout).await?;
            Ok(())
        }
    }
}

/// `out.txt` stages as `out.txt.lockbox-partial`.
fn partial_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".lockbox-partial");
    PathBuf::from(name)
}

async fn copy_to<W: AsyncWrite + Unpin>(
    handle: &mut lockbox_private::ScopedReadHandle,
    writer: &mut W,
) -> Result<u64> {
    let mut total: u64 = 0;
    while let Some(chunk) = handle.next_chunk().await? {
        writer.write_all(&chunk).await.context("writing output")?;
        total += chunk.len() as u64;
    }
    writer.flush().await.context("writing output")?;
    Ok(total)
}

async fn cmd_ls(lockbox: &Lockbox, user: &str, prefix: Option<&str>) -> Result<()> {
    let prefix = match prefix {
        Some(p) => parse_path(p)?,
        None => PrivatePath::root(),
    };
    let auth = unlock(lockbox, user).await?;

    let mut entries = lockbox.private().list(&auth, &prefix).await?;
    let mut count = 0usize;
    while let Some(entry) = entries.next().await {
        println!("{}", entry?.logical);
        count += 1;
    }
    eprintln!("{count} document(s)");
    Ok(())
}

async fn cmd_rm(lockbox: &Lockbox, user: &str, path: &str) -> Result<()> {
    let logical = parse_path(path)?;
    let auth = unlock(lockbox, user).await?;
    lockbox.private().remove(&auth, &logical).await?;
    eprintln!("removed {logical}");
    Ok(())
}

// ── `lockbox status` / `lockbox config show` ──────────────────────────────────

async fn cmd_status(config: &LockboxConfig) -> Result<()> {
    let backend = open_backend(config)?;
    let system_root = lockbox_core::AbsoluteLocation::new(config.layout.system_root.clone());
    let health = check_health(backend.as_ref(), &system_root).await;

    println!("lockbox v{}", env!("CARGO_PKG_VERSION"));
    match config.storage.backend {
        BackendKind::Fs => println!("  storage:     fs {}", config.storage.root.display()),
        BackendKind::Memory => println!("  storage:     memory"),
        BackendKind::S3 => println!(
            "  storage:     s3 {} (bucket {})",
            config.storage.endpoint, config.storage.bucket
        ),
    }
    println!("  system root: {}", config.layout.system_root);
    println!("  segment:     {}", fmt_bytes(u64::from(config.crypto.segment_size)));
    match health {
        Ok(()) => println!("  health:      ok"),
        Err(e) => {
            println!("  health:      UNREACHABLE ({e})");
            std::process::exit(1);
        }
    }
    Ok(())
}

fn cmd_config_show(config: &LockboxConfig, config_path: &Path) -> Result<()> {
    println!("# config: {}", config_path.display());
    let rendered = toml::to_string_pretty(config).context("serializing config")?;
    print!("{rendered}");
    Ok(())
}

// ── Utilities ─────────────────────────────────────────────────────────────────

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
