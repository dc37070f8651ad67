//! peerio: Peerio crypto core CLI
//!
//! Commands:
//!   id                         - derive the identity and print its public-key ID
//!   encrypt <file> --to <user> - encrypt a file for contacts (and yourself)
//!   decrypt <file>             - decrypt a container into the current directory
//!   name <file>                - print the encrypted file name without decrypting
//!   config show                - display current configuration
//!
//! Credentials come from --username / PEERIO_USERNAME and PEERIO_PASSPHRASE,
//! prompting for the passphrase when the variable is unset.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::io::Write;
use std::path::{Path, PathBuf};

use peerio_core::config::{LogConfig, LogFormat, PeerioConfig};
use peerio_core::{Contacts, FileBlob};
use peerio_crypto::{CryptoPool, Identity, Session};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "peerio",
    version,
    about = "Peerio end-to-end encryption",
    long_about = "peerio: derive identities, encrypt files for contacts, and decrypt miniLock containers"
)]
struct Cli {
    /// Path to peerio.toml configuration file
    #[arg(long, short = 'c', env = "PEERIO_CONFIG", default_value = "peerio.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct Credentials {
    /// Username (the scrypt salt for key derivation)
    #[arg(long, short = 'u', env = "PEERIO_USERNAME")]
    username: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Derive the identity and print its public-key ID
    Id {
        #[command(flatten)]
        creds: Credentials,
    },

    /// Encrypt a file for one or more contacts
    ///
    /// You are always added as a recipient so you can read what you send.
    Encrypt {
        #[command(flatten)]
        creds: Credentials,
        /// File to encrypt
        input: PathBuf,
        /// Recipient username (repeatable; must be in the contacts file)
        #[arg(long = "to", short = 't')]
        recipients: Vec<String>,
        /// Output path (default: <input>.minilock)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// File name stored inside the container (default: input file name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Decrypt a container
    Decrypt {
        #[command(flatten)]
        creds: Credentials,
        /// Container to decrypt
        input: PathBuf,
        /// Output path (default: the stored file name, in the current directory)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Print the file name stored in a container
    Name {
        #[command(flatten)]
        creds: Credentials,
        input: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = PeerioConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;
    init_logging(&config.log);

    match cli.command {
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
        Commands::Id { creds } => cmd_id(&config, &creds).await,
        Commands::Encrypt { creds, input, recipients, output, name } => {
            cmd_encrypt(&config, &creds, &input, &recipients, output.as_deref(), name.as_deref()).await
        }
        Commands::Decrypt { creds, input, output } => {
            cmd_decrypt(&config, &creds, &input, output.as_deref()).await
        }
        Commands::Name { creds, input } => cmd_name(&config, &creds, &input).await,
    }
}

fn init_logging(log: &LogConfig) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));

    match log.format {
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

// ── Identity + session setup ──────────────────────────────────────────────────

fn read_passphrase() -> Result<SecretString> {
    if let Ok(p) = std::env::var("PEERIO_PASSPHRASE") {
        return Ok(SecretString::from(p));
    }
    let p = rpassword::prompt_password("Passphrase: ").context("reading passphrase")?;
    Ok(SecretString::from(p))
}

/// Derive the identity on the crypto pool; scrypt takes a noticeable moment.
async fn derive_identity(config: &PeerioConfig, creds: &Credentials) -> Result<Identity> {
    let passphrase = read_passphrase()?;
    let pool = CryptoPool::new(&config.pool);
    pool.derive_identity(&creds.username, passphrase)
        .await
        .context("deriving identity")
}

fn load_contacts(config: &PeerioConfig) -> Result<Contacts> {
    match &config.contacts_file {
        Some(path) => Contacts::load(path)
            .with_context(|| format!("loading contacts: {}", path.display())),
        None => Ok(Contacts::new()),
    }
}

async fn open_session(config: &PeerioConfig, creds: &Credentials) -> Result<Session<Contacts>> {
    let identity = derive_identity(config, creds).await?;
    let contacts = load_contacts(config)?;
    tracing::debug!(contacts = contacts.len(), "session ready");
    Ok(Session::new(identity, contacts, &config.stream))
}

// ── `peerio id` ───────────────────────────────────────────────────────────────

async fn cmd_id(config: &PeerioConfig, creds: &Credentials) -> Result<()> {
    let identity = derive_identity(config, creds).await?;
    println!("{}", identity.id());
    Ok(())
}

// ── `peerio encrypt` ──────────────────────────────────────────────────────────

async fn cmd_encrypt(
    config: &PeerioConfig,
    creds: &Credentials,
    input: &Path,
    recipients: &[String],
    output: Option<&Path>,
    name: Option<&str>,
) -> Result<()> {
    let session = open_session(config, creds).await?;

    let file_name = match name {
        Some(n) => n.to_string(),
        None => input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .context("input has no file name; pass --name")?,
    };
    let output = output.map(Path::to_path_buf).unwrap_or_else(|| {
        let mut p = input.as_os_str().to_owned();
        p.push(".minilock");
        PathBuf::from(p)
    });

    let mut source =
        FileBlob::open(input).with_context(|| format!("opening {}", input.display()))?;

    let to: Vec<&str> = recipients.iter().map(String::as_str).collect();
    let sealed = write_via_temp(&output, |out| {
        session
            .encrypt_file(&mut source, &file_name, &to, out)
            .context("encrypting")
    })?;

    for user in &sealed.failed_recipients {
        eprintln!("warning: no public key for '{user}'; not a recipient");
    }
    println!(
        "Encrypted {} → {} ({} recipient(s))",
        input.display(),
        output.display(),
        sealed.header.recipient_count()
    );
    Ok(())
}

// ── `peerio decrypt` ──────────────────────────────────────────────────────────

async fn cmd_decrypt(
    config: &PeerioConfig,
    creds: &Credentials,
    input: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let session = open_session(config, creds).await?;
    let mut source =
        FileBlob::open(input).with_context(|| format!("opening {}", input.display()))?;

    let output = match output {
        Some(p) => p.to_path_buf(),
        None => {
            let stored = session
                .decrypt_file_name(&mut source)
                .context("reading stored file name")?;
            safe_file_name(&stored)?
        }
    };

    let file = write_via_temp(&output, |out| {
        session.decrypt_file(&mut source, out).context("decrypting")
    })?;

    println!(
        "Decrypted {} → {} ({} bytes from {})",
        input.display(),
        output.display(),
        file.size,
        file.sender_id
    );
    Ok(())
}

/// Run `write` against a temp file beside `output` and rename it into place
/// only if `write` succeeds. On error nothing appears at `output`.
fn write_via_temp<T>(
    output: &Path,
    write: impl FnOnce(&mut std::fs::File) -> Result<T>,
) -> Result<T> {
    let dir = output
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    let value = write(tmp.as_file_mut())?;
    tmp.as_file_mut().flush()?;
    tmp.persist(output)
        .with_context(|| format!("writing {}", output.display()))?;
    Ok(value)
}

/// Reduce a stored name to a bare file name so it cannot escape the
/// current directory.
fn safe_file_name(stored: &str) -> Result<PathBuf> {
    Path::new(stored)
        .file_name()
        .map(PathBuf::from)
        .with_context(|| format!("stored file name {stored:?} is not usable; pass --output"))
}

// ── `peerio name` ─────────────────────────────────────────────────────────────

async fn cmd_name(config: &PeerioConfig, creds: &Credentials, input: &Path) -> Result<()> {
    let session = open_session(config, creds).await?;
    let mut source =
        FileBlob::open(input).with_context(|| format!("opening {}", input.display()))?;
    println!("{}", session.decrypt_file_name(&mut source)?);
    Ok(())
}

// ── `peerio config show` ──────────────────────────────────────────────────────

fn cmd_config_show(config: &PeerioConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
