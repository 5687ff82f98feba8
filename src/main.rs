use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
mod auth;
use keychain::{
    AliasStore, Certificate, CertificateEntry, CredentialFactory, EntryKind, KeyAlgorithm,
    Keystore, KeystoreEntry, PrivateKey, RandomCredentials, SecretKey, Store, StoreEntry,
    default_alias_store_path, default_keystore_path,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "keychain")]
#[command(
    version,
    about = "Password-protected keystore and alias store for keys and certificates."
)]
struct Cli {
    /// Path to the store file
    #[arg(long, global = true, value_name = "PATH", env = "KEYCHAIN_PATH")]
    store: Option<PathBuf>,

    /// Operate on an alias store (peer certificates) instead of a keystore
    #[arg(long, global = true, default_value_t = false)]
    alias: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Creates an empty store
    Init,

    /// Lists all entries
    List {
        /// Print entries as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Adds a DER certificate under a name
    #[command(arg_required_else_help = true)]
    AddCert { name: String, file: PathBuf },

    /// Adds a DER private key under a name
    #[command(arg_required_else_help = true)]
    AddPrivate {
        name: String,
        algorithm: KeyAlgorithm,
        file: PathBuf,
    },

    /// Adds a secret key, generating one when no file is given
    #[command(arg_required_else_help = true)]
    AddSecret {
        name: String,
        algorithm: KeyAlgorithm,
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Writes the raw bytes of an entry to a file
    #[command(arg_required_else_help = true)]
    Export {
        name: String,
        kind: EntryKind,
        file: PathBuf,
    },

    /// Removes an entry
    #[command(arg_required_else_help = true)]
    Remove { name: String, kind: EntryKind },

    /// Re-encrypts the store under a new password
    Passwd,

    /// Shows information about the store
    Info,
}

#[derive(Debug, Serialize)]
struct EntrySummary {
    kind: EntryKind,
    name: String,
    fingerprint: String,
}

impl EntrySummary {
    fn of<E: StoreEntry>(entry: &E) -> Self {
        Self {
            kind: entry.kind(),
            name: entry.name().to_owned(),
            fingerprint: hex::encode(entry.fingerprint()),
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("KEYCHAIN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_path(path: Option<PathBuf>, alias: bool) -> Result<PathBuf> {
    match path {
        Some(p) => Ok(p),
        None if alias => default_alias_store_path(),
        None => default_keystore_path(),
    }
}

/// Opens an existing store; `Store::open` alone would create a missing one.
fn open_existing<E: StoreEntry>(path: &Path) -> Result<Store<E>> {
    let exists = fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
    if !exists {
        bail!(
            "{} does not exist at {}; run `keychain init` first",
            E::STORE_NAME,
            path.display()
        );
    }

    let password = auth::read_password()?;
    Ok(Store::open(path, &password)?)
}

fn init<E: StoreEntry>(path: &Path) -> Result<()> {
    if fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false) {
        bail!("{} already exists at {}", E::STORE_NAME, path.display());
    }

    let password = auth::read_password()?;
    let mut store = Store::<E>::open(path, &password)?;
    store.close()?;
    println!("{} initialized", E::STORE_NAME);
    Ok(())
}

fn list<E: StoreEntry>(path: &Path, json: bool) -> Result<()> {
    let store = open_existing::<E>(path)?;
    let entries = store.entries()?;

    if json {
        let summaries: Vec<EntrySummary> = entries.iter().map(EntrySummary::of).collect();
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No entries stored.");
        return Ok(());
    }

    let summaries: Vec<EntrySummary> = entries.iter().map(EntrySummary::of).collect();
    let name_width = summaries
        .iter()
        .map(|s| s.name.len())
        .chain(std::iter::once("Name".len()))
        .max()
        .unwrap_or(0);
    let kind_width = "certificate".len();

    println!("{:<name_width$}  {:<kind_width$}  Fingerprint", "Name", "Kind");
    println!("{:-<name_width$}  {:-<kind_width$}  {:-<64}", "", "", "");
    for s in summaries {
        let kind = s.kind.to_string();
        println!("{:<name_width$}  {:<kind_width$}  {}", s.name, kind, s.fingerprint);
    }
    Ok(())
}

fn remove<E: StoreEntry>(path: &Path, name: &str, kind: EntryKind) -> Result<()> {
    let mut store = open_existing::<E>(path)?;
    store.remove(name, kind)?;
    store.close()?;
    println!("{kind} '{name}' removed");
    Ok(())
}

fn passwd<E: StoreEntry>(path: &Path) -> Result<()> {
    let mut store = open_existing::<E>(path)?;
    let new_password = auth::read_new_password_with_confirmation()?;
    store.change_password(&new_password)?;
    store.close()?;
    println!("password changed");
    Ok(())
}

fn info<E: StoreEntry>(path: &Path) -> Result<()> {
    let store = open_existing::<E>(path)?;
    let meta = fs::metadata(path)?;
    let modified: DateTime<Local> = meta.modified()?.into();

    println!("Path:      {}", path.display());
    println!("Type:      {}", E::STORE_NAME);
    println!("Entries:   {}", store.len()?);
    println!("Size:      {} bytes", meta.len());
    println!("Modified:  {}", modified.format("%Y-%m-%d %H:%M:%S %Z"));
    Ok(())
}

fn read_der(file: &Path) -> Result<Vec<u8>> {
    fs::read(file).with_context(|| format!("failed to read {}", file.display()))
}

fn add_cert(path: &Path, alias: bool, name: String, file: &Path) -> Result<()> {
    let cert = Certificate::from_der(read_der(file)?);
    if alias {
        let mut store = open_existing::<CertificateEntry>(path)?;
        store.add(CertificateEntry::new(name.clone(), cert))?;
        store.close()?;
    } else {
        let mut store = open_existing::<KeystoreEntry>(path)?;
        store.add(KeystoreEntry::certificate(name.clone(), cert))?;
        store.close()?;
    }
    println!("certificate '{name}' added");
    Ok(())
}

fn keystore_only(alias: bool) -> Result<()> {
    if alias {
        bail!("alias stores hold certificates only");
    }
    Ok(())
}

fn add_private(path: &Path, name: String, algorithm: KeyAlgorithm, file: &Path) -> Result<()> {
    let key = PrivateKey::new(algorithm, read_der(file)?)?;
    let mut store: Keystore = open_existing(path)?;
    store.add(KeystoreEntry::private(name.clone(), key))?;
    store.close()?;
    println!("private key '{name}' added");
    Ok(())
}

fn add_secret(
    path: &Path,
    name: String,
    algorithm: KeyAlgorithm,
    file: Option<&Path>,
) -> Result<()> {
    let key = match file {
        Some(file) => SecretKey::new(algorithm, read_der(file)?)?,
        None => RandomCredentials.secret_key(algorithm)?,
    };
    let mut store: Keystore = open_existing(path)?;
    store.add(KeystoreEntry::secret(name.clone(), key))?;
    store.close()?;
    println!("secret key '{name}' added");
    Ok(())
}

fn export(path: &Path, alias: bool, name: &str, kind: EntryKind, file: &Path) -> Result<()> {
    let not_found = || anyhow::anyhow!("{kind} '{name}' not found");

    let bytes = if alias {
        if kind != EntryKind::Certificate {
            bail!("alias stores hold certificates only");
        }
        let store: AliasStore = open_existing(path)?;
        let cert = store.get_certificate(name)?.ok_or_else(not_found)?;
        cert.der().to_vec()
    } else {
        let store: Keystore = open_existing(path)?;
        match kind {
            EntryKind::Private => store.get_private(name)?.ok_or_else(not_found)?.der().to_vec(),
            EntryKind::Certificate => store
                .get_certificate(name)?
                .ok_or_else(not_found)?
                .der()
                .to_vec(),
            EntryKind::Secret => store.get_secret(name)?.ok_or_else(not_found)?.bytes().to_vec(),
        }
    };

    let bytes = zeroize::Zeroizing::new(bytes);
    fs::write(file, &*bytes).with_context(|| format!("failed to write {}", file.display()))?;
    println!("{kind} '{name}' exported to {}", file.display());
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();

    let args = Cli::parse();
    let alias = args.alias;
    let path = resolve_path(args.store, alias)?;

    match args.command {
        Commands::Init if alias => init::<CertificateEntry>(&path),
        Commands::Init => init::<KeystoreEntry>(&path),

        Commands::List { json } if alias => list::<CertificateEntry>(&path, json),
        Commands::List { json } => list::<KeystoreEntry>(&path, json),

        Commands::AddCert { name, file } => add_cert(&path, alias, name, &file),

        Commands::AddPrivate {
            name,
            algorithm,
            file,
        } => {
            keystore_only(alias)?;
            add_private(&path, name, algorithm, &file)
        }

        Commands::AddSecret {
            name,
            algorithm,
            file,
        } => {
            keystore_only(alias)?;
            add_secret(&path, name, algorithm, file.as_deref())
        }

        Commands::Export { name, kind, file } => export(&path, alias, &name, kind, &file),

        Commands::Remove { name, kind } if alias => {
            remove::<CertificateEntry>(&path, &name, kind)
        }
        Commands::Remove { name, kind } => remove::<KeystoreEntry>(&path, &name, kind),

        Commands::Passwd if alias => passwd::<CertificateEntry>(&path),
        Commands::Passwd => passwd::<KeystoreEntry>(&path),

        Commands::Info if alias => info::<CertificateEntry>(&path),
        Commands::Info => info::<KeystoreEntry>(&path),
    }
}
