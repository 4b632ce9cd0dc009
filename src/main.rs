use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;
use zeroize::Zeroizing;

mod auth;

use pwcrypt::crypto::{DEFAULT_ITERATIONS, KEY_LEN};
use pwcrypt::protect::{CRYPT_MARKER, data_decrypt, data_encrypt, pw_convert};
use pwcrypt::{MainPassword, PasswordStore, default_store_path};

#[derive(Debug, Parser)]
#[command(name = "pwcrypt")]
#[command(
    version,
    about = "Offline password store with reversible encoding or main-password encryption."
)]
struct Cli {
    /// Path to the password store file
    #[arg(long, global = true, value_name = "PATH", env = "PWCRYPT_STORE")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Stores a password under a name
    #[command(arg_required_else_help = true)]
    Set { name: String, password: String },

    /// Prints a stored password
    #[command(arg_required_else_help = true)]
    Get { name: String },

    /// Lists the names of all stored passwords
    List,

    /// Removes a stored password
    #[command(arg_required_else_help = true)]
    Remove { name: String },

    /// Turns main-password encryption of the store on or off,
    /// recoding every stored record
    #[command(arg_required_else_help = true)]
    UseMainPassword { state: Toggle },

    /// Replaces the main password, re-encrypting every stored record
    ChangeMainPassword,

    /// Encrypts a file under a password-derived key
    #[command(arg_required_else_help = true)]
    EncryptFile {
        input: PathBuf,
        output: PathBuf,

        /// Key derivation iteration count
        #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
        iterations: u32,
    },

    /// Decrypts a file produced by encrypt-file
    #[command(arg_required_else_help = true)]
    DecryptFile { input: PathBuf, output: PathBuf },
}

fn resolve_store_path(path: Option<PathBuf>) -> Result<PathBuf> {
    match path {
        Some(p) => Ok(p),
        None => default_store_path(),
    }
}

/// Reads the main password once per invocation and keeps it cached for any
/// further use in the same run.
fn obtain_main_password(cache: &MainPassword) -> Result<Zeroizing<String>> {
    if let Some(pw) = cache.get() {
        return Ok(pw);
    }
    let pw = auth::read_main_password()?;
    cache.set(&pw)?;
    Ok(pw)
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let store_path = resolve_store_path(args.store)?;
    let cache = MainPassword::new();

    match args.command {
        Commands::Set { name, password } => {
            let mut store = PasswordStore::load(&store_path)?;

            let main_pw = if store.use_main_password() {
                Some(obtain_main_password(&cache)?)
            } else {
                None
            };
            let record = pw_convert(
                &password,
                true,
                store.use_main_password(),
                main_pw.as_deref().map(String::as_str),
            );
            if record.is_empty() {
                bail!("failed to encrypt password");
            }

            store.set(&name, record);
            store.save(&store_path)?;
            println!("stored password '{name}'");
        }
        Commands::Get { name } => {
            let store = PasswordStore::load(&store_path)?;
            let Some(record) = store.get(&name) else {
                bail!("no password stored under '{name}'");
            };

            let main_pw = if record.starts_with(CRYPT_MARKER) {
                Some(obtain_main_password(&cache)?)
            } else {
                None
            };
            let plain = pw_convert(
                record,
                false,
                store.use_main_password(),
                main_pw.as_deref().map(String::as_str),
            );
            if plain == record {
                bail!("cannot decrypt '{name}'; wrong main password?");
            }
            println!("{plain}");
        }
        Commands::List => {
            let store = PasswordStore::load(&store_path)?;
            for name in store.names() {
                println!("{name}");
            }
        }
        Commands::Remove { name } => {
            let mut store = PasswordStore::load(&store_path)?;
            if !store.remove(&name) {
                bail!("no password stored under '{name}'");
            }
            store.save(&store_path)?;
            println!("password '{name}' removed");
        }
        Commands::UseMainPassword { state } => {
            let mut store = PasswordStore::load(&store_path)?;
            match state {
                Toggle::On => {
                    if store.use_main_password() {
                        bail!("main password is already in use");
                    }
                    let new_pw = auth::read_new_main_password()?;
                    report_failures(store.recode_all("", &new_pw));
                    store.set_use_main_password(true);
                    store.save(&store_path)?;
                    println!("main password enabled");
                }
                Toggle::Off => {
                    if !store.use_main_password() {
                        bail!("main password is not in use");
                    }
                    let old_pw = obtain_main_password(&cache)?;
                    report_failures(store.recode_all(&old_pw, ""));
                    store.set_use_main_password(false);
                    store.save(&store_path)?;
                    println!("main password disabled");
                }
            }
        }
        Commands::ChangeMainPassword => {
            let mut store = PasswordStore::load(&store_path)?;
            if !store.use_main_password() {
                bail!("main password is not in use");
            }
            let old_pw = obtain_main_password(&cache)?;
            let new_pw = auth::read_new_main_password()?;
            report_failures(store.recode_all(&old_pw, &new_pw));
            store.save(&store_path)?;
            println!("main password changed");
        }
        Commands::EncryptFile {
            input,
            output,
            iterations,
        } => {
            let password = obtain_main_password(&cache)?;
            let data = fs::read(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let (edata, ok) = data_encrypt(&data, &password, KEY_LEN, iterations);
            if !ok {
                bail!("encryption failed");
            }
            fs::write(&output, &edata)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("encrypted {} -> {}", input.display(), output.display());
        }
        Commands::DecryptFile { input, output } => {
            let password = obtain_main_password(&cache)?;
            let edata = fs::read(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let (data, ok) = data_decrypt(&edata, &password, KEY_LEN);
            if !ok {
                bail!("decryption failed; wrong password or damaged file");
            }
            fs::write(&output, &data)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("decrypted {} -> {}", input.display(), output.display());
        }
    }

    Ok(())
}

fn report_failures(failed: Vec<String>) {
    for name in failed {
        eprintln!("warning: could not recode '{name}'; record left unchanged");
    }
}
