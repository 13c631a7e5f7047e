// bin/cli.rs - Domain Key CLI Tool
//
//! Domain key command line interface
//!
//! Inspects and edits a keyring and scores domain keys against a required
//! signer.
//!
//! # Usage
//!
//! ```bash
//! # Engine status
//! domainkey status
//!
//! # Keys published for a domain
//! domainkey domain-key example.com
//!
//! # Score a domain key (uid index -1 = any user-ID named after the domain)
//! domainkey verify example.com 0123...4567 -1 89ABCDEF01234567
//!
//! # Certify user-ID 0 of a key
//! domainkey sign-uid 0123...4567 0 --with 89ABCDEF01234567
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_stream::StreamExt;

use domainkey_trust::api::{DomainKeyApi, ErrorRecord, KeyGenEvent, KeyMap};
use domainkey_trust::keyring::{KeyGenParams, SledKeyring, Validity};
use domainkey_trust::observability::{init_tracing, TracingFormat};
use domainkey_trust::settings::Settings;

/// Domain key trust CLI
#[derive(Parser, Debug)]
#[command(name = "domainkey")]
#[command(version)]
#[command(about = "Domain key trust evaluation - inspect keys and score domain keys")]
#[command(long_about = None)]
struct Args {
    /// Settings file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Keyring directory (overrides settings)
    #[arg(short, long, global = true)]
    keyring: Option<PathBuf>,

    /// Log filter (overrides settings and RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format (pretty, compact, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Engine status
    Status,

    /// List all public keys
    ListKeys,

    /// List keys with a secret counterpart
    ListSecretKeys,

    /// List keys whose user-IDs match a domain
    DomainKey {
        domain: String,
    },

    /// Score a domain key against a required signer
    Verify {
        domain: String,

        /// Fingerprint of the domain key
        fingerprint: String,

        /// User-ID index; negative means any user-ID named after the domain
        #[arg(allow_negative_numbers = true)]
        uid_index: i64,

        /// Key id of the required signer
        required_signer: String,
    },

    /// Import armored keys from a file ("-" for stdin)
    Import {
        file: PathBuf,
    },

    /// Export a key as an armored block
    Export {
        key_id: String,

        /// Include the secret key
        #[arg(long)]
        secret: bool,
    },

    /// Encrypt a file ("-" for stdin) to a recipient
    Encrypt {
        recipient: String,

        #[arg(default_value = "-")]
        file: PathBuf,

        /// Also encrypt to this key
        #[arg(long)]
        sender: Option<String>,

        /// Sign with the sender (or the default key)
        #[arg(long)]
        sign: bool,
    },

    /// Decrypt an armored message and verify its signatures
    Decrypt {
        #[arg(default_value = "-")]
        file: PathBuf,
    },

    /// Certify a user-ID
    SignUid {
        key_id: String,

        uid_index: i64,

        /// Signing key (defaults to the configured default key)
        #[arg(long = "with", default_value = "")]
        with_key: String,

        /// Non-exportable signature
        #[arg(long)]
        local: bool,

        /// Trust signature level (1 = marginal, 2 = full)
        #[arg(long)]
        trust_level: Option<u8>,
    },

    /// Enable a key
    Enable {
        key_id: String,
    },

    /// Disable a key
    Disable {
        key_id: String,
    },

    /// Delete a signature from a user-ID
    DeleteSig {
        key_id: String,
        uid_index: i64,
        sig_index: i64,
    },

    /// Set the owner-trust of a key
    SetTrust {
        key_id: String,

        /// unknown, undefined, never, marginal, full or ultimate
        trust: String,
    },

    /// Generate a key pair
    GenKey {
        /// Real name (usually the domain)
        name: String,

        #[arg(long, default_value = "")]
        email: String,

        #[arg(long, default_value = "")]
        comment: String,

        /// 0, YYYY-MM-DD or <n>[d|w|m|y]
        #[arg(long, default_value = "0")]
        expire: String,

        /// Protect the secret key with the passphrase from this variable
        #[arg(long)]
        passphrase_env: Option<String>,

        /// Primary key only, no encryption subkey
        #[arg(long)]
        no_subkey: bool,
    },
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    if let Some(path) = &args.keyring {
        settings.keyring.path = path.clone();
    }
    if let Some(filter) = &args.log_level {
        settings.log.filter = filter.clone();
    }
    if let Some(format) = &args.log_format {
        settings.log.format = format
            .parse::<TracingFormat>()
            .map_err(anyhow::Error::msg)?;
    }
    init_tracing(settings.tracing_config()).context("Failed to initialize tracing")?;

    let keyring = settings
        .open_keyring()
        .with_context(|| format!("Failed to open keyring {}", settings.keyring.path.display()))?;
    let api = DomainKeyApi::new(Arc::new(keyring));
    let out = Output { format: args.format };

    match args.command {
        Commands::Status => cmd_status(&api, &settings, &out),
        Commands::ListKeys => cmd_list(&out, "Public Keys", api.public_key_list()),
        Commands::ListSecretKeys => cmd_list(&out, "Secret Keys", api.private_key_list()),
        Commands::DomainKey { domain } => {
            cmd_list(&out, &format!("Keys for {}", domain), api.domain_key(&domain))
        }
        Commands::Verify {
            domain,
            fingerprint,
            uid_index,
            required_signer,
        } => cmd_verify(&api, &out, &domain, &fingerprint, uid_index, &required_signer),
        Commands::Import { file } => {
            let armored = read_text(&file)?;
            let summary = api.import_key(&armored).map_err(record)?;
            out.emit(&summary, || {
                println!("{}", "Import".bold().cyan());
                println!("{}", "─".repeat(40));
                println!("  {} {}", "Considered:".bold(), summary.considered);
                println!("  {} {}", "Imported:".bold(), summary.imported);
                println!("  {} {}", "Unchanged:".bold(), summary.unchanged);
                println!("  {} {}", "New user-IDs:".bold(), summary.new_user_ids);
                println!("  {} {}", "New signatures:".bold(), summary.new_signatures);
                println!("  {} {}", "Secret imported:".bold(), summary.secret_imported);
                println!("  {} {}", "Not imported:".bold(), summary.not_imported);
                for status in &summary.imports {
                    println!("    {} {}", status.fingerprint, status.result.dimmed());
                }
            })
        }
        Commands::Export { key_id, secret } => {
            let armored = api.export_key(&key_id, secret).map_err(record)?;
            print!("{}", armored);
            Ok(())
        }
        Commands::Encrypt {
            recipient,
            file,
            sender,
            sign,
        } => {
            let data = read_bytes(&file)?;
            let encrypted = api
                .encrypt(&data, &recipient, sender.as_deref(), sign)
                .map_err(record)?;
            out.emit(&encrypted, || print!("{}", encrypted.data))
        }
        Commands::Decrypt { file } => {
            let armored = read_text(&file)?;
            let decrypted = api.decrypt(&armored).map_err(record)?;
            out.emit(&decrypted, || {
                for sig in &decrypted.signatures {
                    let status = serde_json::to_value(sig.status)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default();
                    eprintln!(
                        "{} {} ({}, validity {})",
                        "Signature:".bold(),
                        sig.fingerprint,
                        status,
                        sig.validity
                    );
                }
                print!("{}", decrypted.data);
            })
        }
        Commands::SignUid {
            key_id,
            uid_index,
            with_key,
            local,
            trust_level,
        } => {
            let result = api
                .sign_uid(&key_id, uid_index, &with_key, local, trust_level)
                .map_err(record)?;
            out.emit(&result, || println!("{} {}", "✓".green(), result.result))
        }
        Commands::Enable { key_id } => {
            let result = api.enable_key(&key_id).map_err(record)?;
            out.emit(&result, || println!("{} {}", "✓".green(), result.result))
        }
        Commands::Disable { key_id } => {
            let result = api.disable_key(&key_id).map_err(record)?;
            out.emit(&result, || println!("{} {}", "✓".green(), result.result))
        }
        Commands::DeleteSig {
            key_id,
            uid_index,
            sig_index,
        } => {
            let result = api
                .delete_uid_signature(&key_id, uid_index, sig_index)
                .map_err(record)?;
            out.emit(&result, || println!("{} {}", "✓".green(), result.result))
        }
        Commands::SetTrust { key_id, trust } => {
            let Some(trust) = Validity::parse(&trust) else {
                bail!("Unknown trust level '{}'", trust);
            };
            let result = api.set_owner_trust(&key_id, trust).map_err(record)?;
            out.emit(&result, || println!("{} {}", "✓".green(), result.result))
        }
        Commands::GenKey {
            name,
            email,
            comment,
            expire,
            passphrase_env,
            no_subkey,
        } => {
            let passphrase = match passphrase_env {
                Some(var) => std::env::var(&var)
                    .with_context(|| format!("Passphrase variable {} is not set", var))?,
                None => String::new(),
            };
            let params = KeyGenParams {
                subkey_type: if no_subkey { "none".into() } else { String::new() },
                name_real: name,
                name_email: email,
                name_comment: comment,
                expire_date: expire,
                passphrase,
                ..Default::default()
            };
            cmd_gen_key(&api, &out, params).await
        }
    }
}

// =============================================================================
// Output
// =============================================================================

struct Output {
    format: OutputFormat,
}

impl Output {
    /// JSON on stdout, or the text rendering
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce()) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(value).context("Failed to encode JSON")?;
                println!("{}", json);
            }
            OutputFormat::Text => text(),
        }
        Ok(())
    }
}

/// Error records become the command's error
fn record(record: ErrorRecord) -> anyhow::Error {
    anyhow::anyhow!(
        "{} failed: {} (code {}, {}:{})",
        record.method,
        record.message,
        record.code,
        record.file,
        record.line
    )
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut data = Vec::new();
        std::io::stdin()
            .read_to_end(&mut data)
            .context("Failed to read stdin")?;
        Ok(data)
    } else {
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
    }
}

fn read_text(path: &Path) -> Result<String> {
    String::from_utf8(read_bytes(path)?).context("Input is not UTF-8")
}

// =============================================================================
// Command Handlers
// =============================================================================

fn cmd_status(api: &DomainKeyApi<SledKeyring>, settings: &Settings, out: &Output) -> Result<()> {
    let status = api.status();
    out.emit(&status, || {
        println!("{}", "Domain Key Status".bold().cyan());
        println!("{}", "─".repeat(40));

        let engine = if status.engine_valid {
            "valid".green()
        } else {
            "invalid".red()
        };
        println!("  {} {}", "Engine:".bold(), engine);
        if let Some(version) = &status.engine_version {
            println!("  {} {}", "Version:".bold(), version);
        }
        if let Some(detail) = &status.detail {
            println!("  {} {}", "Detail:".bold(), detail.red());
        }
        println!(
            "  {} {}",
            "Agent:".bold(),
            status.agent_info.as_deref().unwrap_or("(none)")
        );
        println!(
            "  {} {}",
            "Locale:".bold(),
            status.locale.as_deref().unwrap_or("(unset)")
        );
        println!("  {} {}", "Config tool:".bold(), status.config_tool_detected);
        println!("  {} {}", "CLI version:".bold(), api.version());
        println!();
        println!("{}", "Settings".bold().cyan());
        print!("{}", settings);
    })
}

fn cmd_list(out: &Output, title: &str, keys: Result<KeyMap, ErrorRecord>) -> Result<()> {
    let keys = keys.map_err(record)?;
    out.emit(&keys, || {
        println!("{}", title.bold().cyan());
        println!("{}", "─".repeat(60));
        if keys.is_empty() {
            println!("  No keys");
        }
        for (key_id, key) in &keys {
            let mut flags = Vec::new();
            if key.flags.secret {
                flags.push("secret".yellow());
            }
            if key.flags.disabled {
                flags.push("disabled".red());
            }
            if key.flags.revoked {
                flags.push("revoked".red());
            }
            if key.flags.expired {
                flags.push("expired".red());
            }
            let flags: Vec<String> = flags.iter().map(|f| f.to_string()).collect();

            println!(
                "  {} {} [{}] {}",
                key_id.bold(),
                key.fingerprint.dimmed(),
                key.owner_trust,
                flags.join(" ")
            );
            for (index, uid) in key.uids.iter().enumerate() {
                println!(
                    "    {} {} <{}> ({}, {} signatures)",
                    format!("uid[{}]", index).cyan(),
                    uid.name,
                    uid.email,
                    uid.validity,
                    uid.signatures.len()
                );
                for (sig_index, sig) in uid.signatures.iter().enumerate() {
                    println!("      sig[{}] {}", sig_index, sig.signer_key_id);
                }
            }
        }
    })
}

fn cmd_verify(
    api: &DomainKeyApi<SledKeyring>,
    out: &Output,
    domain: &str,
    fingerprint: &str,
    uid_index: i64,
    required_signer: &str,
) -> Result<()> {
    let verdict = api
        .verify_domain_key_verdict(domain, fingerprint, uid_index, required_signer)
        .map_err(record)?;
    let code = verdict.code();

    #[derive(Serialize)]
    struct VerifyOutput {
        code: i32,
        trusted: bool,
        description: &'static str,
        verdict: domainkey_trust::TrustVerdict,
    }

    let report = VerifyOutput {
        code: code.value(),
        trusted: code.is_trusted(),
        description: code.description(),
        verdict,
    };
    out.emit(&report, || {
        let label = if report.trusted {
            "trusted".green()
        } else {
            "not trusted".red()
        };
        println!("{} {} {}", code.value().to_string().bold(), label, code.description());
    })
}

async fn cmd_gen_key(
    api: &DomainKeyApi<SledKeyring>,
    out: &Output,
    params: KeyGenParams,
) -> Result<()> {
    let task = api.gen_key(params).map_err(record)?;
    if out.format == OutputFormat::Text {
        eprintln!("{} {}", "→".cyan(), task.status());
    }

    let mut events = task.into_events();
    let mut outcome = None;
    while let Some(event) = events.next().await {
        match event {
            KeyGenEvent::Progress(tag) => {
                if out.format == OutputFormat::Text {
                    eprint!("{}", tag);
                    std::io::stderr().flush().ok();
                }
            }
            KeyGenEvent::Complete(result) => {
                outcome = Some(result);
                break;
            }
        }
    }
    if out.format == OutputFormat::Text {
        eprintln!();
    }

    let Some(outcome) = outcome else {
        bail!("Key generation stopped without reporting a result");
    };
    let fingerprint = outcome.map_err(record)?;

    #[derive(Serialize)]
    struct Generated<'a> {
        event: &'static str,
        fingerprint: &'a str,
    }
    let generated = Generated {
        event: domainkey_trust::api::COMPLETE_EVENT,
        fingerprint: &fingerprint,
    };
    out.emit(&generated, || {
        println!("{} Generated {}", "✓".green(), fingerprint.bold())
    })
}
