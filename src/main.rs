//! Command-line front end for the EIP-712 engine.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use hawala_eip712::eip712::{
    address_of, checksum_address, compose_digest, parse_address, sign_hash, Eip712Signature,
    SignatureVerifier, TypedData,
};
use hawala_eip712::error::EngineError;
use hawala_eip712::security::PrivateKey;
use hawala_eip712::utils::engine_config::{EngineSettings, StrictnessLevel};
use hawala_eip712::utils::logging::{init_tracing, redact_if_sensitive};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use zeroize::Zeroizing;

/// Hash, sign and verify EIP-712 typed data
#[derive(Parser, Debug)]
#[command(name = "eip712-tool", version)]
struct Cli {
    /// Engine settings file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Reject unknown message fields and high-s signatures
    #[arg(long, global = true)]
    strict: bool,

    /// Log hashing steps to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the type string, hashes and digest of a typed-data document
    Hash {
        /// Typed-data JSON file (eth_signTypedData_v4 shape)
        file: PathBuf,
    },
    /// Sign a typed-data document
    Sign {
        file: PathBuf,
        #[command(flatten)]
        key: KeySource,
    },
    /// Recover the signer address of a digest
    Recover {
        /// 32-byte digest, hex
        digest: String,
        /// 65-byte r ‖ s ‖ v signature, hex
        signature: String,
    },
    /// Check that a signature over a document was made by an address
    Verify {
        file: PathBuf,
        signature: String,
        address: String,
    },
    /// Compose a digest from a domain separator and a struct hash
    Compose {
        domain_separator: String,
        struct_hash: String,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct KeySource {
    /// File holding the hex private key
    #[arg(long)]
    key_file: Option<PathBuf>,

    /// Environment variable holding the hex private key
    #[arg(long)]
    key_env: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(if cli.verbose { "debug" } else { "warn" });

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            let err = EngineError::from_report(&report);
            tracing::debug!(code = ?err.code, "command failed");
            match serde_json::to_string(&err) {
                Ok(json) => eprintln!("{json}"),
                Err(_) => eprintln!("{err}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli.config.as_deref(), cli.strict)?;

    match &cli.command {
        Command::Hash { file } => hash(file, &settings),
        Command::Sign { file, key } => sign(file, key, &settings),
        Command::Recover { digest, signature } => recover(digest, signature, &settings),
        Command::Verify {
            file,
            signature,
            address,
        } => verify(file, signature, address, &settings),
        Command::Compose {
            domain_separator,
            struct_hash,
        } => compose(domain_separator, struct_hash),
    }
}

fn load_settings(config: Option<&Path>, strict: bool) -> Result<EngineSettings> {
    let mut settings = match config {
        Some(path) => EngineSettings::load(path)?,
        None => EngineSettings::standard(),
    };
    if strict {
        settings.level = StrictnessLevel::Strict;
        settings.strict_fields = true;
        settings.strict_signatures = true;
    }
    Ok(settings)
}

fn read_document(path: &Path) -> Result<TypedData> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    Ok(TypedData::from_json(&json)?)
}

fn hash(file: &Path, settings: &EngineSettings) -> Result<()> {
    let document = read_document(file)?;
    let registry = document.registry()?;
    let parts = document.pre_image(settings)?;

    let output = json!({
        "primaryType": document.primary_type,
        "typeString": registry.type_string(&document.primary_type)?,
        "typeHash": hex0x(&registry.type_hash(&document.primary_type)?),
        "domainSeparator": hex0x(&parts.domain_separator),
        "structHash": hex0x(&parts.struct_hash),
        "digest": hex0x(&parts.digest),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn sign(file: &Path, source: &KeySource, settings: &EngineSettings) -> Result<()> {
    let document = read_document(file)?;
    let key = load_key(source)?;
    let digest = document.pre_image(settings)?.digest;
    let signature = sign_hash(&digest, &key)?;

    let output = json!({
        "digest": hex0x(&digest),
        "signature": signature.to_hex(),
        "r": hex0x(&signature.r),
        "s": hex0x(&signature.s),
        "v": signature.v,
        "signer": checksum_address(&address_of(&key)?),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn load_key(source: &KeySource) -> Result<PrivateKey> {
    let hex_key = match (&source.key_file, &source.key_env) {
        (Some(path), _) => Zeroizing::new(
            std::fs::read_to_string(path)
                .with_context(|| format!("cannot read key file {}", path.display()))?,
        ),
        (None, Some(var)) => Zeroizing::new(
            std::env::var(var).with_context(|| format!("environment variable {var} is not set"))?,
        ),
        (None, None) => bail!("either --key-file or --key-env is required"),
    };
    Ok(PrivateKey::from_hex(&hex_key)?)
}

fn recover(digest: &str, signature: &str, settings: &EngineSettings) -> Result<()> {
    let digest = parse_hash(digest).context("invalid digest")?;
    let signature = Eip712Signature::from_hex(signature)?;
    let signer = SignatureVerifier::from_settings(settings).recover(&digest, &signature)?;
    println!("{}", checksum_address(&signer));
    Ok(())
}

fn verify(file: &Path, signature: &str, address: &str, settings: &EngineSettings) -> Result<()> {
    let document = read_document(file)?;
    let signature = Eip712Signature::from_hex(signature)?;
    let expected = parse_address(address)?;
    tracing::debug!(expected_signer = %redact_if_sensitive("expected_signer", address), "verifying document");

    let valid = document.verify(&signature, &expected, settings)?;
    println!("{}", json!({ "valid": valid, "signer": checksum_address(&expected) }));
    if !valid {
        bail!("signature was not made by {}", checksum_address(&expected));
    }
    Ok(())
}

fn compose(domain_separator: &str, struct_hash: &str) -> Result<()> {
    let domain_separator = parse_hash(domain_separator).context("invalid domain separator")?;
    let struct_hash = parse_hash(struct_hash).context("invalid struct hash")?;
    println!("{}", hex0x(&compose_digest(&domain_separator, &struct_hash)));
    Ok(())
}

fn parse_hash(s: &str) -> Result<[u8; 32]> {
    let s = s.trim();
    let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))?;
    let hash: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .with_context(|| format!("expected 32 bytes, got {}", bytes.len()))?;
    Ok(hash)
}

fn hex0x(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
