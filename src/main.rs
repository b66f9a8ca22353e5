//! model-gate entrypoint: verify a model's SHA-256 before loading it.

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use model_gate::config::{self, ConfigLayer};
use model_gate::digest::ExpectedDigest;
use model_gate::gate::{run_gate, EXIT_READY, EXIT_REJECTED, EXIT_UNREADABLE};
use model_gate::hashing::{sha256_file, DEFAULT_CHUNK_SIZE};
use model_gate::loader::OnnxProbeLoader;
use model_gate::logging;
use model_gate::report::{describe, write_human, write_json, Report};
use model_gate::verify::{check, Integrity};

/// CLI arguments for the model gate.
#[derive(Parser, Debug)]
#[command(
    name = "model-gate",
    version,
    about = "Refuse to load a model file whose SHA-256 does not match",
    args_conflicts_with_subcommands = true
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    verify: VerifyArgs,

    /// Log debug events to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify the model digest and load it on match (default)
    Verify(VerifyArgs),
    /// Print the SHA-256 of a file
    Hash(HashArgs),
}

#[derive(ClapArgs, Debug)]
struct VerifyArgs {
    /// Model file to check [default: model.onnx]
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// Expected SHA-256 as 64 lowercase hex characters
    #[arg(long, value_name = "HEX")]
    expected: Option<String>,

    /// Read size used while hashing [default: 4096]
    #[arg(long, value_name = "BYTES")]
    chunk_size: Option<usize>,

    /// TOML config file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Delete the model file if its digest does not match
    #[arg(long)]
    remove_on_mismatch: bool,

    /// Print a JSON report instead of status lines
    #[arg(long)]
    json: bool,
}

#[derive(ClapArgs, Debug)]
struct HashArgs {
    /// File to hash
    path: PathBuf,

    /// Read size used while hashing
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Compare against this digest and print OK/FAILED instead of the digest
    #[arg(long, value_name = "HEX")]
    expected: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init_logging(args.verbose);
    match run(args) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_UNREADABLE)
        }
    }
}

/// Dispatch a single command and return its exit code.
fn run(args: Args) -> Result<u8> {
    match args.command {
        Some(Command::Hash(hash)) => run_hash(hash),
        Some(Command::Verify(verify)) => run_verify(verify),
        None => run_verify(args.verify),
    }
}

fn run_hash(args: HashArgs) -> Result<u8> {
    if let Some(expected) = args.expected {
        let expected = ExpectedDigest::new(expected);
        return Ok(match check(&args.path, &expected, args.chunk_size) {
            Integrity::Verified { .. } => {
                println!("{}: OK", args.path.display());
                EXIT_READY
            }
            Integrity::Mismatch { .. } => {
                println!("{}: FAILED", args.path.display());
                EXIT_REJECTED
            }
            Integrity::Unreadable(err) => {
                eprintln!("error: {}", describe(&err));
                EXIT_UNREADABLE
            }
        });
    }
    let digest = sha256_file(&args.path, args.chunk_size)
        .with_context(|| format!("hash {}", args.path.display()))?;
    println!("{digest}  {}", args.path.display());
    Ok(EXIT_READY)
}

fn run_verify(args: VerifyArgs) -> Result<u8> {
    let cli = ConfigLayer {
        model_path: args.model,
        expected_digest_hex: args.expected,
        chunk_size_bytes: args.chunk_size,
        remove_on_mismatch: args.remove_on_mismatch.then_some(true),
    };
    let config = config::load(args.config.as_deref(), |key| env::var(key).ok(), cli)
        .context("load configuration")?;

    let mut loader = OnnxProbeLoader;
    let outcome = run_gate(&config, &mut loader);

    if args.json {
        write_json(io::stdout().lock(), &Report::new(&config, &outcome))?;
    } else {
        write_human(io::stdout().lock(), io::stderr().lock(), &config, &outcome)?;
    }
    Ok(outcome.exit_code())
}
