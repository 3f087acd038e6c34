//! xbundle: Command-line tool for building deployable certificate bundles.

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;
use xbundle_lib::{
    BundleOptions, BundleRequest, Bundler, CertSource, CertificatePool, Flavor, Purpose,
    TrustRegistry, TrustStore,
};

#[derive(Parser)]
#[command(
    name = "xbundle",
    about = "Build a deployable certificate bundle with the most widely trusted chain",
    long_about = "xbundle finds every verified chain from a leaf certificate to a\n\
                  self-signed root, ranks the chains by how many platforms trust\n\
                  the root, and prints the chosen bundle with diagnostics.\n\n\
                  Input format (PEM vs DER) is auto-detected. The certificate is\n\
                  read from stdin when no file is given or the file is `-`.",
    after_help = "FLAVORS:\n\
                  \n  ubiquitous  Chain trusted by the most platforms (default)\
                  \n  optimal     Shortest chain trusted by at least one platform\
                  \n  force       Shortest chain, trusted or not\
                  \n\nEXAMPLES:\n\
                  \n  xbundle cert.pem\
                  \n  xbundle --json --int-bundle int.pem cert.pem\
                  \n  xbundle --metadata trust/metadata.json --flavor optimal cert.pem\
                  \n  xbundle --key key.pem --hostname www.example.com cert.pem\
                  \n  xbundle --recurse certs/\
                  \n  cat cert.pem | xbundle -"
)]
struct Cli {
    /// Leaf certificate (PEM or DER, may carry its chain) or a directory of them.
    file: Option<PathBuf>,
    /// Leaf certificate; same as the positional argument.
    #[arg(long = "cert", value_name = "FILE", conflicts_with = "file")]
    cert: Option<PathBuf>,
    /// Private key (PKCS#8 or PKCS#1 PEM, or PKCS#8 DER) to pair with the leaf
    #[arg(long, value_name = "FILE")]
    key: Option<PathBuf>,
    /// Root certificates (default: system CA bundle)
    #[arg(long = "ca-bundle", value_name = "FILE")]
    ca_bundle: Option<PathBuf>,
    /// Intermediate certificates; may be repeated
    #[arg(long = "int-bundle", value_name = "FILE")]
    int_bundle: Vec<PathBuf>,
    /// Bundling flavor: ubiquitous, optimal, force
    #[arg(long, default_value = "ubiquitous")]
    flavor: Flavor,
    /// Trust metadata JSON listing platforms and their roots
    #[arg(long, value_name = "FILE")]
    metadata: Option<PathBuf>,
    /// Hostname the leaf must be valid for
    #[arg(long)]
    hostname: Option<String>,
    /// Options file (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Intended use of the leaf: server-auth, client-auth, any
    #[arg(long)]
    purpose: Option<Purpose>,
    /// Maximum chain length, counting the leaf
    #[arg(long)]
    max_depth: Option<usize>,
    /// Chains to enumerate before keeping only the shortest chain per root
    #[arg(long)]
    max_candidates: Option<usize>,
    /// Warn about certificates expiring within this window (e.g. 30d, 2w)
    #[arg(long, value_name = "DURATION")]
    expiry_window: Option<String>,
    /// Evaluate validity at this time (Unix seconds or RFC 3339)
    #[arg(long, value_name = "TIME")]
    at_time: Option<String>,
    /// Output in JSON format
    #[arg(long)]
    json: bool,
    /// Append the deployable PEM bundle to text output
    #[arg(long)]
    pem: bool,
    /// Recurse into subdirectories (directory mode)
    #[arg(short, long)]
    recurse: bool,
    /// Only print failures (directory mode)
    #[arg(long)]
    failures_only: bool,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
    /// Shorthand for --log-level debug
    #[arg(short, long)]
    verbose: bool,
}

/// Maximum file size for certificate and key inputs (10 MiB).
const MAX_INPUT_BYTES: u64 = 10 * 1024 * 1024;

/// Platform name used when the CA bundle is the only source of trust.
const SYSTEM_PLATFORM: &str = "system";

fn read_input(file: Option<&Path>) -> Result<Vec<u8>> {
    match file {
        Some(path) if path != Path::new("-") => {
            let meta = std::fs::metadata(path)
                .with_context(|| format!("Failed to stat file: {}", path.display()))?;
            if meta.len() > MAX_INPUT_BYTES {
                anyhow::bail!(
                    "File too large ({} bytes, max {} bytes): {}",
                    meta.len(),
                    MAX_INPUT_BYTES,
                    path.display()
                );
            }
            std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))
        }
        _ => {
            let mut buf = Vec::new();
            std::io::stdin()
                .take(MAX_INPUT_BYTES)
                .read_to_end(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn cert_source(input: Vec<u8>) -> CertSource {
    let start = input
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(input.len());
    if input.get(start..).is_some_and(|rest| rest.starts_with(b"-----BEGIN")) {
        CertSource::Pem(input)
    } else {
        CertSource::Der(input)
    }
}

/// Parse a duration string using humantime format.
///
/// Plain numbers (e.g. "3600") default to seconds. Otherwise, standard
/// humantime units are accepted: `s`, `m`, `h`, `d`, `w`, `months`, `y`, etc.
fn parse_duration(s: &str) -> Result<Duration> {
    if s.chars().all(|c| c.is_ascii_digit()) {
        let secs: u64 = s.parse().context("Invalid duration value")?;
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).with_context(|| format!("Invalid duration: '{s}'"))
}

/// Parse a point in time: Unix seconds, or an RFC 3339 timestamp.
fn parse_at_time(s: &str) -> Result<i64> {
    if let Ok(secs) = s.parse::<i64>() {
        return Ok(secs);
    }
    let t = humantime::parse_rfc3339_weak(s).with_context(|| format!("Invalid time: '{s}'"))?;
    let secs = t
        .duration_since(UNIX_EPOCH)
        .with_context(|| format!("Time before 1970: '{s}'"))?
        .as_secs();
    i64::try_from(secs).context("Time out of range")
}

/// Check if a path has a certificate file extension.
fn is_cert_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("pem") || ext.eq_ignore_ascii_case("der")
            || ext.eq_ignore_ascii_case("crt") || ext.eq_ignore_ascii_case("cer")
    )
}

/// Find all certificate files (.pem, .der, .crt, .cer) in a directory.
fn find_cert_files(dir: &Path, recurse: bool) -> Vec<PathBuf> {
    let walker = if recurse {
        walkdir::WalkDir::new(dir)
    } else {
        walkdir::WalkDir::new(dir).max_depth(1)
    };
    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_cert_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Merge the options file with command-line overrides.
fn load_options(cli: &Cli) -> Result<BundleOptions> {
    let mut options = match &cli.config {
        Some(path) => BundleOptions::from_toml_file(path)
            .with_context(|| format!("Failed to load options: {}", path.display()))?,
        None => BundleOptions::default(),
    };
    if let Some(purpose) = cli.purpose {
        options.purpose = purpose;
    }
    if let Some(depth) = cli.max_depth {
        options.max_depth = depth;
    }
    if let Some(limit) = cli.max_candidates {
        options.max_candidates = limit;
    }
    if let Some(window) = &cli.expiry_window {
        options.expiry_window_secs = parse_duration(window)?.as_secs();
    }
    if let Some(at) = &cli.at_time {
        options.at_time = Some(parse_at_time(at)?);
    }
    options.validate()?;
    Ok(options)
}

/// Build the bundler: trust registry, root pool and intermediate pool.
fn load_bundler(cli: &Cli, options: BundleOptions) -> Result<Bundler> {
    let ca_path = cli.ca_bundle.clone().or_else(xbundle_lib::find_system_ca_bundle);
    let ca_data = match &ca_path {
        Some(path) => Some(
            std::fs::read(path)
                .with_context(|| format!("Failed to read CA bundle: {}", path.display()))?,
        ),
        None => {
            tracing::warn!("no CA bundle found; only supplied certificates will be used");
            None
        }
    };

    let store = match &cli.metadata {
        Some(path) => TrustStore::from_metadata_file(path)
            .with_context(|| format!("Failed to load trust metadata: {}", path.display()))?,
        None => {
            let mut roots = CertificatePool::new();
            if let Some(data) = &ca_data {
                roots.add_bundle(data)?;
            }
            TrustStore::from_roots(SYSTEM_PLATFORM, roots.iter().map(|c| c.as_ref()))
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "CA bundle yields no trust; every chain is untrusted");
                    TrustStore::empty()
                })
        }
    };

    let mut bundler = Bundler::new(Arc::new(TrustRegistry::new(store)), options)?;
    if let Some(data) = &ca_data {
        let added = bundler.add_certificates(data)?;
        tracing::debug!(roots = added, "CA bundle loaded");
    }
    for path in &cli.int_bundle {
        let data = read_input(Some(path.as_path()))?;
        let added = bundler
            .add_certificates(&data)
            .with_context(|| format!("Failed to load intermediates: {}", path.display()))?;
        tracing::debug!(path = %path.display(), intermediates = added, "intermediate bundle loaded");
    }
    Ok(bundler)
}

fn request_for(cli: &Cli, input: Vec<u8>, key: Option<&[u8]>) -> BundleRequest {
    let mut request = BundleRequest::new(cert_source(input)).with_flavor(cli.flavor);
    if let Some(key) = key {
        request = request.with_key(key);
    }
    if let Some(host) = &cli.hostname {
        request = request.with_hostname(host.as_str());
    }
    request
}

/// A single result from batch processing.
struct BatchResult {
    path: String,
    pass: bool,
    detail: String,
}

/// Bundle every file in parallel, printing `filename: result`.
///
/// Returns the number of failures.
fn run_batch(cli: &Cli, bundler: &Bundler, files: &[PathBuf]) -> usize {
    let results: Vec<BatchResult> = files
        .par_iter()
        .map(|path| {
            let label = path.display().to_string();
            let outcome = read_input(Some(path.as_path())).and_then(|input| {
                Ok(bundler.bundle(&request_for(cli, input, None))?)
            });
            match outcome {
                Ok(bundle) => BatchResult {
                    path: label,
                    pass: true,
                    detail: format!(
                        "OK, {} certificate(s), {} platform(s), {} diagnostic(s)",
                        bundle.chain.len(),
                        bundle.ubiquity.count,
                        bundle.diagnostics.len()
                    ),
                },
                Err(e) => BatchResult {
                    path: label,
                    pass: false,
                    detail: match e.downcast_ref::<xbundle_lib::BundleError>() {
                        Some(be) => format!("FAIL ({}: {})", be.kind(), be),
                        None => format!("FAIL ({:#})", e),
                    },
                },
            }
        })
        .collect();

    let mut failures = 0;
    for r in &results {
        if !r.pass {
            failures += 1;
        }
        if cli.failures_only && r.pass {
            continue;
        }
        if r.pass {
            println!("{}: {}", r.path, r.detail);
        } else {
            eprintln!("{}: {}", r.path, r.detail);
        }
    }
    failures
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { cli.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let options = load_options(&cli)?;
    let bundler = load_bundler(&cli, options)?;
    let input_path = cli.cert.as_deref().or(cli.file.as_deref());

    if let Some(dir) = input_path.filter(|p| p.is_dir()) {
        if cli.key.is_some() {
            anyhow::bail!("--key cannot be combined with a directory of certificates");
        }
        let files = find_cert_files(dir, cli.recurse);
        if files.is_empty() {
            anyhow::bail!("No certificate files found in {}", dir.display());
        }
        let failures = run_batch(&cli, &bundler, &files);
        if failures > 0 {
            std::process::exit(2);
        }
        return Ok(());
    }

    let input = read_input(input_path)?;
    let key = match &cli.key {
        Some(path) => Some(read_input(Some(path.as_path()))?),
        None => None,
    };
    let request = request_for(&cli, input, key.as_deref());

    match bundler.bundle(&request) {
        Ok(bundle) => {
            if cli.json {
                println!("{}", xbundle_lib::to_json(&bundle)?);
            } else {
                print!("{}", xbundle_lib::display_text(&bundle, cli.pem));
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {}", e.kind(), e);
            std::process::exit(1);
        }
    }
}
