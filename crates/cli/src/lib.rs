#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `cli` implements the argument surface of the two binaries: `resync`
//! (the consumer) and `resync-build` (the producer). The run functions
//! accept the argument iterator and output writers so integration tests
//! drive them exactly as `main` does.

use std::error::Error;
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use client::{Client, Producer};
use fetch::{FetchConfig, Fetcher};
use mapper::Mapper;
use model::Capability;
use model::w3c::parse_w3c;
use sitemap::{Codec, ListReader, ListWriter};

/// Runs the `resync` consumer binary.
pub fn run_client<I, T>(args: I, stdout: &mut dyn Write, stderr: &mut dyn Write) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    ExitCode::from(client_main(args, stdout, stderr))
}

/// Runs the `resync-build` producer binary.
pub fn run_build<I, T>(args: I, stdout: &mut dyn Write, stderr: &mut dyn Write) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    ExitCode::from(build_main(args, stdout, stderr))
}

#[derive(Debug, Parser)]
#[command(
    name = "resync",
    version,
    about = "Synchronize a local tree with a ResourceSync source"
)]
struct ClientCli {
    /// Source document URI (a resource list, change list, or sitemapindex).
    source: String,
    /// Destination directory; derived from the source when omitted.
    destination: Option<String>,
    /// Compare only; report what would change without touching anything.
    #[arg(short = 'a', long, conflicts_with = "incremental")]
    audit: bool,
    /// Apply the source's change list instead of a full baseline.
    #[arg(short = 'i', long)]
    incremental: bool,
    /// Delete local files the source no longer lists.
    #[arg(long)]
    delete: bool,
    /// Only consider changes after this W3C-Datetime instant.
    #[arg(long, value_name = "DATETIME")]
    from: Option<String>,
    /// Verify content digests in addition to timestamps and lengths.
    #[arg(long)]
    checksum: bool,
    /// Report planned actions without performing them.
    #[arg(short = 'n', long)]
    dryrun: bool,
    /// Bearer token attached to every request.
    #[arg(long, value_name = "TOKEN")]
    token: Option<String>,
    /// Minimum seconds between successive requests.
    #[arg(long, value_name = "SECONDS")]
    delay: Option<f64>,
    /// Increase verbosity (-v info, -vv debug).
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Parser)]
#[command(
    name = "resync-build",
    version,
    about = "Publish a local tree as ResourceSync documents"
)]
struct BuildCli {
    /// Mapping specs: `source-uri=local-dir` pairs, or one source URI and
    /// one local directory.
    #[arg(required = true)]
    maps: Vec<String>,
    /// Output file for the resource list (or change list).
    #[arg(short = 'o', long, default_value = "resourcelist.xml")]
    outfile: PathBuf,
    /// Diff against this previously published resource list and write a
    /// change list instead.
    #[arg(long, value_name = "FILE")]
    changelist_from: Option<PathBuf>,
    /// Also write a capability list here.
    #[arg(long, value_name = "FILE")]
    capability_list: Option<PathBuf>,
    /// Also write a source description here.
    #[arg(long, value_name = "FILE")]
    source_description: Option<PathBuf>,
    /// Also package content as a resource dump here.
    #[arg(long, value_name = "FILE")]
    dump: Option<PathBuf>,
    /// Maximum entries per sitemap before splitting into an index.
    #[arg(long, value_name = "N", default_value_t = sitemap::DEFAULT_MAX_SITEMAP_ENTRIES)]
    max_sitemap_entries: usize,
    /// Record MD5 digests for every file.
    #[arg(long)]
    checksum: bool,
    /// Pretty-print the published documents.
    #[arg(long)]
    pretty: bool,
    /// Increase verbosity (-v info, -vv debug).
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
}

fn client_main<I, T>(args: I, stdout: &mut dyn Write, stderr: &mut dyn Write) -> u8
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match ClientCli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => return report_parse_error(&error, stdout, stderr),
    };
    init_logging(cli.verbose);
    match client_operation(&cli, stdout) {
        Ok(()) => 0,
        Err(error) => {
            report_error(error.as_ref(), stderr);
            1
        }
    }
}

fn client_operation(cli: &ClientCli, stdout: &mut dyn Write) -> Result<(), Box<dyn Error>> {
    let base = base_prefix(&cli.source);
    let mapper = match &cli.destination {
        Some(destination) => Mapper::new(&[base.to_string(), destination.clone()])?,
        None => Mapper::new(&[base.to_string()])?,
    };
    let fetcher = Fetcher::new(FetchConfig {
        bearer_token: cli.token.clone(),
        delay: cli
            .delay
            .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
            .map(Duration::from_secs_f64),
        ..FetchConfig::default()
    })?;
    let consumer = Client::new(&fetcher, &mapper)
        .checksum(cli.checksum)
        .delete(cli.delete)
        .dryrun(cli.dryrun);

    let report = if cli.audit {
        consumer.audit(&cli.source)?
    } else if cli.incremental {
        let from = cli.from.as_deref().map(parse_w3c).transpose()?;
        consumer.incremental(&cli.source, from)?
    } else {
        consumer.baseline(&cli.source)?
    };

    let mode = if report.audit_only {
        "audit"
    } else if cli.dryrun {
        "dryrun"
    } else if cli.incremental {
        "incremental"
    } else {
        "baseline"
    };
    let _ = writeln!(stdout, "{mode}: {report}");
    Ok(())
}

fn build_main<I, T>(args: I, stdout: &mut dyn Write, stderr: &mut dyn Write) -> u8
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match BuildCli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => return report_parse_error(&error, stdout, stderr),
    };
    init_logging(cli.verbose);
    match build_operation(&cli, stdout) {
        Ok(()) => 0,
        Err(error) => {
            report_error(error.as_ref(), stderr);
            1
        }
    }
}

fn build_operation(cli: &BuildCli, stdout: &mut dyn Write) -> Result<(), Box<dyn Error>> {
    let mapper = Mapper::new(&cli.maps)?;
    let max_entries = Some(cli.max_sitemap_entries);
    let producer = Producer::new(&mapper)
        .max_sitemap_entries(max_entries)
        .checksum(cli.checksum)
        .pretty(cli.pretty);

    let mut written = Vec::new();
    if let Some(previous_path) = &cli.changelist_from {
        // Read through the list engine so a previously published
        // sitemapindex reassembles transparently.
        let fetcher = Fetcher::new(FetchConfig::default())?;
        let reader = ListReader::new(&fetcher)
            .mapper(&mapper)
            .hint(Capability::ResourceList);
        let previous = reader.read(&previous_path.display().to_string(), false)?;
        let changes = producer.build_change_list(&previous)?;
        let writer = ListWriter::new()
            .codec(Codec::new().pretty(cli.pretty))
            .max_sitemap_entries(max_entries)
            .allow_multifile(true)
            .mapper(&mapper);
        written.extend(writer.write(&changes, &cli.outfile)?);
    } else {
        written.extend(producer.write_resource_list(&cli.outfile)?);
    }

    if let Some(capability_path) = &cli.capability_list {
        let list_capability = if cli.changelist_from.is_some() {
            Capability::ChangeList
        } else {
            Capability::ResourceList
        };
        let list_uri = mapper.dst_to_src(&cli.outfile.to_string_lossy())?;
        let described_by = cli
            .source_description
            .as_ref()
            .and_then(|path| mapper.dst_to_src(&path.to_string_lossy()).ok());
        producer.write_capability_list(
            &[(list_capability, list_uri)],
            capability_path,
            described_by.as_deref(),
        )?;
        written.push(capability_path.clone());
    }

    if let Some(description_path) = &cli.source_description {
        let capability_uris = match &cli.capability_list {
            Some(path) => vec![mapper.dst_to_src(&path.to_string_lossy())?],
            None => Vec::new(),
        };
        producer.write_source_description(&capability_uris, description_path)?;
        written.push(description_path.clone());
    }

    if let Some(dump_path) = &cli.dump {
        written.extend(producer.write_dump(dump_path)?);
    }

    for path in written {
        let _ = writeln!(stdout, "{}", path.display());
    }
    Ok(())
}

/// URI prefix the synchronized resources live under: the directory of a
/// document URI, or the trimmed URI itself.
fn base_prefix(source: &str) -> &str {
    let trimmed = source.trim_end_matches('/');
    if trimmed.ends_with(".xml")
        && let Some(index) = trimmed.rfind('/')
    {
        return &trimmed[..index];
    }
    trimmed
}

fn report_parse_error(error: &clap::Error, stdout: &mut dyn Write, stderr: &mut dyn Write) -> u8 {
    let rendered = error.render();
    if error.use_stderr() {
        let _ = write!(stderr, "{rendered}");
        2
    } else {
        // Help and version output are successful terminations.
        let _ = write!(stdout, "{rendered}");
        0
    }
}

fn report_error(error: &dyn Error, stderr: &mut dyn Write) {
    let _ = writeln!(stderr, "resync: {error}");
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn run_client_captured(args: &[&str]) -> (u8, String, String) {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = client_main(args.iter().copied(), &mut stdout, &mut stderr);
        (
            code,
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr).into_owned(),
        )
    }

    fn run_build_captured(args: &[&str]) -> (u8, String, String) {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = build_main(args.iter().copied(), &mut stdout, &mut stderr);
        (
            code,
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr).into_owned(),
        )
    }

    #[test]
    fn base_prefix_strips_document_names() {
        assert_eq!(
            base_prefix("http://example.com/rs/resourcelist.xml"),
            "http://example.com/rs"
        );
        assert_eq!(base_prefix("http://example.com/rs/"), "http://example.com/rs");
        assert_eq!(base_prefix("http://example.com"), "http://example.com");
    }

    #[test]
    fn missing_arguments_exit_with_usage_error() {
        let (code, _, stderr) = run_client_captured(&["resync"]);
        assert_eq!(code, 2);
        assert!(stderr.contains("Usage"));
    }

    #[test]
    fn help_exits_successfully_on_stdout() {
        let (code, stdout, _) = run_client_captured(&["resync", "--help"]);
        assert_eq!(code, 0);
        assert!(stdout.contains("Synchronize a local tree"));
    }

    #[test]
    fn conflicting_modes_are_rejected() {
        let (code, _, _) = run_client_captured(&["resync", "--audit", "--incremental", "src", "dst"]);
        assert_eq!(code, 2);
    }

    #[test]
    fn build_then_sync_round_trip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source_root = temp.path().join("site");
        fs::create_dir_all(&source_root).expect("mkdir");
        fs::write(source_root.join("a.txt"), b"alpha").expect("write");
        fs::write(source_root.join("b.txt"), b"beta").expect("write");
        let outfile = source_root.join("resourcelist.xml");

        // Publish: map the source tree under its own path so the list's
        // URIs resolve locally.
        let spec = format!("{}={}", source_root.display(), source_root.display());
        let (code, stdout, stderr) = run_build_captured(&[
            "resync-build",
            &spec,
            "-o",
            &outfile.display().to_string(),
            "--checksum",
        ]);
        assert_eq!(code, 0, "stderr: {stderr}");
        assert!(stdout.contains("resourcelist.xml"));

        // Consume into a fresh destination.
        let dest_root = temp.path().join("copy");
        fs::create_dir_all(&dest_root).expect("mkdir");
        let (code, stdout, stderr) = run_client_captured(&[
            "resync",
            &outfile.display().to_string(),
            &dest_root.display().to_string(),
        ]);
        assert_eq!(code, 0, "stderr: {stderr}");
        assert!(stdout.contains("baseline:"));
        assert_eq!(fs::read(dest_root.join("a.txt")).expect("synced"), b"alpha");
        assert_eq!(fs::read(dest_root.join("b.txt")).expect("synced"), b"beta");

        // Audit immediately afterwards reports everything in sync.
        let (code, stdout, _) = run_client_captured(&[
            "resync",
            "--audit",
            &outfile.display().to_string(),
            &dest_root.display().to_string(),
        ]);
        assert_eq!(code, 0);
        assert!(stdout.contains("audit: same=2"));
    }

    #[test]
    fn sync_failure_exits_with_one() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dest = temp.path().join("dst");
        fs::create_dir_all(&dest).expect("mkdir");
        let (code, _, stderr) = run_client_captured(&[
            "resync",
            "/definitely/missing/resourcelist.xml",
            &dest.display().to_string(),
        ]);
        assert_eq!(code, 1);
        assert!(stderr.contains("resync:"));
    }

    #[test]
    fn invalid_from_datetime_is_an_operation_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (code, _, stderr) = run_client_captured(&[
            "resync",
            "--incremental",
            "--from",
            "yesterday",
            "/missing/changelist.xml",
            &temp.path().display().to_string(),
        ]);
        assert_eq!(code, 1);
        assert!(stderr.contains("invalid W3C-Datetime"));
    }
}
