// Copyright 2018-2026 the esm.sh authors. MIT license.

//! Command-line front end for the Build Engine. Parses one build
//! request off the command line, wires the engine's collaborators —
//! real filesystem-backed stores, a real external materialiser and
//! oracle child process, and the CLI's own [`flat_bundler::FlatFileBundler`]
//! standing in for the out-of-scope bundler library — and runs a single
//! [`esm_orchestrator::Engine::build`] to completion.

mod flat_bundler;
mod logger;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use anyhow::Context;
use clap::Parser;
use esm_fingerprint::BuildRequest;
use esm_fingerprint::BuildTarget;
use esm_fingerprint::PackageCoordinate;
use esm_fingerprint::PinnedDependency;
use esm_materializer::PackageMaterializer;
use esm_oracle::OracleProcess;
use esm_orchestrator::Engine;
use esm_orchestrator::EngineConfig;
use esm_orchestrator::FsDtsCopier;
use esm_orchestrator::StaticRegistryClient;
use esm_store::FsArtifactStore;
use esm_store::FsMetadataStore;
use indexmap::IndexMap;

/// Build a single esm.sh-style ES module artifact from a registry package.
#[derive(Debug, Parser)]
#[command(name = "esm-build", version)]
struct Cli {
  /// Package coordinate: `name[@version][/submodule]`, e.g.
  /// `react@17.0.2` or `lodash@4.17.21/unescape`.
  pkg: String,

  /// Bundler output target.
  #[arg(long, default_value = "es2020")]
  target: String,

  /// Select the development `NODE_ENV` value and disable minification.
  #[arg(long)]
  dev: bool,

  /// Inline non-peer dependencies instead of externalising them.
  #[arg(long)]
  bundle: bool,

  /// Monotonic engine output-shape version.
  #[arg(long, default_value_t = 1)]
  build_version: u32,

  /// Alias a specifier to a replacement, `from:to`. Repeatable.
  #[arg(long = "alias", value_name = "FROM:TO")]
  aliases: Vec<String>,

  /// Pin a transitive dependency's resolved version, `name@version`.
  /// Repeatable.
  #[arg(long = "dep", value_name = "NAME@VERSION")]
  deps: Vec<String>,

  /// External command used to populate `node_modules` (the Package
  /// Materialiser). Must support `add <name@version>...`.
  #[arg(long, default_value = "npm")]
  materializer: String,

  /// External command hosting the CJS Export Oracle's child process.
  #[arg(long, default_value = "esm-cjs-oracle")]
  oracle_command: String,

  /// Per-call timeout, in milliseconds, for the CJS Export Oracle.
  #[arg(long, default_value_t = 10_000)]
  oracle_timeout_ms: u64,

  /// Directory scratch working directories are created under.
  #[arg(long)]
  scratch_root: Option<PathBuf>,

  /// Directory the Artifact Store writes blobs to.
  #[arg(long, default_value = "./esm-build-out/artifacts")]
  artifact_root: PathBuf,

  /// Directory the Metadata Store writes records to.
  #[arg(long, default_value = "./esm-build-out/metadata")]
  metadata_root: PathBuf,

  /// Enable debug logging.
  #[arg(short, long)]
  verbose: bool,
}

/// Parses `name[@version][/submodule]`, including a scoped name's extra
/// `@scope/` segment (e.g. `@babel/core@7.18.0/lib/index.js`).
fn parse_pkg(spec: &str) -> anyhow::Result<PackageCoordinate> {
  let scope_end = if spec.starts_with('@') {
    spec.find('/').map(|i| i + 1).unwrap_or(spec.len())
  } else {
    0
  };
  let rest = &spec[scope_end..];
  let at_rel = rest
    .find('@')
    .with_context(|| format!("package coordinate {spec:?} is missing an @version"))?;
  let name = &spec[..scope_end + at_rel];

  let after_at = &rest[at_rel + 1..];
  let (version, submodule) = match after_at.find('/') {
    Some(slash) => (&after_at[..slash], Some(&after_at[slash + 1..])),
    None => (after_at, None),
  };
  if version.is_empty() {
    bail!("package coordinate {spec:?} has an empty version");
  }

  let mut coord = PackageCoordinate::new(name.to_string(), version.to_string());
  if let Some(sub) = submodule {
    coord = coord.with_submodule(sub.to_string());
  }
  Ok(coord)
}

fn parse_alias(raw: &str) -> anyhow::Result<(String, String)> {
  let (from, to) = raw
    .split_once(':')
    .with_context(|| format!("alias {raw:?} must be FROM:TO"))?;
  Ok((from.to_string(), to.to_string()))
}

fn parse_pinned_dep(raw: &str) -> anyhow::Result<PinnedDependency> {
  let at_idx = raw.rfind('@').with_context(|| format!("dep {raw:?} must be NAME@VERSION"))?;
  Ok(PinnedDependency {
    name: raw[..at_idx].to_string(),
    version: raw[at_idx + 1..].to_string(),
  })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();
  logger::install(cli.verbose);

  let pkg = parse_pkg(&cli.pkg)?;
  let target: BuildTarget = cli
    .target
    .parse()
    .map_err(|e| anyhow::anyhow!("{e}"))?;

  let mut req = BuildRequest::new(pkg, cli.build_version, target);
  req.dev_mode = cli.dev;
  req.bundle_mode = cli.bundle;
  let mut alias = IndexMap::new();
  for raw in &cli.aliases {
    let (from, to) = parse_alias(raw)?;
    alias.insert(from, to);
  }
  req.alias = alias;
  for raw in &cli.deps {
    req.deps.push(parse_pinned_dep(raw)?);
  }

  let scratch_root = cli
    .scratch_root
    .unwrap_or_else(|| std::env::temp_dir().join("esm-build"));
  std::fs::create_dir_all(&scratch_root).context("creating scratch root")?;
  std::fs::create_dir_all(&cli.artifact_root).context("creating artifact root")?;
  std::fs::create_dir_all(&cli.metadata_root).context("creating metadata root")?;

  let oracle_wd = scratch_root.join("oracle");
  std::fs::create_dir_all(&oracle_wd).context("creating oracle working directory")?;
  let oracle = OracleProcess::spawn(&cli.oracle_command, &[], &oracle_wd)
    .await
    .context("spawning CJS export oracle")?;

  let config = EngineConfig {
    scratch_root,
    oracle_timeout: Duration::from_millis(cli.oracle_timeout_ms),
    ..Default::default()
  };

  let engine = Engine::new(
    Arc::new(FsMetadataStore::new(cli.metadata_root)),
    Arc::new(FsArtifactStore::new(cli.artifact_root)),
    PackageMaterializer::new(cli.materializer),
    Arc::new(oracle),
    Arc::new(flat_bundler::FlatFileBundler),
    Arc::new(StaticRegistryClient::new()),
    Arc::new(FsDtsCopier),
    config,
  );

  let meta = engine.build(req.clone()).await.context("build failed")?;
  println!("{}", req.fingerprint());
  println!("{}", serde_json::to_string_pretty(&meta)?);
  Ok(())
}
