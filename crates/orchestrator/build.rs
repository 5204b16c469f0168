// Copyright 2018-2026 the esm.sh authors. MIT license.

//! The recursive build routine itself (spec §4.1): fingerprint lookup,
//! scratch directory lifecycle, entry resolution, the bundler retry
//! loop, external resolution (spec §4.5a), and final persistence.
//! Expressed as an explicit `tracing` set threaded by reference through
//! every recursive call, per spec §9's "recursive build with cycle
//! detection ... passed by reference into sub-invocations rather than
//! kept in implicit task-local storage".

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use esm_bundle::classify_bundle_error;
use esm_bundle::synthetic_default_entry;
use esm_bundle::BundleError;
use esm_bundle::BundleOptions;
use esm_bundle::ExternalizingResolver;
use esm_bundle::Platform;
use esm_bundle::RetryDecision;
use esm_fingerprint::BuildRequest;
use esm_fingerprint::BuildTarget;
use esm_fingerprint::PackageCoordinate;
use esm_package_json::PackageJson;
use esm_resolver::DeclarationResolution;
use esm_resolver::ResolvedEntry;
use esm_rewriter::collect_sentinel_names;
use esm_rewriter::rewrite_output;
use esm_rewriter::ExternalInfo;
use esm_rewriter::RewriteContext;
use esm_store::artifact_key;
use esm_store::EsmMetadata;
use futures::future::BoxFuture;
use indexmap::IndexMap;

use crate::builtins;
use crate::BuildError;
use crate::Engine;
use crate::ScratchDir;

/// What [`build_recursive`] produces for one fingerprint, before its
/// caller decides whether (and where) to persist it.
pub(crate) struct BuildOutcome {
  pub metadata: EsmMetadata,
  pub js: Vec<u8>,
  pub css: Option<Vec<u8>>,
}

/// Spec §4.1: the public `Build(req) -> (meta, err)` operation.
pub(crate) async fn build_top_level(
  engine: &Arc<Engine>,
  req: BuildRequest,
) -> Result<EsmMetadata, BuildError> {
  let fp = req.fingerprint();

  if let Some(meta) = check_cache(engine, &fp).await? {
    return Ok(meta);
  }

  let scratch = ScratchDir::create(&engine.config.scratch_root, &fp)?;
  engine
    .materializer
    .materialize_one(scratch.path(), format!("{}@{}", req.pkg.name, req.pkg.version))
    .await?;

  let mut tracing = HashSet::new();
  tracing.insert(fp.clone());

  let outcome = build_recursive(engine, &req, &scratch, &mut tracing).await?;

  engine.artifacts.write(&artifact_key(&fp), &outcome.js).await?;
  if let Some(css) = &outcome.css {
    engine
      .artifacts
      .write(&artifact_key(&req.css_fingerprint()), css)
      .await?;
  }
  engine.metadata.put(&fp, "esm", &outcome.metadata).await?;

  Ok(outcome.metadata)
}

/// Invariant I2: an artifact exists in the metadata store iff its blob
/// exists in the artifact store; an orphan on either side is treated as
/// absent and the orphaned half is removed.
async fn check_cache(engine: &Engine, fp: &str) -> Result<Option<EsmMetadata>, BuildError> {
  let key = artifact_key(fp);
  let meta = engine.metadata.get(fp).await?;
  let blob_exists = engine.artifacts.exists(&key).await?;
  match (meta, blob_exists) {
    (Some(m), true) => Ok(Some(m)),
    (Some(_), false) => {
      engine.metadata.delete(fp).await?;
      Ok(None)
    }
    (None, true) => {
      engine.artifacts.delete(&key).await?;
      Ok(None)
    }
    (None, false) => Ok(None),
  }
}

/// The recursive step (spec §4.1 step 4 onward, §4.2-§4.6). Boxed to
/// permit recursion across an `async fn`.
pub(crate) fn build_recursive<'a>(
  engine: &'a Arc<Engine>,
  req: &'a BuildRequest,
  scratch: &'a ScratchDir,
  tracing: &'a mut HashSet<String>,
) -> BoxFuture<'a, Result<BuildOutcome, BuildError>> {
  Box::pin(async move {
    if req.target.is_types() {
      return build_types(engine, req, scratch).await;
    }

    let package_root = scratch.node_modules().join(&req.pkg.name);
    let manifest = PackageJson::from_path(&package_root.join("package.json"))
      .map_err(esm_resolver::ResolveError::from)?;

    let submodule = req.pkg.submodule.as_deref();
    let mut resolved = engine.resolver.resolve_entry(&package_root, &manifest, submodule)?;
    engine.resolver.verify_esm_entry(&package_root, &mut resolved);
    if resolved.module.is_none() {
      engine
        .resolver
        .resolve_cjs_exports(
          engine.oracle.as_ref(),
          &package_root,
          &mut resolved,
          req.node_env(),
          engine.config.oracle_timeout,
        )
        .await
        .map_err(resolve_error_to_build_error)?;
    }

    let entry_specifier = resolved
      .module
      .clone()
      .or_else(|| resolved.main.clone())
      .unwrap_or_else(|| "index.js".to_string());

    let peer_deps: HashSet<String> = manifest.peer_dependencies.keys().cloned().collect();
    let platform = if matches!(req.target, BuildTarget::Node) {
      Platform::Node
    } else {
      Platform::Browser
    };

    let mut options = BundleOptions::new(
      package_root.join(&entry_specifier).display().to_string(),
      platform,
      req.node_env(),
      req.dev_mode,
    );

    let mut extra_external: HashSet<String> = HashSet::new();
    let mut retried_signatures: HashSet<String> = HashSet::new();
    let mut stdin_entry: Option<String> = None;
    let mut iterations = 0usize;

    let bundle_result = loop {
      iterations += 1;
      if iterations > engine.config.max_bundle_retries {
        return Err(BuildError::Bundle(BundleError::Diagnostic(format!(
          "exceeded {} bundle retry iterations",
          engine.config.max_bundle_retries
        ))));
      }

      if let Some(src) = &stdin_entry {
        // A real bundler library distinguishes a stdin source from an
        // entryPoints path; this engine's `JsBundler` seam doesn't need
        // to, so the synthetic recovery source replaces the entry
        // point's content wholesale.
        options.entry_point = format!("data:text/javascript,{src}");
      }

      let mut plugin = ExternalizingResolver::new(
        &req.pkg.name,
        &entry_specifier,
        &manifest,
        &req.alias,
        &package_root,
        req.bundle_mode,
        &peer_deps,
        &mut extra_external,
      );

      match engine.bundler.bundle(&options, &mut plugin) {
        Ok(result) => break result,
        Err(err) => {
          let decision = classify_bundle_error(&err, &req.pkg.name);
          if decision == RetryDecision::Done {
            return Err(BuildError::Bundle(err));
          }
          // At most one retry per distinct error signature (spec §4.1),
          // to guarantee termination if the classifier keeps recommending
          // the same recovery for an error that never actually clears.
          if !retried_signatures.insert(format!("{decision:?}")) {
            return Err(BuildError::Bundle(err));
          }
          match decision {
            RetryDecision::RetryWithExtraExternal(specifier) => {
              plugin.mark_extra_external(&specifier);
            }
            RetryDecision::RetryWithStdinEntry(pkg) => {
              stdin_entry = Some(synthetic_default_entry(&pkg));
            }
            RetryDecision::Done => unreachable!("handled above"),
          }
        }
      }
    };

    let mut js_text: Option<String> = None;
    let mut css_bytes: Option<Vec<u8>> = None;
    for (name, bytes) in &bundle_result.files {
      if name.ends_with(".css") {
        css_bytes = Some(bytes.clone());
      } else if js_text.is_none() || name.ends_with(".js") {
        js_text = Some(String::from_utf8_lossy(bytes).into_owned());
      }
    }
    let js_text = js_text.ok_or_else(|| {
      BuildError::Bundle(BundleError::Diagnostic(
        "bundler produced no JS output".to_string(),
      ))
    })?;

    let sentinel_names = collect_sentinel_names(&js_text);
    let mut externals: IndexMap<String, ExternalInfo> = IndexMap::new();
    for name in &sentinel_names {
      let info = resolve_external(engine, name, req, &manifest, scratch, tracing).await?;
      externals.insert(name.clone(), info);
    }

    let ctx = RewriteContext {
      build_version: req.build_version,
      target: req.target.as_str(),
      node_env: req.node_env(),
      pkg_name: &req.pkg.name,
      externals: &externals,
    };
    let rewritten = rewrite_output(&js_text, &ctx)?;

    let dts = maybe_build_dts(engine, req, &package_root, &resolved).await?;

    let metadata = EsmMetadata {
      name: req.pkg.name.clone(),
      version: req.pkg.version.clone(),
      module: resolved.module.clone().unwrap_or_default(),
      main: resolved.main.clone().unwrap_or_default(),
      types: resolved.types.clone().unwrap_or_default(),
      typings: resolved.typings.clone().unwrap_or_default(),
      exports: resolved.exports.clone(),
      export_default: resolved.export_default,
      dts,
      package_css: css_bytes.is_some(),
    };

    Ok(BuildOutcome {
      metadata,
      js: rewritten.code.into_bytes(),
      css: css_bytes,
    })
  })
}

/// `target=types`: no bundler invocation at all, just a declaration file
/// located and stored verbatim (spec §4.2 rule 1, §4.1's types branch
/// implied by the fingerprint dropping `.js`).
async fn build_types(
  engine: &Arc<Engine>,
  req: &BuildRequest,
  scratch: &ScratchDir,
) -> Result<BuildOutcome, BuildError> {
  let package_root = scratch.node_modules().join(&req.pkg.name);
  let submodule = req.pkg.submodule.as_deref().unwrap_or("index.d.ts");

  let resolution = engine
    .resolver
    .resolve_declaration(&package_root, submodule, &req.pkg.name);

  let (root, path) = match resolution {
    DeclarationResolution::Found(path) => (package_root.clone(), path),
    DeclarationResolution::NeedsTypesPackage(types_pkg) => {
      engine
        .materializer
        .materialize_one(scratch.path(), format!("{types_pkg}@latest"))
        .await?;
      let types_root = scratch.node_modules().join(&types_pkg);
      match engine
        .resolver
        .resolve_declaration(&types_root, submodule, &types_pkg)
      {
        DeclarationResolution::Found(path) => (types_root, path),
        _ => {
          return Err(BuildError::NotFound {
            specifier: format!("{}.d.ts", req.pkg.name),
            importer: req.pkg.name.clone(),
          })
        }
      }
    }
    DeclarationResolution::NotFound => {
      return Err(BuildError::NotFound {
        specifier: format!("{}.d.ts", req.pkg.name),
        importer: req.pkg.name.clone(),
      })
    }
  };

  let bytes = engine
    .dts
    .read(&root, &path)
    .await
    .map_err(|e| BuildError::Bundle(BundleError::Diagnostic(e.to_string())))?;

  Ok(BuildOutcome {
    metadata: EsmMetadata {
      name: req.pkg.name.clone(),
      version: req.pkg.version.clone(),
      dts: req.fingerprint(),
      ..Default::default()
    },
    js: bytes,
    css: None,
  })
}

/// If entry resolution located a `.d.ts`, build and store its
/// `target=types` sidecar, returning the fingerprint for the metadata
/// record's `dts` field (spec §4.1 glue between the Entry Resolver and
/// the type-declaration copier).
async fn maybe_build_dts(
  engine: &Arc<Engine>,
  req: &BuildRequest,
  package_root: &Path,
  resolved: &ResolvedEntry,
) -> Result<String, BuildError> {
  let Some(types_path) = resolved.types.clone().or_else(|| resolved.typings.clone()) else {
    return Ok(String::new());
  };

  let mut dts_req = req.clone();
  dts_req.target = BuildTarget::Types;
  let dts_fp = dts_req.fingerprint();

  let bytes = engine
    .dts
    .read(package_root, &types_path)
    .await
    .map_err(|e| BuildError::Bundle(BundleError::Diagnostic(e.to_string())))?;

  engine.artifacts.write(&artifact_key(&dts_fp), &bytes).await?;
  engine
    .metadata
    .put(
      &dts_fp,
      "esm",
      &EsmMetadata {
        name: req.pkg.name.clone(),
        version: req.pkg.version.clone(),
        dts: dts_fp.clone(),
        ..Default::default()
      },
    )
    .await?;

  Ok(dts_fp)
}

/// Spec §4.5a: the sentinel URL-selection precedence, evaluated once per
/// distinct external name referenced by one emitted file.
async fn resolve_external(
  engine: &Arc<Engine>,
  name: &str,
  req: &BuildRequest,
  manifest: &PackageJson,
  scratch: &ScratchDir,
  tracing: &mut HashSet<String>,
) -> Result<ExternalInfo, BuildError> {
  // 1. absolute URL.
  if name.starts_with("http://") || name.starts_with("https://") {
    return Ok(ExternalInfo {
      url: name.to_string(),
      is_esm: true,
      has_default: true,
      named_exports: Vec::new(),
    });
  }

  // 2. a sibling submodule of the package currently being built.
  let self_prefix = format!("{}/", req.pkg.name);
  if let Some(export_path) = name.strip_prefix(self_prefix.as_str()) {
    return build_sibling_inline(engine, req, export_path, scratch, tracing).await;
  }

  // 3. the `buffer` built-in.
  if name == "buffer" {
    return Ok(if matches!(req.target, BuildTarget::Node) {
      ExternalInfo {
        url: "buffer".to_string(),
        is_esm: true,
        has_default: true,
        named_exports: vec!["Buffer".to_string()],
      }
    } else {
      ExternalInfo {
        url: format!("/v{}/node_buffer.js", req.build_version),
        is_esm: true,
        has_default: false,
        named_exports: vec!["Buffer".to_string()],
      }
    });
  }

  // 4. another recognised Node built-in.
  if builtins::is_node_builtin(name) {
    if matches!(req.target, BuildTarget::Node) {
      return Ok(ExternalInfo {
        url: name.to_string(),
        is_esm: true,
        has_default: true,
        named_exports: Vec::new(),
      });
    }
    if matches!(req.target, BuildTarget::Deno) {
      if let Some(url) = builtins::deno_std_url(name) {
        return Ok(ExternalInfo {
          url,
          is_esm: true,
          has_default: true,
          named_exports: Vec::new(),
        });
      }
    }
    if let Some((pkg, version)) = builtins::polyfill_package(name) {
      return cross_package_external(engine, pkg, version, req).await;
    }
    if let Some(asset) = builtins::embedded_polyfill_asset(name) {
      return Ok(ExternalInfo {
        url: format!("/{asset}"),
        is_esm: true,
        has_default: true,
        named_exports: Vec::new(),
      });
    }
    return Ok(ExternalInfo {
      url: builtins::unsupported_builtin_error_url(name, &req.pkg.name),
      is_esm: true,
      has_default: true,
      named_exports: Vec::new(),
    });
  }

  // 5. a pinned transitive-dependency override.
  if let Some(pinned) = req.deps.iter().find(|d| d.name == name) {
    return cross_package_external(engine, name, &pinned.version, req).await;
  }

  // 6. already materialised in the local node_modules tree.
  let local_manifest_path = scratch.node_modules().join(name).join("package.json");
  if local_manifest_path.is_file() {
    let local =
      PackageJson::from_path(&local_manifest_path).map_err(esm_resolver::ResolveError::from)?;
    let version = if local.version.is_empty() {
      "latest".to_string()
    } else {
      local.version.clone()
    };
    return cross_package_external(engine, name, &version, req).await;
  }

  // 7. registry fallback, version-hinted from the importer's own
  // dependencies/peerDependencies, defaulting to "latest".
  let hint = manifest
    .dependencies
    .get(name)
    .or_else(|| manifest.peer_dependencies.get(name))
    .cloned()
    .unwrap_or_else(|| "latest".to_string());

  match engine.registry.resolve(name, &hint).await {
    Ok((version, _manifest)) => cross_package_external(engine, name, &version, req).await,
    // 8. nothing produced a path.
    Err(_) => Err(BuildError::NotFound {
      specifier: name.to_string(),
      importer: req.pkg.name.clone(),
    }),
  }
}

/// Same-package, different-submodule external: built inline, reusing
/// the current scratch directory (spec §4.1 "Subtask scheduling").
async fn build_sibling_inline(
  engine: &Arc<Engine>,
  req: &BuildRequest,
  export_path: &str,
  scratch: &ScratchDir,
  tracing: &mut HashSet<String>,
) -> Result<ExternalInfo, BuildError> {
  let mut sub_req = req.clone();
  sub_req.pkg.submodule = Some(export_path.trim_start_matches("./").to_string());
  let fp = sub_req.fingerprint();

  if tracing.contains(&fp) {
    // Re-entry within one top-level build is a silent no-op (spec
    // §4.1): the ancestor frame already tracing this fingerprint owns
    // its persistence. We still owe the Rewriter a shape to reconcile
    // call sites against; absent better information, assume a default
    // export.
    return Ok(ExternalInfo {
      url: format!("/{fp}"),
      is_esm: true,
      has_default: true,
      named_exports: Vec::new(),
    });
  }
  tracing.insert(fp.clone());

  let outcome = build_recursive(engine, &sub_req, scratch, tracing).await?;
  engine.artifacts.write(&artifact_key(&fp), &outcome.js).await?;
  if let Some(css) = &outcome.css {
    engine
      .artifacts
      .write(&artifact_key(&sub_req.css_fingerprint()), css)
      .await?;
  }
  engine.metadata.put(&fp, "esm", &outcome.metadata).await?;

  Ok(metadata_to_external_info(&outcome.metadata, fp))
}

/// A different package: enqueued onto the background subtask queue
/// without waiting (spec §4.1, §5). The Rewriter still needs an export
/// shape to reconcile call sites with, so a lightweight probe runs
/// synchronously first; the full (bundle + rewrite + persist) build
/// then runs in the background. This duplicates the probe's
/// materialise/resolve work when the background build later redoes it —
/// see DESIGN.md.
async fn cross_package_external(
  engine: &Arc<Engine>,
  name: &str,
  version: &str,
  req: &BuildRequest,
) -> Result<ExternalInfo, BuildError> {
  let sub_req = BuildRequest::new(PackageCoordinate::new(name, version), req.build_version, req.target);
  let fp = sub_req.fingerprint();

  if let Some(meta) = check_cache(engine, &fp).await? {
    return Ok(metadata_to_external_info(&meta, fp));
  }

  let shape = probe_entry_shape(engine, &sub_req).await?;
  engine.queue.enqueue(sub_req);

  let is_esm = shape.module.is_some();
  Ok(ExternalInfo {
    url: format!("/{fp}"),
    is_esm,
    has_default: if is_esm { true } else { shape.export_default },
    named_exports: shape.exports,
  })
}

/// A short-lived, throwaway materialise-and-resolve used only to learn
/// a cross-package external's export shape before queueing its real
/// build (see [`cross_package_external`]).
async fn probe_entry_shape(engine: &Arc<Engine>, sub_req: &BuildRequest) -> Result<ResolvedEntry, BuildError> {
  let probe = ScratchDir::create(&engine.config.scratch_root, &format!("{}.probe", sub_req.fingerprint()))?;
  engine
    .materializer
    .materialize_one(probe.path(), format!("{}@{}", sub_req.pkg.name, sub_req.pkg.version))
    .await?;
  let package_root = probe.node_modules().join(&sub_req.pkg.name);
  let manifest = PackageJson::from_path(&package_root.join("package.json"))
    .map_err(esm_resolver::ResolveError::from)?;
  let mut resolved =
    engine
      .resolver
      .resolve_entry(&package_root, &manifest, sub_req.pkg.submodule.as_deref())?;
  engine.resolver.verify_esm_entry(&package_root, &mut resolved);
  if resolved.module.is_none() {
    engine
      .resolver
      .resolve_cjs_exports(
        engine.oracle.as_ref(),
        &package_root,
        &mut resolved,
        sub_req.node_env(),
        engine.config.oracle_timeout,
      )
      .await
      .map_err(resolve_error_to_build_error)?;
  }
  Ok(resolved)
}

/// Keeps the CJS Export Oracle's failures in spec §7's own `Oracle` kind
/// rather than folding them into the generic `Resolve` kind every other
/// [`esm_resolver::ResolveError`] maps to via `#[from]`.
fn resolve_error_to_build_error(err: esm_resolver::ResolveError) -> BuildError {
  match err {
    esm_resolver::ResolveError::Oracle(module, source) => BuildError::Oracle { module, source },
    other => BuildError::Resolve(other),
  }
}

fn metadata_to_external_info(meta: &EsmMetadata, fp: String) -> ExternalInfo {
  let is_esm = !meta.module.is_empty();
  ExternalInfo {
    url: format!("/{fp}"),
    is_esm,
    has_default: if is_esm { true } else { meta.export_default },
    named_exports: meta.exports.clone(),
  }
}
