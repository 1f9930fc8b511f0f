//! Script loading lifecycle.
//!
//! Per file: artifact → (miss) read + compile → bind → store artifact.
//! Per batch: load every file, then subscribe the host to event types that
//! appeared for the first time, then report a summary.
//!
//! Nothing here fails a batch.  A file that cannot be read contributes zero
//! triggers and an error in the [`DiagnosticLog`]; the rest of the batch
//! continues.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::cache::{modified_millis, ScriptCache};
use crate::compiler::{plural, ScriptCompiler};
use crate::config::LoaderConfig;
use crate::diag::DiagnosticLog;
use crate::error::{CacheError, LoadError};
use crate::event::EventInfo;
use crate::item::CompiledUnit;
use crate::registry::{Registry, ScriptInfo};
use crate::services::Services;

// ── LoadSummary ───────────────────────────────────────────────────────────────

/// Outcome of a batch load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: ScriptInfo,
    /// Errors reported during this batch.
    pub errors: usize,
    pub elapsed: Duration,
}

impl LoadSummary {
    fn report(&self) {
        if self.errors == 0 {
            info!(target: "script::loader", "All scripts loaded without errors!");
        }
        if self.loaded.files == 0 {
            warn!(target: "script::loader", "No scripts were found, maybe you should write some ;)");
        } else {
            info!(
                target: "script::loader",
                "loaded {} with a total of {} and {} in {:.2?}",
                plural(self.loaded.files, "script"),
                plural(self.loaded.triggers, "trigger"),
                plural(self.loaded.commands, "command"),
                self.elapsed,
            );
        }
    }
}

// ── ScriptLoader ──────────────────────────────────────────────────────────────

struct Inner {
    config: LoaderConfig,
    services: Services,
    registry: Registry,
    cache: ScriptCache,
    log: DiagnosticLog,
    /// One lock per script path; held for a whole load or unload of it.
    file_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

/// Loads, unloads and reloads scripts.  Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ScriptLoader {
    inner: Arc<Inner>,
}

impl ScriptLoader {
    pub fn new(config: LoaderConfig, services: Services) -> Self {
        let cache = ScriptCache::new(config.cache_dir.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                services,
                registry: Registry::new(),
                cache,
                log: DiagnosticLog::new(),
                file_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.inner.log
    }

    pub fn cache(&self) -> &ScriptCache {
        &self.inner.cache
    }

    // ── Batches ───────────────────────────────────────────────────────────────

    /// Load every script under the configured directory, creating it first
    /// if it does not exist.
    pub fn load_directory(&self) -> LoadSummary {
        let dir = &self.inner.config.scripts_dir;
        if let Err(e) = fs::create_dir_all(dir) {
            self.inner.log.error(dir, format!("could not create scripts directory: {e}"));
        }
        let files = self.script_files();
        self.load_files(&files)
    }

    /// Script files under the configured directory, in path order.
    /// Disabled files and directories are skipped.
    pub fn script_files(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        self.scan(&self.inner.config.scripts_dir, &mut out);
        out.sort();
        out
    }

    fn scan(&self, dir: &Path, out: &mut Vec<PathBuf>) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                self.inner.log.error(dir, format!("could not list directory: {e}"));
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if self.inner.config.is_disabled(&path) {
                continue;
            }
            if path.is_dir() {
                self.scan(&path, out);
            } else if self.inner.config.is_script(&path) {
                out.push(path);
            }
        }
    }

    /// Load `paths` in order, then subscribe new event types.
    pub fn load_files(&self, paths: &[PathBuf]) -> LoadSummary {
        let start = Instant::now();
        let errors_before = self.inner.log.error_count();
        let mut loaded = ScriptInfo::default();
        for path in paths {
            match self.load_script(path) {
                Ok(info) => loaded.add(info),
                Err(e) => self.inner.log.error(path, e.to_string()),
            }
        }
        self.finish_batch(loaded, errors_before, start)
    }

    /// Like [`load_files`](Self::load_files), but compiles the files on
    /// tokio's blocking pool.  Each file gets its own compile context.
    /// A path listed more than once is loaded once.
    pub async fn load_files_concurrently(&self, paths: Vec<PathBuf>) -> LoadSummary {
        let start = Instant::now();
        let errors_before = self.inner.log.error_count();
        let mut seen = HashSet::new();
        let handles: Vec<_> = paths
            .into_iter()
            .filter(|path| seen.insert(path.clone()))
            .map(|path| {
                let loader = self.clone();
                let task_path = path.clone();
                (path, tokio::task::spawn_blocking(move || loader.load_script(&task_path)))
            })
            .collect();

        let mut loaded = ScriptInfo::default();
        for (path, handle) in handles {
            match handle.await {
                Ok(Ok(info)) => loaded.add(info),
                Ok(Err(e)) => self.inner.log.error(&path, e.to_string()),
                Err(e) => self
                    .inner
                    .log
                    .error(&path, format!("unexpected failure while loading: {e}")),
            }
        }
        self.finish_batch(loaded, errors_before, start)
    }

    fn finish_batch(&self, loaded: ScriptInfo, errors_before: usize, start: Instant) -> LoadSummary {
        self.inner
            .registry
            .register_host_events(self.inner.services.host.as_ref());
        let summary = LoadSummary {
            loaded,
            errors: self.inner.log.error_count().saturating_sub(errors_before),
            elapsed: start.elapsed(),
        };
        summary.report();
        summary
    }

    // ── Single files ──────────────────────────────────────────────────────────

    fn file_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self
            .inner
            .file_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(path.to_owned()).or_default().clone()
    }

    /// Load one script.  An already loaded copy is unloaded first.
    ///
    /// Loads and unloads of the same path never overlap.  New event types
    /// are not subscribed until the end of the batch; use
    /// [`reload`](Self::reload) for a standalone file.
    pub fn load_script(&self, path: &Path) -> Result<ScriptInfo, LoadError> {
        let lock = self.file_lock(path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.inner.registry.is_loaded(path) {
            self.unload_locked(path);
        }

        if self.inner.config.enable_caching {
            match self.load_cached(path) {
                Ok(Some(info)) => return Ok(info),
                Ok(None) => {}
                Err(e) => debug!(
                    target: "script::cache",
                    script = %path.display(),
                    "recompiling: {e}"
                ),
            }
        }

        // Taken before reading: an edit during compilation must not be
        // stamped onto the older content.
        let mtime = modified_millis(path).ok();
        let root = self
            .inner
            .services
            .reader
            .read(path)
            .map_err(|e| LoadError::io(path, e))?;
        let (unit, diags) = ScriptCompiler::new(&self.inner.services).compile_file(path, &root);
        let mut errors = diags.error_count();
        self.inner.log.extend(diags.into_entries());

        let (unit, infos) = self.bindings(path, unit, &mut errors);
        let info = self.inner.registry.install(path, &unit, &infos);

        if let Some(mtime) = mtime.filter(|_| self.inner.config.enable_caching && errors == 0) {
            // Failure is logged and leaves no artifact; the next load recompiles.
            let _ = self.inner.cache.store(path, mtime, &unit);
        }
        debug!(
            target: "script::loader",
            "loaded {} and {} from '{}'",
            plural(info.triggers, "trigger"),
            plural(info.commands, "command"),
            path.display(),
        );
        Ok(info)
    }

    /// Install `path`'s artifact if it is usable.  Every failure discards the
    /// artifact and undoes any command already registered from it.
    fn load_cached(&self, path: &Path) -> Result<Option<ScriptInfo>, CacheError> {
        let Some(unit) = self.inner.cache.load(path)? else {
            return Ok(None);
        };
        let services = &self.inner.services;
        let infos = match Registry::resolve(&unit, services.grammar.as_ref()) {
            Ok(infos) => infos,
            Err(e) => {
                self.inner.cache.discard(path);
                return Err(e);
            }
        };
        for command in &unit.commands {
            if let Err(reason) = services.commands.register_command(command) {
                services.commands.unregister_commands(path);
                self.inner.cache.discard(path);
                return Err(CacheError::Command {
                    name: command.name.clone(),
                    reason,
                });
            }
        }
        let info = self.inner.registry.install(path, &unit, &infos);
        debug!(
            target: "script::loader",
            "loaded {} and {} from '{}' (cached)",
            plural(info.triggers, "trigger"),
            plural(info.commands, "command"),
            path.display(),
        );
        Ok(Some(info))
    }

    /// Catalog entries for a freshly compiled unit.  A trigger whose kind the
    /// grammar cannot look up again is reported and dropped.
    fn bindings(
        &self,
        path: &Path,
        mut unit: CompiledUnit,
        errors: &mut usize,
    ) -> (CompiledUnit, Vec<Arc<EventInfo>>) {
        let grammar = self.inner.services.grammar.as_ref();
        let mut infos = Vec::with_capacity(unit.triggers.len());
        unit.triggers.retain(|t| match grammar.event_info(&t.event.kind) {
            Some(info) => {
                infos.push(info);
                true
            }
            None => {
                *errors += 1;
                self.inner.log.error(
                    path,
                    format!("trigger '{}' uses unknown event kind '{}'", t.name, t.event.kind),
                );
                false
            }
        });
        (unit, infos)
    }

    /// Remove everything `path` contributed.
    pub fn unload(&self, path: &Path) -> ScriptInfo {
        let lock = self.file_lock(path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.unload_locked(path)
    }

    fn unload_locked(&self, path: &Path) -> ScriptInfo {
        let removed = self
            .inner
            .registry
            .unload(path, self.inner.services.commands.as_ref());
        debug!(
            target: "script::loader",
            "unloaded {} and {} from '{}'",
            plural(removed.triggers, "trigger"),
            plural(removed.commands, "command"),
            path.display(),
        );
        removed
    }

    /// Unload and load `path` again, then subscribe new event types.
    pub fn reload(&self, path: &Path) -> Result<ScriptInfo, LoadError> {
        let info = self.load_script(path)?;
        self.inner
            .registry
            .register_host_events(self.inner.services.host.as_ref());
        Ok(info)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
