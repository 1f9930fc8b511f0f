//! Event binder and script registry.
//!
//! One lock covers everything shared between files: the load counters, the
//! dispatch table (runtime event type → triggers in bind order), the list of
//! triggers handed to self-registering events, and the set of event types
//! already subscribed with the host.
//!
//! Invariants maintained by [`Registry::install`] and [`Registry::unload`]:
//! * the counters equal the sum of the per-file records;
//! * a dispatch list is never empty (the key is removed with its last trigger);
//! * `subscribed` only grows, because the host cannot revoke a subscription.
//!
//! Collaborator hooks (`SelfRegistering`, `EventHost::subscribe`, command
//! unregistration) are always called with the lock released.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::CacheError;
use crate::event::{EventInfo, EventType, SelfRegistering};
use crate::item::{CompiledUnit, Trigger};
use crate::services::{CommandCompiler, EventHost, Grammar};

// ── ScriptInfo ────────────────────────────────────────────────────────────────

/// File, trigger and command counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptInfo {
    pub files: usize,
    pub triggers: usize,
    pub commands: usize,
}

impl ScriptInfo {
    pub fn new(files: usize, triggers: usize, commands: usize) -> Self {
        Self {
            files,
            triggers,
            commands,
        }
    }

    /// Counts for one loaded file.
    pub fn of(unit: &CompiledUnit) -> Self {
        Self::new(1, unit.triggers.len(), unit.commands.len())
    }

    pub fn add(&mut self, other: ScriptInfo) {
        self.files += other.files;
        self.triggers += other.triggers;
        self.commands += other.commands;
    }

    /// Subtract `other`, clamping at zero.  Returns `false` if any count
    /// would have gone negative.
    pub fn subtract(&mut self, other: ScriptInfo) -> bool {
        let mut ok = true;
        for (mine, theirs) in [
            (&mut self.files, other.files),
            (&mut self.triggers, other.triggers),
            (&mut self.commands, other.commands),
        ] {
            match mine.checked_sub(theirs) {
                Some(n) => *mine = n,
                None => {
                    ok = false;
                    *mine = 0;
                }
            }
        }
        ok
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

struct SelfRegistered {
    trigger: Arc<Trigger>,
    hooks: Arc<dyn SelfRegistering>,
}

#[derive(Default)]
struct Inner {
    loaded: ScriptInfo,
    per_file: HashMap<PathBuf, ScriptInfo>,
    dispatch: HashMap<EventType, Vec<Arc<Trigger>>>,
    self_registered: Vec<SelfRegistered>,
    subscribed: HashSet<EventType>,
}

#[derive(Default)]
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up the catalog entry for every trigger of `unit`, in order.
    ///
    /// An unknown kind means the unit does not match the running grammar
    /// (a stale or corrupt cache artifact).
    pub fn resolve(
        unit: &CompiledUnit,
        grammar: &dyn Grammar,
    ) -> Result<Vec<Arc<EventInfo>>, CacheError> {
        unit.triggers
            .iter()
            .map(|t| {
                grammar
                    .event_info(&t.event.kind)
                    .ok_or_else(|| CacheError::UnknownEvent {
                        trigger: t.name.clone(),
                        kind: t.event.kind.clone(),
                    })
            })
            .collect()
    }

    /// Bind every trigger of `file`'s unit and count the file as loaded.
    ///
    /// `infos[i]` is the catalog entry of `unit.triggers[i]`.
    pub fn install(&self, file: &Path, unit: &CompiledUnit, infos: &[Arc<EventInfo>]) -> ScriptInfo {
        let info = ScriptInfo::of(unit);
        let mut hooks: Vec<(Arc<Trigger>, Arc<dyn SelfRegistering>)> = Vec::new();
        {
            let mut inner = self.lock();
            for (trigger, event) in unit.triggers.iter().zip(infos) {
                match &event.self_registering {
                    Some(h) => {
                        inner.self_registered.push(SelfRegistered {
                            trigger: trigger.clone(),
                            hooks: h.clone(),
                        });
                        hooks.push((trigger.clone(), h.clone()));
                    }
                    None => {
                        for ty in &event.event_types {
                            inner.dispatch.entry(ty.clone()).or_default().push(trigger.clone());
                        }
                    }
                }
            }
            inner.loaded.add(info);
            inner.per_file.entry(file.to_owned()).or_default().add(info);
        }
        for (trigger, h) in hooks {
            h.register(&trigger);
        }
        debug!(
            target: "script::registry",
            file = %file.display(),
            triggers = info.triggers,
            commands = info.commands,
            "installed"
        );
        info
    }

    /// Subscribe with the host once for every dispatched event type that has
    /// not been subscribed yet.  Returns the newly subscribed types.
    pub fn register_host_events(&self, host: &dyn EventHost) -> Vec<EventType> {
        let fresh: Vec<EventType> = {
            let mut inner = self.lock();
            let Inner {
                dispatch,
                subscribed,
                ..
            } = &mut *inner;
            let mut fresh: Vec<EventType> = dispatch
                .keys()
                .filter(|ty| subscribed.insert((*ty).clone()))
                .cloned()
                .collect();
            fresh.sort();
            fresh
        };
        for ty in &fresh {
            debug!(target: "script::registry", event_type = %ty, "subscribing");
            host.subscribe(ty);
        }
        fresh
    }

    /// Remove everything `file` contributed.  Returns the removed counts.
    pub fn unload(&self, file: &Path, commands: &dyn CommandCompiler) -> ScriptInfo {
        let (removed, unhook) = {
            let mut inner = self.lock();
            let removed = inner.per_file.remove(file).unwrap_or_default();

            inner.dispatch.retain(|_, list| {
                list.retain(|t| !t.is_from(file));
                !list.is_empty()
            });
            let (gone, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.self_registered)
                .into_iter()
                .partition(|s| s.trigger.is_from(file));
            inner.self_registered = kept;

            if !inner.loaded.subtract(removed) {
                warn!(
                    target: "script::registry",
                    file = %file.display(),
                    "load counters went negative; clamped to zero"
                );
            }
            (removed, gone)
        };

        for s in unhook {
            s.hooks.unregister(&s.trigger);
        }
        let unregistered = commands.unregister_commands(file);
        if unregistered != removed.commands {
            debug!(
                target: "script::registry",
                file = %file.display(),
                expected = removed.commands,
                unregistered,
                "command count mismatch on unload"
            );
        }
        removed
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Triggers dispatched on `event_type`, in bind order.
    pub fn triggers_for(&self, event_type: &EventType) -> Vec<Arc<Trigger>> {
        self.lock().dispatch.get(event_type).cloned().unwrap_or_default()
    }

    /// Triggers currently held by self-registering events.
    pub fn self_registered(&self) -> Vec<Arc<Trigger>> {
        self.lock()
            .self_registered
            .iter()
            .map(|s| s.trigger.clone())
            .collect()
    }

    pub fn is_loaded(&self, file: &Path) -> bool {
        self.lock().per_file.contains_key(file)
    }

    pub fn is_subscribed(&self, event_type: &EventType) -> bool {
        self.lock().subscribed.contains(event_type)
    }

    pub fn loaded(&self) -> ScriptInfo {
        self.lock().loaded
    }

    pub fn loaded_files(&self) -> usize {
        self.loaded().files
    }

    pub fn loaded_triggers(&self) -> usize {
        self.loaded().triggers
    }

    pub fn loaded_commands(&self) -> usize {
        self.loaded().commands
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
