//! Compiled-script cache.
//!
//! Each script `dir/name.sk` may have an artifact `dir/<cache_dir>/name.skc`:
//!
//! | Bytes | Content |
//! |-------|---------|
//! | 0..8  | script mtime, milliseconds since the Unix epoch, big-endian `i64` |
//! | 8..   | bincode-encoded [`CompiledUnit`] |
//!
//! An artifact is trusted only if its stored mtime equals the script's
//! current one.  Anything unusable is deleted so the next load recompiles;
//! a bad artifact is never fatal.  Writes go to a temporary file in the
//! cache directory that replaces the artifact only once fully written.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::item::CompiledUnit;

#[derive(Debug, Clone)]
pub struct ScriptCache {
    cache_dir: PathBuf,
}

impl ScriptCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Artifact location for `script`.
    pub fn path_for(&self, script: &Path) -> PathBuf {
        let dir = script.parent().unwrap_or_else(|| Path::new(""));
        let mut name = script.file_name().unwrap_or_default().to_os_string();
        name.push("c");
        dir.join(&self.cache_dir).join(name)
    }

    /// Read the artifact for `script`.
    ///
    /// `Ok(None)` when there is none.  Any other failure deletes the
    /// artifact before returning the error.
    pub fn load(&self, script: &Path) -> Result<Option<CompiledUnit>, CacheError> {
        let path = self.path_for(script);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                self.discard(script);
                return Err(e.into());
            }
        };
        match decode(&bytes, modified_millis(script)) {
            Ok(unit) => {
                debug!(
                    target: "script::cache",
                    artifact = %path.display(),
                    triggers = unit.triggers.len(),
                    "cache hit"
                );
                Ok(Some(unit))
            }
            Err(e) => {
                debug!(target: "script::cache", artifact = %path.display(), "discarding: {e}");
                self.discard(script);
                Err(e)
            }
        }
    }

    /// Write `unit` as the artifact for `script`, stamped with `mtime`.
    ///
    /// `mtime` must be the script's modification time from before it was
    /// read, so an edit made during compilation leaves the artifact stale.
    /// On failure no artifact is left behind, not even an older one.
    pub fn store(&self, script: &Path, mtime: i64, unit: &CompiledUnit) -> Result<(), CacheError> {
        let result = self.write(script, mtime, unit);
        if let Err(e) = &result {
            warn!(target: "script::cache", script = %script.display(), "could not cache: {e}");
            self.discard(script);
        }
        result
    }

    fn write(&self, script: &Path, mtime: i64, unit: &CompiledUnit) -> Result<(), CacheError> {
        let path = self.path_for(script);
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let tmp = NamedTempFile::new_in(dir)?;
        {
            let mut out = BufWriter::new(tmp.as_file());
            out.write_i64::<BigEndian>(mtime)?;
            bincode::serialize_into(&mut out, unit).map_err(CacheError::Encode)?;
            out.flush()?;
        }
        tmp.persist(&path).map_err(|e| CacheError::Io(e.error))?;
        debug!(target: "script::cache", artifact = %path.display(), "stored");
        Ok(())
    }

    /// Delete the artifact for `script` if there is one.
    pub fn discard(&self, script: &Path) {
        let path = self.path_for(script);
        match fs::remove_file(&path) {
            Ok(()) => debug!(target: "script::cache", artifact = %path.display(), "deleted"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                target: "script::cache",
                artifact = %path.display(),
                "could not delete: {e}"
            ),
        }
    }
}

fn decode(bytes: &[u8], current: io::Result<i64>) -> Result<CompiledUnit, CacheError> {
    let mut reader = bytes;
    let stored = reader
        .read_i64::<BigEndian>()
        .map_err(|e| CacheError::Decode(Box::new(bincode::ErrorKind::Io(e))))?;
    let current = current?;
    if stored != current {
        return Err(CacheError::Stale { stored, current });
    }
    bincode::deserialize(reader).map_err(CacheError::Decode)
}

/// Modification time of `path` in milliseconds since the Unix epoch.
pub fn modified_millis(path: &Path) -> io::Result<i64> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(millis_since_epoch(modified))
}

fn millis_since_epoch(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
        Err(e) => i64::try_from(e.duration().as_millis()).map_or(i64::MIN, |ms| -ms),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::event::EventSpec;
    use crate::item::{Block, ItemKind, Payload, Statement, Trigger};

    fn unit(file: &Path) -> CompiledUnit {
        CompiledUnit {
            triggers: vec![Arc::new(Trigger {
                file: Some(file.to_owned()),
                name: "on join".into(),
                event: EventSpec::new("join", "join"),
                body: Block::link(vec![ItemKind::Statement(Statement::new("send \"hi\""))]),
            })],
            commands: Vec::new(),
        }
    }

    fn script(dir: &Path) -> PathBuf {
        let path = dir.join("hello.sk");
        fs::write(&path, "on join:\n\tsend \"hi\"\n").unwrap();
        path
    }

    fn mtime(path: &Path) -> i64 {
        modified_millis(path).unwrap()
    }

    fn touch(path: &Path, secs: u64) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn artifact_path() {
        let cache = ScriptCache::new("cache");
        assert_eq!(
            cache.path_for(Path::new("scripts/sub/a.sk")),
            PathBuf::from("scripts/sub/cache/a.skc")
        );
    }

    #[test]
    fn store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = script(dir.path());
        let cache = ScriptCache::new("cache");
        cache.store(&file, mtime(&file), &unit(&file)).unwrap();
        assert!(cache.path_for(&file).exists());
        let back = cache.load(&file).unwrap().unwrap();
        assert_eq!(back, unit(&file));
    }

    #[test]
    fn header_is_big_endian_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let file = script(dir.path());
        touch(&file, 1_000);
        let cache = ScriptCache::new("cache");
        cache.store(&file, mtime(&file), &unit(&file)).unwrap();
        let bytes = fs::read(cache.path_for(&file)).unwrap();
        assert_eq!(bytes[..8], 1_000_000i64.to_be_bytes());
    }

    #[test]
    fn header_is_the_given_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let file = script(dir.path());
        touch(&file, 2_000);
        let cache = ScriptCache::new("cache");
        cache.store(&file, 1_000_000, &unit(&file)).unwrap();
        let bytes = fs::read(cache.path_for(&file)).unwrap();
        assert_eq!(bytes[..8], 1_000_000i64.to_be_bytes());
        assert!(matches!(cache.load(&file), Err(CacheError::Stale { .. })));
    }

    #[test]
    fn missing_artifact_is_a_plain_miss() {
        let dir = tempfile::tempdir().unwrap();
        let file = script(dir.path());
        assert!(ScriptCache::new("cache").load(&file).unwrap().is_none());
    }

    #[test]
    fn stale_artifact_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let file = script(dir.path());
        touch(&file, 1_000);
        let cache = ScriptCache::new("cache");
        cache.store(&file, mtime(&file), &unit(&file)).unwrap();
        touch(&file, 2_000);
        assert!(matches!(cache.load(&file), Err(CacheError::Stale { .. })));
        assert!(!cache.path_for(&file).exists());
    }

    #[test]
    fn garbage_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let file = script(dir.path());
        let cache = ScriptCache::new("cache");
        let artifact = cache.path_for(&file);
        fs::create_dir_all(artifact.parent().unwrap()).unwrap();

        fs::write(&artifact, [1, 2, 3]).unwrap();
        assert!(matches!(cache.load(&file), Err(CacheError::Decode(_))));
        assert!(!artifact.exists());

        let mut bytes = modified_millis(&file).unwrap().to_be_bytes().to_vec();
        bytes.extend_from_slice(&[0xff; 5]);
        fs::write(&artifact, bytes).unwrap();
        assert!(matches!(cache.load(&file), Err(CacheError::Decode(_))));
        assert!(!artifact.exists());
    }

    #[test]
    fn unserializable_unit_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let file = script(dir.path());
        let cache = ScriptCache::new("cache");
        cache.store(&file, mtime(&file), &unit(&file)).unwrap();

        let mut stmt = Statement::new("spawn");
        stmt.payload = Payload::opaque(7u8);
        let mut bad = unit(&file);
        bad.triggers.push(Arc::new(Trigger {
            file: Some(file.clone()),
            name: "on quit".into(),
            event: EventSpec::new("quit", "quit"),
            body: Block::link(vec![ItemKind::Statement(stmt)]),
        }));
        assert!(matches!(cache.store(&file, mtime(&file), &bad), Err(CacheError::Encode(_))));
        assert!(!cache.path_for(&file).exists());
        let leftovers = fs::read_dir(cache.path_for(&file).parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn pre_epoch_times_are_negative() {
        assert_eq!(millis_since_epoch(UNIX_EPOCH - Duration::from_millis(5)), -5);
        assert_eq!(millis_since_epoch(UNIX_EPOCH + Duration::from_millis(5)), 5);
    }
}
