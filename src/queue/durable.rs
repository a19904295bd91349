//! Snapshot-backed queue.
//!
//! Every mutation rewrites the whole queue to `event_queue.dat.tmp` and then
//! renames it over `event_queue.dat`, so the canonical file is always either
//! the previous complete snapshot or the new one. A snapshot larger than the
//! byte cap is discarded: the event stays queued in memory, but the file keeps
//! its previous contents until the queue shrinks back under the cap.
//!
//! Nothing here fails outwards. A missing, unreadable, or corrupt snapshot is
//! deleted and the queue starts empty; save failures are logged and the
//! in-memory queue stays authoritative.

use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{
    diagnostics::Diagnostics,
    event::Event,
    rate_limited_warner::RateLimitedWarner,
};

use super::{
    EventQueue, MemoryEventQueue,
    codec::{self, CodecError},
};

/// Directory created beneath the storage path.
pub const QUEUE_DIR_NAME: &str = "femtotelemetry";
/// Snapshot file name inside [`QUEUE_DIR_NAME`].
pub const QUEUE_FILE_NAME: &str = "event_queue.dat";
/// Lower bound applied to the configured byte cap.
pub const MIN_DISK_BYTES: u64 = 1024;

#[derive(Debug, Error)]
enum PersistError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Queue that mirrors its contents to disk after every change.
pub struct DurableEventQueue {
    events: MemoryEventQueue,
    path: PathBuf,
    tmp_path: PathBuf,
    max_bytes: u64,
    diagnostics: Diagnostics,
    save_failures: RateLimitedWarner,
}

impl DurableEventQueue {
    /// Open (or create) the queue stored under `storage_path`.
    ///
    /// The snapshot lives at `storage_path/femtotelemetry/event_queue.dat`.
    /// `max_bytes` is raised to [`MIN_DISK_BYTES`] if smaller. Never fails; see
    /// the module docs for how bad state is handled.
    pub fn open(storage_path: impl AsRef<Path>, max_bytes: u64) -> Self {
        Self::open_with(storage_path.as_ref(), max_bytes, Diagnostics::new(true))
    }

    pub(crate) fn open_with(storage_path: &Path, max_bytes: u64, diagnostics: Diagnostics) -> Self {
        let dir = storage_path.join(QUEUE_DIR_NAME);
        if let Err(err) = fs::create_dir_all(&dir) {
            diagnostics.warn(format_args!(
                "cannot create queue directory {}: {err}; events will not persist",
                dir.display()
            ));
        }
        let path = dir.join(QUEUE_FILE_NAME);
        let tmp_path = dir.join(format!("{QUEUE_FILE_NAME}.tmp"));
        let mut queue = Self {
            events: MemoryEventQueue::new(),
            path,
            tmp_path,
            max_bytes: max_bytes.max(MIN_DISK_BYTES),
            diagnostics,
            save_failures: RateLimitedWarner::default(),
        };
        queue.load();
        queue
    }

    /// Location of the canonical snapshot.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Effective byte cap after clamping.
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    fn load(&mut self) {
        let _ = fs::remove_file(&self.tmp_path);
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return,
            Err(err) => {
                self.discard_snapshot(&err);
                return;
            }
        };
        match codec::decode_snapshot(&bytes) {
            Ok(events) => {
                self.diagnostics.debug(format_args!(
                    "restored {} queued events from {}",
                    events.len(),
                    self.path.display()
                ));
                self.events = events.into_iter().collect();
            }
            Err(err) => self.discard_snapshot(&err),
        }
    }

    fn discard_snapshot(&self, reason: &dyn std::fmt::Display) {
        self.diagnostics.warn(format_args!(
            "discarding unreadable event queue snapshot {}: {reason}",
            self.path.display()
        ));
        if let Err(err) = fs::remove_file(&self.path)
            && err.kind() != io::ErrorKind::NotFound
        {
            self.diagnostics.warn(format_args!(
                "failed to delete corrupt snapshot {}: {err}",
                self.path.display()
            ));
        }
    }

    fn persist(&self) {
        if let Err(err) = self.write_snapshot() {
            let _ = fs::remove_file(&self.tmp_path);
            self.save_failures.record_drop();
            self.save_failures.warn_if_due(|count| {
                self.diagnostics.warn(format_args!(
                    "failed to save event queue snapshot {} ({count} failures since last report): {err}",
                    self.path.display()
                ));
            });
        }
    }

    fn write_snapshot(&self) -> Result<(), PersistError> {
        let bytes = codec::encode_snapshot(self.events.iter())?;
        {
            let mut file = File::create(&self.tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }

        let size = fs::metadata(&self.tmp_path)?.len();
        if size > self.max_bytes {
            fs::remove_file(&self.tmp_path)?;
            self.diagnostics.debug(format_args!(
                "snapshot of {} events is {size} bytes, over the {} byte cap; not persisted",
                self.events.len(),
                self.max_bytes
            ));
            return Ok(());
        }

        fs::rename(&self.tmp_path, &self.path)?;
        Ok(())
    }
}

impl EventQueue for DurableEventQueue {
    fn len(&self) -> usize {
        self.events.len()
    }

    fn enqueue(&mut self, event: Event) {
        self.events.enqueue(event);
        self.persist();
    }

    fn peek_batch(&self, max_count: usize) -> Vec<Event> {
        self.events.peek_batch(max_count)
    }

    fn drop_batch(&mut self, count: usize) {
        if count == 0 || self.events.is_empty() {
            return;
        }
        self.events.drop_batch(count);
        self.persist();
    }
}

impl Drop for DurableEventQueue {
    fn drop(&mut self) {
        self.save_failures.flush(|count| {
            self.diagnostics.warn(format_args!(
                "{count} event queue snapshot saves to {} failed since the last report",
                self.path.display()
            ));
        });
    }
}

impl std::fmt::Debug for DurableEventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableEventQueue")
            .field("path", &self.path)
            .field("len", &self.events.len())
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}
