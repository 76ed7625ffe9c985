//! Control signals shared between the engine and its worker process
//!
//! Each signal is a single flag with no payload. The engine is the only
//! writer of `should_pause`, `should_stop` and `process_stop`; the worker is
//! the only writer of `paused` and `resumed`.
//!
//! Across processes the flags live in a small memory-mapped file, one byte
//! per flag:
//!
//! ```text
//!   offset 0  should_pause
//!   offset 1  paused
//!   offset 2  should_stop
//!   offset 3  resumed
//!   offset 4  process_stop
//! ```

use memmap2::{MmapMut, MmapOptions};
use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;

use lodestone_core::{ControlSignals, Signal};

use crate::error::IpcError;

const BLOCK_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSlot {
    ShouldPause = 0,
    Paused = 1,
    ShouldStop = 2,
    Resumed = 3,
    /// Asks the worker process to leave its run loop
    ProcessStop = 4,
}

/// Memory-mapped block holding every control flag
pub struct SignalBlock {
    mmap: MmapMut,
    /// SAFETY: Points to the start of mmap, valid as long as mmap exists
    base: *mut u8,
    path: Option<PathBuf>,
    /// Removes the backing file when the creating side drops the block
    _file: Option<NamedTempFile>,
}

// SAFETY: The mapping is only accessed through atomic byte operations, and
// `base` stays valid for as long as `mmap` is owned by the block.
unsafe impl Send for SignalBlock {}

// SAFETY: All reads and writes go through `AtomicU8`, so concurrent access
// from several threads is synchronized.
unsafe impl Sync for SignalBlock {}

impl SignalBlock {
    /// Create a block backed by a new temporary file, all flags cleared
    pub fn create() -> Result<Self, IpcError> {
        let file = tempfile::Builder::new()
            .prefix("lodestone-signals-")
            .tempfile()
            .map_err(|e| IpcError::SignalBlock(format!("failed to create signal file: {}", e)))?;
        file.as_file()
            .set_len(BLOCK_SIZE as u64)
            .map_err(|e| IpcError::SignalBlock(format!("failed to size signal file: {}", e)))?;

        // SAFETY: We just created the file and set its size, so mapping is safe
        let mut mmap = unsafe { MmapOptions::new().len(BLOCK_SIZE).map_mut(file.as_file()) }
            .map_err(|e| IpcError::SignalBlock(format!("failed to map signal file: {}", e)))?;
        let base = mmap.as_mut_ptr();
        let path = file.path().to_path_buf();

        log::debug!("Created signal block at {}", path.display());
        Ok(Self {
            mmap,
            base,
            path: Some(path),
            _file: Some(file),
        })
    }

    /// Map a block created by another process
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IpcError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                IpcError::SignalBlock(format!("failed to open {}: {}", path.display(), e))
            })?;

        let len = file
            .metadata()
            .map_err(|e| IpcError::SignalBlock(e.to_string()))?
            .len();
        if len < BLOCK_SIZE as u64 {
            return Err(IpcError::SignalBlock(format!(
                "{} is {} bytes, expected {}",
                path.display(),
                len,
                BLOCK_SIZE
            )));
        }

        // SAFETY: The file was created by `create()` and has been sized above
        let mut mmap = unsafe { MmapOptions::new().len(BLOCK_SIZE).map_mut(&file) }
            .map_err(|e| IpcError::SignalBlock(format!("failed to map {}: {}", path.display(), e)))?;
        let base = mmap.as_mut_ptr();

        Ok(Self {
            mmap,
            base,
            path: Some(path.to_path_buf()),
            _file: None,
        })
    }

    /// Block without a backing file, usable within one process only
    pub fn anonymous() -> Result<Self, IpcError> {
        let mut mmap = MmapMut::map_anon(BLOCK_SIZE)
            .map_err(|e| IpcError::SignalBlock(format!("failed to map memory: {}", e)))?;
        let base = mmap.as_mut_ptr();
        Ok(Self {
            mmap,
            base,
            path: None,
            _file: None,
        })
    }

    /// Backing file to hand to the worker process
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn flag(&self, slot: SignalSlot) -> &AtomicU8 {
        debug_assert!(self.mmap.len() >= BLOCK_SIZE);
        // SAFETY: every slot offset is below BLOCK_SIZE, the mapping is
        // BLOCK_SIZE bytes long and lives as long as self; AtomicU8 has the
        // same size and alignment as u8
        unsafe { &*(self.base.add(slot as usize) as *const AtomicU8) }
    }

    pub fn set(&self, slot: SignalSlot) {
        self.flag(slot).store(1, Ordering::SeqCst);
    }

    pub fn clear(&self, slot: SignalSlot) {
        self.flag(slot).store(0, Ordering::SeqCst);
    }

    pub fn is_set(&self, slot: SignalSlot) -> bool {
        self.flag(slot).load(Ordering::SeqCst) != 0
    }

    pub fn clear_all(&self) {
        for slot in [
            SignalSlot::ShouldPause,
            SignalSlot::Paused,
            SignalSlot::ShouldStop,
            SignalSlot::Resumed,
            SignalSlot::ProcessStop,
        ] {
            self.clear(slot);
        }
    }

    pub fn signal(self: &Arc<Self>, slot: SignalSlot) -> Arc<dyn Signal> {
        Arc::new(SharedSignal {
            block: self.clone(),
            slot,
        })
    }

    /// The four flags a task tree observes and acknowledges
    pub fn control_signals(self: &Arc<Self>) -> ControlSignals {
        ControlSignals {
            should_pause: self.signal(SignalSlot::ShouldPause),
            paused: self.signal(SignalSlot::Paused),
            should_stop: self.signal(SignalSlot::ShouldStop),
            resumed: self.signal(SignalSlot::Resumed),
        }
    }
}

impl fmt::Debug for SignalBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalBlock")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// One flag of a [`SignalBlock`]
pub struct SharedSignal {
    block: Arc<SignalBlock>,
    slot: SignalSlot,
}

impl Signal for SharedSignal {
    fn set(&self) {
        self.block.set(self.slot);
    }

    fn clear(&self) {
        self.block.clear(self.slot);
    }

    fn is_set(&self) -> bool {
        self.block.is_set(self.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_independent() {
        let block = Arc::new(SignalBlock::anonymous().unwrap());
        let signals = block.control_signals();

        signals.should_pause.set();
        assert!(block.is_set(SignalSlot::ShouldPause));
        assert!(!signals.paused.is_set());
        assert!(!signals.should_stop.is_set());
        assert!(!block.is_set(SignalSlot::ProcessStop));

        block.set(SignalSlot::ProcessStop);
        signals.clear_all();
        assert!(!signals.should_pause.is_set());
        assert!(block.is_set(SignalSlot::ProcessStop));
    }

    #[test]
    fn test_second_mapping_sees_writes() {
        let created = Arc::new(SignalBlock::create().unwrap());
        let path = created.path().unwrap().to_path_buf();
        let opened = Arc::new(SignalBlock::open(&path).unwrap());

        created.set(SignalSlot::ShouldStop);
        assert!(opened.is_set(SignalSlot::ShouldStop));

        opened.control_signals().paused.set();
        assert!(created.is_set(SignalSlot::Paused));

        created.clear_all();
        assert!(!opened.is_set(SignalSlot::ShouldStop));
        assert!(!opened.is_set(SignalSlot::Paused));
    }

    #[test]
    fn test_backing_file_removed_with_creator() {
        let block = SignalBlock::create().unwrap();
        let path = block.path().unwrap().to_path_buf();
        assert!(path.exists());
        drop(block);
        assert!(!path.exists());
    }

    #[test]
    fn test_open_rejects_short_file() {
        let file = NamedTempFile::new().unwrap();
        assert!(matches!(
            SignalBlock::open(file.path()),
            Err(IpcError::SignalBlock(_))
        ));
    }
}
