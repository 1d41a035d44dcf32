//! File-backed shared-memory regions

use memmap2::MmapMut;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use super::error::{IpcError, IpcResult};
use crate::config::{default_shm_dir, IpcConfig};

const OPEN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Directory in which regions are created and looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShmNamespace {
    root: PathBuf,
}

impl ShmNamespace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &IpcConfig) -> Self {
        Self::new(config.shm_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn region_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl Default for ShmNamespace {
    fn default() -> Self {
        Self::new(default_shm_dir())
    }
}

/// Marker for `#[repr(C)]` structs built only from atomics
///
/// # Safety
/// Implementors must be valid for every bit pattern (including all zeros)
/// and must only be mutated through atomic operations.
pub(crate) unsafe trait RegionHeader: Sized {}

/// A mapped region shared with another process
///
/// The creator owns the backing file and removes it on drop. Payload bytes
/// are only touched through the `unsafe` accessors, whose callers follow the
/// handshake discipline of the channel built on top.
pub struct SharedRegion {
    /// Keeps the mapping alive; all access goes through `base`
    _map: MmapMut,
    base: NonNull<u8>,
    len: usize,
    name: String,
    path: PathBuf,
    owner: bool,
}

// SAFETY: the region is plain memory. Header fields are atomics and payload
// access is `unsafe` with the synchronization contract on the caller.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Create (or take over) a zeroed region of `len` bytes
    pub fn create(namespace: &ShmNamespace, name: &str, len: usize) -> IpcResult<Self> {
        fs::create_dir_all(namespace.root()).map_err(IpcError::io(namespace.root()))?;

        let path = namespace.region_path(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(IpcError::io(&path))?;
        file.set_len(len as u64).map_err(IpcError::io(&path))?;

        // SAFETY: the file was just sized to `len`; concurrent access by a
        // peer is mediated by the atomic header protocol.
        let mut map = unsafe { MmapMut::map_mut(&file) }.map_err(IpcError::io(&path))?;
        map.fill(0);

        log::debug!("Created shared region '{}' ({} bytes) at {:?}", name, len, path);
        Ok(Self::from_map(map, name, path, true))
    }

    /// Map an existing region of at least `min_len` bytes, waiting up to `timeout` for it to appear
    pub fn open(
        namespace: &ShmNamespace,
        name: &str,
        min_len: usize,
        timeout: Duration,
    ) -> IpcResult<Self> {
        let path = namespace.region_path(name);
        let deadline = Instant::now() + timeout;

        loop {
            match OpenOptions::new().read(true).write(true).open(&path) {
                Ok(file) => {
                    let actual = file.metadata().map_err(IpcError::io(&path))?.len() as usize;
                    if actual >= min_len.max(1) {
                        // SAFETY: see `create`
                        let map = unsafe { MmapMut::map_mut(&file) }.map_err(IpcError::io(&path))?;
                        log::debug!("Opened shared region '{}' ({} bytes)", name, actual);
                        return Ok(Self::from_map(map, name, path, false));
                    }
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(IpcError::Io { path, source: e }),
            }

            if Instant::now() >= deadline {
                return Err(IpcError::PeerNotReady(name.to_string()));
            }
            thread::sleep(OPEN_POLL_INTERVAL);
        }
    }

    fn from_map(mut map: MmapMut, name: &str, path: PathBuf, owner: bool) -> Self {
        let len = map.len();
        let base = NonNull::new(map.as_mut_ptr()).unwrap_or(NonNull::dangling());
        Self {
            _map: map,
            base,
            len,
            name: name.to_string(),
            path,
            owner,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_owner(&self) -> bool {
        self.owner
    }

    /// Fail unless the region holds at least `required` bytes
    pub(crate) fn ensure_len(&self, required: usize) -> IpcResult<()> {
        if self.len < required {
            return Err(IpcError::RegionTooSmall {
                name: self.name.clone(),
                actual: self.len,
                required,
            });
        }
        Ok(())
    }

    /// View the start of the region as an atomic header
    pub(crate) fn header<T: RegionHeader>(&self) -> &T {
        assert!(
            std::mem::size_of::<T>() <= self.len,
            "region '{}' too small for its header",
            self.name
        );
        // SAFETY: the mapping is page-aligned and long enough (checked
        // above); T is valid for any bit pattern and only mutated atomically.
        unsafe { &*(self.base.as_ptr() as *const T) }
    }

    /// Read-only view of `len` bytes at `offset`
    ///
    /// # Safety
    /// The peer must not write this range for the lifetime of the slice.
    pub(crate) unsafe fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        assert!(offset + len <= self.len, "region '{}' read out of bounds", self.name);
        std::slice::from_raw_parts(self.base.as_ptr().add(offset), len)
    }

    /// Writable view of `len` bytes at `offset`
    ///
    /// # Safety
    /// Nobody else (peer or another view) may access this range for the
    /// lifetime of the slice.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn bytes_mut(&self, offset: usize, len: usize) -> &mut [u8] {
        assert!(offset + len <= self.len, "region '{}' write out of bounds", self.name);
        std::slice::from_raw_parts_mut(self.base.as_ptr().add(offset), len)
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        if self.owner {
            if let Err(e) = fs::remove_file(&self.path) {
                log::debug!("Could not remove shared region {:?}: {}", self.path, e);
            }
        }
    }
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("name", &self.name)
            .field("len", &self.len)
            .field("owner", &self.owner)
            .finish()
    }
}

/// Poll `flag` until it reads `1` or the deadline passes
pub(crate) fn wait_for_ready(flag: &AtomicU32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if flag.load(Ordering::Acquire) == 1 {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(OPEN_POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    struct Flags {
        a: AtomicU32,
        b: AtomicU32,
    }
    unsafe impl RegionHeader for Flags {}

    #[test]
    fn test_create_open_share_memory() {
        let dir = tempfile::tempdir().unwrap();
        let ns = ShmNamespace::new(dir.path());

        let owner = SharedRegion::create(&ns, "shared", 64).unwrap();
        let peer = SharedRegion::open(&ns, "shared", 64, Duration::from_millis(100)).unwrap();
        assert!(owner.is_owner());
        assert!(!peer.is_owner());

        owner.header::<Flags>().b.store(7, Ordering::Release);
        assert_eq!(peer.header::<Flags>().b.load(Ordering::Acquire), 7);
        assert_eq!(peer.header::<Flags>().a.load(Ordering::Acquire), 0);
    }

    #[test]
    fn test_open_missing_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let ns = ShmNamespace::new(dir.path());
        let result = SharedRegion::open(&ns, "absent", 16, Duration::from_millis(20));
        assert!(matches!(result, Err(IpcError::PeerNotReady(name)) if name == "absent"));
    }

    #[test]
    fn test_owner_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let ns = ShmNamespace::new(dir.path());
        let path = ns.region_path("gone");
        {
            let _region = SharedRegion::create(&ns, "gone", 16).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_ensure_len() {
        let dir = tempfile::tempdir().unwrap();
        let ns = ShmNamespace::new(dir.path());
        let region = SharedRegion::create(&ns, "small", 8).unwrap();
        assert!(region.ensure_len(8).is_ok());
        assert!(matches!(
            region.ensure_len(9),
            Err(IpcError::RegionTooSmall { actual: 8, required: 9, .. })
        ));
    }
}
