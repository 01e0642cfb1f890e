//! Handles over individual loop device nodes and the loop-control node.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use libc::ioctl;
use log::debug;

use crate::discover;
use crate::error::{LoopError, Result};
use crate::status::LoopInfo64;
use crate::{
    LOOP_CLR_FD, LOOP_CONTROL, LOOP_CTL_GET_FREE, LOOP_GET_STATUS64, LOOP_SET_FD,
    LOOP_SET_STATUS64,
};

/// One loop device node, identified by its path (e.g. `/dev/loop0`).
///
/// The handle keeps no descriptor open between calls: every operation opens
/// the node, issues exactly one ioctl, and closes it again on every exit
/// path. The only in-process state is the record returned by the last
/// successful status query.
///
/// A device walks through three states: free, bound (a backing file
/// descriptor is set), and configured (the status record carries the backing
/// file metadata). [`attach`](Self::attach) composes the bound and
/// configured steps; [`detach`](Self::detach) returns the device to free.
///
/// # Examples
///
/// ```no_run
/// use loopdevice::LoopDevice;
/// use std::path::Path;
///
/// # fn main() -> loopdevice::Result<()> {
/// let device = LoopDevice::allocate()?;
/// let mut device = device.attach(Path::new("/tmp/disk.img"), true)?;
/// println!("backing file: {}", device.status()?.file_name());
/// device.detach()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LoopDevice {
    path: PathBuf,
    status: Option<LoopInfo64>,
}

impl LoopDevice {
    /// Creates a handle over an explicit device node path.
    ///
    /// Nothing is opened or checked here; the first control call reports
    /// whether the path is usable.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            status: None,
        }
    }

    /// Creates a handle over the first unused loop device on the system.
    ///
    /// Scans the device nodes in order and takes the first one that reports
    /// no backing file. The pick is advisory: another process may bind the
    /// same device before this handle does, which a later
    /// [`attach`](Self::attach) surfaces as [`LoopError::AlreadyBound`].
    ///
    /// # Errors
    ///
    /// [`LoopError::Unavailable`] when every enumerated device is in use or
    /// none exists.
    pub fn allocate() -> Result<Self> {
        match discover::find_unused()? {
            Some(path) => {
                debug!("allocated {}", path.display());
                Ok(Self::new(path))
            }
            None => Err(LoopError::Unavailable),
        }
    }

    /// Path of the device node this handle controls.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record returned by the most recent successful status query, if any.
    pub fn last_status(&self) -> Option<&LoopInfo64> {
        self.status.as_ref()
    }

    fn open_node(&self) -> Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(LoopError::from_os)
    }

    /// Reads the device's status record with `LOOP_GET_STATUS64`.
    ///
    /// # Errors
    ///
    /// [`LoopError::NotBound`] when the device has no backing file; this is
    /// the mechanism by which a free device is recognized.
    pub fn status(&mut self) -> Result<LoopInfo64> {
        let dev = self.open_node()?;

        let mut info = LoopInfo64::default();
        let res = unsafe { ioctl(dev.as_raw_fd(), LOOP_GET_STATUS64, &mut info) };
        if res < 0 {
            return Err(LoopError::last_os_error());
        }

        self.status = Some(info);
        Ok(info)
    }

    /// Whether the device currently has a backing file attached.
    ///
    /// Probes with [`status`](Self::status): success means attached,
    /// [`LoopError::NotBound`] means free. Any other failure propagates
    /// rather than being reported as free.
    pub fn is_attached(&mut self) -> Result<bool> {
        match self.status() {
            Ok(_) => Ok(true),
            Err(LoopError::NotBound) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Writes the device's status record with `LOOP_SET_STATUS64`.
    ///
    /// The record carries the backing file name (truncated at the field's
    /// capacity), the byte offset where the block device begins, and the
    /// size limit (0 exposes the whole file). The device must already be
    /// bound to a backing file descriptor.
    pub fn configure(&mut self, backing: &Path, offset: u64, sizelimit: u64) -> Result<LoopInfo64> {
        let info = LoopInfo64::with_backing(&backing.to_string_lossy(), offset, sizelimit);

        let dev = self.open_node()?;
        let res = unsafe { ioctl(dev.as_raw_fd(), LOOP_SET_STATUS64, &info) };
        if res < 0 {
            return Err(LoopError::last_os_error());
        }

        debug!("configured {} over {}", self.path.display(), backing.display());
        self.status = Some(info);
        Ok(info)
    }

    /// Attaches a backing file to this device and records its metadata.
    ///
    /// Two steps: a `LOOP_SET_FD` call binding the backing file's descriptor
    /// to the node, then [`configure`](Self::configure) with the file name
    /// and zero offset/size limit. Returns the handle that ended up holding
    /// the attachment.
    ///
    /// When `retry_on_busy` is set and the device turns out to be taken
    /// already (a race with another allocator, reported as
    /// [`LoopError::AlreadyBound`]), a fresh unused device is allocated and
    /// attached instead, repeating until a bind succeeds or no free device
    /// remains. Without the flag the error propagates to the caller.
    ///
    /// A failure after the bind but before the configure step leaves the
    /// device bound without metadata; it can be completed with
    /// [`configure`](Self::configure) or released with
    /// [`detach`](Self::detach).
    pub fn attach(mut self, backing: &Path, retry_on_busy: bool) -> Result<LoopDevice> {
        match self.set_backing_fd(backing) {
            Ok(()) => {}
            Err(LoopError::AlreadyBound) if retry_on_busy => {
                debug!("{} is busy, retrying on another device", self.path.display());
                return Self::allocate()?.attach(backing, retry_on_busy);
            }
            Err(err) => return Err(err),
        }

        self.configure(backing, 0, 0)?;
        Ok(self)
    }

    fn set_backing_fd(&self, backing: &Path) -> Result<()> {
        let dev = self.open_node()?;
        let file = File::open(backing)?;

        let res = unsafe { ioctl(dev.as_raw_fd(), LOOP_SET_FD, file.as_raw_fd()) };
        if res < 0 {
            return Err(LoopError::last_os_error());
        }

        debug!("bound {} to {}", backing.display(), self.path.display());
        Ok(())
    }

    /// Releases the backing file association with `LOOP_CLR_FD`.
    ///
    /// The device returns to the free state and the cached status record is
    /// dropped. Fails with [`LoopError::NotBound`] when the device was never
    /// bound.
    pub fn detach(&mut self) -> Result<()> {
        let dev = self.open_node()?;
        let res = unsafe { ioctl(dev.as_raw_fd(), LOOP_CLR_FD) };
        if res < 0 {
            return Err(LoopError::last_os_error());
        }

        self.status = None;
        debug!("detached {}", self.path.display());
        Ok(())
    }
}

/// Handle over `/dev/loop-control`, the kernel-side device allocator.
///
/// [`LoopControl::next_free`] is an alternative to the advisory scan behind
/// [`LoopDevice::allocate`]: the kernel picks (and creates, if needed) a
/// free device itself.
pub struct LoopControl {
    dev: File,
}

impl LoopControl {
    /// Opens the loop-control device.
    ///
    /// # Errors
    ///
    /// Fails when the node does not exist (no loop driver) or the caller
    /// lacks the privilege to open it.
    pub fn open() -> Result<Self> {
        let dev = OpenOptions::new()
            .read(true)
            .write(true)
            .open(LOOP_CONTROL)
            .map_err(LoopError::from_os)?;

        Ok(Self { dev })
    }

    /// Asks the kernel for the next free loop device.
    ///
    /// Issues `LOOP_CTL_GET_FREE`; the device number comes back in the
    /// ioctl's return value, not through an argument.
    pub fn next_free(&self) -> Result<LoopDevice> {
        let res = unsafe { ioctl(self.dev.as_raw_fd(), LOOP_CTL_GET_FREE) };
        if res < 0 {
            return Err(LoopError::last_os_error());
        }

        Ok(LoopDevice::new(format!("/dev/loop{res}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    // A regular file stands in for a device node: opening it succeeds, but
    // every loop ioctl against it fails with ENOTTY.
    fn fake_node() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 512]).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn new_handle_has_no_cached_status() {
        let dev = LoopDevice::new("/dev/loop0");
        assert_eq!(dev.path(), Path::new("/dev/loop0"));
        assert!(dev.last_status().is_none());
    }

    #[test]
    fn handle_is_debug_formattable() {
        let rendered = format!("{:?}", LoopDevice::new("/dev/loop0"));
        assert!(rendered.contains("/dev/loop0"));
    }

    #[test]
    fn status_on_missing_node_is_io_error() {
        let mut dev = LoopDevice::new("/nonexistent/loop99");
        assert!(matches!(dev.status(), Err(LoopError::Io(_))));
    }

    #[test]
    fn status_on_non_device_node_is_io_error() {
        let node = fake_node();
        let mut dev = LoopDevice::new(node.path());
        match dev.status() {
            Err(LoopError::Io(err)) => assert_eq!(err.raw_os_error(), Some(libc::ENOTTY)),
            other => panic!("expected ENOTTY, got {other:?}"),
        }
        assert!(dev.last_status().is_none());
    }

    #[test]
    fn is_attached_propagates_unclassified_failures() {
        // A probe that cannot positively say "free" must not report false.
        let node = fake_node();
        let mut dev = LoopDevice::new(node.path());
        assert!(matches!(dev.is_attached(), Err(LoopError::Io(_))));
    }

    #[test]
    fn detach_on_non_device_node_is_io_error() {
        let node = fake_node();
        let mut dev = LoopDevice::new(node.path());
        assert!(matches!(dev.detach(), Err(LoopError::Io(_))));
    }

    #[test]
    fn attach_to_missing_node_propagates_without_retry_side_effects() {
        let backing = fake_node();
        let dev = LoopDevice::new("/nonexistent/loop99");
        // Not AlreadyBound, so the retry flag must not kick in.
        assert!(matches!(
            dev.attach(backing.path(), true),
            Err(LoopError::Io(_))
        ));
    }

    #[test]
    fn loop_control_open_does_not_panic() {
        // Needs /dev/loop-control and privilege; only classify the outcome.
        match LoopControl::open() {
            Ok(ctl) => {
                let _ = ctl.next_free();
            }
            Err(LoopError::PermissionDenied) | Err(LoopError::Io(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn attach_with_missing_backing_file_is_io_error() {
        let node = fake_node();
        let dev = LoopDevice::new(node.path());
        let res = dev.attach(Path::new("/nonexistent/backing.img"), false);
        match res {
            Err(LoopError::Io(err)) => assert_eq!(err.raw_os_error(), Some(libc::ENOENT)),
            other => panic!("expected ENOENT, got {other:?}"),
        }
    }
}
