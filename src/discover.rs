//! Discovery of loop device nodes.

use std::io;
use std::path::{Path, PathBuf};

use log::trace;
use nix::sys::stat::{SFlag, major, stat};

use crate::device::LoopDevice;
use crate::error::Result;
use crate::{DEV_DIR, LOOP_MAJOR};

/// Lists the loop device nodes under `/dev`, sorted lexicographically.
///
/// A node qualifies when its name is `loop` followed by digits, which leaves
/// out the `loop-control` node and partition nodes such as `loop0p1`.
pub fn list_devices() -> io::Result<Vec<PathBuf>> {
    list_devices_in(Path::new(DEV_DIR))
}

/// Same as [`list_devices`], over an arbitrary directory.
pub fn list_devices_in(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut nodes = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if is_loop_name(&entry.file_name().to_string_lossy()) {
            nodes.push(entry.path());
        }
    }

    nodes.sort();
    Ok(nodes)
}

fn is_loop_name(name: &str) -> bool {
    match name.strip_prefix("loop") {
        Some(digits) => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Finds the first loop device under `/dev` with no backing file attached.
///
/// Returns `Ok(None)` when no loop device exists or all of them are in use.
/// The result is a point-in-time observation: another process may bind the
/// returned device before the caller does, which the subsequent attach
/// reports as [`AlreadyBound`](crate::LoopError::AlreadyBound).
///
/// Probe failures other than the device being free propagate; a device that
/// cannot be inspected is never silently treated as unused.
pub fn find_unused() -> Result<Option<PathBuf>> {
    find_unused_in(Path::new(DEV_DIR))
}

/// Same as [`find_unused`], over an arbitrary directory.
pub fn find_unused_in(dir: &Path) -> Result<Option<PathBuf>> {
    for path in list_devices_in(dir)? {
        if LoopDevice::new(&path).is_attached()? {
            trace!("{} is in use", path.display());
        } else {
            trace!("{} is unused", path.display());
            return Ok(Some(path));
        }
    }

    Ok(None)
}

/// Whether `path` is a genuine loop device node.
///
/// True only for block special files carrying the loop major number.
/// Regular files, other devices, and paths that cannot be inspected at all
/// are reported as `false`.
pub fn is_loop_device(path: &Path) -> bool {
    match stat(path) {
        Ok(st) => {
            let is_block = st.st_mode & SFlag::S_IFMT.bits() == SFlag::S_IFBLK.bits();
            is_block && major(st.st_rdev) == LOOP_MAJOR
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoopError;
    use std::fs::File;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        File::create(dir.join(name)).unwrap();
    }

    #[test]
    fn lists_only_loop_device_nodes_sorted() {
        let dir = tempdir().unwrap();
        for name in ["loop1", "loop10", "loop0", "loop-control", "loop0p1", "sda", "loopback"] {
            touch(dir.path(), name);
        }

        let nodes = list_devices_in(dir.path()).unwrap();
        let names: Vec<_> = nodes
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["loop0", "loop1", "loop10"]);
    }

    #[test]
    fn lists_nothing_in_an_empty_directory() {
        let dir = tempdir().unwrap();
        assert!(list_devices_in(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn listing_a_missing_directory_fails() {
        assert!(list_devices_in(Path::new("/nonexistent/dev")).is_err());
    }

    #[test]
    fn find_unused_in_empty_directory_is_none() {
        let dir = tempdir().unwrap();
        assert!(find_unused_in(dir.path()).unwrap().is_none());
    }

    #[test]
    fn find_unused_ignores_non_loop_names() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "loop-control");
        touch(dir.path(), "sda1");
        assert!(find_unused_in(dir.path()).unwrap().is_none());
    }

    #[test]
    fn find_unused_propagates_probe_failures() {
        // A regular file named like a loop node fails the status probe with
        // ENOTTY, which must surface instead of being read as "unused".
        let dir = tempdir().unwrap();
        touch(dir.path(), "loop0");
        assert!(matches!(
            find_unused_in(dir.path()),
            Err(LoopError::Io(_))
        ));
    }

    #[test]
    fn regular_files_are_not_loop_devices() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "loop0");
        assert!(!is_loop_device(&dir.path().join("loop0")));
    }

    #[test]
    fn missing_paths_are_not_loop_devices() {
        assert!(!is_loop_device(Path::new("/nonexistent/loop0")));
    }

    #[test]
    fn character_devices_are_not_loop_devices() {
        // /dev/null is a character device; the block-special check must
        // reject it regardless of major number.
        let null = Path::new("/dev/null");
        if null.exists() {
            assert!(!is_loop_device(null));
        }
    }
}
