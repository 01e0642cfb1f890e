use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LoopError>;

/// Errors reported by loop device control calls and allocation.
///
/// The first two variants are the interesting ones: the kernel signals "this
/// device has no backing file" with `ENXIO` and "this device is already
/// taken" with `EBUSY`, and both are used as control flow. `NotBound` is how
/// a free device is recognized, and `AlreadyBound` is what drives the
/// retry-on-busy allocation path in [`LoopDevice::attach`].
///
/// [`LoopDevice::attach`]: crate::LoopDevice::attach
#[derive(Error, Debug)]
pub enum LoopError {
    /// The device has no backing file attached (`ENXIO`).
    #[error("loop device has no backing file attached")]
    NotBound,

    /// The device already has a backing file attached (`EBUSY`).
    #[error("loop device already has a backing file attached")]
    AlreadyBound,

    /// Not allowed to open the device node or issue the control call.
    #[error("permission denied for loop device control")]
    PermissionDenied,

    /// No unused loop device exists among the enumerated nodes.
    #[error("no unused loop device available")]
    Unavailable,

    /// Any other I/O failure, propagated unchanged.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl LoopError {
    /// Classifies an OS error from a node open or an ioctl.
    ///
    /// Only the errno values with a defined meaning in the loop protocol get
    /// a named variant; everything else stays an `Io` error.
    pub(crate) fn from_os(err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::ENXIO) => Self::NotBound,
            Some(libc::EBUSY) => Self::AlreadyBound,
            Some(libc::EACCES) | Some(libc::EPERM) => Self::PermissionDenied,
            _ => Self::Io(err),
        }
    }

    pub(crate) fn last_os_error() -> Self {
        Self::from_os(io::Error::last_os_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(errno: i32) -> LoopError {
        LoopError::from_os(io::Error::from_raw_os_error(errno))
    }

    #[test]
    fn enxio_means_not_bound() {
        assert!(matches!(classify(libc::ENXIO), LoopError::NotBound));
    }

    #[test]
    fn ebusy_means_already_bound() {
        assert!(matches!(classify(libc::EBUSY), LoopError::AlreadyBound));
    }

    #[test]
    fn eacces_and_eperm_mean_permission_denied() {
        assert!(matches!(classify(libc::EACCES), LoopError::PermissionDenied));
        assert!(matches!(classify(libc::EPERM), LoopError::PermissionDenied));
    }

    #[test]
    fn other_errnos_stay_io() {
        match classify(libc::ENOENT) {
            LoopError::Io(err) => assert_eq!(err.raw_os_error(), Some(libc::ENOENT)),
            other => panic!("expected Io, got {other:?}"),
        }
        assert!(matches!(classify(libc::ENOTTY), LoopError::Io(_)));
    }
}
