//! Management of Linux loop block devices.
//!
//! Loop devices allow regular files to be accessed as block devices, which
//! is useful for mounting disk images and creating virtual filesystems.
//! This crate covers the control surface for them: binding a backing file to
//! a device node, reading and writing the kernel's status record, detaching,
//! and discovering an unused device among the nodes in `/dev`.
//!
//! The main entry point is [`LoopDevice`]. A handle is either constructed
//! over an explicit node path or allocated over the first unused device:
//!
//! ```no_run
//! use loopdevice::LoopDevice;
//! use std::path::Path;
//!
//! # fn main() -> loopdevice::Result<()> {
//! let device = LoopDevice::allocate()?;
//! let mut device = device.attach(Path::new("/tmp/disk.img"), true)?;
//!
//! let status = device.status()?;
//! println!("{} backs {}", status.file_name(), device.path().display());
//!
//! device.detach()?;
//! # Ok(())
//! # }
//! ```
//!
//! All control calls are synchronous ioctls; each one opens the device node,
//! performs a single operation, and closes it again. Most of them require
//! root (or CAP_SYS_ADMIN) and surface [`LoopError::PermissionDenied`]
//! otherwise.

mod device;
mod discover;
mod error;
mod status;

pub use device::{LoopControl, LoopDevice};
pub use discover::{find_unused, find_unused_in, is_loop_device, list_devices, list_devices_in};
pub use error::{LoopError, Result};
pub use status::{
    LO_FLAGS_AUTOCLEAR, LO_FLAGS_READ_ONLY, LO_FLAGS_USE_AOPS, LO_KEY_SIZE, LO_NAME_SIZE,
    LoopInfo64,
};

/// Directory holding the device nodes.
pub const DEV_DIR: &str = "/dev";
/// Path of the loop-control node, excluded from device enumeration.
pub const LOOP_CONTROL: &str = "/dev/loop-control";
/// Major device number shared by all loop block devices.
pub const LOOP_MAJOR: u64 = 7;

/// Sets up a loop device by associating it with a file descriptor
pub const LOOP_SET_FD: u64 = 0x4C00;
/// Clears a loop device, disassociating it from its backing file
pub const LOOP_CLR_FD: u64 = 0x4C01;
/// Sets status information for a loop device (legacy version)
pub const LOOP_SET_STATUS: u64 = 0x4C02;
/// Gets status information from a loop device (legacy version)
pub const LOOP_GET_STATUS: u64 = 0x4C03;
/// Sets status information for a loop device with 64-bit structure
pub const LOOP_SET_STATUS64: u64 = 0x4C04;
/// Gets status information from a loop device with 64-bit structure
pub const LOOP_GET_STATUS64: u64 = 0x4C05;
/// Changes the backing file descriptor for a loop device
pub const LOOP_CHANGE_FD: u64 = 0x4C06;
/// Sets the capacity (size) of the loop device
pub const LOOP_SET_CAPACITY: u64 = 0x4C07;
/// Enables or disables direct I/O on the loop device
pub const LOOP_SET_DIRECT_IO: u64 = 0x4C08;
/// Sets the block size for the loop device
pub const LOOP_SET_BLOCK_SIZE: u64 = 0x4C09;
/// Configures multiple loop device parameters in a single operation
pub const LOOP_CONFIGURE: u64 = 0x4C0A;

// /dev/loop-control interface
/// Adds a new loop device to the system
pub const LOOP_CTL_ADD: u64 = 0x4C80;
/// Removes a loop device from the system
pub const LOOP_CTL_REMOVE: u64 = 0x4C81;
/// Gets the number of the next available free loop device
pub const LOOP_CTL_GET_FREE: u64 = 0x4C82;
