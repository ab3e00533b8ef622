//! IOS inter-process communication

use num_enum::FromPrimitive;

pub mod format;

/// Path of the EHCI service that implements USB Mass Storage
pub const DEVICE_PATH: &str = "/dev/usb/ehc";

/// Descriptor of an open IOS device
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Fd(pub i32);

pub type IpcResult<T> = Result<T, IpcError>;

/// IPC error codes.
///
/// Unknown negative codes are kept as [Other].
///
/// [Other]: crate::ipc::IpcError::Other
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IpcError {
    InvalidArgument = -4,
    NoHeap = -5,
    NotFound = -6,
    QueueFull = -8,
    NoMemory = -22,
    #[num_enum(catch_all)]
    Other(i32),
}

impl IpcError {
    /// Splits a raw IOS return value into a reply and an error
    pub fn check(ret: i32) -> IpcResult<u32> {
        if ret < 0 {
            Err(IpcError::from_primitive(ret))
        } else {
            Ok(ret as u32)
        }
    }

    pub fn code(&self) -> i32 {
        match *self {
            IpcError::InvalidArgument => -4,
            IpcError::NoHeap => -5,
            IpcError::NotFound => -6,
            IpcError::QueueFull => -8,
            IpcError::NoMemory => -22,
            IpcError::Other(code) => code,
        }
    }
}

/// A single ioctlv vector
#[derive(Debug)]
pub enum IoVec<'a> {
    /// Memory the service reads
    In(&'a [u8]),
    /// Memory the service writes
    Out(&'a mut [u8]),
}

impl IoVec<'_> {
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            IoVec::In(bytes) => *bytes,
            IoVec::Out(bytes) => &**bytes,
        }
    }

    /// Returns `None` for memory the service is not allowed to write
    pub fn as_mut_bytes(&mut self) -> Option<&mut [u8]> {
        match self {
            IoVec::In(_) => None,
            IoVec::Out(bytes) => Some(&mut **bytes),
        }
    }
}

/// The privileged IOS kernel.
///
/// An implementation of this trait forwards requests to the platform's IPC
/// mechanism. Every call blocks until IOS replies. Memory behind every
/// [IoVec] handed to [ioctlv] is expected to satisfy the residency
/// requirement of the service; the [adapter] guarantees that for sector data.
///
/// [ioctlv]: crate::ipc::Ios::ioctlv
/// [adapter]: crate::storage::ums::UsbStorage
pub trait Ios {
    /// Opens a device node.
    fn open(&mut self, path: &str, mode: u8) -> IpcResult<Fd>;

    /// Closes a descriptor returned by [open].
    ///
    /// [open]: crate::ipc::Ios::open
    fn close(&mut self, fd: Fd) -> IpcResult<()>;

    /// Sends a vectored control request.
    ///
    /// The first `num_in` entries of `vectors` are inputs, the rest are
    /// in/out vectors. Returns the non-negative reply of the service.
    fn ioctlv(
        &mut self,
        fd: Fd,
        request: u32,
        num_in: usize,
        vectors: &mut [IoVec<'_>],
    ) -> IpcResult<u32>;
}

#[cfg(test)]
mod tests {
    use crate::ipc::IpcError;

    #[test]
    fn codes_match_discriminants() {
        for err in [
            IpcError::InvalidArgument,
            IpcError::NoHeap,
            IpcError::NotFound,
            IpcError::QueueFull,
            IpcError::NoMemory,
            IpcError::Other(-1),
            IpcError::Other(-1017),
        ] {
            assert_eq!(Err(err), IpcError::check(err.code()));
        }
        assert_eq!(-6, IpcError::NotFound.code());
        assert_eq!(Ok(7), IpcError::check(7));
    }
}
