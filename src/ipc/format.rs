//! Formatted ioctlv requests
//!
//! A format string describes the vectors of a request: the input kinds, then
//! an optional `:` followed by the output kinds. `"ii:d"` sends two `u32`
//! scalars and one data block in the output position, `":"` sends nothing.
//!
//! | Kind | Vector |
//! | ---- | ------ |
//! | `b` | `u8` |
//! | `h` | `u16` |
//! | `i` | `u32` |
//! | `q` | `u64` |
//! | `d` | data block |
//!
//! Scalars travel big-endian, the byte order of the console's CPU.

use crate::ipc::{Fd, IoVec, Ios, IpcError};
use heapless::Vec;

/// Maximum number of vectors in a single request
pub const MAX_VECTORS: usize = 8;

const SCALAR_LEN: usize = 8;

/// Format descriptor error
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FormatError {
    /// Not one of `b`, `h`, `i`, `q`, `d`
    UnknownKind(u8),
    /// The number of arguments on one side differs from the number of kinds
    ArgCount { expected: usize, actual: usize },
    /// Argument at `index` (inputs first, then outputs) has the wrong kind
    KindMismatch { index: usize },
    /// More than [MAX_VECTORS] vectors
    TooManyVectors,
}

/// Error of a formatted request
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoctlError {
    /// The request was never sent
    Format(FormatError),
    /// IOS rejected the request
    Ipc(IpcError),
}

impl From<FormatError> for IoctlError {
    fn from(err: FormatError) -> Self {
        IoctlError::Format(err)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Kind {
    U8,
    U16,
    U32,
    U64,
    Data,
}

impl Kind {
    fn parse(c: u8) -> Result<Kind, FormatError> {
        match c {
            b'b' => Ok(Kind::U8),
            b'h' => Ok(Kind::U16),
            b'i' => Ok(Kind::U32),
            b'q' => Ok(Kind::U64),
            b'd' => Ok(Kind::Data),
            _ => Err(FormatError::UnknownKind(c)),
        }
    }

    fn width(self) -> usize {
        match self {
            Kind::U8 => 1,
            Kind::U16 => 2,
            Kind::U32 => 4,
            Kind::U64 => 8,
            Kind::Data => 0,
        }
    }
}

/// Input argument
#[derive(Debug, Copy, Clone)]
pub enum Arg<'a> {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Data(&'a [u8]),
}

impl Arg<'_> {
    fn kind(&self) -> Kind {
        match self {
            Arg::U8(_) => Kind::U8,
            Arg::U16(_) => Kind::U16,
            Arg::U32(_) => Kind::U32,
            Arg::U64(_) => Kind::U64,
            Arg::Data(_) => Kind::Data,
        }
    }

    fn encode(&self, slot: &mut [u8; SCALAR_LEN]) {
        match *self {
            Arg::U8(v) => slot[0] = v,
            Arg::U16(v) => slot[..2].copy_from_slice(&v.to_be_bytes()),
            Arg::U32(v) => slot[..4].copy_from_slice(&v.to_be_bytes()),
            Arg::U64(v) => *slot = v.to_be_bytes(),
            Arg::Data(_) => {}
        }
    }
}

/// Output argument
#[derive(Debug)]
pub enum Out<'a> {
    U8(&'a mut u8),
    U16(&'a mut u16),
    U32(&'a mut u32),
    U64(&'a mut u64),
    /// Data block filled by the service
    Data(&'a mut [u8]),
    /// Data block in the output position that the service only reads
    Source(&'a [u8]),
}

impl Out<'_> {
    fn kind(&self) -> Kind {
        match self {
            Out::U8(_) => Kind::U8,
            Out::U16(_) => Kind::U16,
            Out::U32(_) => Kind::U32,
            Out::U64(_) => Kind::U64,
            Out::Data(_) | Out::Source(_) => Kind::Data,
        }
    }

    fn decode(&mut self, slot: &[u8; SCALAR_LEN]) {
        match self {
            Out::U8(v) => **v = slot[0],
            Out::U16(v) => **v = u16::from_be_bytes([slot[0], slot[1]]),
            Out::U32(v) => **v = u32::from_be_bytes([slot[0], slot[1], slot[2], slot[3]]),
            Out::U64(v) => **v = u64::from_be_bytes(*slot),
            Out::Data(_) | Out::Source(_) => {}
        }
    }
}

fn split(format: &str) -> Result<(&[u8], &[u8]), FormatError> {
    let bytes = format.as_bytes();
    let (inputs, outputs) = match bytes.iter().position(|&c| c == b':') {
        Some(at) => (&bytes[..at], &bytes[at + 1..]),
        None => (bytes, &[][..]),
    };
    for &c in inputs.iter().chain(outputs) {
        Kind::parse(c)?;
    }
    Ok((inputs, outputs))
}

fn check(
    kinds: &[u8],
    args: impl ExactSizeIterator<Item = Kind>,
    first: usize,
) -> Result<(), FormatError> {
    if kinds.len() != args.len() {
        return Err(FormatError::ArgCount {
            expected: kinds.len(),
            actual: args.len(),
        });
    }
    for (index, (&c, kind)) in kinds.iter().zip(args).enumerate() {
        if Kind::parse(c)? != kind {
            return Err(FormatError::KindMismatch {
                index: first + index,
            });
        }
    }
    Ok(())
}

/// Sends a request described by `format`.
///
/// Output scalars are written back only if IOS accepts the request.
///
/// # Errors
/// * [Format] - `format` does not match the arguments, nothing was sent
/// * [Ipc] - IOS returned a negative code
///
/// [Format]: crate::ipc::format::IoctlError::Format
/// [Ipc]: crate::ipc::format::IoctlError::Ipc
pub fn ioctlv_format<I: Ios + ?Sized>(
    ios: &mut I,
    fd: Fd,
    request: u32,
    format: &str,
    inputs: &[Arg<'_>],
    outputs: &mut [Out<'_>],
) -> Result<u32, IoctlError> {
    let (in_kinds, out_kinds) = split(format)?;
    if in_kinds.len() + out_kinds.len() > MAX_VECTORS {
        return Err(FormatError::TooManyVectors.into());
    }
    check(in_kinds, inputs.iter().map(Arg::kind), 0)?;
    check(out_kinds, outputs.iter().map(Out::kind), inputs.len())?;

    let mut in_scalars = [[0u8; SCALAR_LEN]; MAX_VECTORS];
    let mut out_scalars = [[0u8; SCALAR_LEN]; MAX_VECTORS];
    for (arg, slot) in inputs.iter().zip(in_scalars.iter_mut()) {
        arg.encode(slot);
    }

    let ret = {
        let mut vectors: Vec<IoVec<'_>, MAX_VECTORS> = Vec::new();
        for (arg, slot) in inputs.iter().zip(in_scalars.iter()) {
            let vector = match arg {
                Arg::Data(data) => IoVec::In(*data),
                _ => IoVec::In(&slot[..arg.kind().width()]),
            };
            vectors
                .push(vector)
                .map_err(|_| FormatError::TooManyVectors)?;
        }
        for (out, slot) in outputs.iter_mut().zip(out_scalars.iter_mut()) {
            let width = out.kind().width();
            let vector = match out {
                Out::Data(data) => IoVec::Out(&mut **data),
                Out::Source(data) => IoVec::In(*data),
                _ => IoVec::Out(&mut slot[..width]),
            };
            vectors
                .push(vector)
                .map_err(|_| FormatError::TooManyVectors)?;
        }

        trace!(
            "ipc: ioctlv {:#x}, {} in, {} out",
            request,
            inputs.len(),
            vectors.len() - inputs.len()
        );
        ios.ioctlv(fd, request, inputs.len(), &mut vectors)
            .map_err(IoctlError::Ipc)?
    };

    for (out, slot) in outputs.iter_mut().zip(out_scalars.iter()) {
        out.decode(slot);
    }
    Ok(ret)
}
