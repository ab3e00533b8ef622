//! USB Mass Storage sector access for the IOS `/dev/usb/ehc` service
//!
//! The SCSI command set and the Bulk Only Transport live inside the service.
//! This crate only builds the service's control requests and stages caller
//! buffers that the service cannot reach.
//!
//! # Layers:
//! * [IPC] - the service seam, implement [Ios] for your platform
//! * [Formatted requests] - ioctlv vectors built from `"ii:d"`-style formats
//! * [Scratch pool] - resident memory for buffers the service cannot reach
//! * [Sector adapter] - init, capacity, read and write sectors
//! * [Disc interface] - the boolean slot table a filesystem layer calls
//!
//! # Features
//! | Feature | Description                           |
//! | ------- |---------------------------------------|
//! | `disc` | Include the disc interface            |
//! | `defmt` | Enable logging via [defmt](https://crates.io/crates/defmt) crate |
//! | `log` | Enable logging via [log](https://crates.io/crates/log) crate |
//!
//! [IPC]: crate::ipc
//! [Ios]: crate::ipc::Ios
//! [Formatted requests]: crate::ipc::format
//! [Scratch pool]: crate::pool
//! [Sector adapter]: crate::storage::ums
//! [Disc interface]: crate::disc

#![no_std]

#[cfg(all(feature = "defmt", feature = "log"))]
compile_error!("features `defmt` and `log` are mutually exclusive");

#[macro_use]
mod fmt;

#[cfg(feature = "disc")]
pub mod disc;
pub mod ipc;
pub mod pool;
pub mod storage;

/// Default size of the scratch region, in bytes
pub const HEAP_SIZE: usize = 0x8000;
