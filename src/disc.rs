//! Disc interface
//!
//! The slot table a FAT layer calls into. Every slot reports a plain `bool`;
//! transfer buffers are tagged by [IoBuf::classify].
//!
//! [IoBuf::classify]: crate::storage::IoBuf::classify

use crate::ipc::Ios;
use crate::storage::ums::UsbStorage;
use crate::storage::IoBuf;
use bitflags::bitflags;
use core::borrow::BorrowMut;

/// Device type of USB storage, `'W' 'U' 'S' 'B'`
pub const DEVICE_TYPE_WII_USB: u32 = 0x5755_5342;

bitflags! {
    /// Capabilities of a disc interface
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct Features: u32 {
        const CAN_READ = 0x0000_0001;
        const CAN_WRITE = 0x0000_0002;
        const GAMECUBE_SLOT_A = 0x0000_0010;
        const GAMECUBE_SLOT_B = 0x0000_0020;
        const GAMECUBE_DVD = 0x0000_0040;
        const WII_SD = 0x0000_0100;
        const WII_USB = 0x0000_0200;
        const WII_DVD = 0x0000_0400;
    }
}

/// Sector-level medium access
pub trait DiscInterface {
    /// Device type code
    const IO_TYPE: u32;
    const FEATURES: Features;

    fn startup(&mut self) -> bool;

    fn is_inserted(&mut self) -> bool;

    fn read_sectors(&mut self, sector: u32, count: u32, buf: &mut [u8]) -> bool;

    fn write_sectors(&mut self, sector: u32, count: u32, buf: &[u8]) -> bool;

    fn clear_status(&mut self) -> bool;

    fn shutdown(&mut self) -> bool;
}

impl<I, Buf> DiscInterface for UsbStorage<I, Buf>
where
    I: Ios,
    Buf: BorrowMut<[u8]>,
{
    const IO_TYPE: u32 = DEVICE_TYPE_WII_USB;
    const FEATURES: Features = Features::CAN_READ
        .union(Features::CAN_WRITE)
        .union(Features::WII_USB);

    fn startup(&mut self) -> bool {
        self.init().is_ok()
    }

    fn is_inserted(&mut self) -> bool {
        UsbStorage::is_inserted(self)
    }

    fn read_sectors(&mut self, sector: u32, count: u32, buf: &mut [u8]) -> bool {
        UsbStorage::read_sectors(self, sector, count, IoBuf::classify(buf)).is_ok()
    }

    fn write_sectors(&mut self, sector: u32, count: u32, buf: &[u8]) -> bool {
        UsbStorage::write_sectors(self, sector, count, IoBuf::classify(buf)).is_ok()
    }

    fn clear_status(&mut self) -> bool {
        true
    }

    fn shutdown(&mut self) -> bool {
        self.deinit();
        true
    }
}
