//! USB Mass Storage through `/dev/usb/ehc`

use crate::ipc::format::{ioctlv_format, Arg, FormatError, IoctlError, Out};
use crate::ipc::{Fd, Ios, IpcError, DEVICE_PATH};
use crate::pool::{PoolError, PoolStats, ScratchPool};
use crate::storage::{IoBuf, Residency};
use core::borrow::BorrowMut;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Base of the UMS request codes, `'U' 'M' 'S'` in the upper three bytes
pub const UMS_BASE: u32 = 0x554D_5300;

/// UMS request codes understood by the EHCI service
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UmsIoctl {
    Init = 0x554D_5301,
    GetCapacity = 0x554D_5302,
    ReadSectors = 0x554D_5303,
    WriteSectors = 0x554D_5304,
}

impl UmsIoctl {
    /// Vector layout of the request
    pub fn format(self) -> &'static str {
        match self {
            UmsIoctl::Init => ":",
            UmsIoctl::GetCapacity => ":i",
            UmsIoctl::ReadSectors | UmsIoctl::WriteSectors => "ii:d",
        }
    }
}

/// Sector adapter error
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UmsError {
    /// The service connection is not open
    NotOpen,
    /// The service reported zero sectors
    NoMedium,
    /// The service reported a zero sector size
    InvalidGeometry,
    /// `count * sector_size` does not fit in `u32`
    TransferTooLarge,
    /// The caller's buffer is shorter than `count * sector_size`
    BufferTooSmall,
    /// Scratch pool error
    Pool(PoolError),
    /// Malformed request
    Format(FormatError),
    /// IOS rejected a request
    Ipc(IpcError),
}

impl From<PoolError> for UmsError {
    fn from(err: PoolError) -> Self {
        UmsError::Pool(err)
    }
}

impl From<IoctlError> for UmsError {
    fn from(err: IoctlError) -> Self {
        match err {
            IoctlError::Format(err) => UmsError::Format(err),
            IoctlError::Ipc(err) => UmsError::Ipc(err),
        }
    }
}

/// How read and write report a request IOS rejected
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusPolicy {
    /// Return the error to the caller
    #[default]
    Propagate,
    /// Report success once the request is dispatched, like the libogc
    /// `__io_usb2storage` driver
    Legacy,
}

/// Adapter configuration
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Device node of the service
    pub device: &'static str,
    pub status: StatusPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device: DEVICE_PATH,
            status: StatusPolicy::default(),
        }
    }
}

/// Connection state
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    #[default]
    Closed,
    /// Open, with the sector size of the last successful capacity query
    Open { fd: Fd, sector_size: u32 },
}

/// Reply to a capacity query
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Capacity {
    pub sectors: u32,
    pub sector_size: u32,
}

impl Capacity {
    /// Size of the medium in bytes
    pub fn bytes(&self) -> u64 {
        self.sectors as u64 * self.sector_size as u64
    }
}

/// USB Mass Storage sector adapter
///
/// Owns the service and a scratch region. The region has to satisfy the
/// residency requirement of the service; it becomes the scratch pool on the
/// first [init] and stays one until the adapter is taken apart with
/// [into_parts].
///
/// [init]: crate::storage::ums::UsbStorage::init
/// [into_parts]: crate::storage::ums::UsbStorage::into_parts
pub struct UsbStorage<I: Ios, Buf: BorrowMut<[u8]>> {
    ios: I,
    config: Config,
    region: Option<Buf>,
    pool: Option<ScratchPool<Buf>>,
    state: State,
    sector_size: Option<u32>,
}

impl<I, Buf> UsbStorage<I, Buf>
where
    I: Ios,
    Buf: BorrowMut<[u8]>,
{
    /// Creates a closed adapter
    ///
    /// # Arguments
    /// * `ios` - [Ios] implementation
    /// * `region` - Resident memory for the scratch pool. It is **recommended**
    /// to be [HEAP_SIZE] bytes long, transfers of general buffers larger than
    /// the region fail
    /// * `config` - [Config]
    ///
    /// [Ios]: crate::ipc::Ios
    /// [HEAP_SIZE]: crate::HEAP_SIZE
    pub fn new(ios: I, region: Buf, config: Config) -> UsbStorage<I, Buf> {
        UsbStorage {
            ios,
            config,
            region: Some(region),
            pool: None,
            state: State::Closed,
            sector_size: None,
        }
    }

    /// Opens the service and queries the capacity of the medium.
    ///
    /// Does nothing if already open. A failed capacity query closes the
    /// connection again.
    ///
    /// # Errors
    /// * [Pool] - the region cannot hold a pool
    /// * [Ipc] - the service cannot be opened
    /// * any error of [capacity]
    ///
    /// [Pool]: crate::storage::ums::UmsError::Pool
    /// [Ipc]: crate::storage::ums::UmsError::Ipc
    /// [capacity]: crate::storage::ums::UsbStorage::capacity
    pub fn init(&mut self) -> Result<(), UmsError> {
        if let State::Open { fd, .. } = self.state {
            trace!("ums: already open as {:?}", fd);
            return Ok(());
        }
        self.create_pool()?;

        let fd = self
            .ios
            .open(self.config.device, 0)
            .map_err(UmsError::Ipc)?;
        info!("ums: opened {} as {:?}", self.config.device, fd);

        if let Err(err) = send(&mut self.ios, fd, UmsIoctl::Init, &[], &mut []) {
            warn!("ums: init request failed: {:?}", err);
        }

        match self.query_capacity(fd) {
            Ok(capacity) => {
                self.state = State::Open {
                    fd,
                    sector_size: capacity.sector_size,
                };
                Ok(())
            }
            Err(err) => {
                warn!("ums: no usable medium: {:?}", err);
                self.close(fd);
                Err(err)
            }
        }
    }

    fn create_pool(&mut self) -> Result<(), UmsError> {
        if self.pool.is_some() {
            return Ok(());
        }
        let fits = self
            .region
            .as_ref()
            .is_some_and(|region| ScratchPool::<Buf>::fits(region.borrow()));
        if !fits {
            return Err(PoolError::TooSmall.into());
        }
        if let Some(region) = self.region.take() {
            let pool = ScratchPool::new(region)?;
            debug!("ums: scratch pool of {} bytes", pool.capacity());
            self.pool = Some(pool);
        }
        Ok(())
    }

    /// Queries the capacity of the medium and caches its sector size.
    ///
    /// # Errors
    /// * [NotOpen]
    /// * [NoMedium] - the service reported zero sectors
    /// * [InvalidGeometry] - the service reported a zero sector size
    /// * [Ipc]
    ///
    /// [NotOpen]: crate::storage::ums::UmsError::NotOpen
    /// [NoMedium]: crate::storage::ums::UmsError::NoMedium
    /// [InvalidGeometry]: crate::storage::ums::UmsError::InvalidGeometry
    /// [Ipc]: crate::storage::ums::UmsError::Ipc
    pub fn capacity(&mut self) -> Result<Capacity, UmsError> {
        let State::Open { fd, .. } = self.state else {
            return Err(UmsError::NotOpen);
        };
        let capacity = self.query_capacity(fd)?;
        self.state = State::Open {
            fd,
            sector_size: capacity.sector_size,
        };
        Ok(capacity)
    }

    fn query_capacity(&mut self, fd: Fd) -> Result<Capacity, UmsError> {
        let mut sector_size = 0u32;
        let sectors = send(
            &mut self.ios,
            fd,
            UmsIoctl::GetCapacity,
            &[],
            &mut [Out::U32(&mut sector_size)],
        )?;
        if sectors == 0 {
            return Err(UmsError::NoMedium);
        }
        if sector_size == 0 {
            return Err(UmsError::InvalidGeometry);
        }
        debug!("ums: {} sectors of {} bytes", sectors, sector_size);
        self.sector_size = Some(sector_size);
        Ok(Capacity {
            sectors,
            sector_size,
        })
    }

    /// Returns `true` if a capacity query succeeds
    pub fn is_inserted(&mut self) -> bool {
        self.capacity().is_ok()
    }

    /// Reads `count` sectors starting at `start` into the head of `buf`.
    ///
    /// A [General] buffer is read through a scratch block of the same size.
    ///
    /// # Errors
    /// * [NotOpen]
    /// * [TransferTooLarge]
    /// * [BufferTooSmall]
    /// * [Pool] - no scratch block for a [General] buffer
    /// * [Ipc] - only with [StatusPolicy::Propagate]
    ///
    /// [General]: crate::storage::IoBuf::General
    /// [NotOpen]: crate::storage::ums::UmsError::NotOpen
    /// [TransferTooLarge]: crate::storage::ums::UmsError::TransferTooLarge
    /// [BufferTooSmall]: crate::storage::ums::UmsError::BufferTooSmall
    /// [Pool]: crate::storage::ums::UmsError::Pool
    /// [Ipc]: crate::storage::ums::UmsError::Ipc
    pub fn read_sectors(
        &mut self,
        start: u32,
        count: u32,
        buf: IoBuf<&mut [u8]>,
    ) -> Result<(), UmsError> {
        let (fd, len) = self.transfer_len(count)?;
        let residency = buf.residency();
        let dst = buf
            .into_inner()
            .get_mut(..len)
            .ok_or(UmsError::BufferTooSmall)?;
        trace!("ums: read {} sectors at {}, {:?}", count, start, residency);

        let inputs = [Arg::U32(start), Arg::U32(count)];
        let ret = match residency {
            Residency::Resident => send(
                &mut self.ios,
                fd,
                UmsIoctl::ReadSectors,
                &inputs,
                &mut [Out::Data(dst)],
            ),
            Residency::General => {
                let pool = self.pool.as_mut().ok_or(UmsError::NotOpen)?;
                let mut block = pool.alloc(len)?;
                let ret = send(
                    &mut self.ios,
                    fd,
                    UmsIoctl::ReadSectors,
                    &inputs,
                    &mut [Out::Data(&mut block[..])],
                );
                if ret.is_ok() {
                    dst.copy_from_slice(&block[..]);
                }
                ret
            }
        };
        self.settle(UmsIoctl::ReadSectors, ret)
    }

    /// Writes `count` sectors starting at `start` from the head of `buf`.
    ///
    /// A [General] buffer is copied into a scratch block which is sent instead.
    ///
    /// # Errors
    /// Same as [read_sectors].
    ///
    /// [General]: crate::storage::IoBuf::General
    /// [read_sectors]: crate::storage::ums::UsbStorage::read_sectors
    pub fn write_sectors(
        &mut self,
        start: u32,
        count: u32,
        buf: IoBuf<&[u8]>,
    ) -> Result<(), UmsError> {
        let (fd, len) = self.transfer_len(count)?;
        let residency = buf.residency();
        let src = buf
            .into_inner()
            .get(..len)
            .ok_or(UmsError::BufferTooSmall)?;
        trace!("ums: write {} sectors at {}, {:?}", count, start, residency);

        let inputs = [Arg::U32(start), Arg::U32(count)];
        let ret = match residency {
            Residency::Resident => send(
                &mut self.ios,
                fd,
                UmsIoctl::WriteSectors,
                &inputs,
                &mut [Out::Source(src)],
            ),
            Residency::General => {
                let pool = self.pool.as_mut().ok_or(UmsError::NotOpen)?;
                let mut block = pool.alloc(len)?;
                block.copy_from_slice(src);
                send(
                    &mut self.ios,
                    fd,
                    UmsIoctl::WriteSectors,
                    &inputs,
                    &mut [Out::Source(&block[..])],
                )
            }
        };
        self.settle(UmsIoctl::WriteSectors, ret)
    }

    fn transfer_len(&self, count: u32) -> Result<(Fd, usize), UmsError> {
        let State::Open { fd, sector_size } = self.state else {
            return Err(UmsError::NotOpen);
        };
        let len = count
            .checked_mul(sector_size)
            .ok_or(UmsError::TransferTooLarge)?;
        Ok((fd, len as usize))
    }

    fn settle(&self, ioctl: UmsIoctl, ret: Result<u32, UmsError>) -> Result<(), UmsError> {
        match ret {
            Ok(_) => Ok(()),
            Err(UmsError::Ipc(err)) if self.config.status == StatusPolicy::Legacy => {
                warn!("ums: {:?} failed with {:?}, reported as done", ioctl, err);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Closes the service connection if open. The scratch pool is kept.
    pub fn deinit(&mut self) {
        if let State::Open { fd, .. } = self.state {
            self.close(fd);
        }
    }

    fn close(&mut self, fd: Fd) {
        if let Err(err) = self.ios.close(fd) {
            warn!("ums: close {:?} failed: {:?}", fd, err);
        }
        info!("ums: closed {:?}", fd);
        self.state = State::Closed;
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Sector size of the last successful capacity query, kept across
    /// [deinit]
    ///
    /// [deinit]: crate::storage::ums::UsbStorage::deinit
    pub fn sector_size(&self) -> Option<u32> {
        self.sector_size
    }

    /// Scratch pool counters, `None` before the first [init]
    ///
    /// [init]: crate::storage::ums::UsbStorage::init
    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.pool.as_ref().map(ScratchPool::stats)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ios(&self) -> &I {
        &self.ios
    }

    pub fn ios_mut(&mut self) -> &mut I {
        &mut self.ios
    }

    /// Closes the connection and gives back the service and the region
    pub fn into_parts(mut self) -> (I, Option<Buf>) {
        self.deinit();
        let region = self.pool.map(ScratchPool::into_inner).or(self.region);
        (self.ios, region)
    }
}

fn send<I: Ios>(
    ios: &mut I,
    fd: Fd,
    ioctl: UmsIoctl,
    inputs: &[Arg<'_>],
    outputs: &mut [Out<'_>],
) -> Result<u32, UmsError> {
    ioctlv_format(ios, fd, ioctl.into(), ioctl.format(), inputs, outputs)
        .map_err(UmsError::from)
}
