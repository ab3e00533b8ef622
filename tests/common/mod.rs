#![allow(dead_code)]

use ios_ums::ipc::{Fd, IoVec, Ios, IpcError, IpcResult};
use ios_ums::storage::ums::UmsIoctl;
use std::sync::{Arc, Mutex};

/// A request as seen by the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub ioctl: UmsIoctl,
    pub num_in: usize,
    /// (writable, len) of every vector
    pub vectors: Vec<(bool, usize)>,
    /// Address of the data block, if any
    pub data_addr: Option<usize>,
}

/// In-memory stand-in for the EHCI service
#[derive(Clone)]
pub struct DummyIos {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    sector_size: u32,
    disk: Vec<u8>,
    medium: bool,
    reported_size: Option<u32>,
    open_error: Option<IpcError>,
    close_error: Option<IpcError>,
    capacity_error: Option<IpcError>,
    transfer_error: Option<IpcError>,
    next_fd: i32,
    open: Option<Fd>,
    opens: usize,
    closes: usize,
    paths: Vec<String>,
    requests: Vec<Request>,
}

impl DummyIos {
    pub fn new(sector_size: u32, sectors: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                sector_size,
                disk: vec![0u8; (sector_size * sectors) as usize],
                medium: true,
                reported_size: None,
                open_error: None,
                close_error: None,
                capacity_error: None,
                transfer_error: None,
                next_fd: 3,
                open: None,
                opens: 0,
                closes: 0,
                paths: vec![],
                requests: vec![],
            })),
        }
    }

    /// Zero sectors are reported while the medium is absent
    pub fn set_medium(&self, present: bool) {
        self.inner.lock().unwrap().medium = present;
    }

    pub fn reject_open(&self, err: Option<IpcError>) {
        self.inner.lock().unwrap().open_error = err;
    }

    /// Replies to capacity queries with `size` instead of the real sector size
    pub fn report_sector_size(&self, size: Option<u32>) {
        self.inner.lock().unwrap().reported_size = size;
    }

    /// Fails `close` with `err`, leaving the descriptor open
    pub fn fail_close(&self, err: Option<IpcError>) {
        self.inner.lock().unwrap().close_error = err;
    }

    /// Fails every capacity query with `err`
    pub fn fail_capacity(&self, err: Option<IpcError>) {
        self.inner.lock().unwrap().capacity_error = err;
    }

    /// Fails every read and write with `err`
    pub fn fail_transfers(&self, err: Option<IpcError>) {
        self.inner.lock().unwrap().transfer_error = err;
    }

    pub fn opens(&self) -> usize {
        self.inner.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.inner.lock().unwrap().closes
    }

    pub fn open_fd(&self) -> Option<Fd> {
        self.inner.lock().unwrap().open
    }

    pub fn paths(&self) -> Vec<String> {
        self.inner.lock().unwrap().paths.clone()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn ioctls(&self) -> Vec<UmsIoctl> {
        self.requests().iter().map(|r| r.ioctl).collect()
    }

    /// Raw disk contents of `count` sectors at `start`
    pub fn sectors(&self, start: u32, count: u32) -> Vec<u8> {
        let lock = self.inner.lock().unwrap();
        let size = lock.sector_size as usize;
        let offset = start as usize * size;
        lock.disk[offset..offset + count as usize * size].to_vec()
    }
}

impl Inner {
    fn sector_count(&self) -> u32 {
        (self.disk.len() / self.sector_size as usize) as u32
    }

    /// Byte range addressed by the (start, count) scalars of a transfer
    fn span(&self, vectors: &[IoVec<'_>]) -> IpcResult<(usize, usize)> {
        let start = u32::from_be_bytes(vectors[0].as_bytes().try_into().unwrap());
        let count = u32::from_be_bytes(vectors[1].as_bytes().try_into().unwrap());
        if start as u64 + count as u64 > self.sector_count() as u64 {
            return Err(IpcError::InvalidArgument);
        }
        let size = self.sector_size as usize;
        Ok((start as usize * size, count as usize * size))
    }
}

impl Ios for DummyIos {
    fn open(&mut self, path: &str, mode: u8) -> IpcResult<Fd> {
        assert_eq!(0, mode);
        let mut lock = self.inner.lock().unwrap();
        lock.paths.push(path.to_string());
        if let Some(err) = lock.open_error {
            return Err(err);
        }
        assert!(lock.open.is_none(), "service opened twice");

        let fd = Fd(lock.next_fd);
        lock.next_fd += 1;
        lock.open = Some(fd);
        lock.opens += 1;
        Ok(fd)
    }

    fn close(&mut self, fd: Fd) -> IpcResult<()> {
        let mut lock = self.inner.lock().unwrap();
        if lock.open != Some(fd) {
            return Err(IpcError::InvalidArgument);
        }
        if let Some(err) = lock.close_error {
            return Err(err);
        }
        lock.open = None;
        lock.closes += 1;
        Ok(())
    }

    fn ioctlv(
        &mut self,
        fd: Fd,
        request: u32,
        num_in: usize,
        vectors: &mut [IoVec<'_>],
    ) -> IpcResult<u32> {
        let mut lock = self.inner.lock().unwrap();
        if lock.open != Some(fd) {
            return Err(IpcError::InvalidArgument);
        }
        let ioctl = UmsIoctl::try_from(request).map_err(|_| IpcError::InvalidArgument)?;
        lock.requests.push(Request {
            ioctl,
            num_in,
            vectors: vectors
                .iter()
                .map(|v| (matches!(v, IoVec::Out(_)), v.len()))
                .collect(),
            data_addr: vectors.get(2).map(|v| v.as_bytes().as_ptr() as usize),
        });

        match ioctl {
            UmsIoctl::Init => {
                assert!(vectors.is_empty());
                Ok(0)
            }
            UmsIoctl::GetCapacity => {
                assert_eq!((0, 1), (num_in, vectors.len()));
                if let Some(err) = lock.capacity_error {
                    return Err(err);
                }
                if !lock.medium {
                    return Ok(0);
                }
                let size = lock.reported_size.unwrap_or(lock.sector_size);
                let out = vectors[0].as_mut_bytes().unwrap();
                out.copy_from_slice(&size.to_be_bytes());
                Ok(lock.sector_count())
            }
            UmsIoctl::ReadSectors => {
                assert_eq!((2, 3), (num_in, vectors.len()));
                if let Some(err) = lock.transfer_error {
                    return Err(err);
                }
                let (offset, len) = lock.span(vectors)?;
                let out = vectors[2].as_mut_bytes().unwrap();
                assert_eq!(len, out.len());
                out.copy_from_slice(&lock.disk[offset..offset + len]);
                Ok(0)
            }
            UmsIoctl::WriteSectors => {
                assert_eq!((2, 3), (num_in, vectors.len()));
                if let Some(err) = lock.transfer_error {
                    return Err(err);
                }
                let (offset, len) = lock.span(vectors)?;
                let data = vectors[2].as_bytes();
                assert_eq!(len, data.len());
                lock.disk[offset..offset + len].copy_from_slice(data);
                Ok(0)
            }
        }
    }
}

/// `len` bytes of a recognizable pattern
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 512) as u8).collect()
}
