//! Sector storage behind the IOS service

use core::ops::Deref;

pub mod ums;

/// Whether the service can address a buffer directly
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Residency {
    /// The buffer lives in MEM2 and is passed to the service as is
    Resident,
    /// The buffer has to be staged through the scratch pool
    General,
}

impl Residency {
    /// Classifies an address by the MEM2 windows, cached `0x90` and
    /// uncached `0xD0`.
    pub fn of_addr(addr: usize) -> Residency {
        match addr >> 24 {
            0x90 | 0xD0 => Residency::Resident,
            _ => Residency::General,
        }
    }
}

/// A transfer buffer tagged with its [Residency]
#[derive(Debug)]
pub enum IoBuf<B> {
    Resident(B),
    General(B),
}

impl<B> IoBuf<B> {
    pub fn new(residency: Residency, buf: B) -> IoBuf<B> {
        match residency {
            Residency::Resident => IoBuf::Resident(buf),
            Residency::General => IoBuf::General(buf),
        }
    }

    pub fn residency(&self) -> Residency {
        match self {
            IoBuf::Resident(_) => Residency::Resident,
            IoBuf::General(_) => Residency::General,
        }
    }

    pub fn into_inner(self) -> B {
        match self {
            IoBuf::Resident(buf) | IoBuf::General(buf) => buf,
        }
    }
}

impl<B: Deref<Target = [u8]>> IoBuf<B> {
    /// Tags a buffer by its address
    pub fn classify(buf: B) -> IoBuf<B> {
        IoBuf::new(Residency::of_addr(buf.as_ptr() as usize), buf)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{IoBuf, Residency};

    #[test]
    fn mem2_windows_are_resident() {
        assert_eq!(Residency::Resident, Residency::of_addr(0x9000_0000));
        assert_eq!(Residency::Resident, Residency::of_addr(0x90FF_FFE0));
        assert_eq!(Residency::Resident, Residency::of_addr(0xD012_3400));
    }

    #[test]
    fn mem1_is_general() {
        assert_eq!(Residency::General, Residency::of_addr(0x8000_3000));
        assert_eq!(Residency::General, Residency::of_addr(0xC17F_0000));
        assert_eq!(Residency::General, Residency::of_addr(0x0090_0000));
    }

    #[test]
    fn tag_follows_residency() {
        let mut data = [0u8; 4];
        let buf = IoBuf::new(Residency::Resident, data.as_mut_slice());
        assert_eq!(Residency::Resident, buf.residency());
        assert_eq!(4, buf.into_inner().len());
        assert_eq!(
            Residency::General,
            IoBuf::new(Residency::General, &data[..]).residency()
        );
    }
}
