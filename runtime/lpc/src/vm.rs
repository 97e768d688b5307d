//! User address spaces
//!
//! LPC never dereferences caller-supplied addresses directly. Message bodies
//! are copied between a thread's user address space and kernel buffers
//! through the [`AddressSpace`] trait, and any address that is not mapped
//! makes the copy fail with [`LpcError::Fault`].
//!
//! [`UserMemory`] is a sparse, region-mapped address space used as the host
//! backing for threads.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use crate::error::LpcError;
use crate::sync::lock;
use crate::Result;

/// Virtual address in a user address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct UserAddr(u64);

impl UserAddr {
    /// Null user address
    pub const NULL: UserAddr = UserAddr(0);

    /// Create a user address
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Raw address value
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Whether this is the null address
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Address `offset` bytes further on
    #[inline]
    pub fn offset(&self, offset: u64) -> Option<UserAddr> {
        self.0.checked_add(offset).map(UserAddr)
    }
}

impl fmt::Display for UserAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Cross-address-space copy service
///
/// Implementations must copy all of the requested bytes or none of them.
pub trait AddressSpace: Send + Sync {
    /// Copy `dst.len()` bytes from user address `src` into kernel buffer `dst`
    fn copy_in(&self, src: UserAddr, dst: &mut [u8]) -> Result<()>;

    /// Copy kernel buffer `src` to user address `dst`
    fn copy_out(&self, dst: UserAddr, src: &[u8]) -> Result<()>;
}

/// One mapped region of a [`UserMemory`]
struct Region {
    bytes: Vec<u8>,
}

/// Sparse user address space made of mapped regions
///
/// Regions never overlap. A copy is allowed only if every byte it touches
/// lies inside a single mapped region.
#[derive(Default)]
pub struct UserMemory {
    /// Regions keyed by base address
    regions: Mutex<BTreeMap<u64, Region>>,
}

impl UserMemory {
    /// Create an empty address space
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `len` zeroed bytes at `base`
    ///
    /// # Errors
    ///
    /// Returns `Fault` if the region is empty, wraps the address space,
    /// or overlaps an existing mapping.
    pub fn map(&self, base: UserAddr, len: usize) -> Result<()> {
        let start = base.as_u64();
        let end = start
            .checked_add(len as u64)
            .filter(|_| len > 0 && !base.is_null())
            .ok_or(LpcError::Fault { addr: base })?;

        let mut regions = lock(&self.regions);

        // Nearest region at or below `end` must finish before `start`
        if let Some((&other, region)) = regions.range(..end).next_back() {
            if other + region.bytes.len() as u64 > start {
                return Err(LpcError::Fault { addr: base });
            }
        }

        regions.insert(start, Region { bytes: vec![0; len] });
        log::trace!("vm: mapped [{:#x}, {:#x})", start, end);
        Ok(())
    }

    /// Remove the region starting at `base`
    pub fn unmap(&self, base: UserAddr) -> Result<()> {
        lock(&self.regions)
            .remove(&base.as_u64())
            .map(|_| ())
            .ok_or(LpcError::Fault { addr: base })
    }

    /// Write `bytes` at `addr` (test and loader helper)
    pub fn write(&self, addr: UserAddr, bytes: &[u8]) -> Result<()> {
        self.copy_out(addr, bytes)
    }

    /// Read `len` bytes at `addr` (test and loader helper)
    pub fn read(&self, addr: UserAddr, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0; len];
        self.copy_in(addr, &mut buf)?;
        Ok(buf)
    }

    /// Run `f` on the mapped bytes `[addr, addr + len)`
    fn with_range<R>(
        &self,
        addr: UserAddr,
        len: usize,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R> {
        let fault = LpcError::Fault { addr };
        let start = addr.as_u64();
        let end = start.checked_add(len as u64).ok_or(fault)?;

        let mut regions = lock(&self.regions);
        let (&base, region) = regions.range_mut(..=start).next_back().ok_or(fault)?;

        let region_end = base + region.bytes.len() as u64;
        if addr.is_null() || end > region_end {
            return Err(fault);
        }

        let offset = (start - base) as usize;
        Ok(f(&mut region.bytes[offset..offset + len]))
    }
}

impl AddressSpace for UserMemory {
    fn copy_in(&self, src: UserAddr, dst: &mut [u8]) -> Result<()> {
        self.with_range(src, dst.len(), |bytes| dst.copy_from_slice(bytes))
    }

    fn copy_out(&self, dst: UserAddr, src: &[u8]) -> Result<()> {
        self.with_range(dst, src.len(), |bytes| bytes.copy_from_slice(src))
    }
}

impl fmt::Debug for UserMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let regions = lock(&self.regions);
        f.debug_map()
            .entries(
                regions
                    .iter()
                    .map(|(base, r)| (UserAddr(*base), r.bytes.len())),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_within_region() {
        let mem = UserMemory::new();
        mem.map(UserAddr::new(0x1000), 0x100).unwrap();

        mem.write(UserAddr::new(0x1010), b"hello").unwrap();
        assert_eq!(mem.read(UserAddr::new(0x1010), 5).unwrap(), b"hello");

        let mut buf = [0u8; 3];
        mem.copy_in(UserAddr::new(0x1011), &mut buf).unwrap();
        assert_eq!(&buf, b"ell");
    }

    #[test]
    fn test_unmapped_access_faults() {
        let mem = UserMemory::new();
        mem.map(UserAddr::new(0x1000), 0x10).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(
            mem.copy_in(UserAddr::new(0x2000), &mut buf),
            Err(LpcError::Fault { addr: UserAddr::new(0x2000) })
        );
        assert!(mem.copy_in(UserAddr::NULL, &mut buf).is_err());
        assert!(mem.copy_out(UserAddr::new(0xfff), &buf).is_err());
    }

    #[test]
    fn test_copy_straddling_region_end_copies_nothing() {
        let mem = UserMemory::new();
        mem.map(UserAddr::new(0x1000), 0x10).unwrap();

        assert!(mem.write(UserAddr::new(0x100e), b"abcd").is_err());
        assert_eq!(mem.read(UserAddr::new(0x100e), 2).unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_overlapping_map_rejected() {
        let mem = UserMemory::new();
        mem.map(UserAddr::new(0x1000), 0x100).unwrap();

        assert!(mem.map(UserAddr::new(0x10f0), 0x20).is_err());
        assert!(mem.map(UserAddr::new(0x0f80), 0x100).is_err());
        assert!(mem.map(UserAddr::new(0x1100), 0x10).is_ok());
        assert!(mem.map(UserAddr::NULL, 0x10).is_err());
        assert!(mem.map(UserAddr::new(0x5000), 0).is_err());
    }

    #[test]
    fn test_unmap() {
        let mem = UserMemory::new();
        mem.map(UserAddr::new(0x1000), 0x10).unwrap();
        mem.unmap(UserAddr::new(0x1000)).unwrap();
        assert!(mem.read(UserAddr::new(0x1000), 1).is_err());
        assert!(mem.unmap(UserAddr::new(0x1000)).is_err());
    }
}
