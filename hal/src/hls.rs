//! Hart-local storage.
//!
//! Every secondary hart gets one block carved from a bump arena:
//!
//! ```text
//! block start                          tp (64-byte aligned)        block end
//! | pad | stack (grows down) .......... | .tdata | .tbss | (slack) |
//! ```
//!
//! The thread pointer sits at `(start + cacheline + min_stack)` rounded
//! down to a cache line, so the stack below it is at least `min_stack`
//! bytes and the TLS image above it always fits. Blocks are never freed.

use crate::cache::CacheMaintenance;
use crate::config::PlfConfig;
use crate::error::{HalError, HalResult};

/// Link-time thread-local template: `.tdata` contents followed by a
/// zero-initialized `.tbss` region.
#[derive(Debug, Clone, Copy)]
pub struct TlsImage<'a> {
    pub tdata: &'a [u8],
    /// Offset of `.tbss` from the start of `.tdata`.
    pub tbss_offset: usize,
    pub tbss_len: usize,
}

impl<'a> TlsImage<'a> {
    pub const EMPTY: Self = Self {
        tdata: &[],
        tbss_offset: 0,
        tbss_len: 0,
    };

    pub const fn new(tdata: &'a [u8], tbss_len: usize) -> Self {
        Self {
            tdata,
            tbss_offset: tdata.len(),
            tbss_len,
        }
    }

    /// Bytes from the start of `.tdata` to the end of `.tbss`.
    pub fn size(&self) -> usize {
        self.tdata.len().max(self.tbss_offset + self.tbss_len)
    }
}

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
impl TlsImage<'static> {
    /// Template described by the linker script symbols.
    ///
    /// # Safety
    ///
    /// The `_tdata_*`/`_tbss_*` symbols must delimit the TLS template and
    /// `.tdata` must not be written while the image is in use.
    pub unsafe fn from_linker() -> Self {
        unsafe extern "C" {
            static _tdata_start: u8;
            static _tdata_end: u8;
            static _tbss_start: u8;
            static _tbss_end: u8;
        }
        let tdata_start = &raw const _tdata_start as usize;
        let tdata_end = &raw const _tdata_end as usize;
        let tbss_start = &raw const _tbss_start as usize;
        let tbss_end = &raw const _tbss_end as usize;
        Self {
            tdata: unsafe {
                core::slice::from_raw_parts(tdata_start as *const u8, tdata_end - tdata_start)
            },
            tbss_offset: tbss_start - tdata_start,
            tbss_len: tbss_end - tbss_start,
        }
    }
}

/// Size of one hart-local block. Depends only on link-time layout.
pub fn compute_hls_size(image: &TlsImage, config: &PlfConfig) -> usize {
    image.size() + config.cacheline + config.hls_min_stack
}

/// Program-break style allocator over a fixed region.
pub struct BumpArena<'a> {
    mem: &'a mut [u8],
    brk: usize,
}

impl<'a> BumpArena<'a> {
    pub fn new(mem: &'a mut [u8]) -> Self {
        Self { mem, brk: 0 }
    }

    /// # Safety
    ///
    /// `[base, base + len)` must be valid for writes for `'a` and not
    /// aliased by any other live reference.
    pub unsafe fn from_raw(base: *mut u8, len: usize) -> Self {
        Self::new(unsafe { core::slice::from_raw_parts_mut(base, len) })
    }

    pub fn base(&self) -> usize {
        self.mem.as_ptr() as usize
    }

    pub fn capacity(&self) -> usize {
        self.mem.len()
    }

    pub fn used(&self) -> usize {
        self.brk
    }

    pub fn remaining(&self) -> usize {
        self.mem.len() - self.brk
    }

    /// Move the break up by `size` bytes and return the offset of the old
    /// break. Fails without side effects when the region is exhausted.
    pub fn sbrk(&mut self, size: usize) -> HalResult<usize> {
        if size > self.remaining() {
            return Err(HalError::OutOfMemory);
        }
        let old = self.brk;
        self.brk += size;
        Ok(old)
    }

    pub fn block(&self, block: &HlsBlock) -> &[u8] {
        &self.mem[block.offset..block.offset + block.len]
    }

    pub fn block_mut(&mut self, block: &HlsBlock) -> &mut [u8] {
        &mut self.mem[block.offset..block.offset + block.len]
    }

    /// Absolute thread pointer of `block`, the value a hart loads into `tp`.
    pub fn thread_pointer(&self, block: &HlsBlock) -> usize {
        self.base() + block.offset + block.tp_offset
    }
}

/// Handle to one hart-local block inside a [`BumpArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HlsBlock {
    pub offset: usize,
    pub len: usize,
    /// Thread pointer relative to the block start. Also the initial stack
    /// pointer: the stack occupies `[0, tp_offset)`.
    pub tp_offset: usize,
}

impl HlsBlock {
    pub fn stack_len(&self) -> usize {
        self.tp_offset
    }

    pub fn tls_range(&self, image: &TlsImage) -> core::ops::Range<usize> {
        self.tp_offset..self.tp_offset + image.size()
    }
}

/// Carve one hart-local block. `Err(OutOfMemory)` leaves the arena untouched.
pub fn allocate_thread_block(
    arena: &mut BumpArena,
    image: &TlsImage,
    config: &PlfConfig,
) -> HalResult<HlsBlock> {
    let len = compute_hls_size(image, config);
    let offset = arena.sbrk(len)?;
    let start = arena.base() + offset;
    let tp = (start + config.cacheline + config.hls_min_stack) & !(config.cacheline - 1);
    Ok(HlsBlock {
        offset,
        len,
        tp_offset: tp - start,
    })
}

/// Copy the TLS template into `block` and clear its `.tbss`.
pub fn init_tls<C: CacheMaintenance>(
    arena: &mut BumpArena,
    block: &HlsBlock,
    image: &TlsImage,
    config: &PlfConfig,
) {
    let range = block.tls_range(image);
    let tls = &mut arena.block_mut(block)[range];
    write_image(tls, image);
    if C::SOFTWARE_MANAGED || config.flush_tls {
        // The target hart may bring its caches up after this one wrote
        // the image; push it past L1 now.
        C::flush_range(tls.as_ptr() as usize, tls.len());
    }
}

/// Initialize the TLS area at an absolute thread pointer, as the boot hart
/// does for its own `tp`.
///
/// # Safety
///
/// `[tp, tp + image.size())` must be writable and not aliased.
pub unsafe fn init_tls_at<C: CacheMaintenance>(tp: usize, image: &TlsImage, flush: bool) {
    let size = image.size();
    if size == 0 {
        return;
    }
    let tls = unsafe { core::slice::from_raw_parts_mut(tp as *mut u8, size) };
    write_image(tls, image);
    if C::SOFTWARE_MANAGED || flush {
        C::flush_range(tp, size);
    }
}

fn write_image(tls: &mut [u8], image: &TlsImage) {
    tls[..image.tdata.len()].copy_from_slice(image.tdata);
    tls[image.tbss_offset..image.tbss_offset + image.tbss_len].fill(0);
}
