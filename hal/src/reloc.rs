//! Copying load-time images of `.rodata`/`.data` to their run addresses.
//!
//! Images that execute from ROM keep initialized data at a load address
//! and copy it to RAM before anything reads a global.

use core::ptr;

/// One relocatable section: run range `[start, end)` and the address its
/// initial contents were loaded at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocInfo {
    pub start: usize,
    pub end: usize,
    pub load: usize,
}

impl RelocInfo {
    pub const NONE: Self = Self {
        start: 0,
        end: 0,
        load: 0,
    };

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sections already running where they were loaded need no copy.
    pub fn needs_copy(&self) -> bool {
        self.start != self.load && !self.is_empty()
    }

    /// Copy the section to its run address. Returns whether anything was
    /// copied.
    ///
    /// # Safety
    ///
    /// Both ranges must be valid for `len()` bytes and nothing may hold a
    /// reference into the destination.
    pub unsafe fn apply(&self) -> bool {
        if !self.needs_copy() {
            return false;
        }
        unsafe { ptr::copy(self.load as *const u8, self.start as *mut u8, self.len()) };
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocations {
    pub rodata: RelocInfo,
    pub data: RelocInfo,
}

impl Relocations {
    pub const NONE: Self = Self {
        rodata: RelocInfo::NONE,
        data: RelocInfo::NONE,
    };

    /// Read-only data first, then data. Returns the number of sections copied.
    ///
    /// # Safety
    ///
    /// See [`RelocInfo::apply`].
    pub unsafe fn apply(&self) -> usize {
        let mut copied = 0;
        for section in [&self.rodata, &self.data] {
            if unsafe { section.apply() } {
                copied += 1;
            }
        }
        copied
    }
}

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
impl Relocations {
    /// Sections described by the linker script. Scripts without
    /// relocation must still define the symbols, with `load == start`.
    ///
    /// # Safety
    ///
    /// The `__rel*` symbols must be defined by the linker script.
    pub unsafe fn from_linker() -> Self {
        unsafe extern "C" {
            static __relrodata_start: u8;
            static __relrodata_end: u8;
            static __relrodata_load_start: u8;
            static __reldata_start: u8;
            static __reldata_end: u8;
            static __reldata_load_start: u8;
        }
        Self {
            rodata: RelocInfo {
                start: &raw const __relrodata_start as usize,
                end: &raw const __relrodata_end as usize,
                load: &raw const __relrodata_load_start as usize,
            },
            data: RelocInfo {
                start: &raw const __reldata_start as usize,
                end: &raw const __reldata_end as usize,
                load: &raw const __reldata_load_start as usize,
            },
        }
    }
}

impl Default for Relocations {
    fn default() -> Self {
        Self::NONE
    }
}
