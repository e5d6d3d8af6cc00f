//! 32-bit x86.
//!
//! libc owns `GS` for ELF TLS, so the TLBR is an `FS` segment backed by a GDT entry from
//! `set_thread_area`. Word 0 of the thread block points at itself.

use super::{RegisterMap, Tag};

#[derive(Debug, Copy, Clone)]
pub struct X86;

impl RegisterMap for X86 {
    const TAG: Tag = Tag::X86;
    const LOAD_SEQUENCE: &'static str = crate::__x86_load_sequence!("{base}");
    const SLOT_OFFSET: usize = crate::__x86_slot_offset!();
    const WORD_SIZE: usize = 4;
}

#[doc(hidden)]
#[macro_export]
macro_rules! __x86_load_sequence {
    ($dest:literal) => {
        concat!("mov ", $dest, ", dword ptr fs:[0]")
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __x86_task_slot {
    ($base:literal) => {
        concat!("dword ptr [", $base, " + ", $crate::__x86_slot_offset!(), "]")
    };
}

/// Byte offset of the task context slot, as a literal so assembly text can embed it.
#[doc(hidden)]
#[macro_export]
macro_rules! __x86_slot_offset {
    () => {
        4
    };
}

#[cfg(target_arch = "x86")]
mod native {
    use std::arch::asm;
    use std::io;

    use super::X86;
    use crate::arch::{Bind, ContextAccessor};
    use crate::tls::ThreadBlock;

    /// `struct user_desc` from asm/ldt.h, bitfields packed into `flags`.
    #[repr(C)]
    struct UserDesc {
        entry_number: u32,
        base_addr: u32,
        limit: u32,
        flags: u32,
    }

    const SEG_32BIT: u32 = 1 << 0;
    const READ_EXEC_ONLY: u32 = 1 << 3;
    const LIMIT_IN_PAGES: u32 = 1 << 4;
    const SEG_NOT_PRESENT: u32 = 1 << 5;
    const USEABLE: u32 = 1 << 6;

    /// Lets the kernel pick a free TLS entry.
    const ANY_ENTRY: u32 = u32::MAX;

    /// GDT, ring 3.
    fn selector(entry_number: u32) -> u16 {
        ((entry_number << 3) | 3) as u16
    }

    unsafe fn set_thread_area(desc: &mut UserDesc) -> io::Result<()> {
        let result = libc::syscall(libc::SYS_set_thread_area, desc as *mut UserDesc);
        if result == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    impl ContextAccessor for X86 {
        #[inline(always)]
        unsafe fn context_base() -> *mut ThreadBlock {
            let base: *mut ThreadBlock;
            asm!(
                crate::get_context_base!("{base}"),
                base = out(reg) base,
                options(pure, readonly, nostack, preserves_flags),
            );
            base
        }
    }

    impl Bind for X86 {
        /// Previous `FS` selector and the GDT entry we allocated.
        type Saved = (u16, u32);

        unsafe fn install(block: *mut ThreadBlock) -> io::Result<Self::Saved> {
            let previous: u16;
            asm!("mov {0:x}, fs", out(reg) previous, options(nomem, nostack, preserves_flags));

            let mut desc = UserDesc {
                entry_number: ANY_ENTRY,
                base_addr: block as u32,
                limit: 0xfffff,
                flags: SEG_32BIT | LIMIT_IN_PAGES | USEABLE,
            };
            set_thread_area(&mut desc)?;

            asm!(
                "mov fs, {0:x}",
                in(reg) selector(desc.entry_number),
                options(nostack, preserves_flags),
            );

            Ok((previous, desc.entry_number))
        }

        unsafe fn uninstall((previous, entry_number): Self::Saved) -> io::Result<()> {
            asm!("mov fs, {0:x}", in(reg) previous, options(nostack, preserves_flags));

            let mut desc = UserDesc {
                entry_number,
                base_addr: 0,
                limit: 0,
                flags: READ_EXEC_ONLY | SEG_NOT_PRESENT,
            };
            set_thread_area(&mut desc)
        }
    }
}
