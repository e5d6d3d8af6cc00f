//! 64-bit x86.
//!
//! libc owns `FS` for ELF TLS, so the TLBR is the `GS` segment base, set with `arch_prctl`.
//! Word 0 of the thread block points at itself, which makes `gs:[0]` the TLBR value.

use super::{RegisterMap, Tag};

#[derive(Debug, Copy, Clone)]
pub struct X86_64;

impl RegisterMap for X86_64 {
    const TAG: Tag = Tag::X86_64;
    const LOAD_SEQUENCE: &'static str = crate::__x86_64_load_sequence!("{base}");
    const SLOT_OFFSET: usize = crate::__x86_64_slot_offset!();
    const WORD_SIZE: usize = 8;
}

#[doc(hidden)]
#[macro_export]
macro_rules! __x86_64_load_sequence {
    ($dest:literal) => {
        concat!("mov ", $dest, ", qword ptr gs:[0]")
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __x86_64_task_slot {
    ($base:literal) => {
        concat!("qword ptr [", $base, " + ", $crate::__x86_64_slot_offset!(), "]")
    };
}

/// Byte offset of the task context slot, as a literal so assembly text can embed it.
#[doc(hidden)]
#[macro_export]
macro_rules! __x86_64_slot_offset {
    () => {
        8
    };
}

#[cfg(target_arch = "x86_64")]
mod native {
    use std::arch::asm;
    use std::io;

    use super::X86_64;
    use crate::arch::{Bind, ContextAccessor};
    use crate::tls::ThreadBlock;

    // asm/prctl.h
    const ARCH_SET_GS: libc::c_long = 0x1001;
    const ARCH_GET_GS: libc::c_long = 0x1004;

    impl ContextAccessor for X86_64 {
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

    impl Bind for X86_64 {
        /// Previous `GS` base.
        type Saved = libc::c_ulong;

        unsafe fn install(block: *mut ThreadBlock) -> io::Result<Self::Saved> {
            let mut previous: libc::c_ulong = 0;
            let result = libc::syscall(
                libc::SYS_arch_prctl,
                ARCH_GET_GS,
                &mut previous as *mut libc::c_ulong,
            );
            if result == -1 {
                return Err(io::Error::last_os_error());
            }

            let result = libc::syscall(libc::SYS_arch_prctl, ARCH_SET_GS, block as libc::c_ulong);
            if result == -1 {
                return Err(io::Error::last_os_error());
            }

            Ok(previous)
        }

        unsafe fn uninstall(saved: Self::Saved) -> io::Result<()> {
            let result = libc::syscall(libc::SYS_arch_prctl, ARCH_SET_GS, saved);
            if result == -1 {
                return Err(io::Error::last_os_error());
            }

            Ok(())
        }
    }
}
