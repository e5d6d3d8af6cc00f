//! Architecture register map.
//!
//! Each supported CPU architecture gets one zero-sized type describing how to reach the
//! thread-local base register (TLBR) and where the task context slot lives relative to it.
//! The tables exist on every target; only [Native] is wired to the hardware.

use std::{fmt, io};

use crate::tls::ThreadBlock;

mod x86;
mod x86_64;

pub use x86::X86;
pub use x86_64::X86_64;

#[cfg(not(target_os = "linux"))]
compile_error!("taskreg only supports Linux");

#[cfg(not(any(target_arch = "x86_64", target_arch = "x86")))]
compile_error!("taskreg only supports x86_64 and x86");

/// Register map of the architecture being compiled for.
#[cfg(target_arch = "x86_64")]
pub type Native = X86_64;

/// Register map of the architecture being compiled for.
#[cfg(target_arch = "x86")]
pub type Native = X86;

/// Closed set of architectures with a register map entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    X86_64,
    X86,
}

impl Tag {
    pub const fn name(self) -> &'static str {
        match self {
            Tag::X86_64 => "x86_64",
            Tag::X86 => "x86",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Static description of one architecture's thread-local addressing.
pub trait RegisterMap {
    const TAG: Tag;

    /// Instruction that copies the TLBR value into the register named by `{base}`.
    const LOAD_SEQUENCE: &'static str;

    /// Byte displacement of the task context slot from the TLBR value.
    const SLOT_OFFSET: usize;

    /// Size of a pointer, and therefore of the task context slot.
    const WORD_SIZE: usize;
}

/// The two inlined operations every call site uses to find the current task.
pub trait ContextAccessor: RegisterMap {
    /// Materializes the TLBR value in a register chosen by the register allocator.
    ///
    /// # Safety
    /// A [crate::tls::Binding] must be alive on the calling thread.
    unsafe fn context_base() -> *mut ThreadBlock;

    /// Address of the task context slot.
    ///
    /// # Safety
    /// `base` must come from [ContextAccessor::context_base] on the same thread.
    #[inline(always)]
    unsafe fn task_slot(base: *mut ThreadBlock) -> *mut *mut () {
        base.byte_add(Self::SLOT_OFFSET).cast()
    }
}

/// Points the TLBR at a thread block and back again.
pub(crate) trait Bind: ContextAccessor {
    /// Whatever is needed to put the register back the way it was.
    type Saved;

    unsafe fn install(block: *mut ThreadBlock) -> io::Result<Self::Saved>;

    unsafe fn uninstall(saved: Self::Saved) -> io::Result<()>;
}

/// Looks up `(load_sequence, offset)` for an architecture tag at compile time.
///
/// ```
/// let (load, offset) = taskreg::resolve!(x86_64);
/// assert_eq!(load, "mov {base}, qword ptr gs:[0]");
/// assert_eq!(offset, 8);
/// ```
#[macro_export]
macro_rules! resolve {
    (x86_64) => {
        (
            <$crate::arch::X86_64 as $crate::arch::RegisterMap>::LOAD_SEQUENCE,
            <$crate::arch::X86_64 as $crate::arch::RegisterMap>::SLOT_OFFSET,
        )
    };
    (x86) => {
        (
            <$crate::arch::X86 as $crate::arch::RegisterMap>::LOAD_SEQUENCE,
            <$crate::arch::X86 as $crate::arch::RegisterMap>::SLOT_OFFSET,
        )
    };
    ($other:ident) => {
        compile_error!(concat!("unsupported architecture tag `", stringify!($other), "`"))
    };
}

/// Expands to the native instruction loading the TLBR value into register `$dest`.
///
/// Meant for hand-written assembly such as switch trampolines.
/// `$dest` must not hold a live value at that point.
#[cfg(target_arch = "x86_64")]
#[macro_export]
macro_rules! get_context_base {
    ($dest:literal) => {
        $crate::__x86_64_load_sequence!($dest)
    };
}

/// Expands to the native instruction loading the TLBR value into register `$dest`.
///
/// Meant for hand-written assembly such as switch trampolines.
/// `$dest` must not hold a live value at that point.
#[cfg(target_arch = "x86")]
#[macro_export]
macro_rules! get_context_base {
    ($dest:literal) => {
        $crate::__x86_load_sequence!($dest)
    };
}

/// Expands to the memory operand of the task context slot, given `$base` holding the TLBR.
#[cfg(target_arch = "x86_64")]
#[macro_export]
macro_rules! task_slot {
    ($base:literal) => {
        $crate::__x86_64_task_slot!($base)
    };
}

/// Expands to the memory operand of the task context slot, given `$base` holding the TLBR.
#[cfg(target_arch = "x86")]
#[macro_export]
macro_rules! task_slot {
    ($base:literal) => {
        $crate::__x86_task_slot!($base)
    };
}
