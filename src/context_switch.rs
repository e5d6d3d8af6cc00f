//! Abstraction over userspace multitasking.
//!
//! Provides an implementation for every CPU architecture.
//! The trampoline updates the task context slot with the same addressing the accessor reads it with.

use std::arch::global_asm;
use std::mem;

/// Handle to a stack pointer set up for context switching.
#[repr(transparent)]
#[derive(Debug, Copy, Clone)]
pub struct Continuation(*const ());

impl Continuation {
    /// Placeholder to be overwritten by [jump].
    pub const fn empty() -> Self {
        Continuation(std::ptr::null())
    }
}

extern "C" {
    fn taskreg_jump(from: *mut Continuation, to: *const Continuation, task: *mut ());
}

/// Executes a context switch.
///
/// Spills registers, sets `from` to updated stack pointer.
/// Stores `task` in the task context slot.
/// Sets stack pointer to `to`, restores registers.
///
/// # Safety
/// A [crate::tls::Binding] must be alive on the calling thread, `to` must come from
/// [prepare_stack] or an earlier [jump] on this thread.
#[inline]
pub unsafe fn jump<T>(from: *mut Continuation, to: *const Continuation, task: *mut T) {
    taskreg_jump(from, to, task.cast());
}

/// Callee-saved registers pushed by the trampoline.
#[cfg(target_arch = "x86_64")]
const SAVED_REGISTERS: usize = 6;
#[cfg(target_arch = "x86")]
const SAVED_REGISTERS: usize = 4;

/// Where the return address goes, relative to a 16 byte boundary, so `entry` sees the
/// alignment a `call` would have produced.
#[cfg(target_arch = "x86_64")]
const RETURN_ADDRESS_MISALIGNMENT: usize = 0;
#[cfg(target_arch = "x86")]
const RETURN_ADDRESS_MISALIGNMENT: usize = 8;

/// Initializes a stack for context switching.
///
/// The first [jump] to the result starts executing `entry`, which finds its own task
/// through [crate::current] and must never return.
///
/// # Safety
/// `stack_top` must be the writable upper end of a stack with room for the initial frame.
pub unsafe fn prepare_stack(stack_top: *mut u8, entry: extern "C" fn() -> !) -> Continuation {
    const WORD: usize = mem::size_of::<usize>();

    let aligned = stack_top as usize & !15;
    let return_address = aligned - 16 + RETURN_ADDRESS_MISALIGNMENT;

    (return_address as *mut usize).write(entry as usize);
    ((return_address + WORD) as *mut usize).write(0); // entry has nowhere to return to

    let stack_pointer = return_address - SAVED_REGISTERS * WORD;
    for register in 0..SAVED_REGISTERS {
        ((stack_pointer + register * WORD) as *mut usize).write(0);
    }

    Continuation(stack_pointer as *const ())
}

#[cfg(target_arch = "x86_64")]
global_asm!(
    ".text",
    ".global taskreg_jump",
    ".type taskreg_jump, @function",
    ".p2align 4",
    "taskreg_jump:",
    "push rbp",
    "push rbx",
    "push r12",
    "push r13",
    "push r14",
    "push r15",
    "mov [rdi], rsp",
    "mov rsp, [rsi]",
    crate::get_context_base!("rax"),
    concat!("mov ", crate::task_slot!("rax"), ", rdx"),
    "pop r15",
    "pop r14",
    "pop r13",
    "pop r12",
    "pop rbx",
    "pop rbp",
    "ret",
    ".size taskreg_jump, . - taskreg_jump",
);

#[cfg(target_arch = "x86")]
global_asm!(
    ".text",
    ".global taskreg_jump",
    ".type taskreg_jump, @function",
    ".p2align 4",
    "taskreg_jump:",
    "mov eax, [esp + 4]",
    "mov edx, [esp + 8]",
    "mov ecx, [esp + 12]",
    "push ebp",
    "push ebx",
    "push esi",
    "push edi",
    "mov [eax], esp",
    "mov esp, [edx]",
    crate::get_context_base!("eax"),
    concat!("mov ", crate::task_slot!("eax"), ", ecx"),
    "pop edi",
    "pop esi",
    "pop ebx",
    "pop ebp",
    "ret",
    ".size taskreg_jump, . - taskreg_jump",
);
