//! Function-entry stack-bound checks.

use std::arch::asm;

use crate::stack::Stack;

/// Stack bounds of a task.
///
/// Descriptors that want [stack_exhausted] put this first and are `#[repr(C)]`,
/// so the current task pointer doubles as a pointer to its header.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TaskHeader {
    pub stack_lo: usize,
    pub stack_hi: usize,
    /// Entering a function with the stack pointer at or below this needs more stack.
    pub stack_guard: usize,
}

impl TaskHeader {
    /// Bounds of `stack`, keeping `red_zone` bytes above its limit in reserve.
    pub fn for_stack(stack: &Stack, red_zone: usize) -> Self {
        let stack_lo = stack.limit() as usize;
        TaskHeader {
            stack_lo,
            stack_hi: stack.base() as usize,
            stack_guard: stack_lo + red_zone,
        }
    }

    pub fn contains(&self, stack_pointer: usize) -> bool {
        (self.stack_lo..self.stack_hi).contains(&stack_pointer)
    }
}

/// Current stack pointer.
#[inline(always)]
pub fn stack_pointer() -> usize {
    let stack_pointer: usize;
    #[cfg(target_arch = "x86_64")]
    unsafe {
        asm!("mov {}, rsp", out(reg) stack_pointer, options(nomem, nostack, preserves_flags));
    }
    #[cfg(target_arch = "x86")]
    unsafe {
        asm!("mov {}, esp", out(reg) stack_pointer, options(nomem, nostack, preserves_flags));
    }
    stack_pointer
}

/// Whether the current task has run into its stack guard.
///
/// Always `false` while no task is current.
///
/// # Safety
/// A [crate::tls::Binding] must be alive on the calling thread and the current task,
/// if any, must start with a [TaskHeader].
#[inline(always)]
pub unsafe fn stack_exhausted() -> bool {
    let task = crate::current::<TaskHeader>();
    if task.is_null() {
        return false;
    }

    stack_pointer() <= (*task).stack_guard
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::ptr;

    use super::*;
    use crate::context_switch::{jump, prepare_stack, Continuation};
    use crate::tls::Binding;

    mod stack_exhausted {
        use super::*;

        #[test]
        fn false_without_task() {
            let _binding = Binding::install().unwrap();

            assert!(!unsafe { stack_exhausted() });
        }

        #[test]
        fn false_with_room_left() {
            let _binding = Binding::install().unwrap();
            let sp = stack_pointer();
            let mut header = TaskHeader {
                stack_lo: sp - 64 * 1024,
                stack_hi: sp + 1024,
                stack_guard: sp - 32 * 1024,
            };
            unsafe { crate::set_current(&mut header as *mut TaskHeader) };

            assert!(!unsafe { stack_exhausted() });
        }

        #[test]
        fn true_past_guard() {
            let _binding = Binding::install().unwrap();
            let sp = stack_pointer();
            let mut header = TaskHeader {
                stack_lo: sp - 64 * 1024,
                stack_hi: sp + 64 * 1024,
                stack_guard: sp + 32 * 1024,
            };
            unsafe { crate::set_current(&mut header as *mut TaskHeader) };

            assert!(unsafe { stack_exhausted() });
        }
    }

    mod on_fiber {
        use super::*;

        #[repr(C)]
        struct Descriptor {
            header: TaskHeader,
            own: Continuation,
            caller: Continuation,
            stack_pointer: usize,
            exhausted: bool,
        }

        extern "C" fn entry() -> ! {
            let task = unsafe { crate::current::<Descriptor>() };
            unsafe {
                (*task).stack_pointer = stack_pointer();
                (*task).exhausted = stack_exhausted();
                jump(
                    ptr::addr_of_mut!((*task).own),
                    ptr::addr_of!((*task).caller),
                    ptr::null_mut::<()>(),
                );
            }
            unreachable!()
        }

        #[test]
        fn runs_within_its_own_stack() {
            let _binding = Binding::install().unwrap();
            let stack = Stack::new(NonZeroUsize::MIN, NonZeroUsize::new(16).unwrap()).unwrap();
            let task = Box::into_raw(Box::new(Descriptor {
                header: TaskHeader::for_stack(&stack, 4096),
                own: unsafe { prepare_stack(stack.base(), entry) },
                caller: Continuation::empty(),
                stack_pointer: 0,
                exhausted: true,
            }));

            unsafe { jump(ptr::addr_of_mut!((*task).caller), ptr::addr_of!((*task).own), task) };

            let task = unsafe { Box::from_raw(task) };
            assert!(task.header.contains(task.stack_pointer));
            assert!(!task.exhausted);
            assert!(unsafe { crate::current::<()>() }.is_null());
        }
    }
}
