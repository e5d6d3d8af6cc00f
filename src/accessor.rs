//! Who am I running as.
//!
//! Every function here inlines to a segment-relative load plus at most one memory access.
//! None of them can fail, they only have preconditions.

use std::ptr;

use crate::arch::{ContextAccessor, Native};
use crate::tls::{self, ThreadBlock};

/// Reads the calling thread's TLBR.
///
/// # Safety
/// A [tls::Binding] must be alive on the calling thread.
#[inline(always)]
pub unsafe fn context_base() -> *mut ThreadBlock {
    Native::context_base()
}

/// Address of the task context slot of the thread block at `base`.
///
/// # Safety
/// `base` must come from [context_base] on the calling thread.
#[inline(always)]
pub unsafe fn task_slot(base: *mut ThreadBlock) -> *mut *mut () {
    Native::task_slot(base)
}

/// Descriptor of the task running on this thread, null if there is none.
///
/// # Safety
/// A [tls::Binding] must be alive on the calling thread.
#[inline(always)]
pub unsafe fn current<T>() -> *mut T {
    task_slot(context_base()).read().cast()
}

/// Makes `task` the current task of this thread.
///
/// Reserved for the scheduler's context switch.
///
/// # Safety
/// A [tls::Binding] must be alive on the calling thread.
#[inline(always)]
pub unsafe fn set_current<T>(task: *mut T) {
    task_slot(context_base()).write(task.cast());
}

/// Makes `task` the current task of this thread, returning the previous one.
///
/// # Safety
/// A [tls::Binding] must be alive on the calling thread.
#[inline(always)]
pub unsafe fn replace_current<T>(task: *mut T) -> *mut T {
    ptr::replace(task_slot(context_base()), task.cast()).cast()
}

/// Like [current], but `None` on threads without a thread block, e.g. in a signal handler
/// that landed on a thread the runtime doesn't own.
#[inline(always)]
pub fn try_current<T>() -> Option<*mut T> {
    if !tls::is_installed() {
        return None;
    }

    Some(unsafe { current() }) // safety: checked above
}
