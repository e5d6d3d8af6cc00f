//! Task stacks.

use std::num::NonZeroUsize;
use std::{ffi, io, ptr};

use crate::Error;

#[derive(Debug)]
pub struct Stack {
    pointer: *mut u8,
    length: usize,
    guard_length: usize,
}

impl Stack {
    /// Allocates a general purpose stack.
    /// Demand paging ensures that physical memory is allocated only as necessary, during a page fault.
    /// The stack is protected from overflow using guard pages.
    pub fn new(guard_pages: NonZeroUsize, usable_pages: NonZeroUsize) -> crate::Result<Self> {
        let (guard_pages, usable_pages) = (guard_pages.get(), usable_pages.get());

        let page_size = page_size();
        let length = guard_pages
            .checked_add(usable_pages)
            .and_then(|pages| pages.checked_mul(page_size))
            .ok_or_else(|| Error::Stack(io::ErrorKind::InvalidInput.into()))?;

        // kernel allocates an unused block of virtual memory
        let pointer = unsafe {
            libc::mmap(
                ptr::null_mut(),
                length,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if pointer == libc::MAP_FAILED {
            return Err(Error::Stack(io::Error::last_os_error()));
        }

        // if guarding memory goes wrong then mmap gets cleaned up in Stack's drop
        let stack = Stack {
            pointer: pointer as *mut u8,
            length,
            guard_length: guard_pages * page_size,
        };

        // located at the lowest addresses since the stack grows downward
        let result = unsafe { libc::mprotect(pointer, stack.guard_length, libc::PROT_NONE) };
        if result == -1 {
            return Err(Error::Stack(io::Error::last_os_error()));
        }

        Ok(stack)
    }

    /// Highest address, where an empty stack's pointer starts.
    pub fn base(&self) -> *mut u8 {
        // safety: part of same allocation, can't overflow
        unsafe { self.pointer.add(self.length) }
    }

    /// Lowest usable address, just above the guard pages.
    pub fn limit(&self) -> *mut u8 {
        // safety: part of same allocation, can't overflow
        unsafe { self.pointer.add(self.guard_length) }
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        let result = unsafe { libc::munmap(self.pointer as *mut ffi::c_void, self.length) };
        debug_assert_eq!(result, 0);
    }
}

fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}
