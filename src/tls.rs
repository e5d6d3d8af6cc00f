//! Per-thread installation of the thread block the TLBR points at.
//!
//! Stands in for the thread initialization code of a runtime: install once when a worker
//! thread starts, uninstall before it exits.

use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{compiler_fence, Ordering};
use std::{io, mem, thread};

use crate::arch::{Bind, Native, RegisterMap};
use crate::Error;

/// Memory the TLBR points at.
///
/// Cache padded to avoid potential performance hit due to false sharing.
#[repr(C, align(128))]
#[derive(Debug)]
pub struct ThreadBlock {
    /// Lets a single segment-relative load materialize the TLBR value.
    this: *mut ThreadBlock,
    /// Task context slot.
    task: *mut (),
    reserved: [usize; 4],
}

const _: () = assert!(mem::offset_of!(ThreadBlock, task) == Native::SLOT_OFFSET);
const _: () = assert!(mem::offset_of!(ThreadBlock, this) == 0);

impl ThreadBlock {
    const EMPTY: ThreadBlock = ThreadBlock {
        this: ptr::null_mut(),
        task: ptr::null_mut(),
        reserved: [0; 4],
    };

    /// Words the accessor never touches, exposed for canary checks.
    pub fn reserved(&self) -> &[usize; 4] {
        &self.reserved
    }
}

thread_local! {
    /// Const initialized, so reading it from a signal handler never allocates.
    static INSTALLED: Cell<bool> = const { Cell::new(false) };
}

/// Whether the calling thread has a live [Binding].
#[inline]
pub fn is_installed() -> bool {
    INSTALLED.with(|installed| installed.get())
}

/// Owns the calling thread's thread block while the TLBR points at it.
#[derive(Debug)]
pub struct Binding {
    block: NonNull<ThreadBlock>,
    saved: Option<<Native as Bind>::Saved>, // option for taking ownership in drop
    thread: PhantomData<*const ()>,         // TLBR belongs to one OS thread
}

impl Binding {
    /// Allocates a thread block and points the calling thread's TLBR at it.
    pub fn install() -> crate::Result<Self> {
        if is_installed() {
            return Err(Error::AlreadyInstalled);
        }

        let block = Box::into_raw(Box::new(ThreadBlock::EMPTY));
        unsafe { (*block).this = block };

        let saved = match unsafe { Native::install(block) } {
            Ok(saved) => saved,
            Err(error) => {
                drop(unsafe { Box::from_raw(block) });
                return Err(Error::Install(error));
            }
        };

        compiler_fence(Ordering::SeqCst);
        INSTALLED.with(|installed| installed.set(true));
        log::debug!("installed thread block {:p} ({})", block, Native::TAG);

        Ok(Binding {
            block: unsafe { NonNull::new_unchecked(block) }, // safety: came from a box
            saved: Some(saved),
            thread: PhantomData,
        })
    }

    /// The TLBR value of the calling thread.
    pub fn base(&self) -> *mut ThreadBlock {
        self.block.as_ptr()
    }

    /// Restores the previous TLBR, reporting failure instead of logging it.
    pub fn uninstall(mut self) -> crate::Result<()> {
        self.release().map_err(Error::Uninstall)
    }

    fn release(&mut self) -> io::Result<()> {
        let Some(saved) = self.saved.take() else {
            return Ok(());
        };

        // a signal handler must never see the flag set while the register is already restored
        INSTALLED.with(|installed| installed.set(false));
        compiler_fence(Ordering::SeqCst);

        if let Err(error) = unsafe { Native::uninstall(saved) } {
            // the register still points at the block, so it has to stay allocated
            compiler_fence(Ordering::SeqCst);
            INSTALLED.with(|installed| installed.set(true));
            return Err(error);
        }

        log::debug!("uninstalled thread block {:p} ({})", self.block, Native::TAG);

        drop(unsafe { Box::from_raw(self.block.as_ptr()) });
        Ok(())
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        if let Err(error) = self.release() {
            log::error!("leaking thread block {:p}: {}", self.block, error);
            if !thread::panicking() {
                debug_assert!(false, "failed to uninstall thread block: {error}");
            }
        }
    }
}

/// Runs `f` with a thread block installed on the calling thread.
///
/// # Examples
///
/// ```
/// let tlbr = taskreg::tls::scope(|| unsafe { taskreg::context_base() }).unwrap();
/// assert!(!tlbr.is_null());
/// ```
pub fn scope<T>(f: impl FnOnce() -> T) -> crate::Result<T> {
    let binding = Binding::install()?;
    let output = f();
    binding.uninstall()?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::arch::ContextAccessor;

    mod install {
        use super::*;

        #[test]
        fn loads_block_address() {
            let binding = Binding::install().unwrap();

            let base = unsafe { Native::context_base() };

            assert_eq!(base, binding.base());
        }

        #[test]
        fn starts_with_empty_slot() {
            let binding = Binding::install().unwrap();

            let task = unsafe { Native::task_slot(binding.base()).read() };

            assert!(task.is_null());
        }

        #[test]
        fn marks_thread_installed() {
            assert!(!is_installed());

            let binding = Binding::install().unwrap();
            assert!(is_installed());

            drop(binding);
            assert!(!is_installed());
        }

        #[test]
        fn cant_nest() {
            let _binding = Binding::install().unwrap();

            let result = Binding::install();

            assert!(matches!(result, Err(Error::AlreadyInstalled)));
        }

        #[test]
        fn works_several_times() {
            Binding::install().unwrap().uninstall().unwrap();
            Binding::install().unwrap().uninstall().unwrap();
        }

        #[test]
        fn works_in_parallel() {
            let handle = thread::spawn(|| {
                let binding = Binding::install().unwrap();
                assert_eq!(unsafe { Native::context_base() }, binding.base());
            });

            let binding = Binding::install().unwrap();
            assert_eq!(unsafe { Native::context_base() }, binding.base());

            handle.join().unwrap();
        }
    }

    /// A non-canonical address makes `ARCH_SET_GS` fail.
    #[cfg(target_arch = "x86_64")]
    mod failed_uninstall {
        use super::*;

        const NON_CANONICAL: libc::c_ulong = 0x8000_0000_0000_0000;

        #[test]
        fn keeps_thread_installed() {
            let mut binding = Binding::install().unwrap();
            let saved = binding.saved.replace(NON_CANONICAL);

            assert!(binding.release().is_err());
            assert!(is_installed());
            assert_eq!(unsafe { Native::context_base() }, binding.base());

            binding.saved = saved;
            drop(binding);
            assert!(!is_installed());
        }

        #[test]
        fn doesnt_abort_while_unwinding() {
            let handle = thread::spawn(|| {
                let result = std::panic::catch_unwind(|| {
                    let mut binding = Binding::install().unwrap();
                    binding.saved = Some(NON_CANONICAL);
                    panic!();
                });
                result.is_err()
            });

            assert!(handle.join().unwrap());
        }
    }

    mod scope {
        use super::*;

        #[test]
        fn returns_output() {
            let output = scope(|| 123);

            assert_eq!(output.unwrap(), 123);
        }

        #[test]
        fn cant_nest() {
            let result = scope(|| scope(|| {}));

            assert!(matches!(result, Ok(Err(Error::AlreadyInstalled))));
        }

        #[test]
        fn cleans_up_after_panic() {
            let result = std::panic::catch_unwind(|| {
                scope(|| panic!()).unwrap();
            });

            assert!(result.is_err());
            assert!(!is_installed());
        }
    }
}
