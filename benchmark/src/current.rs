use std::cell::Cell;
use std::num::NonZeroUsize;
use std::ptr;

use taskreg::context_switch::{jump, prepare_stack, Continuation};
use taskreg::stack::Stack;

thread_local! {
    static CURRENT: Cell<*mut ()> = const { Cell::new(ptr::null_mut()) };
}

/// # Safety
/// A [taskreg::tls::Binding] must be alive on the calling thread.
pub unsafe fn current_taskreg() -> *mut () {
    taskreg::current()
}

pub fn current_thread_local() -> *mut () {
    CURRENT.with(|current| current.get())
}

/// # Safety
/// A [taskreg::tls::Binding] must be alive on the calling thread.
pub unsafe fn set_current_taskreg(task: *mut ()) {
    taskreg::set_current(task)
}

pub fn set_current_thread_local(task: *mut ()) {
    CURRENT.with(|current| current.set(task))
}

#[repr(C)]
struct PingPong {
    own: Continuation,
    caller: Continuation,
}

extern "C" fn ping_pong_entry() -> ! {
    loop {
        let task = unsafe { taskreg::current::<PingPong>() };
        unsafe {
            jump(
                ptr::addr_of_mut!((*task).own),
                ptr::addr_of!((*task).caller),
                ptr::null_mut::<()>(),
            )
        };
    }
}

/// A fiber that switches straight back whenever it's resumed.
pub struct Switcher {
    task: Box<PingPong>,
    _stack: Stack,
}

impl Switcher {
    pub fn new() -> Self {
        let stack = Stack::new(NonZeroUsize::MIN, NonZeroUsize::new(8).unwrap()).unwrap();
        let task = Box::new(PingPong {
            own: unsafe { prepare_stack(stack.base(), ping_pong_entry) },
            caller: Continuation::empty(),
        });

        Switcher { task, _stack: stack }
    }

    /// Two context switches.
    ///
    /// # Safety
    /// A [taskreg::tls::Binding] must be alive on the calling thread.
    pub unsafe fn round_trip(&mut self) {
        let task = &mut *self.task as *mut PingPong;
        jump(ptr::addr_of_mut!((*task).caller), ptr::addr_of!((*task).own), task);
    }
}

impl Default for Switcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use taskreg::tls::Binding;

    use super::*;

    #[test]
    fn reads_back_with_binding() {
        let _binding = Binding::install().unwrap();
        let mut task = 0_u8;
        let task = &mut task as *mut u8 as *mut ();

        unsafe { set_current_taskreg(task) };

        assert_eq!(unsafe { current_taskreg() }, task);
    }

    #[test]
    fn round_trip_leaves_no_task() {
        let _binding = Binding::install().unwrap();
        let mut switcher = Switcher::new();

        unsafe { switcher.round_trip() };
        unsafe { switcher.round_trip() };

        assert!(unsafe { current_taskreg() }.is_null());
    }
}
