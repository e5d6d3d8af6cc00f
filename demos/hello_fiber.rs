use std::num::NonZeroUsize;
use std::ptr;

use taskreg::context_switch::{jump, prepare_stack, Continuation};
use taskreg::stack::Stack;

#[repr(C)]
struct Fiber {
    name: &'static str,
    own: Continuation,
    caller: Continuation,
}

extern "C" fn entry() -> ! {
    let fiber = unsafe { taskreg::current::<Fiber>() };
    println!("hello from {}", unsafe { (*fiber).name });

    unsafe { jump(ptr::addr_of_mut!((*fiber).own), ptr::addr_of!((*fiber).caller), ptr::null_mut::<()>()) };
    unreachable!()
}

#[taskreg::bind]
fn main() {
    let stack = Stack::new(NonZeroUsize::MIN, NonZeroUsize::new(16).unwrap()).unwrap();
    let mut fiber = Fiber {
        name: "fiber",
        own: unsafe { prepare_stack(stack.base(), entry) },
        caller: Continuation::empty(),
    };

    let fiber = &mut fiber as *mut Fiber;
    unsafe { jump(ptr::addr_of_mut!((*fiber).caller), ptr::addr_of!((*fiber).own), fiber) };

    println!("back on the main stack");
}
