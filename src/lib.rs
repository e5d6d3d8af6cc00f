//! O(1) access to the descriptor of the task running on the current thread.
//!
//! A dedicated segment register points at a per-thread [tls::ThreadBlock] whose task context
//! slot a user-space scheduler updates on every switch. Reading it is one inlined
//! segment-relative load and one memory access, usable from signal handlers and
//! hand-written trampolines alike.
//!
//! # Examples
//!
//! ```
//! taskreg::tls::scope(|| {
//!     let mut task = 123;
//!     unsafe { taskreg::set_current(&mut task as *mut i32) };
//!
//!     assert_eq!(unsafe { *taskreg::current::<i32>() }, 123);
//! })
//! .unwrap();
//! ```

pub mod arch;
pub mod context_switch;
pub mod stack;
pub mod task;
pub mod tls;

mod accessor;
mod error;

pub use accessor::{context_base, current, replace_current, set_current, task_slot, try_current};
pub use error::{Error, Result};

#[cfg(feature = "macros")]
pub use taskreg_macros::bind;
