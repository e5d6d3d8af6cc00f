#[taskreg::bind]
fn installed() -> bool {
    taskreg::tls::is_installed()
}

#[taskreg::bind]
fn current_after_set(task: *mut u16) -> *mut u16 {
    unsafe { taskreg::set_current(task) };
    unsafe { taskreg::current() }
}

#[test]
fn body_runs_with_binding() {
    assert!(installed());
    assert!(!taskreg::tls::is_installed());
}

#[test]
fn body_sees_its_own_writes() {
    let mut task = 9_u16;
    let task = &mut task as *mut u16;

    assert_eq!(current_after_set(task), task);
}
