fn main() {
    let (_load, offset) = taskreg::resolve!(x86_64);
    assert_eq!(offset, 8);

    let (_load, offset) = taskreg::resolve!(x86);
    assert_eq!(offset, 4);
}
