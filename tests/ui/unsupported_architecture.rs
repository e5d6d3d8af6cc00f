fn main() {
    taskreg::resolve!(sparc64);
}
