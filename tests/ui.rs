#[test]
fn ui() {
    let t = trybuild::TestCases::new();
    t.pass("tests/ui/supported_architectures.rs");
    t.compile_fail("tests/ui/unsupported_architecture.rs");
}
