/// Display version information
pub fn execute() {
    println!("pinrelay {}", env!("CARGO_PKG_VERSION"));
    println!("Pinning orchestration and storage audit for content-addressed data");
}
