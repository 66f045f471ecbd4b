pub fn run() {
    println!("auto-deploy version: {}", env!("CARGO_PKG_VERSION"));
}
