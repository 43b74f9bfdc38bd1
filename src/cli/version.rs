/// Display version information
pub fn execute() {
    println!("pln-staging {}", env!("CARGO_PKG_VERSION"));
    println!("Admission control and deposit staging for PLN journals");
}
