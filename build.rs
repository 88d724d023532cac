use std::env;

fn main() {
    // Only the board build links against the AVR runtime; host builds run the test suite
    let target = env::var("TARGET").unwrap_or_default();
    if target.contains("avr") {
        println!("cargo:rustc-link-arg=-mmcu=atmega128");
    }

    println!("cargo:rerun-if-changed=build.rs");
}
