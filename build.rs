use std::env;

fn main() {
    let target = env::var("TARGET").unwrap_or_default();

    // Host builds (unit tests) need no linker tweaks
    if !target.contains("avr") {
        return;
    }

    // Configure for ATmega128
    println!("cargo:rustc-link-arg=-mmcu=atmega128");

    if env::var("PROFILE").map(|p| p == "debug").unwrap_or(false) {
        println!("cargo:rustc-cfg=feature=\"debug\"");
    }

    println!("cargo:warning=Building gyro peripheral for ATmega128 at 16MHz");
}
