//! Build script: export the binary's symbols so crash dumps can name its frames.

use std::env;

/// ELF targets whose executables export nothing to `dladdr` by default.
const EXPORTING_TARGETS: [&str; 5] = ["linux", "android", "freebsd", "netbsd", "openbsd"];

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if EXPORTING_TARGETS.contains(&target_os.as_str()) {
        println!("cargo:rustc-link-arg-bins=-rdynamic");
    }
}
