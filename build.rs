use std::env;
use std::process::Command;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=RUSTC");

    embed_compiler_metadata()?;

    Ok(())
}

/// Expose compiler details to the crate as `PROC_SNAPSHOT_*` env vars so
/// build metadata can be reported without the host's cooperation.
fn embed_compiler_metadata() -> Result<(), Box<dyn std::error::Error>> {
    let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());

    // A missing or broken rustc must not fail the build, the field just stays empty
    let rust_version = Command::new(&rustc)
        .arg("--version")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|version| version.trim().to_string())
        .unwrap_or_default();

    if rust_version.is_empty() {
        println!("cargo:warning=Could not determine rustc version from {rustc}");
    }

    let target = env::var("TARGET").unwrap_or_default();
    let profile = env::var("PROFILE").unwrap_or_default();

    println!("cargo:rustc-env=PROC_SNAPSHOT_RUSTC_VERSION={rust_version}");
    println!("cargo:rustc-env=PROC_SNAPSHOT_TARGET={target}");
    println!("cargo:rustc-env=PROC_SNAPSHOT_PROFILE={profile}");

    Ok(())
}
