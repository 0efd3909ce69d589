use std::process::Command;

// GIT_HASH is logged at startup. Packaged builds without a checkout can set
// AUTOFANFIC_GIT_HASH instead.
fn main() {
    println!("cargo:rerun-if-env-changed=AUTOFANFIC_GIT_HASH");
    println!("cargo:rerun-if-changed=.git/HEAD");

    let hash = std::env::var("AUTOFANFIC_GIT_HASH").ok().or_else(|| {
        Command::new("git")
            .args(["rev-parse", "--short", "HEAD"])
            .output()
            .ok()
            .filter(|o| o.status.success())
            .and_then(|o| String::from_utf8(o.stdout).ok())
    });

    println!(
        "cargo:rustc-env=GIT_HASH={}",
        hash.as_deref().map(str::trim).unwrap_or("unknown")
    );
}
