use std::process::Command;

/// Build identity for `hostgauge_core::VERSION`.
///
/// `HOSTGAUGE_BUILD_SHA` wins when set (packaging from a source tarball has no
/// `.git`); otherwise the short SHA of HEAD, or "unknown" outside a checkout.
fn build_sha() -> String {
    if let Ok(sha) = std::env::var("HOSTGAUGE_BUILD_SHA") {
        let sha = sha.trim();
        if !sha.is_empty() {
            return sha.to_string();
        }
    }

    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".into())
}

fn main() {
    println!("cargo:rustc-env=HOSTGAUGE_GIT_SHA={}", build_sha());

    // Re-run on a new commit or override, not on every source change.
    println!("cargo:rerun-if-env-changed=HOSTGAUGE_BUILD_SHA");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/refs/");
}
