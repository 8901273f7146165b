//! Stamps `RENDITION_VERSION` for `rendition --version`.
//!
//! A build from a release tag reports the package version. Anything else
//! reports `dev@<short hash>`, or `dev@unknown` outside a git checkout.

use std::process::Command;

/// Stdout of a successful `git` invocation, trimmed.
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn version() -> String {
    if git(&["describe", "--exact-match", "--tags", "HEAD"]).is_some() {
        return std::env::var("CARGO_PKG_VERSION").unwrap_or_default();
    }
    match git(&["rev-parse", "--short", "HEAD"]) {
        Some(hash) if !hash.is_empty() => format!("dev@{hash}"),
        _ => "dev@unknown".to_string(),
    }
}

fn main() {
    for watched in [".git/HEAD", ".git/refs/"] {
        println!("cargo:rerun-if-changed={watched}");
    }
    println!("cargo:rustc-env=RENDITION_VERSION={}", version());
}
