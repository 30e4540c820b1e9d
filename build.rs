//! Build script stamping the startup banner with a version and commit.
//!
//! - PLAYER_SYNC_VERSION: release version (defaults to CARGO_PKG_VERSION)
//! - PLAYER_SYNC_GIT_SHA: short commit SHA (defaults to `git rev-parse`)

use std::process::Command;

fn main() {
    let version = std::env::var("PLAYER_SYNC_VERSION").unwrap_or_else(|_| {
        std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "unknown".into())
    });
    println!("cargo:rustc-env=PLAYER_SYNC_VERSION={}", version);

    let git_sha = std::env::var("PLAYER_SYNC_GIT_SHA").unwrap_or_else(|_| short_sha());
    println!("cargo:rustc-env=PLAYER_SYNC_GIT_SHA={}", git_sha);

    println!("cargo:rerun-if-env-changed=PLAYER_SYNC_VERSION");
    println!("cargo:rerun-if-env-changed=PLAYER_SYNC_GIT_SHA");
}

fn short_sha() -> String {
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".into())
}
