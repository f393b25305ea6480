//! Embeds a human readable version string as `BUILD_INFO_HUMAN`.
//!
//! The string is `<pkg version> (<git>) <rustc version>`, where `<git>` is
//! `git describe` output when a tag is reachable, otherwise
//! `g<short sha>[+dirty]` stamped with the commit date. Components that
//! cannot be determined (no git, no rustc on PATH) are omitted.

use std::process::Command;

use chrono::{DateTime, Utc};

fn main() {
    for path in ["src", "build.rs", "Cargo.toml", "Cargo.lock"] {
        println!("cargo:rerun-if-changed={path}");
    }

    println!("cargo:rustc-env=BUILD_INFO_HUMAN={}", build_info());
}

fn run(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn git(args: &[&str]) -> Option<String> {
    run("git", args)
}

fn is_dirty() -> bool {
    git(&["status", "--porcelain"])
        .map(|status| {
            status
                .lines()
                .filter_map(|line| line.get(3..))
                .any(|path| path != ".cargo-ok")
        })
        .unwrap_or(false)
}

fn git_version() -> Option<String> {
    if let Some(described) = git(&["describe", "--tags", "--dirty"]) {
        return Some(described);
    }

    let sha = git(&["rev-parse", "--short=12", "HEAD"])?;
    let date = git(&["log", "-1", "--format=%ct"])
        .and_then(|ts| ts.parse::<i64>().ok())
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
        .unwrap_or_else(Utc::now)
        .format("%Y-%m-%d");
    let dirty = if is_dirty() { "+dirty" } else { "" };

    Some(format!("g{sha}{dirty} {date}"))
}

fn build_info() -> String {
    [
        Some(env!("CARGO_PKG_VERSION").to_string()),
        git_version().map(|v| format!("({v})")),
        run("rustc", &["--version"]),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ")
}
