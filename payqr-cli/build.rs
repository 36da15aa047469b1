use std::path::Path;
use std::process::Command;

const OVERRIDE_VAR: &str = "PAYQR_BUILD_SHA";

/// `git describe` for the workspace, e.g. `v0.1.0-3-g1a2b3c4-dirty` or a bare
/// short hash when no tag is reachable.
fn describe(workspace: &Path) -> Option<String> {
    let out = Command::new("git")
        .arg("-C")
        .arg(workspace)
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let text = String::from_utf8(out.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_owned())
}

fn main() {
    println!("cargo:rerun-if-env-changed={OVERRIDE_VAR}");

    // Release tarballs carry no .git; packagers pass the revision explicitly.
    let revision = match std::env::var(OVERRIDE_VAR) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_owned(),
        _ => {
            let manifest = std::env::var_os("CARGO_MANIFEST_DIR").unwrap_or_default();
            let workspace = Path::new(&manifest).join("..");
            for watched in [".git/HEAD", ".git/index"] {
                let p = workspace.join(watched);
                if p.exists() {
                    println!("cargo:rerun-if-changed={}", p.display());
                }
            }
            describe(&workspace).unwrap_or_else(|| String::from("unknown"))
        }
    };

    println!("cargo:rustc-env={OVERRIDE_VAR}={revision}");
}
