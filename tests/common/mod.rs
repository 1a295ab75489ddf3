use assert_cmd::{Command, cargo::cargo_bin_cmd};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// A scratch install with `upgrade/`, `waf/` and `bak/` trees.
pub fn install_dir() -> TempDir {
    let temp = TempDir::new().unwrap();
    for dir in ["upgrade", "waf", "bak"] {
        fs::create_dir(temp.path().join(dir)).unwrap();
    }
    temp
}

pub fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// `wafup` running inside `cwd` with the live root pointed at `waf/`.
#[allow(dead_code)]
pub fn wafup_cmd(cwd: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("wafup");
    cmd.env_remove("RUST_LOG")
        .arg("-C")
        .arg(cwd)
        .arg("--live-root")
        .arg("waf/");
    cmd
}
