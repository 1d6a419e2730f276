// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

mod integration;
mod stores;

use anyhow::Result;
use std::{
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
    process::{Command, Output},
};
use tempfile::TempDir;

/// Isolated store directory driven through the binary.
pub(crate) struct Sandbox {
    root: TempDir,
    store_dir: PathBuf,
}

impl Sandbox {
    pub(crate) fn new() -> Result<Self> {
        let root = tempfile::tempdir()?;
        let store_dir = root.path().join("stores");

        Ok(Self { root, store_dir })
    }

    /// Create directory in sandbox, and return its canonical path.
    pub(crate) fn mkdir(&self, name: impl AsRef<Path>) -> Result<PathBuf> {
        let path = self.root.path().join("targets").join(name);
        fs::create_dir_all(&path)?;

        Ok(path.canonicalize()?)
    }

    pub(crate) fn store_dir(&self) -> &Path {
        self.store_dir.as_path()
    }

    pub(crate) fn run(&self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Result<Run> {
        // INVARIANT: Never read user configuration or real store locations.
        let output = Command::new(env!("CARGO_BIN_EXE_sflctl"))
            .arg("--store-dir")
            .arg(&self.store_dir)
            .args(["--format", "legacy", "--config"])
            .arg(self.root.path().join("missing.toml"))
            .args(args)
            .env_remove("SFLCTL_STORE_DIR")
            .env("RUST_LOG", "warn")
            .output()?;

        Ok(Run(output))
    }
}

/// Finished invocation of the binary.
pub(crate) struct Run(Output);

impl Run {
    pub(crate) fn success(&self) -> bool {
        self.0.status.success()
    }

    pub(crate) fn code(&self) -> Option<i32> {
        self.0.status.code()
    }

    pub(crate) fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.0.stdout).into_owned()
    }

    pub(crate) fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.0.stderr).into_owned()
    }

    pub(crate) fn lines(&self) -> Vec<String> {
        self.stdout().lines().map(ToString::to_string).collect()
    }
}
