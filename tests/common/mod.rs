#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// State directory used by CLI invocations from this workspace.
    pub fn state_dir(&self) -> PathBuf {
        self.temp_dir.path().join("state")
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Binary invocation pinned to this workspace's state directory.
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("cost-reconcile").expect("binary exists");
        cmd.arg("--state-dir").arg(self.state_dir());
        cmd
    }
}

/// System-of-record sample in Turkish number format with semicolons.
pub const SYSTEM_CSV: &str = "\
İş Yeri Kodu;Masraf Yeri Kodu;Amortisman;DİS;Enerji
P1;C1;100;20,5;1.000,25
P1;C2;50;0;0
P2;C1;10;1;1
";

/// Staged sample sharing the system headers, comma separated.
pub const STAGED_CSV: &str = "\
İş Yeri Kodu,Masraf Yeri Kodu,Amortisman,DİS,Enerji
P1,C1,200,10,5
";
