//! Shared test infrastructure for integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Isolated state directory plus a document tree to run docflow against.
pub struct TestFixture {
    pub state: TempDir,
    pub docs: TempDir,
}

/// Captured result of one docflow invocation.
#[derive(Debug)]
pub struct Run {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl Run {
    fn from_output(output: Output) -> Self {
        Self {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.stdout)
            .unwrap_or_else(|err| panic!("stdout is not JSON ({err}):\n{}", self.stdout))
    }

    pub fn assert_code(&self, expected: i32) -> &Self {
        assert_eq!(
            self.code, expected,
            "unexpected exit code\nstdout:\n{}\nstderr:\n{}",
            self.stdout, self.stderr
        );
        self
    }
}

impl TestFixture {
    /// Documents: two Markdown files (one with trailing spaces) and a text file.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let fixture = Self {
            state: TempDir::new().expect("state dir"),
            docs: TempDir::new().expect("docs dir"),
        };
        fixture.write_doc("guide.md", "# Guide  \n\nSee [intro](intro.md).\n");
        fixture.write_doc("intro.md", "Intro\n");
        fixture.write_doc("notes/todo.txt", "later\n");
        fixture
    }

    pub fn write_doc(&self, rel: &str, text: &str) {
        let path = self.docs.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create doc parent");
        }
        fs::write(path, text).expect("write doc");
    }

    pub fn read_doc(&self, rel: &str) -> String {
        fs::read_to_string(self.docs.path().join(rel)).expect("read doc")
    }

    pub fn docs_path(&self) -> &Path {
        self.docs.path()
    }

    pub fn workflow_file(&self, name: &str) -> PathBuf {
        self.state.path().join("workflows").join(format!("{name}.json"))
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.state.path().join("manifest.json")
    }

    /// Run the docflow binary against this fixture's state directory.
    pub fn run<I, S>(&self, args: I) -> Run
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let output = Command::new(env!("CARGO_BIN_EXE_docflow"))
            .arg("--state-dir")
            .arg(self.state.path())
            .args(args)
            .env_remove("DOCFLOW_LOG")
            .env_remove("DOCFLOW_HOME")
            .output()
            .expect("spawn docflow");
        Run::from_output(output)
    }

    /// Start a workflow over the fixture documents without running anything.
    pub fn start(&self, name: &str) -> Run {
        let docs = self.docs_path().display().to_string();
        self.run(["start", name, docs.as_str(), "--no-run"])
    }

    pub fn status_json(&self, name: &str) -> serde_json::Value {
        self.run(["status", name, "--json"]).assert_code(0).json()
    }
}
