//! Run the project's verify command after a patch
//!
//! The command comes from, in order: an explicit override, `[verify]
//! command` in `archfix.toml`, `[tool.archfix] verify_cmd` in
//! `pyproject.toml`, and finally `{python} -m pytest -q`.

use crate::graph::scanner::python_files;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_PYTHON: &str = "python3";

/// Characters of stdout/stderr kept in reports
const OUTPUT_TAIL: usize = 3000;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

const MISSING_PYTEST: &str = "No module named pytest";
const PYTEST_GUIDANCE: &str = "install pytest or configure [verify] command";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOptions {
    /// Command given on the command line; wins over everything
    pub command_override: Option<String>,
    /// `[verify] command` from archfix.toml
    pub configured_command: Option<String>,
    pub timeout_secs: u64,
    pub python: String,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            command_override: None,
            configured_command: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            python: DEFAULT_PYTHON.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    /// `None` when verification did not run
    pub success: Option<bool>,
    pub returncode: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,
    #[serde(default)]
    pub py_compile_fallback: bool,
}

impl VerifyReport {
    pub fn not_run() -> Self {
        Self::default()
    }

    pub fn failed(&self) -> bool {
        self.success == Some(false)
    }

    fn spawn_failure(command: Vec<String>, message: String) -> Self {
        Self {
            success: Some(false),
            returncode: None,
            stdout: String::new(),
            stderr: message,
            command,
            guidance: None,
            py_compile_fallback: false,
        }
    }
}

/// Last `n` characters of `s`
fn tail(s: &str, n: usize) -> String {
    let count = s.chars().count();
    if count <= n {
        return s.to_string();
    }
    s.chars().skip(count - n).collect()
}

fn pyproject_verify_cmd(root: &Path) -> Option<String> {
    let content = std::fs::read_to_string(root.join("pyproject.toml")).ok()?;
    let value: toml::Value = toml::from_str(&content).ok()?;
    value
        .get("tool")?
        .get("archfix")?
        .get("verify_cmd")?
        .as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve and split the verify command
pub fn resolve_command(root: &Path, options: &VerifyOptions) -> Vec<String> {
    let non_empty = |s: &Option<String>| s.as_ref().map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
    let raw = non_empty(&options.command_override)
        .or_else(|| non_empty(&options.configured_command))
        .or_else(|| pyproject_verify_cmd(root));
    match raw {
        Some(cmd) => shell_words::split(&cmd).unwrap_or_else(|e| {
            warn!("Could not split verify command '{}': {}", cmd, e);
            cmd.split_whitespace().map(String::from).collect()
        }),
        None => vec![
            options.python.clone(),
            "-m".to_string(),
            "pytest".to_string(),
            "-q".to_string(),
        ],
    }
}

/// `py_compile` without `.py` arguments compiles every project file
pub fn expand_py_compile_args(cmd: Vec<String>, root: &Path) -> Vec<String> {
    if cmd.len() < 2 || !cmd.iter().any(|a| a == "py_compile") {
        return cmd;
    }
    if cmd.iter().any(|a| a.ends_with(".py")) {
        return cmd;
    }
    let files: Vec<String> = python_files(root, &[])
        .into_iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    cmd.into_iter().chain(files).collect()
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> Option<JoinHandle<String>> {
    stream.map(|mut s| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = s.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Option<i32>, String> {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status.code().unwrap_or(-1))),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Ok(None);
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(e.to_string()),
        }
    }
}

/// Run `cmd` in `cwd`, draining both pipes while polling for exit
pub fn run_command(cmd: &[String], cwd: &Path, timeout_secs: u64) -> VerifyReport {
    let Some((program, args)) = cmd.split_first() else {
        return VerifyReport::spawn_failure(Vec::new(), "empty verify command".to_string());
    };
    debug!("Running verify: {} {:?}", program, args);
    let mut child = match Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            return VerifyReport::spawn_failure(
                cmd.to_vec(),
                format!("failed to run {}: {}", program, e),
            )
        }
    };
    let out_reader = drain(child.stdout.take());
    let err_reader = drain(child.stderr.take());
    let waited = wait_with_timeout(&mut child, Duration::from_secs(timeout_secs));
    let stdout = join(out_reader);
    let mut stderr = join(err_reader);

    let (success, returncode) = match waited {
        Ok(Some(code)) => (code == 0, Some(code)),
        Ok(None) => {
            warn!("verify command timed out after {}s", timeout_secs);
            let msg = format!("verify command timed out after {}s", timeout_secs);
            stderr = if stderr.is_empty() {
                msg
            } else {
                format!("{}\n{}", stderr, msg)
            };
            (false, Some(-1))
        }
        Err(e) => {
            stderr = format!("{}\nfailed to wait for verify command: {}", stderr, e);
            (false, None)
        }
    };

    let guidance = (stdout.contains(MISSING_PYTEST) || stderr.contains(MISSING_PYTEST))
        .then(|| PYTEST_GUIDANCE.to_string());
    VerifyReport {
        success: Some(success),
        returncode,
        stdout: tail(&stdout, OUTPUT_TAIL),
        stderr: tail(&stderr, OUTPUT_TAIL),
        command: cmd.to_vec(),
        guidance,
        py_compile_fallback: false,
    }
}

/// Run the resolved verify command in the project root
pub fn verify_patch(root: &Path, options: &VerifyOptions) -> VerifyReport {
    let cmd = expand_py_compile_args(resolve_command(root, options), root);
    let report = run_command(&cmd, root, options.timeout_secs);
    info!(
        "Verify {} (returncode {:?})",
        if report.success == Some(true) { "passed" } else { "failed" },
        report.returncode
    );
    report
}

/// `{python} -m py_compile` over the modified `.py` files
pub fn verify_py_compile(root: &Path, modified: &[String], options: &VerifyOptions) -> VerifyReport {
    let files: Vec<String> = modified
        .iter()
        .filter(|p| p.ends_with(".py"))
        .map(|p| root.join(p).to_string_lossy().into_owned())
        .collect();
    if files.is_empty() {
        return VerifyReport {
            success: Some(true),
            returncode: Some(0),
            stdout: "no .py files to compile".to_string(),
            py_compile_fallback: true,
            ..Default::default()
        };
    }
    let cmd: Vec<String> = [options.python.clone(), "-m".into(), "py_compile".into()]
        .into_iter()
        .chain(files)
        .collect();
    let mut report = run_command(&cmd, root, options.timeout_secs.min(60));
    report.py_compile_fallback = true;
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(cmd: &str) -> VerifyOptions {
        VerifyOptions {
            command_override: Some(cmd.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_command_resolution_order() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        assert_eq!(
            resolve_command(root, &VerifyOptions::default()),
            vec!["python3", "-m", "pytest", "-q"]
        );

        std::fs::write(
            root.join("pyproject.toml"),
            "[tool.archfix]\nverify_cmd = \"python -m unittest discover\"\n",
        )
        .unwrap();
        assert_eq!(
            resolve_command(root, &VerifyOptions::default()),
            vec!["python", "-m", "unittest", "discover"]
        );

        let configured = VerifyOptions {
            configured_command: Some("make check".into()),
            ..Default::default()
        };
        assert_eq!(resolve_command(root, &configured), vec!["make", "check"]);

        let overridden = VerifyOptions {
            command_override: Some("sh -c 'exit 3'".into()),
            ..configured
        };
        assert_eq!(resolve_command(root, &overridden), vec!["sh", "-c", "exit 3"]);
    }

    #[test]
    fn test_py_compile_expansion() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        let cmd: Vec<String> = vec!["python".into(), "-m".into(), "py_compile".into()];
        let expanded = expand_py_compile_args(cmd.clone(), dir.path());
        assert_eq!(expanded.len(), 4);
        assert!(expanded[3].ends_with("a.py"));

        let explicit: Vec<String> = cmd.into_iter().chain(["b.py".to_string()]).collect();
        assert_eq!(expand_py_compile_args(explicit.clone(), dir.path()), explicit);
    }

    #[test]
    fn test_run_success_and_failure() {
        let dir = TempDir::new().unwrap();
        let ok = verify_patch(dir.path(), &options("sh -c 'echo fine'"));
        assert_eq!(ok.success, Some(true));
        assert_eq!(ok.returncode, Some(0));
        assert_eq!(ok.stdout.trim(), "fine");

        let bad = verify_patch(dir.path(), &options("sh -c 'echo broken >&2; exit 4'"));
        assert_eq!(bad.success, Some(false));
        assert_eq!(bad.returncode, Some(4));
        assert_eq!(bad.stderr.trim(), "broken");
    }

    #[test]
    fn test_timeout() {
        let dir = TempDir::new().unwrap();
        let mut opts = options("sh -c 'exec sleep 5'");
        opts.timeout_secs = 1;
        let report = verify_patch(dir.path(), &opts);
        assert_eq!(report.success, Some(false));
        assert_eq!(report.returncode, Some(-1));
        assert!(report.stderr.contains("verify command timed out after 1s"));
    }

    #[test]
    fn test_missing_program() {
        let dir = TempDir::new().unwrap();
        let report = verify_patch(dir.path(), &options("definitely-not-a-real-binary-xyz"));
        assert_eq!(report.success, Some(false));
        assert!(report.stderr.starts_with("failed to run"));
    }

    #[test]
    fn test_guidance_and_tail() {
        let dir = TempDir::new().unwrap();
        let report = verify_patch(
            dir.path(),
            &options("sh -c 'echo \"No module named pytest\" >&2; exit 1'"),
        );
        assert_eq!(report.guidance.as_deref(), Some(PYTEST_GUIDANCE));

        let long = "x".repeat(5000);
        assert_eq!(tail(&long, OUTPUT_TAIL).len(), OUTPUT_TAIL);
        assert_eq!(tail("short", OUTPUT_TAIL), "short");
    }
}
