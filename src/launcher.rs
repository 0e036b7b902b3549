//! OS-aware resolution and spawn-descriptor construction for external tools.
//!
//! Given a logical tool name (`codex`, `claude`, a shell), locates the
//! executable across the platform's well-known install locations and `PATH`,
//! and produces a descriptor that spawns correctly on the host OS. On Windows
//! an npm `.cmd`/`.bat` shim cannot be spawned directly, so the descriptor
//! wraps it in `cmd /c` and prepends the shim's directory to the child `PATH`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

use crate::error::{Error, Result};

/// How long the `which`/`where` fallback subprocess may run.
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything needed to spawn a tool process.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl ToolSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Build a `tokio::process::Command` from this descriptor.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }

    /// Build a PTY command builder from this descriptor.
    pub fn pty_command(&self) -> portable_pty::CommandBuilder {
        let mut cmd = portable_pty::CommandBuilder::new(&self.program);
        for arg in &self.args {
            cmd.arg(arg);
        }
        if let Some(dir) = &self.cwd {
            cmd.cwd(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Resolve a logical tool name and wrap it into a spawn descriptor.
///
/// Windows batch shims are wrapped in `cmd /c`; the resolved executable's
/// directory is prepended to the child's `PATH` so transitive lookups by the
/// tool itself succeed.
pub async fn spawn_spec(name: &str, explicit: Option<&Path>) -> Result<ToolSpec> {
    let resolved = resolve(name, explicit).await?;
    let is_shim = is_batch_shim(&resolved);
    let path_var = std::env::var("PATH").unwrap_or_default();
    wrap_resolved(resolved, is_shim, &path_var)
}

/// Build the spawn descriptor for an already-resolved executable. The shim
/// decision is an explicit input: a batch shim cannot be spawned directly, so
/// it runs under the system command processor. Either way the executable's
/// directory lands at the front of the child's `PATH`, ahead of the parent's
/// entries.
fn wrap_resolved(resolved: PathBuf, is_shim: bool, parent_path: &str) -> Result<ToolSpec> {
    let exe_dir = resolved.parent().map(Path::to_path_buf);

    let mut spec = if is_shim {
        ToolSpec::new("cmd")
            .arg("/c")
            .arg(resolved.to_string_lossy().to_string())
    } else {
        ToolSpec::new(resolved)
    };

    if let Some(dir) = exe_dir {
        let joined = std::env::join_paths(
            std::iter::once(dir).chain(std::env::split_paths(parent_path)),
        )
        .map_err(|e| Error::Config(format!("Invalid PATH entry: {e}")))?;
        spec = spec.env("PATH", joined.to_string_lossy().to_string());
    }

    Ok(spec)
}

/// Locate an executable for a logical tool name. Search order, first hit wins:
/// explicit path, OS well-known locations, `PATH`, then a bounded
/// `which`/`where` subprocess.
pub async fn resolve(name: &str, explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if is_executable(path) {
            return Ok(path.to_path_buf());
        }
        return Err(Error::NotFound(format!(
            "Configured path for `{name}` is not executable: {}",
            path.display()
        )));
    }

    for dir in well_known_dirs() {
        if let Some(hit) = candidate_in(&dir, name) {
            return Ok(hit);
        }
    }

    if let Some(hit) = search_path(name) {
        return Ok(hit);
    }

    if let Some(hit) = which_lookup(name).await {
        return Ok(hit);
    }

    Err(Error::NotFound(format!("`{name}` executable not found")))
}

/// Platform-specific well-known install locations, most specific first.
fn well_known_dirs() -> Vec<PathBuf> {
    let mut dirs_list = Vec::new();
    let home = dirs::home_dir();

    #[cfg(target_os = "windows")]
    {
        // npm global installs land in the per-user roaming dir.
        if let Ok(appdata) = std::env::var("APPDATA") {
            dirs_list.push(PathBuf::from(appdata).join("npm"));
        }
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            dirs_list.push(PathBuf::from(local).join("Programs"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        dirs_list.push(PathBuf::from("/opt/homebrew/bin"));
        dirs_list.push(PathBuf::from("/usr/local/bin"));
    }

    #[cfg(target_os = "linux")]
    {
        dirs_list.push(PathBuf::from("/usr/local/bin"));
        dirs_list.push(PathBuf::from("/usr/bin"));
    }

    if let Some(home) = home {
        dirs_list.push(home.join(".local").join("bin"));
        dirs_list.push(home.join(".npm-global").join("bin"));
    }

    dirs_list
}

/// Check a single directory for the named executable, trying the platform's
/// executable extensions on Windows.
fn candidate_in(dir: &Path, name: &str) -> Option<PathBuf> {
    for candidate_name in candidate_names(name) {
        let candidate = dir.join(candidate_name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn candidate_names(name: &str) -> Vec<String> {
    if cfg!(windows) {
        vec![
            format!("{name}.exe"),
            format!("{name}.cmd"),
            format!("{name}.bat"),
            name.to_string(),
        ]
    } else {
        vec![name.to_string()]
    }
}

fn search_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        if let Some(hit) = candidate_in(&dir, name) {
            return Some(hit);
        }
    }
    None
}

/// Last resort: ask `which` (or `where` on Windows), capped at 5 seconds.
async fn which_lookup(name: &str) -> Option<PathBuf> {
    let finder = if cfg!(windows) { "where" } else { "which" };
    let output = tokio::time::timeout(
        RESOLVE_TIMEOUT,
        Command::new(finder).arg(name).output(),
    )
    .await
    .ok()?
    .ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout.lines().next()?.trim();
    if first.is_empty() {
        return None;
    }
    Some(PathBuf::from(first))
}

/// Only Windows spawns treat a batch file as a shim; elsewhere the extension
/// carries no meaning.
fn is_batch_shim(path: &Path) -> bool {
    cfg!(windows) && has_batch_extension(path)
}

fn has_batch_extension(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase),
        Some(ref ext) if ext == "cmd" || ext == "bat"
    )
}

pub fn is_executable(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = std::fs::metadata(path) {
            return meta.permissions().mode() & 0o111 != 0;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_builds_command() {
        let spec = ToolSpec::new("echo").arg("hello").env("FOO", "bar");
        assert_eq!(spec.program, PathBuf::from("echo"));
        assert_eq!(spec.args, vec!["hello"]);
        assert_eq!(spec.env.get("FOO").map(String::as_str), Some("bar"));
    }

    #[tokio::test]
    async fn test_resolve_missing_tool() {
        let result = resolve("definitely-not-a-real-tool-9f2d", None).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_finds_sh() {
        let path = resolve("sh", None).await.unwrap();
        assert!(is_executable(&path));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_explicit_path_wins() {
        let sh = resolve("sh", None).await.unwrap();
        let resolved = resolve("anything", Some(&sh)).await.unwrap();
        assert_eq!(resolved, sh);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_explicit_non_executable_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-exec");
        std::fs::write(&file, b"x").unwrap();
        let result = resolve("tool", Some(&file)).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_spec_prepends_exe_dir_to_path() {
        let spec = spawn_spec("sh", None).await.unwrap();
        let path = spec.env.get("PATH").expect("PATH set");
        let exe_dir = spec.program.parent().unwrap().to_string_lossy().to_string();
        assert!(path.starts_with(&exe_dir));
    }

    #[test]
    fn test_batch_extension_detection() {
        assert!(has_batch_extension(Path::new("/fake/npm/codex.cmd")));
        assert!(has_batch_extension(Path::new("/fake/npm/CODEX.BAT")));
        assert!(!has_batch_extension(Path::new("/fake/tools/codex.exe")));
        assert!(!has_batch_extension(Path::new("/usr/local/bin/codex")));
    }

    #[test]
    fn test_wrap_batch_shim_uses_command_processor() {
        let parent_path = join(["/fake/sys", "/fake/bin"]);
        let spec =
            wrap_resolved(PathBuf::from("/fake/npm/codex.cmd"), true, &parent_path).unwrap();

        // The shim itself is an argument to the command processor.
        assert_eq!(spec.program, PathBuf::from("cmd"));
        assert_eq!(
            spec.args,
            vec!["/c".to_string(), "/fake/npm/codex.cmd".to_string()]
        );

        // The shim directory leads the child's PATH, parent entries follow.
        let path = spec.env.get("PATH").expect("PATH set");
        assert!(path.starts_with("/fake/npm"));
        assert!(path.contains("/fake/sys"));
        assert!(path.contains("/fake/bin"));
    }

    #[test]
    fn test_wrap_native_executable_spawns_directly() {
        let parent_path = join(["/fake/sys"]);
        let spec =
            wrap_resolved(PathBuf::from("/fake/tools/codex.exe"), false, &parent_path).unwrap();

        assert_eq!(spec.program, PathBuf::from("/fake/tools/codex.exe"));
        assert!(spec.args.is_empty());

        let path = spec.env.get("PATH").expect("PATH set");
        assert!(path.starts_with("/fake/tools"));
    }

    /// Platform-correct PATH separator for the fixture parent PATH.
    fn join<const N: usize>(entries: [&str; N]) -> String {
        std::env::join_paths(entries)
            .unwrap()
            .to_string_lossy()
            .to_string()
    }
}
