use std::path::PathBuf;

use crate::gateway::tool::ToolKind;

/// Returns the base directory for agentdeck data.
///
/// Uses `$AGENTDECK_HOME` if set, otherwise defaults to `~/.agentdeck`.
pub fn deck_home() -> PathBuf {
    if let Ok(home) = std::env::var("AGENTDECK_HOME") {
        return PathBuf::from(home);
    }

    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agentdeck")
}

/// Returns the path to the user configuration file.
pub fn config_path() -> PathBuf {
    deck_home().join("config.toml")
}

/// Ensure the data directory exists.
pub fn ensure_dirs() -> std::io::Result<()> {
    std::fs::create_dir_all(deck_home())
}

/// The Codex home directory (`$CODEX_HOME` or `~/.codex`).
pub fn codex_home() -> PathBuf {
    if let Ok(raw) = std::env::var("CODEX_HOME") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".codex")
}

/// The Claude Code home directory (`$CLAUDE_HOME` or `~/.claude`).
pub fn claude_home() -> PathBuf {
    if let Ok(raw) = std::env::var("CLAUDE_HOME") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claude")
}

/// Root of a tool's on-disk session archive.
///
/// Codex stores rollouts under `~/.codex/sessions/YYYY/MM/DD/*.jsonl`;
/// Claude Code stores transcripts under `~/.claude/projects/<slug>/*.jsonl`.
pub fn archive_root(tool: ToolKind) -> PathBuf {
    match tool {
        ToolKind::Codex => codex_home().join("sessions"),
        ToolKind::ClaudeCode => claude_home().join("projects"),
    }
}

/// The tool's primary user-facing config file.
pub fn tool_config_path(tool: ToolKind) -> PathBuf {
    match tool {
        ToolKind::Codex => codex_home().join("config.toml"),
        ToolKind::ClaudeCode => claude_home().join("settings.json"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deck_home_from_env() {
        std::env::set_var("AGENTDECK_HOME", "/tmp/test-deck");
        assert_eq!(deck_home(), PathBuf::from("/tmp/test-deck"));
        std::env::remove_var("AGENTDECK_HOME");
    }

    #[test]
    fn test_config_path_under_home() {
        std::env::set_var("AGENTDECK_HOME", "/tmp/test-deck");
        assert_eq!(config_path(), PathBuf::from("/tmp/test-deck/config.toml"));
        std::env::remove_var("AGENTDECK_HOME");
    }

    #[test]
    fn test_archive_roots_differ_per_tool() {
        let codex = archive_root(ToolKind::Codex);
        let claude = archive_root(ToolKind::ClaudeCode);
        assert!(codex.ends_with("sessions"));
        assert!(claude.ends_with("projects"));
        assert_ne!(codex, claude);
    }

    #[test]
    fn test_codex_home_env_override() {
        std::env::set_var("CODEX_HOME", "/tmp/test-codex");
        assert_eq!(codex_home(), PathBuf::from("/tmp/test-codex"));
        std::env::remove_var("CODEX_HOME");
    }
}
