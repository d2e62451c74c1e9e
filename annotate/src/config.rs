/// Engine configuration
///
/// Settings are read from `annotate.json` inside the context's config
/// directory; every field falls back to its default when absent.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::Result;

pub const CONFIG_FILE_NAME: &str = "annotate.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Debugger executable
    pub debugger_path: PathBuf,
    /// Name of the init file written to the config directory
    pub init_file_name: String,
    /// Commands written to the init file before the debugger starts
    pub init_commands: Vec<String>,
    /// Prompt suffixes that mark a confirmation question
    pub misc_prompt_patterns: Vec<String>,
    /// Longest annotation line accepted before it is treated as text
    pub max_annotation_len: usize,
    /// Number of instructions requested when disassembling at $pc
    pub disassemble_count: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debugger_path: PathBuf::from("gdb"),
            init_file_name: "a2_gdb_init".into(),
            init_commands: vec![
                "set annotate 2".into(),
                "set height 0".into(),
                "set width 0".into(),
            ],
            misc_prompt_patterns: vec![
                "(y or n) ".into(),
                "(y or [n]) ".into(),
                "([y] or n) ".into(),
            ],
            max_annotation_len: 4096,
            disassemble_count: 64,
        }
    }
}

impl EngineConfig {
    /// Load the configuration stored in `config_dir`, or the defaults
    pub fn load(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(CONFIG_FILE_NAME);
        if !path.is_file() {
            log::debug!("No {} in {}, using defaults", CONFIG_FILE_NAME, config_dir.display());
            return Ok(Self::default());
        }

        let text = fs::read_to_string(&path)?;
        let config = serde_json::from_str(&text)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Write the debugger init file
    pub fn write_init_file(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut contents = self.init_commands.join("\n");
        contents.push('\n');
        fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("annotate-config-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = scratch_dir("missing");
        assert_eq!(EngineConfig::load(&dir).unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = scratch_dir("partial");
        fs::write(
            dir.join(CONFIG_FILE_NAME),
            r#"{"debugger_path": "/opt/gdb/bin/gdb", "disassemble_count": 10}"#,
        )
        .unwrap();

        let config = EngineConfig::load(&dir).unwrap();
        assert_eq!(config.debugger_path, PathBuf::from("/opt/gdb/bin/gdb"));
        assert_eq!(config.disassemble_count, 10);
        assert_eq!(config.max_annotation_len, 4096);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = scratch_dir("malformed");
        fs::write(dir.join(CONFIG_FILE_NAME), "{ not json").unwrap();
        assert!(matches!(
            EngineConfig::load(&dir),
            Err(crate::EngineError::Config(_))
        ));
    }

    #[test]
    fn test_init_file_contents() {
        let dir = scratch_dir("init");
        let path = dir.join("nested").join("a2_gdb_init");
        EngineConfig::default().write_init_file(&path).unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert_eq!(text, "set annotate 2\nset height 0\nset width 0\n");
    }
}
