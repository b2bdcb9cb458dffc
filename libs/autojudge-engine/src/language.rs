// Toolchain configuration for local execution
use anyhow::{bail, Context, Result};
use autojudge_common::types::Language;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// How to prepare and run one language.
///
/// Command arguments may contain `{source}`, `{artifact}` and `{dir}`,
/// expanded against the working area of the round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub name: String,
    pub source_file: String,
    /// File produced by the build step, relative to the working area
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_file: Option<String>,
    /// Build command; absent for interpreted languages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<Vec<String>>,
    pub run: Vec<String>,
}

impl LanguageConfig {
    pub fn needs_build(&self) -> bool {
        self.build.is_some()
    }

    fn validate(&self) -> Result<()> {
        if self.source_file.trim().is_empty() {
            bail!("Language '{}' has an empty source_file", self.name);
        }
        if self.run.is_empty() {
            bail!("Language '{}' has an empty run command", self.name);
        }
        if matches!(&self.build, Some(cmd) if cmd.is_empty()) {
            bail!("Language '{}' has an empty build command", self.name);
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LanguagesJson {
    pub languages: Vec<LanguageConfig>,
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Toolchains assumed to be installed on the judging host
pub fn builtin_configs() -> Vec<LanguageConfig> {
    vec![
        LanguageConfig {
            name: "go".to_string(),
            source_file: "solution.go".to_string(),
            artifact_file: Some(format!("solution_bin{}", std::env::consts::EXE_SUFFIX)),
            build: Some(argv(&["go", "build", "-o", "{artifact}", "{source}"])),
            run: argv(&["{artifact}"]),
        },
        LanguageConfig {
            name: "python".to_string(),
            source_file: "solution.py".to_string(),
            artifact_file: None,
            build: None,
            run: argv(&["python3", "{source}"]),
        },
        LanguageConfig {
            name: "javascript".to_string(),
            source_file: "solution.js".to_string(),
            artifact_file: None,
            build: None,
            run: argv(&["node", "{source}"]),
        },
        LanguageConfig {
            name: "java".to_string(),
            source_file: "Main.java".to_string(),
            artifact_file: None,
            build: Some(argv(&["javac", "{source}"])),
            run: argv(&["java", "-cp", "{dir}", "Main"]),
        },
    ]
}

/// Language configuration manager
#[derive(Debug, Clone, Default)]
pub struct LanguageConfigManager {
    configs: HashMap<Language, LanguageConfig>,
}

impl LanguageConfigManager {
    pub fn from_configs(configs: impl IntoIterator<Item = LanguageConfig>) -> Result<Self> {
        let mut manager = Self::default();
        for config in configs {
            let language = Language::parse(&config.name)
                .ok_or_else(|| anyhow::anyhow!("Unknown language '{}' in toolchain config", config.name))?;
            config.validate()?;
            manager.configs.insert(language, config);
        }
        Ok(manager)
    }

    /// Load language configurations from languages.json
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .context("Failed to read languages.json")?;

        let languages_json: LanguagesJson = serde_json::from_str(&content)
            .context("Failed to parse languages.json")?;

        Self::from_configs(languages_json.languages)
    }

    /// Load from `config_path` when it exists, otherwise use the built-in toolchains
    pub fn load_or_builtin(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let manager = Self::load(config_path)?;
            info!(path = %config_path.display(), languages = ?manager.list_languages(), "Loaded toolchain config");
            Ok(manager)
        } else {
            warn!(path = %config_path.display(), "Toolchain config not found, using built-in toolchains");
            Ok(Self::builtin())
        }
    }

    pub fn builtin() -> Self {
        Self::from_configs(builtin_configs()).expect("built-in toolchains are valid")
    }

    /// Replace or add the toolchain for one language
    pub fn with(mut self, language: Language, config: LanguageConfig) -> Result<Self> {
        config.validate()?;
        self.configs.insert(language, config);
        Ok(self)
    }

    pub fn get_config(&self, language: Language) -> Option<&LanguageConfig> {
        self.configs.get(&language)
    }

    pub fn supports(&self, language: Language) -> bool {
        self.configs.contains_key(&language)
    }

    /// List all configured languages
    pub fn list_languages(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self.configs.keys().copied().collect();
        languages.sort_by_key(|l| l.as_str());
        languages
    }

    pub fn to_json(&self) -> Result<String> {
        let languages = self
            .list_languages()
            .into_iter()
            .filter_map(|l| self.configs.get(&l).cloned())
            .collect();
        serde_json::to_string_pretty(&LanguagesJson { languages })
            .context("Failed to serialize languages.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_capabilities() {
        let manager = LanguageConfigManager::builtin();
        assert!(manager.get_config(Language::Go).unwrap().needs_build());
        assert!(manager.get_config(Language::Java).unwrap().needs_build());
        assert!(!manager.get_config(Language::Python).unwrap().needs_build());
        assert!(!manager.get_config(Language::JavaScript).unwrap().needs_build());
        assert_eq!(manager.list_languages().len(), 4);
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"languages":[{{"name":"python","source_file":"main.py","run":["pypy3","{{source}}"]}}]}}"#
        )
        .unwrap();

        let manager = LanguageConfigManager::load(file.path()).unwrap();
        assert!(manager.supports(Language::Python));
        assert!(!manager.supports(Language::Go));
        assert_eq!(manager.get_config(Language::Python).unwrap().run[0], "pypy3");
    }

    #[test]
    fn test_unknown_language_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"languages":[{{"name":"cobol","source_file":"a.cob","run":["cobc"]}}]}}"#
        )
        .unwrap();
        assert!(LanguageConfigManager::load(file.path()).is_err());
    }

    #[test]
    fn test_empty_run_command_rejected() {
        let config = LanguageConfig {
            name: "python".to_string(),
            source_file: "main.py".to_string(),
            artifact_file: None,
            build: None,
            run: vec![],
        };
        assert!(LanguageConfigManager::from_configs([config]).is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_builtin() {
        let manager =
            LanguageConfigManager::load_or_builtin(Path::new("/nonexistent/languages.json")).unwrap();
        assert!(manager.supports(Language::Go));
    }

    #[test]
    fn test_json_round_trips_through_load() {
        let json = LanguageConfigManager::builtin().to_json().unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        let reloaded = LanguageConfigManager::load(file.path()).unwrap();
        assert_eq!(
            reloaded.get_config(Language::Go),
            LanguageConfigManager::builtin().get_config(Language::Go)
        );
    }

    #[test]
    fn test_with_validates() {
        let broken = LanguageConfig {
            name: "python".to_string(),
            source_file: "solution.py".to_string(),
            artifact_file: None,
            build: None,
            run: vec![],
        };
        assert!(LanguageConfigManager::default().with(Language::Python, broken).is_err());

        let manager = LanguageConfigManager::default()
            .with(Language::Python, builtin_configs().remove(1))
            .unwrap();
        assert!(manager.supports(Language::Python));
    }
}
