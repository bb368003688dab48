use crate::model::ResourceKind;
use crate::reconcile::DEFAULT_FLASH_WINDOW;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

pub const MIN_REFRESH_MS: u64 = 500;
pub const DEFAULT_REFRESH_MS: u64 = 2_000;

/// Effective timings: command line first, then the runtime config, then
/// built-in defaults.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Settings {
    pub refresh: Duration,
    pub flash: Duration,
}

impl Settings {
    pub fn resolve(
        refresh_ms: Option<u64>,
        flash_ms: Option<u64>,
        config: &RuntimeConfigSnapshot,
    ) -> Self {
        let refresh = refresh_ms
            .map(Duration::from_millis)
            .or(config.refresh)
            .unwrap_or(Duration::from_millis(DEFAULT_REFRESH_MS))
            .max(Duration::from_millis(MIN_REFRESH_MS));
        let flash = flash_ms
            .map(Duration::from_millis)
            .or(config.flash_window)
            .unwrap_or(DEFAULT_FLASH_WINDOW);
        Self { refresh, flash }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeConfigSnapshot {
    pub source: Option<String>,
    pub refresh: Option<Duration>,
    pub flash_window: Option<Duration>,
    pub dump_dir: Option<PathBuf>,
    pub benchmark_dir: Option<PathBuf>,
    pub aliases: HashMap<String, String>,
}

impl RuntimeConfigSnapshot {
    pub fn resolve_kind(&self, token: &str) -> Option<ResourceKind> {
        let token = token.trim().to_ascii_lowercase();
        let target = self
            .aliases
            .get(&token)
            .map(String::as_str)
            .unwrap_or(&token);
        ResourceKind::from_token(target)
    }

    pub fn dump_dir(&self) -> PathBuf {
        self.dump_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("skiff-screens"))
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfigWatcher {
    path: Option<PathBuf>,
    modified: Option<SystemTime>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct SkiffConfigFile {
    #[serde(default)]
    refresh_ms: Option<u64>,
    #[serde(default, alias = "flash_ms")]
    flash_window_ms: Option<u64>,
    #[serde(default)]
    dump_dir: Option<PathBuf>,
    #[serde(default, alias = "benchmarks_dir")]
    benchmark_dir: Option<PathBuf>,
    #[serde(default)]
    aliases: BTreeMap<String, String>,
}

impl RuntimeConfigWatcher {
    pub fn discover() -> Self {
        Self::at(discover_config_path())
    }

    pub fn at(path: Option<PathBuf>) -> Self {
        Self {
            path,
            modified: None,
        }
    }

    pub fn load_current(&mut self) -> Result<RuntimeConfigSnapshot> {
        let Some(path) = self.path.clone() else {
            return Ok(RuntimeConfigSnapshot::default());
        };

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read runtime config {}", path.display()))?;
        let parsed: SkiffConfigFile = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse runtime config {}", path.display()))?;
        self.modified = fs::metadata(&path)
            .ok()
            .and_then(|meta| meta.modified().ok());

        Ok(RuntimeConfigSnapshot {
            source: Some(path.display().to_string()),
            refresh: parsed
                .refresh_ms
                .map(|ms| Duration::from_millis(ms.max(MIN_REFRESH_MS))),
            flash_window: parsed.flash_window_ms.map(Duration::from_millis),
            dump_dir: parsed.dump_dir.map(|dir| expand_home(&dir)),
            benchmark_dir: parsed.benchmark_dir.map(|dir| expand_home(&dir)),
            aliases: parsed
                .aliases
                .into_iter()
                .map(|(alias, target)| (alias.to_ascii_lowercase(), target))
                .collect(),
        })
    }

    pub fn reload_if_changed(&mut self) -> Result<Option<RuntimeConfigSnapshot>> {
        let Some(current_path) = self.path.clone() else {
            self.path = discover_config_path();
            if self.path.is_some() {
                return self.load_current().map(Some);
            }
            return Ok(None);
        };

        if !current_path.exists() {
            self.path = discover_config_path();
            self.modified = None;
            if self.path.is_some() {
                return self.load_current().map(Some);
            }
            return Ok(Some(RuntimeConfigSnapshot::default()));
        }

        let modified = fs::metadata(&current_path)
            .ok()
            .and_then(|meta| meta.modified().ok());
        if modified != self.modified {
            return self.load_current().map(Some);
        }

        Ok(None)
    }
}

fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Ok(home) = std::env::var("HOME")
    {
        return PathBuf::from(home).join(rest);
    }
    path.to_path_buf()
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SKIFF_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [
        PathBuf::from("skiff.yaml"),
        PathBuf::from("skiff.yml"),
        PathBuf::from(".skiff.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let user_candidates = [
            PathBuf::from(&home).join(".config/skiff/config.yaml"),
            PathBuf::from(&home).join(".config/skiff/config.yml"),
            PathBuf::from(&home).join(".skiff.yaml"),
        ];
        for candidate in user_candidates {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::{RuntimeConfigSnapshot, RuntimeConfigWatcher, Settings};
    use crate::model::ResourceKind;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn loads_keys_and_floors_refresh() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("skiff.yaml");
        std::fs::write(
            &path,
            "refresh_ms: 100\nflash_window_ms: 3000\ndump_dir: /var/tmp/dumps\naliases:\n  Web: deploy\n",
        )
        .expect("write config");

        let mut watcher = RuntimeConfigWatcher::at(Some(path.clone()));
        let snapshot = watcher.load_current().expect("load");
        assert_eq!(snapshot.source, Some(path.display().to_string()));
        assert_eq!(snapshot.refresh, Some(Duration::from_millis(500)));
        assert_eq!(snapshot.flash_window, Some(Duration::from_secs(3)));
        assert_eq!(snapshot.dump_dir(), PathBuf::from("/var/tmp/dumps"));
        assert_eq!(snapshot.benchmark_dir, None);
        assert_eq!(
            snapshot.resolve_kind("web"),
            Some(ResourceKind::Deployments)
        );

        assert!(watcher.reload_if_changed().expect("reload").is_none());
    }

    #[test]
    fn reports_parse_failures_with_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("skiff.yaml");
        std::fs::write(&path, "refresh_ms: [nope").expect("write config");

        let error = RuntimeConfigWatcher::at(Some(path))
            .load_current()
            .unwrap_err();
        assert!(error.to_string().contains("failed to parse runtime config"));
    }

    #[test]
    fn builtin_tokens_resolve_without_aliases() {
        let snapshot = RuntimeConfigSnapshot::default();
        assert_eq!(snapshot.resolve_kind(" PO "), Some(ResourceKind::Pods));
        assert_eq!(snapshot.resolve_kind("bogus"), None);
        assert!(snapshot.dump_dir().ends_with("skiff-screens"));
    }

    #[test]
    fn command_line_wins_over_config() {
        let config = RuntimeConfigSnapshot {
            refresh: Some(Duration::from_secs(10)),
            flash_window: Some(Duration::from_secs(5)),
            ..RuntimeConfigSnapshot::default()
        };

        let settings = Settings::resolve(Some(100), Some(100), &config);
        assert_eq!(settings.flash, Duration::from_millis(100));
        assert_eq!(settings.refresh, Duration::from_millis(500));

        let settings = Settings::resolve(None, None, &config);
        assert_eq!(settings.flash, Duration::from_secs(5));
        assert_eq!(settings.refresh, Duration::from_secs(10));

        let settings = Settings::resolve(None, None, &RuntimeConfigSnapshot::default());
        assert_eq!(settings.flash, Duration::from_millis(1500));
        assert_eq!(settings.refresh, Duration::from_secs(2));
    }
}
