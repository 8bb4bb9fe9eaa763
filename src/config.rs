//! Scenario file loading.
//!
//! The engine itself consumes parsed [`Scenario`] values; this module
//! is the default loader for `.yaml`/`.yml` scenario files and
//! directories of them.

use crate::model::Scenario;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Loads scenarios from a configured set of search paths.
#[derive(Debug)]
pub struct ScenarioLoader {
    pub scenario_paths: Vec<PathBuf>,
}

impl ScenarioLoader {
    pub fn new() -> Self {
        Self {
            scenario_paths: vec![PathBuf::from("scenarios")],
        }
    }

    pub fn add_path<P: AsRef<Path>>(&mut self, path: P) -> &mut Self {
        self.scenario_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Load a single scenario file.
    pub fn load_scenario<P: AsRef<Path>>(&self, path: P) -> Result<Scenario> {
        let path = path.as_ref();
        info!("loading scenario from {}", path.display());

        let content = fs::read_to_string(path).with_context(|| {
            format!("failed to read scenario file: {}", path.display())
        })?;
        let scenario = Scenario::from_yaml(&content).with_context(|| {
            format!("failed to parse YAML from {}", path.display())
        })?;

        debug!("loaded scenario: {}", scenario.name);
        Ok(scenario)
    }

    /// Load every scenario file directly inside `dir`. Files that
    /// fail to parse are skipped with a log line.
    pub fn load_scenarios_from_dir<P: AsRef<Path>>(
        &self,
        dir: P,
    ) -> Result<Vec<Scenario>> {
        let dir = dir.as_ref();
        info!("loading scenarios from directory: {}", dir.display());

        let mut scenarios = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| {
            format!("failed to read directory: {}", dir.display())
        })? {
            let path = entry?.path();
            if path.is_file() && is_scenario_file(&path) {
                match self.load_scenario(&path) {
                    Ok(scenario) => scenarios.push(scenario),
                    Err(err) => {
                        debug!(
                            "skipping {}: {err:#}",
                            path.display()
                        );
                    }
                }
            }
        }

        info!(
            "loaded {} scenarios from {}",
            scenarios.len(),
            dir.display()
        );
        Ok(scenarios)
    }

    /// Load scenarios from every configured search path that exists.
    pub fn load_all_scenarios(&self) -> Result<Vec<Scenario>> {
        let mut all = Vec::new();
        for path in &self.scenario_paths {
            if path.is_dir() {
                all.extend(self.load_scenarios_from_dir(path)?);
            }
        }
        info!("loaded {} scenarios in total", all.len());
        Ok(all)
    }
}

impl Default for ScenarioLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn is_scenario_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "name: t\nsteps:\n  only:\n    type: HTTP\n    \
                           request:\n      method: GET\n      \
                           url: http://localhost/ping\n    route:\n      \
                           - then: {}\n";

    #[test]
    fn yaml_extensions_are_scenario_files() {
        assert!(is_scenario_file(Path::new("flow.yaml")));
        assert!(is_scenario_file(Path::new("flow.yml")));
        assert!(!is_scenario_file(Path::new("flow.json")));
        assert!(!is_scenario_file(Path::new("readme.md")));
        assert!(!is_scenario_file(Path::new("no_ext")));
    }

    #[test]
    fn loads_yaml_and_skips_everything_else() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.yaml"), MINIMAL).unwrap();
        fs::write(dir.path().join("broken.yaml"), "steps: [not a map").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loader = ScenarioLoader::new();
        let scenarios = loader.load_scenarios_from_dir(dir.path()).unwrap();
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].name, "t");
    }

    #[test]
    fn missing_file_is_an_error() {
        let loader = ScenarioLoader::new();
        assert!(loader.load_scenario("does/not/exist.yaml").is_err());
    }
}
