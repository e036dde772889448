//! On-disk project definition store and name-based resolution.

use std::path::{Path, PathBuf};

use kt_types::{TuneError, TuneResult};
use tracing::{info, warn};

use crate::definition::ProjectDefinition;

/// Reads project definition YAML files from one directory.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    root: PathBuf,
}

impl ProjectStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Parse every regular file under the store root as a project definition.
    /// Files that fail to parse are an error: a broken definition should not
    /// silently vanish from resolution.
    fn load_all(&self) -> TuneResult<Vec<ProjectDefinition>> {
        let mut projects = Vec::new();
        if !self.root.exists() {
            return Ok(projects);
        }

        let mut entries: Vec<PathBuf> = std::fs::read_dir(&self.root)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        entries.sort();

        for path in entries {
            let raw = std::fs::read_to_string(&path)?;
            let prj: ProjectDefinition = serde_yaml::from_str(&raw).map_err(|e| {
                TuneError::Project(format!("load {} failed: {e}", path.display()))
            })?;
            info!(project = %prj.project, path = %path.display(), "project definition loaded");
            projects.push(prj);
        }
        Ok(projects)
    }

    /// Resolve a comma-separated request into one merged project.
    ///
    /// The first on-disk definition whose name appears in the request becomes
    /// the base; every further match is appended in store order. Fails when
    /// no requested name matches.
    pub fn resolve(&self, requested: &str) -> TuneResult<ProjectDefinition> {
        let wanted: Vec<&str> = requested
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        info!(request = %requested, "resolving tuning project");

        let mut target: Option<ProjectDefinition> = None;
        for prj in self.load_all()? {
            if !wanted.contains(&prj.project.as_str()) {
                continue;
            }
            match target.as_mut() {
                None => target = Some(prj),
                Some(base) => base.merge(prj),
            }
        }

        target.ok_or_else(|| {
            warn!(request = %requested, "no matching project definition");
            TuneError::ProjectNotFound(requested.to_string())
        })
    }
}
