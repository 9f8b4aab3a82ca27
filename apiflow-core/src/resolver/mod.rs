//! Import resolution: locating, parsing, caching and splicing components.

mod cache;
mod merge;
mod source;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::ResolveError;
use crate::parser::{environment_snapshot, expand_env, parse_component_str, parse_document_str, DocumentFormat};
use crate::types::{Component, Workflow};
use crate::validate::{validate_component, validate_workflow};
use crate::variables::VariableStore;

pub use cache::ComponentCache;
pub use merge::ImportTarget;
pub use source::{normalize_lexically, ComponentSource, FsSource, MemorySource};

use merge::{apply_overrides, bind_private_variables, Expansion};

const EXTENSIONS: [&str; 2] = ["yml", "yaml"];

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Searched in order after the literal path.
    pub search_dirs: Vec<PathBuf>,
    pub max_depth: usize,
    pub max_load_attempts: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            search_dirs: [".", "components", "templates", "workflows", "steps"]
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            max_depth: 32,
            max_load_attempts: 256,
        }
    }
}

impl ResolverConfig {
    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dirs.push(dir.into());
        self
    }
}

pub struct ComponentResolver<S: ComponentSource = FsSource> {
    config: ResolverConfig,
    source: S,
    cache: ComponentCache,
    env: BTreeMap<String, String>,
    in_progress: Vec<PathBuf>,
    load_attempts: usize,
}

impl ComponentResolver<FsSource> {
    pub fn from_fs(config: ResolverConfig) -> Self {
        Self::new(config, FsSource)
    }
}

impl<S: ComponentSource> ComponentResolver<S> {
    /// The process environment is snapshotted here for `${VAR}` expansion.
    pub fn new(config: ResolverConfig, source: S) -> Self {
        Self {
            config,
            source,
            cache: ComponentCache::new(),
            env: environment_snapshot(),
            in_progress: Vec::new(),
            load_attempts: 0,
        }
    }

    pub fn with_environment(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_cache(mut self, cache: ComponentCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &ComponentCache {
        &self.cache
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Reads, parses, resolves and validates the workflow at `path`.
    pub fn load_workflow(&mut self, path: impl AsRef<Path>) -> Result<Workflow, ResolveError> {
        let path = path.as_ref();
        let key = self.source.canonicalize(path);
        let text = self
            .source
            .read_to_string(&key)
            .map_err(|source| ResolveError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let text = expand_env(&text, &self.env);
        let mut workflow = parse_document_str(&text, DocumentFormat::Auto)
            .map_err(|source| ResolveError::Parse {
                path: path.to_path_buf(),
                source,
            })?
            .document;
        workflow.environment = self.env.clone();

        let base_dir = parent_dir(&key);
        self.reset();
        self.in_progress.push(key);
        let result = self.expand_imports(&mut workflow, &base_dir, 1);
        self.in_progress.clear();
        result?;

        validate_workflow(&workflow).map_err(|source| ResolveError::InvalidDocument {
            path: path.display().to_string(),
            source,
        })?;
        debug!(
            workflow = %workflow.name,
            steps = workflow.steps.len(),
            groups = workflow.groups.len(),
            "workflow resolved"
        );
        Ok(workflow)
    }

    /// Expands the imports of an already parsed workflow. Relative import paths
    /// are looked up against `base_dir` first.
    pub fn resolve_workflow(
        &mut self,
        mut workflow: Workflow,
        base_dir: impl AsRef<Path>,
    ) -> Result<Workflow, ResolveError> {
        if workflow.environment.is_empty() {
            workflow.environment = self.env.clone();
        }
        self.reset();
        let result = self.expand_imports(&mut workflow, base_dir.as_ref(), 1);
        self.in_progress.clear();
        result?;
        Ok(workflow)
    }

    /// Loads one component, fully resolved, from the cache when possible.
    pub fn load_component(
        &mut self,
        import_path: &str,
        base_dir: impl AsRef<Path>,
    ) -> Result<Arc<Component>, ResolveError> {
        self.reset();
        self.load(import_path, base_dir.as_ref(), 1)
    }

    fn reset(&mut self) {
        self.in_progress.clear();
        self.load_attempts = 0;
    }

    fn load(&mut self, import_path: &str, base_dir: &Path, depth: usize) -> Result<Arc<Component>, ResolveError> {
        self.load_attempts += 1;
        if self.load_attempts > self.config.max_load_attempts {
            return Err(ResolveError::LoadAttemptsExceeded {
                path: import_path.to_string(),
                limit: self.config.max_load_attempts,
            });
        }
        if depth > self.config.max_depth {
            return Err(ResolveError::ImportDepthExceeded {
                path: import_path.to_string(),
                limit: self.config.max_depth,
            });
        }

        let located = self.locate(import_path, base_dir)?;
        let key = self.source.canonicalize(&located);
        if self.in_progress.contains(&key) {
            let mut chain: Vec<String> = self
                .in_progress
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            chain.push(key.display().to_string());
            return Err(ResolveError::CircularImport { chain });
        }
        if let Some(hit) = self.cache.get(&key) {
            debug!(path = %key.display(), "component cache hit");
            return Ok(hit);
        }

        let text = self
            .source
            .read_to_string(&key)
            .map_err(|source| ResolveError::Io {
                path: key.clone(),
                source,
            })?;
        let text = expand_env(&text, &self.env);
        let mut component = parse_component_str(&text, DocumentFormat::Auto)
            .map_err(|source| ResolveError::Parse {
                path: key.clone(),
                source,
            })?
            .document;

        self.in_progress.push(key.clone());
        let result = self.expand_imports(&mut component, &parent_dir(&key), depth + 1);
        self.in_progress.pop();
        result?;

        validate_component(&component).map_err(|e| ResolveError::InvalidComponent {
            path: key.display().to_string(),
            reason: e
                .violations
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        })?;

        debug!(
            path = %key.display(),
            component = %component.name,
            depth,
            "component loaded"
        );
        let component = Arc::new(component);
        self.cache.insert(key, component.clone());
        Ok(component)
    }

    fn expand_imports<T: ImportTarget>(
        &mut self,
        target: &mut T,
        base_dir: &Path,
        depth: usize,
    ) -> Result<(), ResolveError> {
        let imports = target.take_imports();
        if imports.is_empty() {
            return Ok(());
        }
        let mut importer = VariableStore::with_environment(self.env.clone());
        importer.declare(target.variables());

        let mut expansion = Expansion::default();
        for import in &imports {
            let cached = self.load(&import.path, base_dir, depth)?;
            let mut component = (*cached).clone();
            apply_overrides(&mut component, import, &importer)?;
            bind_private_variables(&mut component, &import.path)?;
            expansion.merge(component, import)?;
        }
        expansion.splice_into(target);
        Ok(())
    }

    fn locate(&self, import_path: &str, base_dir: &Path) -> Result<PathBuf, ResolveError> {
        let candidates = self.candidates(import_path, base_dir);
        for candidate in &candidates {
            trace!(candidate = %candidate.display(), "probing component path");
            if self.source.is_file(candidate) {
                return Ok(candidate.clone());
            }
        }
        Err(ResolveError::ComponentNotFound {
            path: import_path.to_string(),
            tried: candidates.iter().map(|p| p.display().to_string()).collect(),
        })
    }

    fn candidates(&self, import_path: &str, base_dir: &Path) -> Vec<PathBuf> {
        let raw = Path::new(import_path);
        let mut roots = Vec::new();
        if raw.is_absolute() {
            roots.push(raw.to_path_buf());
        } else {
            roots.push(base_dir.join(raw));
            roots.push(raw.to_path_buf());
            roots.extend(self.config.search_dirs.iter().map(|d| d.join(raw)));
        }

        let mut out: Vec<PathBuf> = Vec::new();
        for root in roots {
            let mut variants = vec![root.clone()];
            for ext in EXTENSIONS {
                let mut name = root.clone().into_os_string();
                name.push(".");
                name.push(ext);
                variants.push(PathBuf::from(name));
            }
            for v in variants {
                let v = normalize_lexically(&v);
                if !out.contains(&v) {
                    out.push(v);
                }
            }
        }
        out
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

/// Loads a workflow from the filesystem with the default resolver settings.
pub fn load_workflow(path: impl AsRef<Path>) -> Result<Workflow, ResolveError> {
    ComponentResolver::from_fs(ResolverConfig::default()).load_workflow(path)
}
