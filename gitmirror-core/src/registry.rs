//! Ordered repository list with path-based webhook routing.
//!
//! Paths are compared after [`clean_path`] so `/site/` and `/site` route to
//! the same repository. When two repositories share a path the first one in
//! configuration order wins; [`RepoRegistry::duplicate_paths`] reports the
//! rest so the loader can warn about them.

use std::collections::HashSet;
use std::sync::Arc;

use crate::types::RepositoryConfig;

#[derive(Debug, Clone, Default)]
pub struct RepoRegistry {
    repos: Vec<Arc<RepositoryConfig>>,
}

impl RepoRegistry {
    pub fn new(repos: Vec<RepositoryConfig>) -> Self {
        Self {
            repos: repos.into_iter().map(Arc::new).collect(),
        }
    }

    /// All repositories in configuration order.
    pub fn all(&self) -> &[Arc<RepositoryConfig>] {
        &self.repos
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    /// First repository whose path matches the request path.
    pub fn find(&self, request_path: &str) -> Option<&Arc<RepositoryConfig>> {
        let wanted = clean_path(request_path);
        self.repos.iter().find(|r| clean_path(&r.path) == wanted)
    }

    /// Every routing path, one entry per repository (duplicates included).
    pub fn paths(&self) -> Vec<String> {
        self.repos.iter().map(|r| clean_path(&r.path).to_string()).collect()
    }

    /// One entry per repository shadowed by an earlier one with the same path.
    pub fn duplicate_paths(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.repos
            .iter()
            .map(|r| clean_path(&r.path))
            .filter(|path| !seen.insert(*path))
            .map(str::to_string)
            .collect()
    }
}

/// Strip a single trailing slash, keeping a bare `/` intact.
pub fn clean_path(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => path,
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
