use thiserror::Error;

/// Errors surfaced by scene loading and instantiation. Every variant carries
/// the offending path(s) for diagnostics.
#[derive(Debug, Error)]
pub enum SceneError {
    /// The requested scene path does not resolve to a file.
    #[error("scene source not found: {path}")]
    SourceNotFound { path: String },

    /// A reference edge (static) or construction step (runtime) would close
    /// a cycle. `chain` is the offending path sequence.
    #[error("circular scene dependency involving `{path}`: {}", .chain.join(" -> "))]
    CircularDependency { path: String, chain: Vec<String> },

    /// A scene references a path that does not resolve. Soft: recorded and
    /// logged, never aborts the referencing load.
    #[error("scene `{path}` references missing scene `{referenced}`")]
    MissingDependency { path: String, referenced: String },

    /// The file exists but could not be parsed into a scene.
    #[error("failed to load scene `{path}`: {reason}")]
    Load { path: String, reason: String },
}

impl SceneError {
    /// The primary path this error is about.
    pub fn path(&self) -> &str {
        match self {
            SceneError::SourceNotFound { path } => path,
            SceneError::CircularDependency { path, .. } => path,
            SceneError::MissingDependency { path, .. } => path,
            SceneError::Load { path, .. } => path,
        }
    }

    pub fn is_circular(&self) -> bool {
        matches!(self, SceneError::CircularDependency { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_offending_paths() {
        let err = SceneError::CircularDependency {
            path: "a.scene".into(),
            chain: vec!["a.scene".into(), "b.scene".into(), "a.scene".into()],
        };
        let text = err.to_string();
        assert!(text.contains("a.scene -> b.scene -> a.scene"));
        assert_eq!(err.path(), "a.scene");
        assert!(err.is_circular());
    }
}
