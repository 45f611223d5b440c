use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvoError {
    #[error("not initialized: run 'evo init'")]
    NotInitialized,

    #[error("detection failed: {0}")]
    Detection(String),

    #[error("sandbox setup failed: {0}")]
    SandboxSetup(String),

    #[error("quality gate failed: {0}")]
    QualityGate(String),

    #[error("github call failed: {0}")]
    GithubApi(String),

    #[error("unknown issue #{0}: not tracked by this engine")]
    UnknownIssue(u64),

    #[error("invalid version '{0}': expected MAJOR.MINOR.PATCH")]
    InvalidVersion(String),

    #[error("invalid improvement kind: {0}")]
    InvalidKind(String),

    #[error("invalid artifact path '{0}': must be relative without '..' components")]
    InvalidArtifactPath(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EvoError>;
