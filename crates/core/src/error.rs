/// Result alias that carries the custom [`VoxelError`] type.
pub type Result<T> = std::result::Result<T, VoxelError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum VoxelError {
    /// Free-form failure surfaced to the caller as a readable message.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON configuration or serialisation failure.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("framebuffer slot {0} does not exist")]
    UnknownFramebuffer(usize),
    /// A framebuffer was asked to blend or draw from itself.
    #[error("framebuffer slot {target} cannot be drawn into itself")]
    SelfBlend { target: usize },
    #[error("framebuffer holds {actual} voxels but {expected} were expected")]
    GridMismatch { expected: usize, actual: usize },
    /// Failure reported by the accelerated kernel collaborator.
    #[error("voxel kernel: {0}")]
    Kernel(String),
}

impl VoxelError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn kernel<T: Into<String>>(msg: T) -> Self {
        Self::Kernel(msg.into())
    }
}

impl From<&str> for VoxelError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for VoxelError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
