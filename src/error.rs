use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum GraphicsError {
    #[error("environment is not set")]
    EnvironmentNotSet,
    #[error("failed to create window or GPU context: {0}")]
    ContextCreation(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("failed to compile {stage} shader: {log}")]
    ShaderCompile { stage: &'static str, log: String },
    #[error("failed to link shader program: {0}")]
    ShaderLink(String),
    #[error("{what} framebuffer is incomplete (status {status:#x})")]
    FramebufferIncomplete { what: &'static str, status: u32 },
    #[error("{what} has a zero dimension ({width}x{height})")]
    ZeroSize {
        what: &'static str,
        width: u32,
        height: u32,
    },
    #[error("{0} is null")]
    NullHandle(&'static str),
    #[error("{0} was already freed")]
    DoubleFree(String),
    #[error("manipulation tool is already armed")]
    AlreadyArmed,
    #[error("{0} is already registered")]
    Duplicate(String),
    #[error("invalid lifecycle transition: {0}")]
    Lifecycle(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{what} is out of range: id >= size ({requested} >= {available})")]
    OutOfRange {
        what: String,
        requested: usize,
        available: usize,
    },
    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(Duration, &'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, GraphicsError>;

#[cfg(test)]
mod tests {
    use super::GraphicsError;

    #[test]
    fn out_of_range_message_carries_both_bounds() {
        let err = GraphicsError::OutOfRange {
            what: "mesh index for \"cube\"".to_string(),
            requested: 4,
            available: 2,
        };
        let message = err.to_string();
        assert!(message.contains("4 >= 2"), "{message}");
        assert!(message.contains("cube"));
    }

    #[test]
    fn zero_size_message_names_dimensions() {
        let err = GraphicsError::ZeroSize {
            what: "HDR framebuffer",
            width: 0,
            height: 600,
        };
        assert_eq!(err.to_string(), "HDR framebuffer has a zero dimension (0x600)");
    }
}
