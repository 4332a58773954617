use std::path::PathBuf;

use thiserror::Error;

/// 配置补丁错误类型
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("IO 错误 ({}): {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON 序列化错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("配置无效: {0}")]
    Invalid(String),
}

impl PatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
