//! 存储层错误类型

/// 快照与审计存储错误。
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 快照文件读写失败
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// 快照内容不是合法的 JSON 或结构不匹配
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} store lock poisoned")]
    Lock(&'static str),
}
