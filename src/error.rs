use thiserror::Error;

/// 开票流程错误
#[derive(Debug, Error)]
pub enum InvoiceError {
    /// 账期月份无法识别或首尾颠倒
    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("no devices selected")]
    EmptySelection,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid device: {0}")]
    InvalidDevice(String),

    /// 候选值文本格式错误
    #[error("invalid candidate list: {0}")]
    InvalidCandidates(String),

    /// 操作员取消了 partial 确认
    #[error("partial issuance resolution cancelled by operator")]
    Cancelled,

    /// 会话已确认, 不可再修改或重复确认
    #[error("invoice session already confirmed")]
    SessionClosed,

    #[error("seller '{company}' not found in group '{group}'")]
    SellerNotFound { group: String, company: String },

    #[error("no devices found for '{0}'")]
    NoDevices(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("document generation failed: {0}")]
    Document(String),
}

impl InvoiceError {
    /// 查询未命中: 非致命, 调用方可回到安全状态
    pub fn is_lookup_miss(&self) -> bool {
        matches!(self, Self::SellerNotFound { .. } | Self::NoDevices(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidRange(_)
                | Self::EmptySelection
                | Self::InvalidParameter(_)
                | Self::InvalidDevice(_)
                | Self::InvalidCandidates(_)
        )
    }
}

impl From<std::io::Error> for InvoiceError {
    fn from(err: std::io::Error) -> Self {
        InvoiceError::Document(err.to_string())
    }
}

impl From<csv::Error> for InvoiceError {
    fn from(err: csv::Error) -> Self {
        InvoiceError::Document(err.to_string())
    }
}
