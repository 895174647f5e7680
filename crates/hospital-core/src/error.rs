//! 错误定义模块

use serde::Serialize;
use thiserror::Error;

/// 对外暴露的错误分类，随错误响应一起返回给调用方
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum ErrorKind {
    MissingCredential,
    Expired,
    Invalid,
    Unauthorized,
    InvalidInput,
    NotFound,
    ResourceConflict,
    InternalError,
}

impl ErrorKind {
    /// 是否属于客户端错误（HTTP 400 类）
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ErrorKind::InternalError)
    }
}

/// 医院系统统一错误类型
#[derive(Error, Debug)]
pub enum HospitalError {
    #[error("Token is missing")]
    MissingCredential,

    #[error("Token is expired")]
    Expired,

    #[error("Token is invalid: {0}")]
    InvalidToken(String),

    #[error("权限错误: {0}")]
    Unauthorized(String),

    #[error("验证错误: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("资源冲突: {0}")]
    ResourceConflict(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("系统内部错误: {0}")]
    Internal(String),

    #[error("网络错误: {0}")]
    Network(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HospitalError {
    /// 错误所属分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            HospitalError::MissingCredential => ErrorKind::MissingCredential,
            HospitalError::Expired => ErrorKind::Expired,
            HospitalError::InvalidToken(_) => ErrorKind::Invalid,
            HospitalError::Unauthorized(_) => ErrorKind::Unauthorized,
            HospitalError::InvalidInput(_) => ErrorKind::InvalidInput,
            HospitalError::NotFound(_) => ErrorKind::NotFound,
            HospitalError::ResourceConflict(_) => ErrorKind::ResourceConflict,
            HospitalError::Database(_)
            | HospitalError::Internal(_)
            | HospitalError::Network(_)
            | HospitalError::Serialization(_) => ErrorKind::InternalError,
        }
    }

    /// 面向调用方的错误描述，不带分类前缀
    pub fn message(&self) -> String {
        match self {
            HospitalError::InvalidToken(msg)
            | HospitalError::Unauthorized(msg)
            | HospitalError::InvalidInput(msg)
            | HospitalError::NotFound(msg)
            | HospitalError::ResourceConflict(msg)
            | HospitalError::Database(msg)
            | HospitalError::Internal(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        HospitalError::InvalidInput(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        HospitalError::NotFound(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        HospitalError::Unauthorized(message.into())
    }
}

/// 医院系统统一结果类型
pub type Result<T> = std::result::Result<T, HospitalError>;
