use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::database::DbError;
use crate::routes::attachment::OwnerRef;
use crate::storage::StorageError;
use crate::utils::{error_codes, error_to_api_response, error_with_data_to_api_response};
use crate::validation::FieldErrors;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("提交内容校验失败")]
    Validation {
        errors: FieldErrors,
        /// 原始输入，回显给客户端以便重新填写
        input: serde_json::Value,
    },
    #[error("请求格式错误: {0}")]
    BadRequest(String),
    #[error("未知的链接类型: {0}")]
    InvalidLinkType(String),
    #[error("未知的资源类型: {0}")]
    InvalidAssetType(String),
    #[error("无效的链接地址: {0}")]
    InvalidUrl(String),
    #[error("文件过大: {size} 字节，上限 {limit} 字节")]
    AssetTooLarge { size: usize, limit: usize },
    #[error("无法读取上传的文件: {0}")]
    AssetUnreadable(String),
    #[error("文件存储失败: {0}")]
    StorageWriteFailure(#[from] StorageError),
    #[error("归属实体不存在: {0}")]
    UnknownOwner(OwnerRef),
    #[error("资源不存在: {0}")]
    NotFound(String),
    #[error("无权操作该资源")]
    Forbidden,
    #[error("身份冲突: {0}")]
    IdentityConflict(String),
    #[error("数据库错误: {0}")]
    Database(#[from] DbError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. }
            | AppError::InvalidLinkType(_)
            | AppError::InvalidAssetType(_)
            | AppError::InvalidUrl(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) | AppError::AssetUnreadable(_) => StatusCode::BAD_REQUEST,
            AppError::AssetTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UnknownOwner(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::IdentityConflict(_) => StatusCode::CONFLICT,
            AppError::StorageWriteFailure(_) | AppError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            AppError::Validation { .. } | AppError::BadRequest(_) => error_codes::VALIDATION_ERROR,
            AppError::InvalidLinkType(_) | AppError::InvalidAssetType(_) | AppError::InvalidUrl(_) => {
                error_codes::INVALID_ATTACHMENT
            }
            AppError::AssetTooLarge { .. } | AppError::AssetUnreadable(_) => error_codes::ASSET_REJECTED,
            AppError::UnknownOwner(_) | AppError::NotFound(_) => error_codes::NOT_FOUND,
            AppError::Forbidden => error_codes::PERMISSION_DENIED,
            AppError::IdentityConflict(_) => error_codes::IDENTITY_CONFLICT,
            AppError::StorageWriteFailure(_) => error_codes::STORAGE_ERROR,
            AppError::Database(_) => error_codes::INTERNAL_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        match self {
            AppError::Validation { errors, input } => (
                status,
                error_with_data_to_api_response(
                    code,
                    "提交内容校验失败".to_string(),
                    serde_json::json!({ "errors": errors, "input": input }),
                ),
            )
                .into_response(),
            // 内部错误只记录日志，不把细节返回给客户端
            AppError::StorageWriteFailure(ref e) => {
                tracing::error!("Storage failure: {}", e);
                (status, error_to_api_response::<()>(code, "文件存储失败".to_string())).into_response()
            }
            AppError::Database(ref e) => {
                tracing::error!("Database failure: {}", e);
                (status, error_to_api_response::<()>(code, "内部服务器错误".to_string())).into_response()
            }
            other => (status, error_to_api_response::<()>(code, other.to_string())).into_response(),
        }
    }
}
