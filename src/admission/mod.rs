//! # 准入模块
//!
//! 网关的入口守卫：解析密钥、校验模型白名单、串行化限额判定。
//! 业务性拒绝以 [`AdmissionVerdict::Reject`] 返回，`Err` 只留给存储层故障。

pub mod controller;
pub mod model_match;
pub mod response;

pub use controller::{
    AdmissionController, AdmissionOptions, AdmissionPass, AdmissionRequest, AdmissionVerdict,
    extract_bearer_secret,
};
pub use model_match::{is_model_allowed, model_identifiers_match, normalize_allowed_models};
pub use response::{
    AdmissionRejection, ErrorBody, ErrorDetail, QuotaSnapshot, RejectionKind,
};
