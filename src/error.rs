use std::error::Error;
use std::fmt;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

#[derive(Debug)]
pub enum GradeError {
    /// 访问码错误
    AccessDenied,
    /// 表单内容不完整或格式错误
    InvalidInput(String),
    /// 配置表中没有答案
    ExamKeyMissing,
    /// 该学号已经提交过
    Duplicate(String),
    /// 模型接口限流，可以重试
    RateLimited(String),
    Grader(String),
    Sheet(String),
    Email(String),
    Pdf(String),
    ReportNotFound,
    Config(String),
    Internal(String),
}

impl GradeError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GradeError::RateLimited(_))
    }
}

impl fmt::Display for GradeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GradeError::AccessDenied => write!(f, "访问码错误"), // user-facing output
            GradeError::InvalidInput(msg) => write!(f, "提交内容有误: {}", msg),
            GradeError::ExamKeyMissing => write!(f, "老师还没有上传答案，请稍后再试"),
            GradeError::Duplicate(id) => write!(f, "学号{}已经提交过试卷", id),
            GradeError::RateLimited(msg) => write!(f, "评分服务繁忙，请稍后重试: {}", msg),
            GradeError::Grader(msg) => write!(f, "评分服务出错: {}", msg),
            GradeError::Sheet(msg) => write!(f, "读写成绩表失败: {}", msg),
            GradeError::Email(msg) => write!(f, "发送邮件失败: {}", msg),
            GradeError::Pdf(msg) => write!(f, "生成PDF失败: {}", msg),
            GradeError::ReportNotFound => write!(f, "报告不存在或已过期"),
            GradeError::Config(msg) => write!(f, "配置文件错误: {}", msg),
            GradeError::Internal(msg) => write!(f, "服务器内部错误: {}", msg),
        }
    }
}

impl Error for GradeError {}

impl ResponseError for GradeError {
    fn status_code(&self) -> StatusCode {
        match self {
            GradeError::AccessDenied => StatusCode::UNAUTHORIZED,
            GradeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            GradeError::ExamKeyMissing => StatusCode::SERVICE_UNAVAILABLE,
            GradeError::Duplicate(_) => StatusCode::CONFLICT,
            GradeError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            GradeError::Grader(_) | GradeError::Sheet(_) => StatusCode::BAD_GATEWAY,
            GradeError::ReportNotFound => StatusCode::NOT_FOUND,
            GradeError::Email(_)
            | GradeError::Pdf(_)
            | GradeError::Config(_)
            | GradeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "code": self.status_code().as_u16(),
            "msg": self.to_string(),
        }))
    }
}
