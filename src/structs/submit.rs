use serde::{Deserialize, Serialize};

use crate::structs::grade_type::{AccessCode, ReportId, StudentId};
use crate::structs::grading::ItemGrade;

#[derive(Deserialize)]
pub struct UnlockRequest {
    pub(crate) access_code: AccessCode,
}

// 对于提交的试卷进行解析和响应的结构体
#[derive(Debug)]
pub struct SubmitForm {
    pub(crate) access_code: AccessCode,
    pub(crate) student_id: StudentId,
    pub(crate) name: String,
    pub(crate) email: Option<String>,
    pub(crate) image: Vec<u8>,
    pub(crate) mime_type: String,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub(crate) code: u16,
    pub(crate) score: f64,
    pub(crate) details: Vec<ItemGrade>,
    pub(crate) final_comment: String,
    /// 报告生成失败时为空
    pub(crate) report_id: Option<ReportId>,
    /// 成绩是否已写入成绩表
    pub(crate) recorded: bool,
    pub(crate) emailed: bool,
    pub(crate) warnings: Vec<String>,
}

/// 成绩表中的一行
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRow {
    pub student_id: StudentId,
    pub name: String,
    pub timestamp: String,
    pub score: f64,
    pub email: Option<String>,
}

impl SubmissionRow {
    pub fn to_values(&self) -> Vec<serde_json::Value> {
        vec![
            self.student_id.clone().into(),
            self.name.clone().into(),
            self.timestamp.clone().into(),
            self.score.into(),
            self.email.clone().unwrap_or_default().into(),
        ]
    }
}
