use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::{StreamExt, TryStreamExt};
use serde_json::json;

use crate::email_server::{EmailServerHandle, ReportMail};
use crate::error::GradeError;
use crate::grader_client::GraderClient;
use crate::pdf::{render_report, ReportHeader};
use crate::report_server::{Report, ReportServerHandle};
use crate::sheet_server::{ExamSheet, SheetServerHandle};
use crate::structs::submit::{SubmissionRow, SubmitForm, SubmitResponse, UnlockRequest};
use crate::utils::{now_timestamp, report_filename};
use crate::ExamSettings;

// 文本字段的长度上限
const MAX_TEXT_FIELD: usize = 4 * 1024;

/// 比较访问码，成绩表中没有设置访问码时拒绝所有请求
pub fn check_access(exam: &ExamSheet, access_code: &str) -> Result<(), GradeError> {
    let expected = exam.access_code.trim();
    if expected.is_empty() || expected != access_code.trim() {
        return Err(GradeError::AccessDenied);
    }
    Ok(())
}

/// 根据文件头判断图片类型，只接受jpg和png
pub fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else {
        None
    }
}

// 验证访问码
pub(crate) async fn unlock(
    req_body: web::Json<UnlockRequest>,
    settings: web::Data<ExamSettings>,
    sheet_server: web::Data<SheetServerHandle>,
) -> Result<HttpResponse, GradeError> {
    let exam = sheet_server.load_exam().await?;
    check_access(&exam, &req_body.access_code)?;
    Ok(HttpResponse::Ok().json(json!({
        "code": 200,
        "exam_title": settings.title,
        "num_questions": settings.num_questions,
        "key_loaded": !exam.answer_key.trim().is_empty(),
    })))
}

/// 读取multipart表单
async fn read_submit_form(mut payload: Multipart, max_image_bytes: usize) -> Result<SubmitForm, GradeError> {
    let mut form = SubmitForm {
        access_code: String::new(),
        student_id: String::new(),
        name: String::new(),
        email: None,
        image: Vec::new(),
        mime_type: String::new(),
    };

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| GradeError::InvalidInput(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let limit = if name == "image" { max_image_bytes } else { MAX_TEXT_FIELD };
        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| GradeError::InvalidInput(e.to_string()))?;
            if data.len() + chunk.len() > limit {
                return Err(GradeError::InvalidInput(format!("{}字段过大", name)));
            }
            data.extend_from_slice(&chunk);
        }

        if name == "image" {
            form.image = data;
            continue;
        }
        let text = String::from_utf8(data)
            .map_err(|_| GradeError::InvalidInput(format!("{}字段不是有效的文本", name)))?
            .trim()
            .to_string();
        match name.as_str() {
            "access_code" => form.access_code = text,
            "student_id" => form.student_id = text,
            "name" => form.name = text,
            "email" if !text.is_empty() => form.email = Some(text),
            _ => {}
        }
    }
    Ok(form)
}

impl SubmitForm {
    fn validate(&mut self) -> Result<(), GradeError> {
        if self.student_id.is_empty() || self.name.is_empty() {
            return Err(GradeError::InvalidInput("请填写学号和姓名".to_string()));
        }
        if self.image.is_empty() {
            return Err(GradeError::InvalidInput("请上传试卷照片".to_string()));
        }
        match sniff_image_type(&self.image) {
            Some(mime_type) => self.mime_type = mime_type.to_string(),
            None => return Err(GradeError::InvalidInput("只支持jpg和png格式的图片".to_string())),
        }
        Ok(())
    }
}

// 提交试卷并进行评分
pub(crate) async fn submit(
    payload: Multipart,
    settings: web::Data<ExamSettings>,
    grader: web::Data<GraderClient>,
    sheet_server: web::Data<SheetServerHandle>,
    report_server: web::Data<ReportServerHandle>,
    email_server: web::Data<Option<EmailServerHandle>>,
) -> Result<HttpResponse, GradeError> {
    let mut form = read_submit_form(payload, settings.max_upload_bytes).await?;

    // 读取答案和访问码
    let exam = sheet_server.load_exam().await.map_err(|e| {
        log::error!("读取答案失败: {}", e);
        e
    })?;
    check_access(&exam, &form.access_code)?;
    if exam.answer_key.trim().is_empty() {
        return Err(GradeError::ExamKeyMissing);
    }
    form.validate()?;

    // 检查是否重复提交，评分失败或请求中断时reservation被丢弃，学号随之释放
    let reservation = sheet_server.reserve(form.student_id.clone()).await?;

    // 进行评分
    let grading = grader
        .grade(&form.image, &form.mime_type, &exam.answer_key, settings.num_questions)
        .await
        .map_err(|e| {
            log::error!("学号{}评分失败: {}", reservation.student_id(), e);
            e
        })?;
    let score = grading.normalized(settings.num_questions);
    let timestamp = now_timestamp();
    let mut warnings = Vec::new();

    // 登记成绩，失败不影响返回结果
    let row = SubmissionRow {
        student_id: form.student_id.clone(),
        name: form.name.clone(),
        timestamp: timestamp.clone(),
        score,
        email: form.email.clone(),
    };
    let recorded = match sheet_server.record(reservation, row).await {
        Ok(()) => true,
        Err(e) => {
            warnings.push(format!("成绩未能写入成绩表，请告知老师: {}", e));
            false
        }
    };

    // 生成报告
    let header = ReportHeader {
        title: &settings.title,
        student_name: &form.name,
        student_id: &form.student_id,
        date: &timestamp,
    };
    let filename = report_filename(&form.name);
    let pdf = match render_report(&header, &grading, score) {
        Ok(pdf) => Some(pdf),
        Err(e) => {
            log::error!("生成报告失败: {}", e);
            warnings.push(e.to_string());
            None
        }
    };

    // 发送邮件
    let mut emailed = false;
    if let (Some(to), Some(pdf)) = (form.email.as_ref(), pdf.as_ref()) {
        match email_server.get_ref() {
            Some(email_server) => {
                let mail = ReportMail {
                    to: to.clone(),
                    student_name: form.name.clone(),
                    exam_title: settings.title.clone(),
                    score,
                    filename: filename.clone(),
                    pdf: pdf.clone(),
                };
                match email_server.send_report(mail).await {
                    Ok(()) => emailed = true,
                    Err(e) => {
                        log::error!("发送邮件时出错: {}", e);
                        warnings.push(format!("{}，请手动下载报告", e));
                    }
                }
            }
            None => warnings.push("邮件服务未开启，请手动下载报告".to_string()),
        }
    }

    let report_id = match pdf {
        Some(pdf) => report_server.store(Report { filename, pdf }).await,
        None => None,
    };

    Ok(HttpResponse::Ok().json(SubmitResponse {
        code: 200,
        score,
        details: grading.details,
        final_comment: grading.final_comment,
        report_id,
        recorded,
        emailed,
        warnings,
    }))
}
