use actix_web::{web, HttpResponse};

use crate::error::GradeError;
use crate::report_server::ReportServerHandle;

// 手动下载PDF报告
pub(crate) async fn download(
    path: web::Path<String>,
    report_server: web::Data<ReportServerHandle>,
) -> Result<HttpResponse, GradeError> {
    let id = path.into_inner();
    let report = report_server.fetch(id).await.ok_or(GradeError::ReportNotFound)?;
    Ok(HttpResponse::Ok()
        .content_type("application/pdf")
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", report.filename),
        ))
        .body(report.pdf))
}
