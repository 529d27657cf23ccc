use std::path::PathBuf;
use actix_files::NamedFile;

// 提交试卷的页面
pub(crate) async fn index() -> actix_web::Result<NamedFile> {
    Ok(NamedFile::open(PathBuf::from("templates/index.html"))?)
}
