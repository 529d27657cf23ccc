use actix_files::Files;
use actix_web::web;

use crate::config::Config;

pub mod config;
pub mod email_server;
pub mod error;
pub mod grader_client;
pub mod pdf;
pub mod report_server;
pub mod retry;
pub mod score;
pub mod service;
pub mod sheet_server;
pub mod structs;
pub mod utils;

/// 请求处理时用到的考试设置
#[derive(Debug, Clone)]
pub struct ExamSettings {
    pub title: String,
    pub num_questions: usize,
    pub max_upload_bytes: usize,
}

impl ExamSettings {
    pub fn from_config(config: &Config) -> ExamSettings {
        ExamSettings {
            title: config.exam.title.clone(),
            num_questions: config.exam.num_questions,
            max_upload_bytes: config.max_upload_bytes(),
        }
    }
}

/// 注册所有路由，app_data由调用方提供
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(service::pages::index))
        .service(Files::new("/resources", "resources"))
        .service(
            web::scope("/api")
                .route("/unlock", web::post().to(service::exam::unlock))
                .route("/submit", web::post().to(service::exam::submit))
                .route("/report/{id}", web::get().to(service::report::download)),
        );
}
