use std::fs;

use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use lazy_static::lazy_static;

use papergrade::config::Config;
use papergrade::email_server::EmailServer;
use papergrade::grader_client::GraderClient;
use papergrade::report_server::ReportServer;
use papergrade::sheet_server::SheetServer;
use papergrade::{configure, ExamSettings};

lazy_static! {
    static ref CONFIG: Config = {
        let path = std::env::var("PAPERGRADE_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        match Config::load(&path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("{}", e);
                std::process::exit(1);
            }
        }
    };
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 自定义提示词
    let prompt = match &CONFIG.exam.prompt_file {
        Some(path) => match fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(e) => {
                log::error!("读取提示词文件{}时出现错误：{}", path, e);
                std::process::exit(1);
            }
        },
        None => None,
    };
    let grader = match GraderClient::new(&CONFIG.grader, prompt) {
        Ok(grader) => web::Data::new(grader),
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    let (sheet_server, sheet_handle) = match SheetServer::new(&CONFIG.sheets) {
        Ok(pair) => pair,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };
    tokio::spawn(sheet_server.run());

    let (report_server, report_handle) = ReportServer::new(CONFIG.report_ttl());
    tokio::spawn(report_server.run());

    let email_handle = match &CONFIG.smtp {
        Some(smtp) => match EmailServer::new(smtp) {
            Ok((email_server, handle)) => {
                tokio::spawn(email_server.run());
                Some(handle)
            }
            Err(e) => {
                log::error!("邮件服务启动失败，将不发送邮件: {}", e);
                None
            }
        },
        None => {
            log::info!("未配置SMTP，将不发送邮件");
            None
        }
    };

    let settings = web::Data::new(ExamSettings::from_config(&CONFIG));
    let sheet_handle = web::Data::new(sheet_handle);
    let report_handle = web::Data::new(report_handle);
    let email_handle = web::Data::new(email_handle);

    log::info!("HTTP服务启动于 {}", CONFIG.server.bind);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(settings.clone())
            .app_data(grader.clone())
            .app_data(sheet_handle.clone())
            .app_data(report_handle.clone())
            .app_data(email_handle.clone())
            .configure(configure)
    })
    .bind(&CONFIG.server.bind)?
    .run()
    .await
}
