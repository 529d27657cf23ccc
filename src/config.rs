use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::GradeError;
use crate::retry::RetryPolicy;

/// 配置文件 config.toml 的内容
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub exam: ExamConfig,
    pub grader: GraderConfig,
    pub sheets: SheetsConfig,
    /// 不填写则不发送邮件
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// 上传图片的大小上限(MB)
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
    /// 生成的报告在内存中保留的时间
    #[serde(default = "default_report_ttl_secs")]
    pub report_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExamConfig {
    #[serde(default = "default_exam_title")]
    pub title: String,
    #[serde(default = "default_num_questions")]
    pub num_questions: usize,
    /// 自定义提示词模板，支持 {answer_key} 和 {num_questions}
    pub prompt_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_grader_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SheetsConfig {
    #[serde(default = "default_sheets_base")]
    pub api_base: String,
    pub spreadsheet_id: String,
    #[serde(default)]
    pub access_token: String,
    /// 答案(A1)和访问码(B1)所在的范围
    #[serde(default = "default_config_range")]
    pub config_range: String,
    /// 成绩登记所在的工作表
    #[serde(default = "default_ledger_sheet")]
    pub ledger_sheet: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub from: String,
}

fn default_bind() -> String {
    "127.0.0.1:8081".to_string()
}
fn default_max_upload_mb() -> usize {
    10
}
fn default_report_ttl_secs() -> u64 {
    30 * 60
}
fn default_exam_title() -> String {
    "Exam Results".to_string()
}
fn default_num_questions() -> usize {
    4
}
fn default_grader_base() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    2000
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_sheets_base() -> String {
    "https://sheets.googleapis.com".to_string()
}
fn default_config_range() -> String {
    "Config!A1:B1".to_string()
}
fn default_ledger_sheet() -> String {
    "Sheet1".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: default_bind(),
            max_upload_mb: default_max_upload_mb(),
            report_ttl_secs: default_report_ttl_secs(),
        }
    }
}

impl Default for ExamConfig {
    fn default() -> Self {
        ExamConfig {
            title: default_exam_title(),
            num_questions: default_num_questions(),
            prompt_file: None,
        }
    }
}

impl Config {
    /// 从toml文本解析配置
    pub fn from_toml(text: &str) -> Result<Config, GradeError> {
        let config: Config = toml::from_str(text).map_err(|e| GradeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 读取配置文件，并用环境变量覆盖其中的密钥
    pub fn load(path: impl AsRef<Path>) -> Result<Config, GradeError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| GradeError::Config(format!("无法读取{}: {}", path.display(), e)))?;
        let mut config = Config::from_toml(&text)?;
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("PAPERGRADE_GRADER_KEY") {
            self.grader.api_key = key;
        }
        if let Ok(token) = std::env::var("PAPERGRADE_SHEETS_TOKEN") {
            self.sheets.access_token = token;
        }
        if let Some(smtp) = self.smtp.as_mut() {
            if let Ok(password) = std::env::var("PAPERGRADE_SMTP_PASSWORD") {
                smtp.password = password;
            }
        }
    }

    fn validate(&self) -> Result<(), GradeError> {
        if self.exam.num_questions == 0 {
            return Err(GradeError::Config("exam.num_questions 必须大于0".to_string()));
        }
        if self.grader.max_attempts == 0 {
            return Err(GradeError::Config("grader.max_attempts 必须大于0".to_string()));
        }
        if self.sheets.spreadsheet_id.trim().is_empty() {
            return Err(GradeError::Config("sheets.spreadsheet_id 不能为空".to_string()));
        }
        Ok(())
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.server.max_upload_mb * 1024 * 1024
    }

    pub fn report_ttl(&self) -> Duration {
        Duration::from_secs(self.server.report_ttl_secs)
    }
}

impl GraderConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::from_toml(
            r#"
[grader]
api_key = "k"

[sheets]
spreadsheet_id = "sheet-1"
"#,
        )
        .unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8081");
        assert_eq!(config.exam.num_questions, 4);
        assert_eq!(config.grader.model, "gemini-2.5-flash");
        assert_eq!(config.grader.max_attempts, 3);
        assert_eq!(config.sheets.config_range, "Config!A1:B1");
        assert!(config.smtp.is_none());
        assert_eq!(config.max_upload_bytes(), 10 * 1024 * 1024);
    }

    #[test]
    fn rejects_zero_questions() {
        let err = Config::from_toml(
            r#"
[exam]
num_questions = 0

[grader]

[sheets]
spreadsheet_id = "sheet-1"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, GradeError::Config(_)));
    }

    #[test]
    fn reads_smtp_section() {
        let config = Config::from_toml(
            r#"
[grader]
[sheets]
spreadsheet_id = "sheet-1"

[smtp]
host = "smtp.example.com"
username = "notify@example.com"
password = "secret"
from = "notify@example.com"
"#,
        )
        .unwrap();
        assert_eq!(config.smtp.unwrap().host, "smtp.example.com");
    }
}
