use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::config::GraderConfig;
use crate::error::GradeError;
use crate::retry::{with_backoff, RetryPolicy};
use crate::structs::grading::GradingResult;

/// 默认的评分提示词
pub const DEFAULT_PROMPT: &str = r#"You are a strict engineering professor grading a handwritten exam against the teacher's answer key.

TEACHER'S ANSWER KEY:
{answer_key}

INSTRUCTIONS:
1. Read the attached photo of the handwritten exam. Try to decipher the handwriting even when it is hard to read.
2. Identify the {num_questions} answers.
3. Compare each answer with the answer key.
4. Give each question a score from 0 to 5 (decimals allowed).
   - 5 points: correct and conceptually complete.
   - 0 points: wrong or unanswered.
5. Give short feedback for every question.

REQUIRED OUTPUT (JSON ONLY):
Return strictly one JSON object with this structure and no extra text:
{
    "details": [
        {"question": 1, "score": 0.0, "feedback": "..."},
        {"question": 2, "score": 0.0, "feedback": "..."}
    ],
    "final_comment": "One general piece of advice for the student..."
}
"#;

pub struct GraderClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    policy: RetryPolicy,
    prompt_template: String,
}

impl GraderClient {
    pub fn new(config: &GraderConfig, prompt_template: Option<String>) -> Result<GraderClient, GradeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GradeError::Config(format!("无法创建HTTP客户端: {}", e)))?;
        Ok(GraderClient {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            policy: config.retry_policy(),
            prompt_template: prompt_template.unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
        })
    }

    pub fn build_prompt(&self, answer_key: &str, num_questions: usize) -> String {
        self.prompt_template
            .replace("{answer_key}", answer_key)
            .replace("{num_questions}", &num_questions.to_string())
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.api_base, self.model)
    }

    /// 对试卷图片评分，限流时按策略重试
    pub async fn grade(
        &self,
        image: &[u8],
        mime_type: &str,
        answer_key: &str,
        num_questions: usize,
    ) -> Result<GradingResult, GradeError> {
        let prompt = self.build_prompt(answer_key, num_questions);
        let body = request_body(&prompt, image, mime_type);
        let body = &body;
        with_backoff(&self.policy, move |attempt| {
            log::debug!("调用评分模型 {}，第{}次", self.model, attempt);
            self.call_once(body)
        })
        .await
    }

    async fn call_once(&self, body: &Value) -> Result<GradingResult, GradeError> {
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| GradeError::Grader(format!("请求失败: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if status == StatusCode::TOO_MANY_REQUESTS || error_text.contains("RESOURCE_EXHAUSTED") {
                return Err(GradeError::RateLimited(status.to_string()));
            }
            log::error!("评分模型返回错误: {} - {}", status, error_text);
            return Err(GradeError::Grader(format!("{} - {}", status, error_text)));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| GradeError::Grader(format!("无法解析响应: {}", e)))?;
        let text = extract_text(&response_json)
            .ok_or_else(|| GradeError::Grader("模型没有返回内容".to_string()))?;
        parse_grading(&text)
    }
}

/// 构建 generateContent 请求体：提示词 + base64编码的图片
pub fn request_body(prompt: &str, image: &[u8], mime_type: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [
                { "text": prompt },
                {
                    "inline_data": {
                        "mime_type": mime_type,
                        "data": general_purpose::STANDARD.encode(image),
                    }
                }
            ]
        }],
        "generationConfig": {
            "temperature": 0.2,
            "topP": 0.95,
            "topK": 40,
            "maxOutputTokens": 8192,
            "responseMimeType": "application/json",
        }
    })
}

// 拼接第一个候选结果中所有文本片段
fn extract_text(response: &Value) -> Option<String> {
    let parts = response.pointer("/candidates/0/content/parts")?.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// 解析模型输出的JSON，允许外面包着```json代码块
pub fn parse_grading(text: &str) -> Result<GradingResult, GradeError> {
    let mut trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        trimmed = rest.trim_start_matches("json").trim_start();
        trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed).trim();
    }
    let result: GradingResult = serde_json::from_str(trimmed)
        .map_err(|e| GradeError::Grader(format!("无法解析模型返回的JSON: {}", e)))?;
    if result.details.is_empty() {
        return Err(GradeError::Grader("模型没有返回任何题目的评分".to_string()));
    }
    Ok(result.clamped())
}
