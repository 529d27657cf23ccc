use std::collections::HashSet;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use url::Url;

use crate::config::SheetsConfig;
use crate::error::GradeError;
use crate::structs::grade_type::{AccessCode, StudentId};
use crate::structs::submit::SubmissionRow;
use crate::utils::same_identity;

/// 配置表中读出的答案和访问码
#[derive(Debug, Clone, PartialEq)]
pub struct ExamSheet {
    pub answer_key: String,
    pub access_code: AccessCode,
}

#[derive(Debug)]
enum Command {
    LoadExam {
        res_tx: oneshot::Sender<Result<ExamSheet, GradeError>>,
    },
    Reserve {
        student_id: StudentId,
        res_tx: oneshot::Sender<Result<(), GradeError>>,
    },
    Record {
        student_id: StudentId,
        row: SubmissionRow,
        res_tx: oneshot::Sender<Result<(), GradeError>>,
    },
    Release {
        student_id: StudentId,
    },
}

pub struct SheetServer {
    http: reqwest::Client,
    api_base: String,
    spreadsheet_id: String,
    access_token: String,
    config_range: String,
    ledger_sheet: String,

    /// 正在评分中的学号，防止同一进程内重复提交
    pending: HashSet<StudentId>,

    /// 接收命令的管道
    cmd_rx: mpsc::UnboundedReceiver<Command>,
}

/// 命令执行层
impl SheetServer {
    pub fn new(config: &SheetsConfig) -> Result<(SheetServer, SheetServerHandle), GradeError> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GradeError::Config(format!("无法创建HTTP客户端: {}", e)))?;
        Url::parse(&config.api_base)
            .map_err(|e| GradeError::Config(format!("sheets.api_base 无效: {}", e)))?;

        Ok((
            SheetServer {
                http,
                api_base: config.api_base.clone(),
                spreadsheet_id: config.spreadsheet_id.clone(),
                access_token: config.access_token.clone(),
                config_range: config.config_range.clone(),
                ledger_sheet: config.ledger_sheet.clone(),
                pending: HashSet::new(),
                cmd_rx,
            },
            SheetServerHandle { cmd_tx },
        ))
    }

    fn values_url(&self, range: &str, append: bool) -> Result<Url, GradeError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| GradeError::Config(format!("sheets.api_base 无效: {}", e)))?;
        let last = if append { format!("{}:append", range) } else { range.to_string() };
        url.path_segments_mut()
            .map_err(|_| GradeError::Config("sheets.api_base 无效".to_string()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values", last.as_str()]);
        if append {
            url.query_pairs_mut()
                .append_pair("valueInputOption", "RAW")
                .append_pair("insertDataOption", "INSERT_ROWS");
        }
        Ok(url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.access_token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.access_token)
        }
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<Value>>, GradeError> {
        let url = self.values_url(range, false)?;
        let response = self
            .authorized(self.http.get(url))
            .send()
            .await
            .map_err(|e| GradeError::Sheet(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GradeError::Sheet(format!("{} - {}", status, text)));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| GradeError::Sheet(format!("无法解析响应: {}", e)))?;
        // 空范围不会返回values字段
        let rows = body["values"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .map(|row| row.as_array().cloned().unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    /// 读取配置表的答案(A1)和访问码(B1)
    async fn load_exam(&self) -> Result<ExamSheet, GradeError> {
        let rows = self.get_values(&self.config_range).await?;
        let first = rows.first();
        let cell = |i: usize| first.and_then(|row| row.get(i)).map(cell_text).unwrap_or_default();
        Ok(ExamSheet {
            answer_key: cell(0),
            access_code: cell(1),
        })
    }

    /// 扫描成绩表第一列，确认该学号没有提交过
    async fn reserve(&mut self, student_id: StudentId) -> Result<(), GradeError> {
        let key = student_id.trim().to_lowercase();
        if self.pending.contains(&key) {
            return Err(GradeError::Duplicate(student_id));
        }
        let range = a1_range(&self.ledger_sheet, "A:A");
        let rows = self.get_values(&range).await?;
        let exists = rows
            .iter()
            .filter_map(|row| row.first())
            .any(|cell| same_identity(&cell_text(cell), &student_id));
        if exists {
            return Err(GradeError::Duplicate(student_id));
        }
        self.pending.insert(key);
        Ok(())
    }

    /// 在成绩表末尾追加一行
    async fn record(&mut self, student_id: StudentId, row: SubmissionRow) -> Result<(), GradeError> {
        self.pending.remove(&student_id.trim().to_lowercase());
        let range = a1_range(&self.ledger_sheet, "A1");
        let url = self.values_url(&range, true)?;
        let response = self
            .authorized(self.http.post(url))
            .json(&json!({ "values": [row.to_values()] }))
            .send()
            .await
            .map_err(|e| GradeError::Sheet(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GradeError::Sheet(format!("{} - {}", status, text)));
        }
        log::info!("学号{}的成绩已登记: {}", row.student_id, row.score);
        Ok(())
    }

    pub async fn run(mut self) {
        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                Command::LoadExam { res_tx } => {
                    let result = self.load_exam().await;
                    let _ = res_tx.send(result);
                }
                Command::Reserve { student_id, res_tx } => {
                    let result = self.reserve(student_id).await;
                    let _ = res_tx.send(result);
                }
                Command::Record { student_id, row, res_tx } => {
                    let result = self.record(student_id, row).await;
                    if let Err(e) = &result {
                        log::error!("写入成绩表时出错: {}", e);
                    }
                    let _ = res_tx.send(result);
                }
                Command::Release { student_id } => {
                    self.pending.remove(&student_id.trim().to_lowercase());
                }
            }
        }
    }
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// 工作表名包含特殊字符时需要加单引号
pub fn a1_range(sheet: &str, cells: &str) -> String {
    if sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        format!("{}!{}", sheet, cells)
    } else {
        format!("'{}'!{}", sheet.replace('\'', "''"), cells)
    }
}

/// handler层
#[derive(Debug, Clone)]
pub struct SheetServerHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

fn stopped() -> GradeError {
    GradeError::Internal("成绩表服务已停止".to_string())
}

impl SheetServerHandle {
    pub async fn load_exam(&self) -> Result<ExamSheet, GradeError> {
        let (res_tx, res_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::LoadExam { res_tx })
            .map_err(|_| stopped())?;
        res_rx.await.map_err(|_| stopped())?
    }

    /// 检查重复提交并占用该学号，返回的Reservation被丢弃时自动释放
    pub async fn reserve(&self, student_id: StudentId) -> Result<Reservation, GradeError> {
        let (res_tx, res_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Reserve {
                student_id: student_id.clone(),
                res_tx,
            })
            .map_err(|_| stopped())?;
        res_rx.await.map_err(|_| stopped())??;
        Ok(Reservation {
            student_id,
            cmd_tx: Some(self.cmd_tx.clone()),
        })
    }

    /// 登记成绩，占用的学号交由成绩表服务释放
    pub async fn record(&self, mut reservation: Reservation, row: SubmissionRow) -> Result<(), GradeError> {
        let cmd_tx = reservation.cmd_tx.take().ok_or_else(stopped)?;
        let (res_tx, res_rx) = oneshot::channel();
        cmd_tx
            .send(Command::Record {
                student_id: reservation.student_id.clone(),
                row,
                res_tx,
            })
            .map_err(|_| stopped())?;
        res_rx.await.map_err(|_| stopped())?
    }
}

/// 已占用的学号，未登记成绩就被丢弃时(评分失败或请求被取消)释放占用
#[must_use]
#[derive(Debug)]
pub struct Reservation {
    student_id: StudentId,
    cmd_tx: Option<mpsc::UnboundedSender<Command>>,
}

impl Reservation {
    pub fn student_id(&self) -> &str {
        &self.student_id
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if let Some(cmd_tx) = self.cmd_tx.take() {
            let student_id = std::mem::take(&mut self.student_id);
            log::debug!("释放学号{}", student_id);
            if cmd_tx.send(Command::Release { student_id }).is_err() {
                log::warn!("成绩表服务已停止，无法释放学号");
            }
        }
    }
}
