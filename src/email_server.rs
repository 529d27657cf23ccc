use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::sync::{mpsc, oneshot};

use crate::config::SmtpConfig;
use crate::error::GradeError;

/// 要发送给学生的报告邮件
#[derive(Debug, Clone)]
pub struct ReportMail {
    pub to: String,
    pub student_name: String,
    pub exam_title: String,
    pub score: f64,
    pub filename: String,
    pub pdf: Vec<u8>,
}

#[derive(Debug)]
enum Command {
    SendReport {
        mail: ReportMail,
        res_tx: oneshot::Sender<Result<(), GradeError>>,
    },
}

pub struct EmailServer {
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    from: String,
    smtp_transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailServer {
    pub fn new(config: &SmtpConfig) -> Result<(EmailServer, EmailServerHandle), GradeError> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let smtp_transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| GradeError::Config(format!("SMTP服务器无效: {}", e)))?
            .credentials(creds)
            .build();

        Ok((
            EmailServer {
                cmd_rx,
                from: config.from.clone(),
                smtp_transport,
            },
            EmailServerHandle { cmd_tx },
        ))
    }

    async fn send_report(&self, mail: ReportMail) -> Result<(), GradeError> {
        let message = build_report_message(&self.from, &mail)?;
        self.smtp_transport
            .send(message)
            .await
            .map_err(|e| GradeError::Email(e.to_string()))?;
        log::info!("报告已发送至{}", mail.to);
        Ok(())
    }

    pub async fn run(mut self) {
        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                Command::SendReport { mail, res_tx } => {
                    let result = self.send_report(mail).await;
                    let _ = res_tx.send(result);
                }
            }
        }
    }
}

/// 构建带PDF附件的邮件
pub fn build_report_message(from: &str, mail: &ReportMail) -> Result<Message, GradeError> {
    let from: Mailbox = from
        .parse()
        .map_err(|e| GradeError::Config(format!("发件地址无效: {}", e)))?;
    let to: Mailbox = mail
        .to
        .parse()
        .map_err(|e| GradeError::InvalidInput(format!("邮箱地址无效: {}", e)))?;
    let pdf_type = ContentType::parse("application/pdf")
        .map_err(|e| GradeError::Email(e.to_string()))?;

    let body = format!(
        "{}，你好：\n\n你的试卷已经批改完成，成绩为 {} / 20。\n详细的评语请查看附件中的PDF报告。\n",
        mail.student_name, mail.score
    );

    Message::builder()
        .from(from)
        .to(to)
        .subject(format!("{} - 成绩报告", mail.exam_title))
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(body))
                .singlepart(Attachment::new(mail.filename.clone()).body(mail.pdf.clone(), pdf_type)),
        )
        .map_err(|e| GradeError::Email(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct EmailServerHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl EmailServerHandle {
    /// 把报告发送到学生邮箱
    pub async fn send_report(&self, mail: ReportMail) -> Result<(), GradeError> {
        let (res_tx, res_rx) = oneshot::channel();
        let stopped = || GradeError::Internal("邮件服务已停止".to_string());
        self.cmd_tx
            .send(Command::SendReport { mail, res_tx })
            .map_err(|_| stopped())?;
        res_rx.await.map_err(|_| stopped())?
    }
}
