use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use uuid::Uuid;

use crate::structs::grade_type::ReportId;

/// 已生成的PDF报告
#[derive(Debug, Clone)]
pub struct Report {
    pub filename: String,
    pub pdf: Vec<u8>,
}

#[derive(Debug)]
enum Command {
    Store {
        report: Report,
        res_tx: oneshot::Sender<ReportId>,
    },
    Fetch {
        id: ReportId,
        res_tx: oneshot::Sender<Option<Report>>,
    },
}

pub struct ReportServer {
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    /// 报告ID和(报告,生成时间)的HashMap
    reports: HashMap<ReportId, (Report, Instant)>,
    ttl: Duration,
}

impl ReportServer {
    pub fn new(ttl: Duration) -> (ReportServer, ReportServerHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        (
            ReportServer {
                cmd_rx,
                reports: HashMap::new(),
                ttl,
            },
            ReportServerHandle { cmd_tx },
        )
    }

    fn store(&mut self, report: Report) -> ReportId {
        let id = Uuid::new_v4().to_string();
        self.reports.insert(id.clone(), (report, Instant::now()));
        id
    }

    fn fetch(&self, id: &str) -> Option<Report> {
        match self.reports.get(id) {
            Some((report, created)) if created.elapsed() < self.ttl => Some(report.clone()),
            _ => None,
        }
    }

    fn purge(&mut self) {
        let ttl = self.ttl;
        let before = self.reports.len();
        self.reports.retain(|_, (_, created)| created.elapsed() < ttl);
        let removed = before - self.reports.len();
        if removed > 0 {
            log::debug!("清除了{}份过期报告", removed);
        }
    }

    pub async fn run(mut self) {
        let mut interval = time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                // 处理命令
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Store { report, res_tx }) => {
                            let _ = res_tx.send(self.store(report));
                        }
                        Some(Command::Fetch { id, res_tx }) => {
                            let _ = res_tx.send(self.fetch(&id));
                        }
                        None => break,
                    }
                }
                // 定时清除过期报告
                _ = interval.tick() => self.purge(),
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportServerHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl ReportServerHandle {
    /// 保存报告并返回下载用的ID
    pub async fn store(&self, report: Report) -> Option<ReportId> {
        let (res_tx, res_rx) = oneshot::channel();
        self.cmd_tx.send(Command::Store { report, res_tx }).ok()?;
        res_rx.await.ok()
    }

    pub async fn fetch(&self, id: ReportId) -> Option<Report> {
        let (res_tx, res_rx) = oneshot::channel();
        self.cmd_tx.send(Command::Fetch { id, res_tx }).ok()?;
        res_rx.await.ok().flatten()
    }
}
