use time::macros::format_description;
use time::OffsetDateTime;

use crate::pdf::pdf_safe;

/// 成绩表和报告使用的时间格式，如 2024-05-01 14:30
pub fn timestamp(now: OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]");
    now.format(&format).unwrap_or_else(|_| now.unix_timestamp().to_string())
}

pub fn now_timestamp() -> String {
    timestamp(OffsetDateTime::now_utc())
}

// 下载文件名只保留安全字符
pub fn report_filename(name: &str) -> String {
    // Content-Disposition中只放ASCII，重音字母先折叠
    let cleaned: String = pdf_safe(name.trim())
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "Feedback.pdf".to_string()
    } else {
        format!("Feedback_{}.pdf", cleaned)
    }
}

/// 学号比较时忽略首尾空白和大小写
pub fn same_identity(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// 简单的按字符数折行
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word = word.to_string();
            // 超长的单词强制截断
            while word.chars().count() > width {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let head: String = word.chars().take(width).collect();
                word = word.chars().skip(width).collect();
                lines.push(head);
            }
            if word.is_empty() {
                continue;
            }
            let needed = if current.is_empty() { 0 } else { 1 } + word.chars().count();
            if current.chars().count() + needed > width {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
