use serde::{Deserialize, Serialize};

use crate::score::{clamp_item, normalize_score};

/// 单道题的评分结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemGrade {
    pub question: u32,
    pub score: f64,
    #[serde(default)]
    pub feedback: String,
}

/// 模型返回的整份试卷评分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingResult {
    pub details: Vec<ItemGrade>,
    #[serde(default)]
    pub final_comment: String,
}

impl GradingResult {
    /// 20分制总分。模型漏掉的题目按0分计
    pub fn normalized(&self, expected_items: usize) -> f64 {
        let mut scores: Vec<f64> = self.details.iter().map(|item| item.score).collect();
        if scores.len() < expected_items {
            scores.resize(expected_items, 0.0);
        }
        normalize_score(&scores)
    }

    /// 把单题分数限制在合法范围内，返回修正后的结果
    pub fn clamped(mut self) -> GradingResult {
        for item in self.details.iter_mut() {
            item.score = clamp_item(item.score);
        }
        self
    }
}
