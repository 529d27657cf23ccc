/// 每道题的满分
pub const ITEM_MAX: f64 = 5.0;
/// 总分按20分制换算
pub const TOTAL_MAX: f64 = 20.0;

/// 单题分数限制在 [0, 5]，非数字按0分处理
pub fn clamp_item(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, ITEM_MAX)
    } else {
        0.0
    }
}

/// 把N道题的得分换算为20分制: sum / (N * 5) * 20，保留两位小数
pub fn normalize_score(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let sum: f64 = scores.iter().copied().map(clamp_item).sum();
    let total = sum / (scores.len() as f64 * ITEM_MAX) * TOTAL_MAX;
    round2(total).clamp(0.0, TOTAL_MAX)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
