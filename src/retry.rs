use std::future::Future;
use std::time::Duration;

use rand::{thread_rng, Rng as _};
use tokio::time::sleep;

use crate::error::GradeError;

/// 重试次数上限，超过后指数退避不再有意义
pub const MAX_ATTEMPTS: u32 = 16;

/// 限流时的重试策略：指数退避加随机抖动
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> RetryPolicy {
        RetryPolicy {
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS),
            base_delay,
        }
    }

    /// 第attempt次失败后的等待时间，attempt从1开始。
    /// 抖动小于base_delay/2，所以在max_attempts以内等待时间随次数严格递增
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(MAX_ATTEMPTS);
        let backoff = self.base_delay.saturating_mul(1u32 << exp);
        let jitter_ceiling = (self.base_delay.as_millis() / 2) as u64;
        let jitter = if jitter_ceiling == 0 {
            0
        } else {
            thread_rng().gen_range(0..jitter_ceiling)
        };
        backoff + Duration::from_millis(jitter)
    }
}

/// 执行op，遇到限流错误时按策略等待后重试，其他错误直接返回
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, GradeError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, GradeError>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_rate_limited() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                log::warn!(
                    "评分服务限流 (尝试 {}/{})，{}ms后重试",
                    attempt,
                    policy.max_attempts,
                    delay.as_millis()
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
