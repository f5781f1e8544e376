//! cron 表达式校验
//!
//! 接受 5 段（分 时 日 月 周）或 6/7 段（带秒、可选年）表达式；
//! 5 段表达式在前面补 `0` 秒字段后交给 `cron` 解析。

use crate::SchedulerError;
use cron::Schedule;
use std::str::FromStr;

/// 将 5 段表达式规范化为 6 段；其它段数原样返回（去除首尾空白）。
pub fn normalize_cron_expression(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// 解析 cron 表达式。
pub fn parse_cron_expression(expression: &str) -> Result<Schedule, SchedulerError> {
    let invalid = |reason: String| SchedulerError::InvalidCron {
        expression: expression.to_string(),
        reason,
    };
    let fields = expression.split_whitespace().count();
    if !(5..=7).contains(&fields) {
        return Err(invalid(format!("expected 5 to 7 fields, found {}", fields)));
    }
    Schedule::from_str(&normalize_cron_expression(expression)).map_err(|err| invalid(err.to_string()))
}

/// 同步校验 cron 表达式。
pub fn validate_cron_expression(expression: &str) -> Result<(), SchedulerError> {
    parse_cron_expression(expression).map(|_| ())
}
