//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 日志脱敏模块
//!
//! 客户端地址、用户ID和会话令牌在写入日志前都经过这里。

/// 基础脱敏：保留首尾各两个字符
#[inline]
pub fn redact_basic(value: Option<&str>) -> String {
    let Some(value) = value else {
        return "unknown".to_string();
    };

    let value = value.trim();
    if value.is_empty() {
        return "unknown".to_string();
    }

    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "***".to_string();
    }

    let prefix: String = chars[..2].iter().collect();
    let suffix: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", prefix, suffix)
}

/// 用户ID脱敏
#[inline]
pub fn redact_user_id(value: Option<&str>) -> String {
    redact_basic(value)
}

/// IP地址脱敏
///
/// IPv4 保留前两段，IPv6 保留第一段。
#[inline]
pub fn redact_ip(value: Option<&str>) -> String {
    let Some(value) = value else {
        return "unknown".to_string();
    };

    let value = value.trim();
    if value.is_empty() || value == crate::constants::UNKNOWN_SUBJECT {
        return "unknown".to_string();
    }

    let parts: Vec<&str> = value.split('.').collect();
    if parts.len() == 4 {
        return format!("{}.{}.***.***", parts[0], parts[1]);
    }

    if value.contains(':') {
        let first = value.split(':').next().unwrap_or_default();
        return format!("{}:***:***", first);
    }

    redact_basic(Some(value))
}

/// 会话令牌脱敏（只显示长度）
#[inline]
pub fn redact_token(value: Option<&str>) -> String {
    match value {
        Some(token) if !token.is_empty() => format!("<token len={}>", token.len()),
        _ => "none".to_string(),
    }
}
