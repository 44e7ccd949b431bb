//! 通用工具函数

use chrono::NaiveTime;

/// 规范化状态代码：去除首尾空白、折叠西班牙语重音、转大写、空格转下划线
///
/// 空字符串视为无状态。
pub fn normalize_status_code(code: &str) -> Option<String> {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        return None;
    }

    let folded: String = trimmed
        .chars()
        .map(|c| match c {
            'á' | 'Á' => 'A',
            'é' | 'É' => 'E',
            'í' | 'Í' => 'I',
            'ó' | 'Ó' => 'O',
            'ú' | 'Ú' | 'ü' | 'Ü' => 'U',
            'ñ' | 'Ñ' => 'N',
            ' ' | '-' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect();

    Some(folded)
}

/// 解析远端返回的时间字段，接受 `HH:MM`、`HH:MM:SS` 和带小数秒的格式
pub fn parse_clock_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"]
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(raw, format).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_status_code() {
        assert_eq!(normalize_status_code("Deserción").as_deref(), Some("DESERCION"));
        assert_eq!(normalize_status_code(" atendido ipress ").as_deref(), Some("ATENDIDO_IPRESS"));
        assert_eq!(normalize_status_code("   "), None);
    }

    #[test]
    fn test_parse_clock_time() {
        assert_eq!(parse_clock_time("09:30"), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(parse_clock_time("09:30:15"), NaiveTime::from_hms_opt(9, 30, 15));
        assert!(parse_clock_time("09:30:15.250").is_some());
        assert!(parse_clock_time("later").is_none());
    }
}
