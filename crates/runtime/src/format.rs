//! Cell value formatting.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use toolspec::FormatterKind;

use crate::RuntimeConfig;

/// Render `value` for display with the column's formatter.
///
/// Missing and `null` values become the configured placeholder. Values a
/// formatter cannot interpret fall back to plain text.
pub fn format_value(kind: FormatterKind, value: Option<&Value>, config: &RuntimeConfig) -> String {
    let value = match value {
        None | Some(Value::Null) => return config.placeholder.clone(),
        Some(value) => value,
    };

    match kind {
        FormatterKind::Currency => as_number(value)
            .map(|n| currency(n, &config.currency_symbol))
            .unwrap_or_else(|| plain(value)),
        FormatterKind::DateTime => temporal(value)
            .map(|dt| dt.format(&config.datetime_format).to_string())
            .unwrap_or_else(|| plain(value)),
        FormatterKind::Date => temporal(value)
            .map(|dt| dt.format(&config.date_format).to_string())
            .unwrap_or_else(|| plain(value)),
        FormatterKind::Time => temporal(value)
            .map(|dt| dt.format(&config.time_format).to_string())
            .or_else(|| time_only(value).map(|t| t.format(&config.time_format).to_string()))
            .unwrap_or_else(|| plain(value)),
        FormatterKind::Uppercase => plain(value).to_uppercase(),
        FormatterKind::Lowercase => plain(value).to_lowercase(),
        FormatterKind::Capitalize => capitalize_words(&plain(value)),
        FormatterKind::Plain => plain(value),
    }
}

/// Text of a value as it appears in an input control.
pub fn input_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(value) => plain(value),
    }
}

/// Plain-text rendering of any JSON value.
pub fn plain(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn currency(amount: f64, symbol: &str) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = group_thousands(cents / 100);
    format!("{sign}{symbol}{whole}.{:02}", cents % 100)
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Parse RFC 3339 timestamps, naive date-times, bare dates, and epoch
/// milliseconds. Offsets are kept as given, not converted.
fn temporal(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
        }
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.naive_local())
                .ok()
                .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok())
                .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok())
                .or_else(|| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
        }
        _ => None,
    }
}

fn time_only(value: &Value) -> Option<NaiveTime> {
    let s = value.as_str()?.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

fn capitalize_words(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fmt(kind: FormatterKind, value: Value) -> String {
        format_value(kind, Some(&value), &RuntimeConfig::default())
    }

    #[test]
    fn missing_values_use_placeholder() {
        let config = RuntimeConfig::default();
        assert_eq!(format_value(FormatterKind::Currency, None, &config), "N/A");
        assert_eq!(fmt(FormatterKind::Date, Value::Null), "N/A");
    }

    #[test]
    fn currency_groups_and_rounds() {
        assert_eq!(fmt(FormatterKind::Currency, json!(1234.5)), "$1,234.50");
        assert_eq!(fmt(FormatterKind::Currency, json!(0)), "$0.00");
        assert_eq!(fmt(FormatterKind::Currency, json!(-9.999)), "-$10.00");
        assert_eq!(fmt(FormatterKind::Currency, json!("1000000")), "$1,000,000.00");
    }

    #[test]
    fn currency_falls_back_to_text() {
        assert_eq!(fmt(FormatterKind::Currency, json!("free")), "free");
    }

    #[test]
    fn dates_and_times() {
        let ts = json!("2024-03-05T14:07:09Z");
        assert_eq!(fmt(FormatterKind::DateTime, ts.clone()), "2024-03-05 14:07:09");
        assert_eq!(fmt(FormatterKind::Date, ts.clone()), "2024-03-05");
        assert_eq!(fmt(FormatterKind::Time, ts), "14:07:09");
        assert_eq!(fmt(FormatterKind::Date, json!("2024-03-05")), "2024-03-05");
        assert_eq!(fmt(FormatterKind::Time, json!("08:30")), "08:30:00");
        assert_eq!(fmt(FormatterKind::DateTime, json!(0)), "1970-01-01 00:00:00");
    }

    #[test]
    fn unparseable_dates_render_as_text() {
        assert_eq!(fmt(FormatterKind::Date, json!("someday")), "someday");
        assert_eq!(fmt(FormatterKind::DateTime, json!(true)), "true");
    }

    #[test]
    fn case_formatters() {
        assert_eq!(fmt(FormatterKind::Uppercase, json!("abc")), "ABC");
        assert_eq!(fmt(FormatterKind::Lowercase, json!("AbC")), "abc");
        assert_eq!(fmt(FormatterKind::Capitalize, json!("hELLO wORLD")), "Hello World");
    }

    #[test]
    fn plain_renders_scalars_and_structures() {
        assert_eq!(fmt(FormatterKind::Plain, json!(42)), "42");
        assert_eq!(fmt(FormatterKind::Plain, json!(false)), "false");
        assert_eq!(fmt(FormatterKind::Plain, json!([1, 2])), "[1,2]");
    }

    #[test]
    fn input_text_of_null_is_empty() {
        assert_eq!(input_text(Some(&Value::Null)), "");
        assert_eq!(input_text(Some(&json!(3.5))), "3.5");
    }
}
