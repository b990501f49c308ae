//! Line protocol parsing.
//!
//! ```text
//! measurement[,tag=value...] field=value[,field=value...] [timestamp]
//! ```
//!
//! Commas, spaces and equal signs in names are escaped with a backslash,
//! string field values are double quoted.

use crate::error::{ImportError, ImportResult};
use crate::point::{FieldValue, Record};

/// Parse one line into a `Record`. The timestamp is kept as written.
pub fn parse_line(line: &str) -> ImportResult<Record> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ImportError::Parse("empty line".into()));
    }

    let key_end = find_unescaped(line, ' ')
        .ok_or_else(|| ImportError::Parse(format!("missing fields: {}", line)))?;
    let (key, rest) = line.split_at(key_end);

    let sections: Vec<&str> = split_unescaped(rest, ' ', true)
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
    let (fields, timestamp) = match sections.len() {
        1 => (sections[0], None),
        2 => (sections[0], Some(sections[1])),
        0 => return Err(ImportError::Parse(format!("missing fields: {}", line))),
        _ => return Err(ImportError::Parse(format!("invalid line format: {}", line))),
    };

    let mut parts = split_unescaped(key, ',', false).into_iter();
    let measurement = unescape(parts.next().unwrap_or(""));
    if measurement.is_empty() {
        return Err(ImportError::Parse(format!("missing measurement: {}", line)));
    }

    let mut record = Record::new(&measurement);
    for pair in parts {
        let (k, v) = split_pair(pair)
            .ok_or_else(|| ImportError::Parse(format!("invalid tag {:?}: {}", pair, line)))?;
        if v.is_empty() {
            return Err(ImportError::Parse(format!("missing tag value {:?}: {}", k, line)));
        }
        record.tags.insert(unescape(k), unescape(v));
    }

    for pair in split_unescaped(fields, ',', true) {
        let (k, v) = split_pair(pair)
            .ok_or_else(|| ImportError::Parse(format!("invalid field {:?}: {}", pair, line)))?;
        let value = parse_value(v)
            .map_err(|e| ImportError::Parse(format!("field {:?}: {}: {}", k, e, line)))?;
        record.fields.insert(unescape(k), value);
    }

    if let Some(ts) = timestamp {
        let ts = ts
            .parse::<i64>()
            .map_err(|e| ImportError::Parse(format!("invalid timestamp {:?}: {}", ts, e)))?;
        record.timestamp = Some(ts);
    }

    Ok(record)
}

fn parse_value(raw: &str) -> Result<FieldValue, String> {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return Ok(FieldValue::String(unescape(&raw[1..raw.len() - 1])));
    }

    match raw {
        "" => return Err("missing value".into()),
        "t" | "T" | "true" | "True" | "TRUE" => return Ok(FieldValue::Boolean(true)),
        "f" | "F" | "false" | "False" | "FALSE" => return Ok(FieldValue::Boolean(false)),
        _ => {}
    }

    if let Some(num) = raw.strip_suffix('i') {
        return num
            .parse::<i64>()
            .map(FieldValue::Integer)
            .map_err(|e| format!("invalid integer {:?}: {}", raw, e));
    }
    if let Some(num) = raw.strip_suffix('u') {
        let unsigned = num
            .parse::<u64>()
            .map_err(|e| format!("invalid unsigned {:?}: {}", raw, e))?;
        return i64::try_from(unsigned)
            .map(FieldValue::Integer)
            .map_err(|_| format!("unsigned {:?} out of range", raw));
    }

    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(FieldValue::Float(v)),
        _ => Err(format!("invalid number {:?}", raw)),
    }
}

/// Split `key=value` at the first unescaped equal sign.
fn split_pair(pair: &str) -> Option<(&str, &str)> {
    let pos = find_unescaped(pair, '=')?;
    let (key, value) = (&pair[..pos], &pair[pos + 1..]);
    if key.is_empty() {
        return None;
    }
    Some((key, value))
}

fn find_unescaped(s: &str, needle: char) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == needle {
            return Some(i);
        }
    }
    None
}

fn split_unescaped(s: &str, sep: char, quotes: bool) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    let mut quoted = false;

    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' if quotes => quoted = !quoted,
            c if c == sep && !quoted => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => out.push(next),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_simple_line() {
        let record = parse_line("cpu,host=a value=1 1").unwrap();
        assert_eq!(record.measurement, "cpu");
        assert_eq!(record.tags.get("host").map(String::as_str), Some("a"));
        assert_eq!(record.fields.get("value"), Some(&FieldValue::Float(1.0)));
        assert_eq!(record.timestamp, Some(1));
    }

    #[test]
    fn test_parse_field_types() {
        let record =
            parse_line("m i=-3i,u=7u,f=2.5,b=t,s=\"a, b=c\",no=FALSE 1700000000").unwrap();
        assert_eq!(record.fields["i"], FieldValue::Integer(-3));
        assert_eq!(record.fields["u"], FieldValue::Integer(7));
        assert_eq!(record.fields["f"], FieldValue::Float(2.5));
        assert_eq!(record.fields["b"], FieldValue::Boolean(true));
        assert_eq!(record.fields["s"], FieldValue::String("a, b=c".into()));
        assert_eq!(record.fields["no"], FieldValue::Boolean(false));
        assert!(record.tags.is_empty());
    }

    #[test]
    fn test_parse_escapes() {
        let record =
            parse_line(r#"disk\ io,path=/var\ lib,kind=a\,b msg="say \"hi\"" 5"#).unwrap();
        assert_eq!(record.measurement, "disk io");
        assert_eq!(record.tags["path"], "/var lib");
        assert_eq!(record.tags["kind"], "a,b");
        assert_eq!(record.fields["msg"], FieldValue::String("say \"hi\"".into()));
        assert_eq!(record.timestamp, Some(5));
    }

    #[test]
    fn test_parse_without_timestamp() {
        let record = parse_line("mem used=42i\r\n").unwrap();
        assert_eq!(record.timestamp, None);
        assert_eq!(record.fields["used"], FieldValue::Integer(42));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_line("cpu").is_err());
        assert!(parse_line("cpu,host value=1").is_err());
        assert!(parse_line("cpu value= 1").is_err());
        assert!(parse_line("cpu value=1 notatime").is_err());
        assert!(parse_line("cpu value=abc").is_err());
        assert!(parse_line("cpu value=18446744073709551615u").is_err());
        assert!(parse_line(",host=a value=1").is_err());
        assert!(parse_line("cpu value=1 1 2").is_err());
    }

    #[test]
    fn test_round_trip_through_rendering() {
        let line = "weather,city=New\\ York temp=21.5,ok=true,note=\"x y\" 1000";
        let record = parse_line(line).unwrap();
        assert_eq!(parse_line(&record.to_line_protocol()).unwrap(), record);
    }
}
