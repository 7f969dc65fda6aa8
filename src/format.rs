//! Id templates such as `{plan.id}_STATION_{stationIndex:02d}`.
//!
//! A placeholder is a dotted path into the format context, optionally
//! followed by a spec: `d` (integer), `Nd` (space padded), `0Nd` (zero
//! padded), `s` or `Ns` (string, left aligned). `{{` and `}}` are literal
//! braces.

use crate::error::{Result, XpjsonError};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_.]*)(?::([^{}]*))?\}").expect("placeholder pattern")
});

static SPEC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(0)?([0-9]+)?([ds])?$").expect("format spec pattern"));

/// Expand `template` against `ctx`, a JSON object of named values.
pub fn format_id(template: &str, ctx: &Value) -> Result<String> {
    let error = |reason: String| XpjsonError::IdFormat {
        format: template.to_string(),
        reason,
    };

    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER_RE.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        push_literal(&mut out, &template[last..whole.start()]).map_err(&error)?;
        last = whole.end();

        match whole.as_str() {
            "{{" => out.push('{'),
            "}}" => out.push('}'),
            _ => {
                let path = caps.get(1).map_or("", |m| m.as_str());
                let value = lookup(ctx, path)
                    .ok_or_else(|| error(format!("no value for '{}'", path)))?;
                let spec = caps.get(2).map_or("", |m| m.as_str());
                out.push_str(&render(value, spec).map_err(&error)?);
            }
        }
    }
    push_literal(&mut out, &template[last..]).map_err(&error)?;
    Ok(out)
}

fn push_literal(out: &mut String, text: &str) -> std::result::Result<(), String> {
    if let Some(brace) = text.chars().find(|c| *c == '{' || *c == '}') {
        return Err(format!("unmatched '{}'", brace));
    }
    out.push_str(text);
    Ok(())
}

/// Resolve a dotted path; null values count as absent.
fn lookup<'a>(ctx: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(ctx, |value, key| value.get(key))
        .filter(|v| !v.is_null())
}

fn render(value: &Value, spec: &str) -> std::result::Result<String, String> {
    let caps = SPEC_RE
        .captures(spec)
        .ok_or_else(|| format!("unsupported format spec '{}'", spec))?;
    let zero = caps.get(1).is_some();
    let width = caps
        .get(2)
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .unwrap_or(0);

    match caps.get(3).map(|m| m.as_str()) {
        Some("d") => {
            let n = value
                .as_i64()
                .ok_or_else(|| format!("'d' needs an integer, got {}", value))?;
            Ok(if zero {
                format!("{:0width$}", n, width = width)
            } else {
                format!("{:>width$}", n, width = width)
            })
        }
        Some("s") => Ok(format!("{:<width$}", plain(value), width = width)),
        _ => match value.as_i64() {
            Some(n) if zero => Ok(format!("{:0width$}", n, width = width)),
            _ => Ok(format!("{:>width$}", plain(value), width = width)),
        },
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Value {
        json!({
            "plan": {"id": "P7", "planNumber": 7},
            "station": {"id": "S1", "name": null},
            "stationIndex": 3,
            "commandIndex": 12
        })
    }

    #[test]
    fn dotted_paths_and_indices() {
        assert_eq!(
            format_id("{plan.id}_STATION_{stationIndex}", &ctx()).unwrap(),
            "P7_STATION_3"
        );
    }

    #[test]
    fn numeric_padding() {
        assert_eq!(format_id("{stationIndex:02d}", &ctx()).unwrap(), "03");
        assert_eq!(format_id("{commandIndex:4d}", &ctx()).unwrap(), "  12");
        assert_eq!(format_id("{plan.planNumber:03}", &ctx()).unwrap(), "007");
        assert_eq!(format_id("[{plan.id:4s}]", &ctx()).unwrap(), "[P7  ]");
    }

    #[test]
    fn escaped_braces() {
        assert_eq!(format_id("{{{plan.id}}}", &ctx()).unwrap(), "{P7}");
    }

    #[test]
    fn errors_name_the_template() {
        let err = format_id("{station.name}", &ctx()).unwrap_err();
        assert!(matches!(err, XpjsonError::IdFormat { ref format, .. } if format == "{station.name}"));
        assert!(format_id("{plan.id", &ctx()).is_err());
        assert!(format_id("{plan.id:02d}", &ctx()).is_err());
        assert!(format_id("{stationIndex:x}", &ctx()).is_err());
    }
}
