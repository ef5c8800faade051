use regex::Regex;
use std::sync::LazyLock;

use crate::ingest::is_image;
use crate::models::{ChartData, Dataset, FileRecord, LabValue};

// label, separator, integer part, optional fraction: "Glucosa: 120 mg/dL", "LDL,130,mg/dL", "Hb = 13,5 g/dL"
static LAB_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\p{L}[^:=,;\t]*?)\s*([:=,;\t])\s*(-?\d+)(?:([.,])(\d+))?")
        .expect("Invalid lab value pattern")
});

/// Extract a lab value from one line of text.
///
/// Both `13.5` and `13,5` are read as decimals, except in comma-separated rows where the
/// comma always starts the next field. Lines whose number runs on into a date or a time
/// (`Fecha: 2024-01-05`) are not lab values.
pub fn parse_lab_line(line: &str) -> Option<LabValue> {
    let caps = LAB_LINE.captures(line)?;
    let label = caps.get(1)?.as_str().trim().to_string();
    let separator = caps.get(2)?.as_str();
    let integer = caps.get(3)?;

    let (number, rest) = match (caps.get(4), caps.get(5)) {
        (Some(mark), Some(fraction))
            if is_decimal_mark(mark.as_str(), separator, &line[fraction.end()..]) =>
        {
            (
                format!("{}.{}", integer.as_str(), fraction.as_str()),
                &line[fraction.end()..],
            )
        }
        _ => (integer.as_str().to_string(), &line[integer.end()..]),
    };
    let value = number.parse::<f64>().ok()?;
    let unit = unit_after_value(rest)?;

    Some(LabValue { label, value, unit })
}

fn is_decimal_mark(mark: &str, separator: &str, after_fraction: &str) -> bool {
    mark == "." || (separator != "," && !after_fraction.starts_with(','))
}

fn is_unit_start(c: char) -> bool {
    c.is_alphabetic() || c == '%' || c == 'µ'
}

// Outer None rejects the line; inner None is a value without a unit.
fn unit_after_value(rest: &str) -> Option<Option<String>> {
    let runs_on = match rest.chars().next() {
        Some('-' | '/' | ':') => true,
        Some('.') => rest[1..].starts_with(|c: char| c.is_ascii_digit()),
        _ => false,
    };
    if runs_on {
        return None;
    }

    let rest = rest.trim_start_matches(' ');
    let field = match rest.chars().next() {
        None => return Some(None),
        Some(',' | ';' | '\t') => rest[1..].trim_start_matches(' '),
        Some(c) if is_unit_start(c) => rest,
        Some(_) => return Some(None),
    };

    let unit = field
        .split([',', ';', '\t'])
        .next()
        .unwrap_or_default()
        .trim();
    Some(
        unit.chars()
            .next()
            .filter(|c| is_unit_start(*c))
            .map(|_| unit.to_string()),
    )
}

pub fn parse_lab_values(text: &str) -> Vec<LabValue> {
    text.lines().filter_map(parse_lab_line).collect()
}

/// Lab values found in the text records, in record order. Image records are skipped.
pub fn lab_values_from_records(records: &[FileRecord]) -> Vec<LabValue> {
    records
        .iter()
        .filter(|r| !is_image(&r.media_type))
        .flat_map(|r| parse_lab_values(&r.content))
        .collect()
}

/// Single-series chart of the given values.
pub fn chart_from_lab_values(values: &[LabValue]) -> ChartData {
    if values.is_empty() {
        return ChartData::default();
    }

    ChartData {
        labels: values.iter().map(|v| v.label.clone()).collect(),
        datasets: vec![Dataset {
            label: "input".to_string(),
            data: values.iter().map(|v| v.value).collect(),
            color: "#4e79a7".to_string(),
        }],
    }
}
