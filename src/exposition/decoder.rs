//! Decoder for the Prometheus text exposition format (version 0.0.4).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A decoding failure, with the 1-based line it happened on.
#[derive(Debug, Error, PartialEq)]
#[error("line {line}: {kind}")]
pub struct DecodeError {
    pub line: usize,
    pub kind: DecodeErrorKind,
}

#[derive(Debug, Error, PartialEq)]
pub enum DecodeErrorKind {
    #[error("missing metric name")]
    MissingName,
    #[error("missing sample value")]
    MissingValue,
    #[error("invalid sample value '{0}'")]
    InvalidValue(String),
    #[error("unknown metric type '{0}'")]
    UnknownType(String),
    #[error("malformed label set")]
    MalformedLabels,
    #[error("invalid escape sequence '\\{0}'")]
    InvalidEscape(char),
}

/// The declared type of a metric family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Untyped,
}

impl FromStr for MetricKind {
    type Err = DecodeErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            "histogram" => Ok(MetricKind::Histogram),
            "summary" => Ok(MetricKind::Summary),
            "untyped" => Ok(MetricKind::Untyped),
            other => Err(DecodeErrorKind::UnknownType(other.to_string())),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
            MetricKind::Summary => "summary",
            MetricKind::Untyped => "untyped",
        };
        f.write_str(s)
    }
}

/// One exposed sample line.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

impl Sample {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// A named group of samples with its help text and type.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: Option<String>,
    pub kind: MetricKind,
    pub samples: Vec<Sample>,
}

impl MetricFamily {
    fn new(name: &str) -> Self {
        MetricFamily {
            name: name.to_string(),
            help: None,
            kind: MetricKind::Untyped,
            samples: Vec::new(),
        }
    }

    /// Whether a sample called `name` belongs to this family. Only histograms
    /// and summaries carry the `_bucket`, `_sum` and `_count` series.
    fn owns(&self, name: &str) -> bool {
        if name == self.name {
            return true;
        }
        let Some(suffix) = name.strip_prefix(self.name.as_str()) else {
            return false;
        };
        match self.kind {
            MetricKind::Histogram => matches!(suffix, "_bucket" | "_sum" | "_count"),
            MetricKind::Summary => matches!(suffix, "_sum" | "_count"),
            _ => false,
        }
    }

    /// The first sample whose labels are exactly `labels`.
    pub fn sample(&self, labels: &[(&str, &str)]) -> Option<&Sample> {
        self.samples.iter().find(|sample| {
            sample.labels.len() == labels.len()
                && labels
                    .iter()
                    .all(|(key, value)| sample.label(key) == Some(*value))
        })
    }
}

/// Decodes an exposition body into families, in the order they appear.
pub fn decode(text: &str) -> Result<Vec<MetricFamily>, DecodeError> {
    let mut families: Vec<MetricFamily> = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        let at = |kind: DecodeErrorKind| DecodeError {
            line: index + 1,
            kind,
        };

        if line.is_empty() {
            continue;
        }

        if let Some(comment) = line.strip_prefix('#') {
            let (keyword, rest) = next_token(comment);
            if keyword != "HELP" && keyword != "TYPE" {
                continue;
            }
            let (name, rest) = next_token(rest);
            if name.is_empty() {
                return Err(at(DecodeErrorKind::MissingName));
            }
            let rest = rest.trim();
            let family = family_for(&mut families, name);
            if keyword == "HELP" {
                family.help = Some(unescape_help(rest));
            } else {
                family.kind = rest.parse().map_err(at)?;
            }
            continue;
        }

        let sample = parse_sample(line).map_err(at)?;
        match families.last_mut() {
            Some(family) if family.owns(&sample.name) => family.samples.push(sample),
            _ => {
                let mut family = MetricFamily::new(&sample.name);
                family.samples.push(sample);
                families.push(family);
            }
        }
    }

    Ok(families)
}

/// Looks up a family by name. An unknown name is simply absent.
pub fn find_family<'a>(families: &'a [MetricFamily], name: &str) -> Option<&'a MetricFamily> {
    families.iter().find(|family| family.name == name)
}

/// Splits off the first whitespace-separated token. Runs of whitespace count
/// as one separator.
fn next_token(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    input.split_once(char::is_whitespace).unwrap_or((input, ""))
}

fn family_for<'a>(families: &'a mut Vec<MetricFamily>, name: &str) -> &'a mut MetricFamily {
    let existing = families.iter().position(|family| family.name == name);
    let index = match existing {
        Some(index) => index,
        None => {
            families.push(MetricFamily::new(name));
            families.len() - 1
        }
    };
    &mut families[index]
}

fn parse_sample(line: &str) -> Result<Sample, DecodeErrorKind> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .unwrap_or(line.len());
    let name = &line[..name_end];
    if name.is_empty() {
        return Err(DecodeErrorKind::MissingName);
    }

    let mut rest = &line[name_end..];
    let mut labels = BTreeMap::new();
    if let Some(body) = rest.strip_prefix('{') {
        let (parsed, remainder) = parse_labels(body)?;
        labels = parsed;
        rest = remainder;
    }

    let mut fields = rest.split_whitespace();
    let raw_value = fields.next().ok_or(DecodeErrorKind::MissingValue)?;
    // A trailing timestamp is allowed and ignored.
    let value = parse_value(raw_value)?;

    Ok(Sample {
        name: name.to_string(),
        labels,
        value,
    })
}

/// Parses `k="v",...}` and returns the labels plus whatever follows the
/// closing brace.
fn parse_labels(input: &str) -> Result<(BTreeMap<String, String>, &str), DecodeErrorKind> {
    let mut labels = BTreeMap::new();
    let mut rest = input.trim_start();

    loop {
        if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        }

        let eq = rest.find('=').ok_or(DecodeErrorKind::MalformedLabels)?;
        let key = rest[..eq].trim();
        if key.is_empty() {
            return Err(DecodeErrorKind::MalformedLabels);
        }
        let quoted = rest[eq + 1..]
            .trim_start()
            .strip_prefix('"')
            .ok_or(DecodeErrorKind::MalformedLabels)?;

        let mut value = String::new();
        let mut chars = quoted.char_indices();
        let consumed = loop {
            match chars.next() {
                Some((i, '"')) => break i + 1,
                Some((_, '\\')) => match chars.next() {
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, '"')) => value.push('"'),
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, other)) => return Err(DecodeErrorKind::InvalidEscape(other)),
                    None => return Err(DecodeErrorKind::MalformedLabels),
                },
                Some((_, c)) => value.push(c),
                None => return Err(DecodeErrorKind::MalformedLabels),
            }
        };
        labels.insert(key.to_string(), value);

        rest = quoted[consumed..].trim_start();
        if let Some(after) = rest.strip_prefix(',') {
            rest = after.trim_start();
        } else if !rest.starts_with('}') {
            return Err(DecodeErrorKind::MalformedLabels);
        }
    }
}

fn parse_value(raw: &str) -> Result<f64, DecodeErrorKind> {
    match raw {
        "+Inf" | "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        "NaN" => Ok(f64::NAN),
        other => other
            .parse()
            .map_err(|_| DecodeErrorKind::InvalidValue(other.to_string())),
    }
}

fn unescape_help(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
