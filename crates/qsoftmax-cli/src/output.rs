//! Rendering of run reports.

use crate::driver::RunReport;
use serde::Serialize;
use std::fmt::{self, Write as _};
use std::io::Write;

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text (default).
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown format '{other}'. Expected one of: text, json")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// `name: v0 v1 v2 ...` on one line.
pub fn trace_line<T: fmt::Display>(name: &str, values: &[T]) -> String {
    let mut line = format!("{name}:");
    for v in values {
        // Writing into a String cannot fail.
        let _ = write!(line, " {v}");
    }
    line
}

/// Text rendering in pipeline order: generated data, max, staged data,
/// output, and the optional dequantized probabilities.
pub fn render_text(report: &RunReport) -> String {
    let mut lines = vec![
        trace_line("usr_src_data", &report.usr_src_data),
        format!("max_usr_src_data: {}", report.max_usr_src_data),
        trace_line("src_data", &report.src_data),
        trace_line("output", &report.output),
    ];
    if let Some(probs) = &report.dequantized {
        lines.push(trace_line("dequantized", probs));
    }
    lines.join("\n")
}

/// Write `value` to stdout as JSON or as the text produced by `text_fn`.
pub fn emit<T: Serialize>(
    format: OutputFormat,
    value: &T,
    text_fn: impl FnOnce(&T) -> String,
) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    match format {
        OutputFormat::Json => writeln!(stdout, "{}", serde_json::to_string_pretty(value)?)?,
        OutputFormat::Text => writeln!(stdout, "{}", text_fn(value))?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn trace_line_layout() {
        insta::assert_snapshot!(trace_line("src_data", &[255.0f32, 254.0, 0.5]), @"src_data: 255 254 0.5");
        insta::assert_snapshot!(trace_line::<u8>("empty", &[]), @"empty:");
    }
}
