//! Output formatting abstraction for text vs JSON rendering
//!
//! All subcommand output flows through [`OutputWriter`] which handles format switching.
//! This keeps format-specific logic out of command handlers entirely.

use std::io::Write;

use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Abstraction for writing CLI output in different formats.
///
/// Subcommand handlers call `writer.render(&payload)` where `payload`
/// implements both `Serialize` (for JSON) and `Render` (for text).
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Render a payload to stdout.
    pub fn render<T: Render + Serialize>(&self, payload: &T) -> Result<(), CliError> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        self.render_to(payload, &mut handle)
    }

    /// Render a payload to an arbitrary writer.
    ///
    /// For `Text` format, delegates to `Render::render_text()`.
    /// For `Json` format, serialises via `serde_json`.
    pub fn render_to<T: Render + Serialize>(
        &self,
        payload: &T,
        w: &mut dyn Write,
    ) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Text => {
                payload.render_text(w)?;
            }
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *w, payload)?;
                writeln!(w)?;
            }
        }
        Ok(())
    }
}

/// Trait for human-readable text rendering.
///
/// Implemented by every CLI output payload alongside `serde::Serialize`.
pub trait Render {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()>;
}

/// Left-aligned text table with columns sized to their widest cell.
pub struct Table {
    headers: Vec<&'static str>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&'static str]) -> Self {
        Self {
            headers: headers.to_vec(),
            rows: Vec::new(),
        }
    }

    pub fn row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    pub fn write(&self, w: &mut dyn Write) -> std::io::Result<()> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.len()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if let Some(width) = widths.get_mut(i) {
                    *width = (*width).max(cell.chars().count());
                }
            }
        }

        let headers: Vec<String> = self.headers.iter().map(|h| (*h).to_owned()).collect();
        write_row(w, &headers, &widths)?;
        for row in &self.rows {
            write_row(w, row, &widths)?;
        }
        Ok(())
    }
}

fn write_row(w: &mut dyn Write, cells: &[String], widths: &[usize]) -> std::io::Result<()> {
    let last = cells.len().saturating_sub(1);
    for (i, cell) in cells.iter().enumerate() {
        if i == last {
            write!(w, "{cell}")?;
        } else {
            let width = widths.get(i).copied().unwrap_or(0);
            write!(w, "{cell:<width$}  ")?;
        }
    }
    writeln!(w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct TestPayload {
        field1: String,
        field2: u32,
    }

    impl Render for TestPayload {
        fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
            writeln!(w, "Field1: {}", self.field1)?;
            writeln!(w, "Field2: {}", self.field2)?;
            Ok(())
        }
    }

    fn render(format: OutputFormat, payload: &TestPayload) -> String {
        let mut buffer = Vec::new();
        OutputWriter::new(format)
            .render_to(payload, &mut buffer)
            .expect("rendering should succeed");
        String::from_utf8(buffer).expect("valid UTF-8")
    }

    #[test]
    fn test_output_writer_text_format() {
        let output = render(
            OutputFormat::Text,
            &TestPayload {
                field1: "test value".to_owned(),
                field2: 42,
            },
        );
        assert!(output.contains("Field1: test value"), "should render field1");
        assert!(output.contains("Field2: 42"), "should render field2");
    }

    #[test]
    fn test_output_writer_json_format() {
        let output = render(
            OutputFormat::Json,
            &TestPayload {
                field1: "test".to_owned(),
                field2: 100,
            },
        );
        let parsed: serde_json::Value = serde_json::from_str(&output).expect("valid JSON");
        assert_eq!(parsed["field1"].as_str(), Some("test"));
        assert_eq!(parsed["field2"].as_u64(), Some(100));
        assert!(output.ends_with('\n'), "JSON output ends with a newline");
    }

    #[test]
    fn test_table_aligns_columns() {
        let mut table = Table::new(&["SERVICE", "STATE"]);
        table.row(vec!["db".to_owned(), "running".to_owned()]);
        table.row(vec!["worker".to_owned(), "absent".to_owned()]);

        let mut buffer = Vec::new();
        table.write(&mut buffer).expect("write");
        let output = String::from_utf8(buffer).expect("valid UTF-8");
        let lines: Vec<_> = output.lines().collect();

        assert_eq!(lines[0], "SERVICE  STATE");
        assert_eq!(lines[1], "db       running");
        assert_eq!(lines[2], "worker   absent");
    }

    #[test]
    fn test_table_without_rows_prints_header() {
        let table = Table::new(&["NAME"]);
        let mut buffer = Vec::new();
        table.write(&mut buffer).expect("write");
        assert_eq!(String::from_utf8(buffer).expect("utf8"), "NAME\n");
    }
}
