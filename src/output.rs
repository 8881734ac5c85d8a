use std::io::{self, Write};

use serde::Serialize;
use serde_json::Value;

use crate::domain::SampleMap;
use crate::orchestrator::{ProgressEvent, ProgressSink, UploadResult};
use crate::platform::{Issue, ValidationIssues};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_upload(result: &UploadResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Writes progress lines to stderr as they happen.
pub struct ConsoleOutput;

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({} ms)", event.message, elapsed.as_millis()),
            None => eprintln!("{}", event.message),
        }
    }
}

impl ConsoleOutput {
    pub fn print_summary(result: &UploadResult) {
        println!("Project {}: {} samples uploaded", result.project_id, result.samples.len());
        if result.locations_matched > 0 {
            println!("Matched {} collection locations", result.locations_matched);
        }
        for sample in &result.samples {
            println!("  {} (id {})", sample.name, sample.id);
            for file in &sample.files {
                println!("    {file}");
            }
        }
    }
}

/// Renders validation issues as an itemized list.
pub fn render_issues(issues: &ValidationIssues) -> String {
    let mut out = String::new();
    render_section(&mut out, "Errors", &issues.errors);
    render_section(&mut out, "Warnings", &issues.warnings);
    out
}

fn render_section(out: &mut String, title: &str, issues: &[Issue]) {
    if issues.is_empty() {
        return;
    }
    out.push_str(&format!("{title}:\n"));
    for issue in issues {
        match issue {
            Issue::Message(message) => out.push_str(&format!("  - {message}\n")),
            Issue::Table {
                caption,
                headers,
                rows,
            } => {
                out.push_str(&format!("  - {caption}\n"));
                for row in rows {
                    let cells = row
                        .iter()
                        .enumerate()
                        .map(|(index, cell)| match headers.get(index) {
                            Some(header) => format!("{header}: {}", cell_text(cell)),
                            None => cell_text(cell),
                        })
                        .collect::<Vec<_>>();
                    out.push_str(&format!("      {}\n", cells.join(", ")));
                }
            }
        }
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Lists what discovery had grouped before it failed.
pub fn render_partial(samples: &SampleMap) -> String {
    let mut out = String::new();
    for (name, files) in samples {
        out.push_str(&format!(
            "{name}: R1 {:?}, R2 {:?}, single {:?}\n",
            files.first_reads(),
            files.second_reads(),
            files.single_reads()
        ));
    }
    out
}
