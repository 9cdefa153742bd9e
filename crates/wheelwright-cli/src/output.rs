use atty::Stream;
use color_eyre::Result;
use serde_json::{json, Value};
use wheelwright_core::{CommandStatus, ExecutionOutcome};

use crate::style::Style;

#[derive(Clone, Copy, Debug)]
pub struct OutputOptions {
    pub quiet: bool,
    pub json: bool,
    pub no_color: bool,
}

/// Prints the outcome and returns the process exit code.
pub fn emit_output(opts: &OutputOptions, command: &str, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = outcome.status.exit_code();
    let style = Style::new(opts.no_color, atty::is(Stream::Stdout));

    if opts.json {
        let payload = json_response(command, outcome, code);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(code);
    }

    if let CommandStatus::Ok = outcome.status {
        if opts.quiet {
            return Ok(code);
        }
        println!("{}", style.status(outcome.status, &outcome.message));
        if let Some(table) = render_release_table(&style, &outcome.details) {
            println!("{table}");
        }
        if let Some(hint) = hint_from_details(&outcome.details) {
            println!("{}", style.info(&format!("Tip: {hint}")));
        }
    } else {
        // Failures print even under --quiet, on stderr.
        eprintln!("{}", style.status(outcome.status, &outcome.message));
        if !opts.quiet {
            if let Some(table) = render_release_table(&style, &outcome.details) {
                eprintln!("{table}");
            }
        }
        let reasons = collect_why_bullets(&outcome.details);
        if !reasons.is_empty() {
            eprintln!();
            eprintln!("Why:");
            for reason in reasons {
                eprintln!("  • {reason}");
            }
        }
        if let Some(hint) = hint_from_details(&outcome.details) {
            eprintln!();
            eprintln!("Fix:");
            eprintln!("{}", style.fix_bullet(&format!("  • {hint}")));
        }
    }
    Ok(code)
}

pub fn json_response(command: &str, outcome: &ExecutionOutcome, code: i32) -> Value {
    let status = match outcome.status {
        CommandStatus::Ok => "ok",
        CommandStatus::UserError => "user_error",
        CommandStatus::Failure => "failure",
    };
    json!({
        "command": command,
        "status": status,
        "message": outcome.message,
        "details": outcome.details,
        "exit_code": code,
    })
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}

fn collect_why_bullets(details: &Value) -> Vec<String> {
    let Some(map) = details.as_object() else {
        return Vec::new();
    };
    let strings = |key: &str| -> Vec<String> {
        map.get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };
    let mut bullets = strings("failures");
    if bullets.is_empty() {
        // The first issue repeats the headline.
        bullets = strings("issues").into_iter().skip(1).collect();
    }
    for (key, label) in [("packages", "packages"), ("known", "known variants")] {
        if let Some(value) = map.get(key).and_then(Value::as_array) {
            let names: Vec<&str> = value.iter().filter_map(Value::as_str).collect();
            if !names.is_empty() {
                bullets.push(format!("{label}: {}", names.join(", ")));
            }
        }
    }
    bullets
}

struct TargetRow {
    group: String,
    filename: String,
    state: String,
    stage: String,
    upload: String,
    release: String,
}

fn render_release_table(style: &Style, details: &Value) -> Option<String> {
    let groups = details.get("groups")?.as_array()?;
    let mut rows = Vec::new();
    for group in groups {
        let label = format!(
            "{} {}",
            group.get("variant")?.as_str()?,
            group.get("upstream_version")?.as_str()?
        );
        for target in group.get("targets")?.as_array()? {
            let text = |key: &str| {
                target
                    .get(key)
                    .and_then(Value::as_str)
                    .unwrap_or("-")
                    .to_string()
            };
            let release = target
                .get("release")
                .and_then(|release| release.get("status"))
                .and_then(Value::as_str)
                .unwrap_or("-")
                .to_string();
            let stage = if target.get("failure").is_some() {
                "failed".to_string()
            } else {
                text("stage")
            };
            rows.push(TargetRow {
                group: label.clone(),
                filename: text("filename"),
                state: text("state"),
                stage,
                upload: text("upload"),
                release,
            });
        }
    }
    if rows.is_empty() {
        return None;
    }
    Some(format_target_table(style, &rows))
}

fn format_target_table(style: &Style, rows: &[TargetRow]) -> String {
    let headers = ["Group", "Wheel", "State", "Stage", "Upload", "Release"];
    let mut widths = headers.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row.cells()) {
            *width = (*width).max(cell.len());
        }
    }
    let line = |cells: [&str; 6]| -> String {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![style.table_header(&line(headers))];
    lines.push(
        widths
            .iter()
            .map(|width| "-".repeat(*width))
            .collect::<Vec<_>>()
            .join("  "),
    );
    for row in rows {
        let cells = row.cells();
        let mut rendered = Vec::with_capacity(cells.len());
        for (index, (cell, width)) in cells.iter().zip(widths).enumerate() {
            let padded = format!("{cell:<width$}");
            rendered.push(if index >= 2 { style.cell(&padded) } else { padded });
        }
        lines.push(rendered.join("  ").trim_end().to_string());
    }
    lines.join("\n")
}

impl TargetRow {
    fn cells(&self) -> [&str; 6] {
        [
            &self.group,
            &self.filename,
            &self.state,
            &self.stage,
            &self.upload,
            &self.release,
        ]
    }
}
