// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Renders progress, pipeline events, and warnings in normal, quiet, and JSON-lines modes.

use serde::Serialize;
use std::time::Instant;

use crate::diagnostics::Warning;
use crate::pipeline::PipelineEvent;

/// How much the CLI prints, and in what shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Progress lines and stage events
    Normal,
    /// Final result and alerts only
    Quiet,
    /// One JSON object per line
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Status line in JSON mode.
#[derive(Serialize)]
struct StatusLine<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

pub struct Output {
    mode: OutputMode,
    started: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            started: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Report durations on the final success or error line from now on.
    pub fn start_timer(&mut self) {
        self.started = Some(Instant::now());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Normal mode only.
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    pub fn event(&self, event: &PipelineEvent) {
        match self.mode {
            OutputMode::Normal => println!("{}", describe(event)),
            OutputMode::Quiet => {}
            OutputMode::Json => self.json_line(event),
        }
    }

    /// Print `value` as one JSON line; a no-op outside JSON mode.
    pub fn json_line<T: Serialize>(&self, value: &T) {
        if self.mode == OutputMode::Json {
            write_json(Stream::Stdout, value);
        }
    }

    /// Warnings are printed in every mode; stuck deployments are alerts.
    pub fn warning(&self, warning: &Warning) {
        self.status(
            Stream::Stderr,
            "warning",
            warning.kind.label(),
            &warning.message,
            false,
        );
    }

    pub fn success(&self, message: &str) {
        self.status(Stream::Stdout, "success", "", message, true);
    }

    pub fn error(&self, message: &str) {
        self.status(Stream::Stderr, "error", "Error", message, true);
    }

    fn status(&self, stream: Stream, event: &str, label: &str, message: &str, timed: bool) {
        let duration = if timed { self.started.map(|_| self.elapsed_secs()) } else { None };

        if self.mode == OutputMode::Json {
            write_json(
                stream,
                &StatusLine {
                    event,
                    message,
                    duration_secs: duration,
                },
            );
            return;
        }

        let mut line = if label.is_empty() {
            message.to_string()
        } else {
            format!("{label}: {message}")
        };
        if self.mode == OutputMode::Normal
            && stream == Stream::Stdout
            && let Some(secs) = duration.filter(|s| *s > 0.0)
        {
            line.push_str(&format!(" ({secs:.1}s)"));
        }
        match stream {
            Stream::Stdout => println!("{line}"),
            Stream::Stderr => eprintln!("{line}"),
        }
    }
}

fn write_json<T: Serialize>(stream: Stream, value: &T) {
    let Ok(json) = serde_json::to_string(value) else {
        return;
    };
    match stream {
        Stream::Stdout => println!("{json}"),
        Stream::Stderr => eprintln!("{json}"),
    }
}

fn describe(event: &PipelineEvent) -> String {
    match event {
        PipelineEvent::ExecutionStarted {
            execution_id,
            pipeline,
        } => format!("Execution {} of {} started", execution_id, pipeline),
        PipelineEvent::StageStarted { stage, .. } => format!("  → {}...", stage),
        PipelineEvent::StageSucceeded { stage, outputs, .. } => {
            if outputs.is_empty() {
                format!("  ✓ {}", stage)
            } else {
                let ids: Vec<String> = outputs.iter().map(|n| n.to_string()).collect();
                format!("  ✓ {} ({})", stage, ids.join(", "))
            }
        }
        PipelineEvent::StageFailed {
            stage, kind, cause, ..
        } => format!("  ✗ {} [{}]: {}", stage, kind, cause),
        PipelineEvent::ExecutionFinished {
            execution_id,
            status,
        } => format!("Execution {} {}", execution_id, status),
    }
}
