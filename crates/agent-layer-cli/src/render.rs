use std::cell::{Cell, RefCell};
use std::io::IsTerminal;
use std::time::{Duration, Instant};

use agent_layer_core::ReadinessCheck;
use agent_layer_upgrade::ApplyObserver;
use anstyle::{AnsiColor, Effects, Style};
use indicatif::{HumanCount, ProgressBar, ProgressStyle};
use tracing::warn;

const OUTPUT_ENV: &str = "AL_OUTPUT";
const NO_COLOR_ENV: &str = "NO_COLOR";
const MAX_READINESS_DETAILS: usize = 5;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum UiMode {
    Plain,
    Interactive,
}

/// `AL_OUTPUT` wins when it names a style; otherwise rich output needs a
/// terminal and no `NO_COLOR`.
pub(crate) fn resolve_output_style(
    requested: Option<&str>,
    no_color: bool,
    stdout_is_terminal: bool,
) -> OutputStyle {
    match requested.map(str::trim) {
        Some(value) if value.eq_ignore_ascii_case("plain") => return OutputStyle::Plain,
        Some(value) if value.eq_ignore_ascii_case("rich") => return OutputStyle::Rich,
        Some("") | None => {}
        Some(other) => warn!(value = other, "ignoring unsupported {OUTPUT_ENV} value"),
    }
    if stdout_is_terminal && !no_color {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn current_output_style() -> OutputStyle {
    let requested = std::env::var(OUTPUT_ENV).ok();
    let no_color = std::env::var_os(NO_COLOR_ENV).is_some_and(|value| !value.is_empty());
    resolve_output_style(
        requested.as_deref(),
        no_color,
        std::io::stdout().is_terminal(),
    )
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
    mode: UiMode,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self {
            style,
            mode: ui_mode_from_style(style),
        }
    }

    pub(crate) fn current() -> Self {
        Self::from_style(current_output_style())
    }

    pub(crate) fn style(self) -> OutputStyle {
        self.style
    }

    pub(crate) fn print_status(self, status: &str, message: &str) {
        println!("{}", render_status_line(self.style, status, message));
    }

    pub(crate) fn print_section(self, title: &str) {
        if let Some(line) = render_section_header(self.mode, title) {
            println!();
            let rendered = match self.style {
                OutputStyle::Plain => line,
                OutputStyle::Rich => colorize(section_style(), &line),
            };
            println!("{rendered}");
        }
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }

    pub(crate) fn apply_progress(self, label: &str) -> ApplyProgress {
        ApplyProgress {
            style: self.style,
            label: label.to_string(),
            total: Cell::new(0),
            written: Cell::new(0),
            progress_bar: RefCell::new(None),
            started_at: Cell::new(None),
        }
    }
}

/// Progress for the write phase of an apply. The bar only appears once the
/// engine starts writing so it never overdraws prompts.
pub(crate) struct ApplyProgress {
    style: OutputStyle,
    label: String,
    total: Cell<u64>,
    written: Cell<u64>,
    progress_bar: RefCell<Option<ProgressBar>>,
    started_at: Cell<Option<Instant>>,
}

impl ApplyProgress {
    pub(crate) fn summary_line(&self) -> Option<String> {
        let elapsed = self.started_at.get()?.elapsed();
        render_progress_line(
            self.style,
            &self.label,
            self.written.get(),
            self.total.get(),
            Some(elapsed),
        )
    }

    pub(crate) fn abandon(&self) {
        if let Some(progress_bar) = self.progress_bar.borrow_mut().take() {
            progress_bar.finish_and_clear();
        }
    }
}

impl ApplyObserver for ApplyProgress {
    fn on_start(&self, total: usize) {
        let total = total as u64;
        self.total.set(total);
        self.started_at.set(Some(Instant::now()));
        if self.style != OutputStyle::Rich {
            return;
        }
        let progress_bar = ProgressBar::new(total.max(1));
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.cyan.bold} {msg:<12} [{bar:20.cyan/blue}] {pos:>3}/{len:3} {elapsed_precise}",
        ) {
            progress_bar.set_style(style.tick_chars("-=~* ").progress_chars("=>-"));
        }
        progress_bar.set_message(self.label.clone());
        progress_bar.enable_steady_tick(Duration::from_millis(80));
        *self.progress_bar.borrow_mut() = Some(progress_bar);
    }

    fn on_write(&self, _path: &str) {
        let written = (self.written.get() + 1).min(self.total.get());
        self.written.set(written);
        if let Some(progress_bar) = self.progress_bar.borrow().as_ref() {
            progress_bar.set_position(written);
        }
    }

    fn on_finish(&self) {
        if let Some(progress_bar) = self.progress_bar.borrow_mut().take() {
            progress_bar.finish_and_clear();
        }
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => {
            let badge = match status {
                "ok" => "[OK]",
                "warn" => "[WARN]",
                "error" => "[ERR]",
                _ => "[..]",
            };
            format!("{badge} {message}")
        }
    }
}

pub(crate) fn format_readiness_lines(style: OutputStyle, checks: &[ReadinessCheck]) -> Vec<String> {
    let mut lines = Vec::new();
    for check in checks {
        lines.push(render_status_line(
            style,
            "warn",
            &format!("{}: {}", check.id, check.summary),
        ));
        for detail in check.details.iter().take(MAX_READINESS_DETAILS) {
            lines.push(format!("    - {detail}"));
        }
        let hidden = check.details.len().saturating_sub(MAX_READINESS_DETAILS);
        if hidden > 0 {
            lines.push(format!("    - ... and {hidden} more"));
        }
        lines.push(format!("    action: {}", check.recommended_action));
    }
    lines
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn progress_label_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

fn progress_bar_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::BrightBlue.into()))
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

fn ui_mode_from_style(style: OutputStyle) -> UiMode {
    match style {
        OutputStyle::Plain => UiMode::Plain,
        OutputStyle::Rich => UiMode::Interactive,
    }
}

fn render_section_header(mode: UiMode, title: &str) -> Option<String> {
    match mode {
        UiMode::Plain => None,
        UiMode::Interactive => Some(format!("== {title} ==")),
    }
}

fn render_progress_line(
    style: OutputStyle,
    label: &str,
    current: u64,
    total: u64,
    elapsed: Option<Duration>,
) -> Option<String> {
    if style == OutputStyle::Plain {
        return None;
    }

    let width = 18_usize;
    let safe_total = total.max(1);
    let bounded_current = current.min(safe_total);
    let filled = ((bounded_current as usize) * width) / (safe_total as usize);
    let bar = format!(
        "{}{}",
        "=".repeat(filled),
        "-".repeat(width.saturating_sub(filled))
    );
    let percent = (bounded_current * 100) / safe_total;
    let counts = format!("{}/{}", HumanCount(current), HumanCount(total));
    let suffix = elapsed
        .map(|value| format!(" complete in {}", format_elapsed(value)))
        .unwrap_or_default();

    Some(format!(
        "{} [{}] {:>3}% {}{}",
        colorize(progress_label_style(), label),
        colorize(progress_bar_style(), &bar),
        percent,
        counts,
        suffix
    ))
}
