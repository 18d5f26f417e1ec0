use std::io::{BufRead, Write};

use anyhow::{Context, Result};

use crate::apply::{ChangeCategory, PendingItem};

#[derive(Debug, Default)]
pub struct ReviewBatch<'a> {
    pub managed: Vec<&'a PendingItem>,
    pub memory: Vec<&'a PendingItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    PerItem,
    /// Blanket answers for the managed and memory categories; deletions still
    /// go through [`Prompter::decide`].
    Categories { managed: Decision, memory: Decision },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Apply,
    /// Left out without asking.
    Skip,
    /// Asked and answered no.
    Decline,
}

impl Decision {
    fn from_answer(accepted: bool) -> Self {
        if accepted {
            Self::Apply
        } else {
            Self::Decline
        }
    }

    fn from_selection(selected: bool) -> Self {
        if selected {
            Self::Apply
        } else {
            Self::Skip
        }
    }
}

pub trait Prompter {
    fn review(&mut self, _batch: &ReviewBatch<'_>) -> Result<ReviewOutcome> {
        Ok(ReviewOutcome::PerItem)
    }

    fn decide(&mut self, _item: &PendingItem) -> Result<Decision> {
        Ok(Decision::Skip)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RejectAll;

impl Prompter for RejectAll {}

/// Explicit category selection from command-line flags. Selected deletions
/// are confirmed through `confirm` unless full auto-accept was requested.
#[derive(Debug, Clone)]
pub struct CategoryFlags<P = RejectAll> {
    pub managed: bool,
    pub memory: bool,
    pub deletions: bool,
    auto_accept: bool,
    confirm: P,
}

impl CategoryFlags<RejectAll> {
    pub fn new(managed: bool, memory: bool, deletions: bool) -> Self {
        Self {
            managed,
            memory,
            deletions,
            auto_accept: true,
            confirm: RejectAll,
        }
    }
}

impl<P: Prompter> CategoryFlags<P> {
    pub fn with_confirmation<Q: Prompter>(self, confirm: Q) -> CategoryFlags<Q> {
        CategoryFlags {
            managed: self.managed,
            memory: self.memory,
            deletions: self.deletions,
            auto_accept: false,
            confirm,
        }
    }
}

impl<P: Prompter> Prompter for CategoryFlags<P> {
    fn review(&mut self, _batch: &ReviewBatch<'_>) -> Result<ReviewOutcome> {
        Ok(ReviewOutcome::Categories {
            managed: Decision::from_selection(self.managed),
            memory: Decision::from_selection(self.memory),
        })
    }

    fn decide(&mut self, item: &PendingItem) -> Result<Decision> {
        let selected = match item.category {
            ChangeCategory::Managed => self.managed,
            ChangeCategory::Memory => self.memory,
            ChangeCategory::Deletion => self.deletions,
        };
        if !selected {
            return Ok(Decision::Skip);
        }
        if self.auto_accept || item.category != ChangeCategory::Deletion {
            return Ok(Decision::Apply);
        }
        self.confirm.decide(item)
    }
}

fn print_item<W: Write>(output: &mut W, item: &PendingItem) -> Result<()> {
    writeln!(output, "{}", item.describe())?;
    if let Some(preview) = &item.preview {
        if !preview.unified_diff.is_empty() {
            write!(output, "{}", preview.unified_diff)?;
            if !preview.unified_diff.ends_with('\n') {
                writeln!(output)?;
            }
        }
    }
    Ok(())
}

fn ask_yes_no<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> Result<bool> {
    write!(output, "{question} [y/N] ")?;
    output.flush().context("failed to flush prompt")?;
    let mut answer = String::new();
    let read = input
        .read_line(&mut answer)
        .context("failed to read answer")?;
    if read == 0 {
        writeln!(output)?;
        return Ok(false);
    }
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

pub struct InteractivePrompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> InteractivePrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> Prompter for InteractivePrompter<R, W> {
    fn decide(&mut self, item: &PendingItem) -> Result<Decision> {
        if item.category == ChangeCategory::Managed && !item.requires_explicit_accept() {
            writeln!(self.output, "auto-applying {}", item.describe())?;
            return Ok(Decision::Apply);
        }
        print_item(&mut self.output, item)?;
        let question = match item.category {
            ChangeCategory::Deletion => format!("Delete {}?", item.path),
            ChangeCategory::Managed | ChangeCategory::Memory => {
                format!("Apply {} to {}?", item.kind.label(), item.path)
            }
        };
        let accepted = ask_yes_no(&mut self.input, &mut self.output, &question)?;
        Ok(Decision::from_answer(accepted))
    }
}

pub struct UnifiedReviewPrompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> UnifiedReviewPrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn review_category(&mut self, title: &str, items: &[&PendingItem]) -> Result<Decision> {
        if items.is_empty() {
            return Ok(Decision::Skip);
        }
        writeln!(self.output, "== {title} ({}) ==", items.len())?;
        for item in items {
            print_item(&mut self.output, item)?;
        }
        let question = format!("Apply all {} {}?", items.len(), title.to_ascii_lowercase());
        let accepted = ask_yes_no(&mut self.input, &mut self.output, &question)?;
        Ok(Decision::from_answer(accepted))
    }
}

impl<R: BufRead, W: Write> Prompter for UnifiedReviewPrompter<R, W> {
    fn review(&mut self, batch: &ReviewBatch<'_>) -> Result<ReviewOutcome> {
        let managed = self.review_category("Managed updates", &batch.managed)?;
        let memory = self.review_category("Memory updates", &batch.memory)?;
        Ok(ReviewOutcome::Categories { managed, memory })
    }

    fn decide(&mut self, item: &PendingItem) -> Result<Decision> {
        print_item(&mut self.output, item)?;
        let question = format!("Delete {}?", item.path);
        let accepted = ask_yes_no(&mut self.input, &mut self.output, &question)?;
        Ok(Decision::from_answer(accepted))
    }
}
