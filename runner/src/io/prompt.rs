//! Prompt builder for agent invocations.
//!
//! Templates are split into sections by `<!-- section:KEY required|droppable -->`
//! markers before rendering, so task text can never forge a section boundary.
//! Empty sections vanish and the rest are joined by exactly one blank line.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, Value, context};
use tracing::debug;

use crate::core::task::Task;
use crate::core::types::RunStop;
use crate::io::marker::{COMPLETION_MARKER, PLAN_FILE, PR_DESCRIPTION_FILE};

const COMPLETION_PARTIAL: &str = include_str!("prompts/completion.md");
const TEMPLATES: [(&str, &str); 6] = [
    ("initial", include_str!("prompts/initial.md")),
    ("continuation", include_str!("prompts/continuation.md")),
    ("plan", include_str!("prompts/plan.md")),
    ("pr_description", include_str!("prompts/pr_description.md")),
    ("chunk_summary", include_str!("prompts/chunk_summary.md")),
    ("final_summary", include_str!("prompts/final_summary.md")),
];

/// Sections dropped first when a prompt exceeds its budget.
const DROP_ORDER: [&str; 4] = ["diff", "transcript", "summaries", "body"];

static ENGINE: LazyLock<PromptEngine> = LazyLock::new(PromptEngine::new);

/// One marker-delimited slice of template source.
#[derive(Debug, Clone)]
struct TemplateSection {
    key: &'static str,
    required: bool,
    source: &'static str,
}

/// A section after rendering.
#[derive(Debug, Clone)]
struct RenderedSection {
    key: &'static str,
    required: bool,
    content: String,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
    templates: HashMap<&'static str, Vec<TemplateSection>>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template("completion", COMPLETION_PARTIAL)
            .expect("completion template should be valid");
        let templates = TEMPLATES
            .iter()
            .map(|(name, source)| (*name, split_sections(source)))
            .collect();
        Self { env, templates }
    }

    fn render(&self, name: &str, ctx: &Value) -> Result<Vec<RenderedSection>> {
        let sections = self
            .templates
            .get(name)
            .ok_or_else(|| anyhow!("unknown prompt template {name}"))?;
        let mut rendered = Vec::with_capacity(sections.len());
        for section in sections {
            let content = self
                .env
                .render_str(section.source, ctx)
                .with_context(|| format!("render {name} section {}", section.key))?;
            let content = content.trim();
            if content.is_empty() {
                continue;
            }
            rendered.push(RenderedSection {
                key: section.key,
                required: section.required,
                content: content.to_string(),
            });
        }
        Ok(rendered)
    }
}

/// Split template source into sections using HTML comment markers.
///
/// Text before the first marker is ignored.
fn split_sections(source: &'static str) -> Vec<TemplateSection> {
    static SECTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
            .expect("section regex should compile")
    });

    let markers: Vec<_> = SECTION_RE.captures_iter(source).collect();
    let mut sections = Vec::with_capacity(markers.len());
    for (i, caps) in markers.iter().enumerate() {
        let (Some(marker), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(source.len(), |m| m.start());
        sections.push(TemplateSection {
            key: key.as_str(),
            required: kind.as_str() == "required",
            source: &source[marker.end()..end],
        });
    }
    sections
}

/// Apply budget to sections, dropping droppable sections as needed.
fn apply_budget_to_sections(sections: &mut Vec<RenderedSection>, budget: usize) {
    let total_len =
        |secs: &[RenderedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    // Still over budget: truncate the last section on a char boundary.
    let total = total_len(sections);
    if total <= budget {
        return;
    }
    let Some(last) = sections.last_mut() else {
        return;
    };
    let other_len = total - last.content.len();
    let allowed = budget.saturating_sub(other_len);
    let before_len = last.content.len();
    let mut cut = allowed.saturating_sub(12).min(last.content.len());
    while !last.content.is_char_boundary(cut) {
        cut -= 1;
    }
    last.content.truncate(cut);
    last.content.push_str("\n[truncated]");
    debug!(
        section = last.key,
        before_len,
        after_len = last.content.len(),
        "truncated section for budget"
    );
}

fn render_sections(sections: &[RenderedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds agent prompts within a byte budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
    tools: Vec<String>,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            budget_bytes,
            tools: ["Read", "Edit", "Write", "Glob", "Grep"]
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    /// Tools named in the editing contract.
    pub fn with_tools(mut self, tools: &[String]) -> Self {
        if !tools.is_empty() {
            self.tools = tools.to_vec();
        }
        self
    }

    /// Prompt for chunk 0 of an implementation run.
    pub fn build_initial(&self, task: &Task, workdir: &Path) -> Result<String> {
        self.build("initial", &self.task_context(task, workdir)?)
    }

    /// Prompt for chunks after the first: restates the task and the completion protocol.
    pub fn build_continuation(&self, task: &Task, workdir: &Path) -> Result<String> {
        self.build("continuation", &self.task_context(task, workdir)?)
    }

    /// Analysis-only prompt whose terminal artifact is the plan file.
    pub fn build_plan(&self, task: &Task, workdir: &Path) -> Result<String> {
        task.validate()?;
        let workdir = absolute_workdir(workdir)?;
        self.build(
            "plan",
            &context! {
                workdir => workdir.display().to_string(),
                plan_path => workdir.join(PLAN_FILE).display().to_string(),
                title => task.title(),
                body => task.body(),
            },
        )
    }

    pub fn build_pr_description(
        &self,
        task: &Task,
        diff: &str,
        workdir: &Path,
    ) -> Result<String> {
        task.validate()?;
        let workdir = absolute_workdir(workdir)?;
        self.build(
            "pr_description",
            &context! {
                workdir => workdir.display().to_string(),
                output_path => workdir.join(PR_DESCRIPTION_FILE).display().to_string(),
                title => task.title(),
                body => task.body(),
                diff => Some(diff.trim()).filter(|d| !d.is_empty()),
            },
        )
    }

    pub fn build_chunk_summary(
        &self,
        task: &Task,
        chunk_index: u32,
        transcript: &str,
    ) -> Result<String> {
        task.validate()?;
        self.build(
            "chunk_summary",
            &context! {
                title => task.title(),
                chunk_number => chunk_index + 1,
                transcript => Some(transcript.trim()).filter(|t| !t.is_empty()),
            },
        )
    }

    pub fn build_final_summary(
        &self,
        task: &Task,
        summaries: &[String],
        stop: RunStop,
    ) -> Result<String> {
        task.validate()?;
        let summaries: Vec<&str> = summaries
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        self.build(
            "final_summary",
            &context! {
                title => task.title(),
                summaries => summaries,
                stop => stop.as_str(),
            },
        )
    }

    fn task_context(&self, task: &Task, workdir: &Path) -> Result<Value> {
        task.validate()?;
        let workdir = absolute_workdir(workdir)?;
        Ok(context! {
            workdir => workdir.display().to_string(),
            marker_path => workdir.join(COMPLETION_MARKER).display().to_string(),
            tools => self.tools.join(", "),
            title => task.title(),
            body => task.body(),
        })
    }

    fn build(&self, name: &str, ctx: &Value) -> Result<String> {
        let mut sections = ENGINE.render(name, ctx)?;
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        Ok(render_sections(&sections))
    }
}

/// Artifact paths handed to the agent must not depend on its cwd.
fn absolute_workdir(workdir: &Path) -> Result<PathBuf> {
    std::path::absolute(workdir)
        .with_context(|| format!("resolve workdir {}", workdir.display()))
}
