//! Batch progress messages rendered from embedded Tera templates.

use anyhow::{Context, Result};
use tera::{Context as TeraContext, Tera};

const TEMPLATES: &[(&str, &str)] = &[
    ("total", include_str!("templates/total.tera")),
    ("phase", include_str!("templates/phase.tera")),
    ("current", include_str!("templates/current.tera")),
    ("complete", include_str!("templates/complete.tera")),
    ("done", include_str!("templates/done.tera")),
];

pub struct Progress {
    tera: Tera,
}

impl Progress {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.iter().copied())
            .context("failed to load progress templates")?;
        Ok(Self { tera })
    }

    pub fn total(&self, total: u64) -> Result<String> {
        let mut ctx = TeraContext::new();
        ctx.insert("total", &total);
        self.render("total", &ctx)
    }

    pub fn phase(&self, phase: u8) -> Result<String> {
        let mut ctx = TeraContext::new();
        ctx.insert("phase", &phase);
        self.render("phase", &ctx)
    }

    pub fn current(&self, batch: u64, from: u64, to: u64) -> Result<String> {
        self.render("current", &batch_context(batch, from, to))
    }

    pub fn complete(&self, batch: u64, from: u64, to: u64) -> Result<String> {
        self.render("complete", &batch_context(batch, from, to))
    }

    pub fn done(&self, job: &str, steps: u64, tally: &str) -> Result<String> {
        let mut ctx = TeraContext::new();
        ctx.insert("job", job);
        ctx.insert("steps", &steps);
        ctx.insert("tally", tally);
        self.render("done", &ctx)
    }

    fn render(&self, name: &str, ctx: &TeraContext) -> Result<String> {
        let rendered = self
            .tera
            .render(name, ctx)
            .with_context(|| format!("failed to render '{name}' progress message"))?;
        Ok(rendered.trim_end().to_string())
    }
}

fn batch_context(batch: u64, from: u64, to: u64) -> TeraContext {
    let mut ctx = TeraContext::new();
    ctx.insert("batch", &batch);
    ctx.insert("from", &from);
    ctx.insert("to", &to);
    ctx
}

/// 1-based batch number of the page starting at `from`.
pub fn batch_number(from: u64, step_size: u64) -> u64 {
    if step_size == 0 {
        1
    } else {
        from / step_size + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_lines_match_the_familiar_wording() {
        let progress = Progress::new().unwrap();
        assert_eq!(
            progress.current(2, 25, 50).unwrap(),
            "Processing batch 2 of group members 25 to 50"
        );
        assert_eq!(
            progress.complete(2, 25, 50).unwrap(),
            "Processing batch 2 of group members 25 to 50 complete"
        );
        assert_eq!(progress.total(120).unwrap(), "Group members to sync: 120");
    }

    #[test]
    fn phase_and_done_lines() {
        let progress = Progress::new().unwrap();
        assert_eq!(progress.phase(0).unwrap(), "Phase 0: adding missing members");
        assert_eq!(progress.phase(1).unwrap(), "Phase 1: removing stale members");
        assert_eq!(
            progress.done("manual_crm_to_platform", 1, "0 added").unwrap(),
            "All done! manual_crm_to_platform finished after 1 step: 0 added"
        );
        assert!(progress
            .done("manual_crm_to_platform", 3, "0 added")
            .unwrap()
            .contains("after 3 steps"));
    }

    #[test]
    fn batch_numbers_count_pages_from_one() {
        assert_eq!(batch_number(0, 25), 1);
        assert_eq!(batch_number(50, 25), 3);
        assert_eq!(batch_number(0, 0), 1);
    }
}
