use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use openspec_core::{
    change::Change,
    config::Config,
    run::WorkflowRun,
    todo::TodoList,
    types::{ArtifactKind, Stage, STAGE_COUNT},
};
use std::path::Path;

#[derive(Subcommand)]
pub enum ChangeSubcommand {
    /// Scaffold a new change (YYYY-MM-DD-<slug>) with its todo checklist
    Create {
        slug: String,
        #[arg(long)]
        title: Option<String>,
        /// One-line motivation, used as the proposal's "Why"
        #[arg(long)]
        description: Option<String>,
        /// File the change touches (repeatable)
        #[arg(long = "affected", value_name = "FILE")]
        affected: Vec<String>,
    },
    /// List active and archived changes
    List,
    /// Show a change's manifest, checklist and artifacts
    Show { id: String },
}

pub fn run(root: &Path, subcmd: ChangeSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ChangeSubcommand::Create {
            slug,
            title,
            description,
            affected,
        } => create(root, &slug, title, description, affected, json),
        ChangeSubcommand::List => list(root, json),
        ChangeSubcommand::Show { id } => show(root, &id, json),
    }
}

fn create(
    root: &Path,
    slug: &str,
    title: Option<String>,
    description: Option<String>,
    affected: Vec<String>,
    json: bool,
) -> anyhow::Result<()> {
    Config::load(root).context("failed to load config")?;
    let title = title.unwrap_or_else(|| slug.replace('-', " "));
    let today = chrono::Local::now().date_naive();
    let change = Change::create(root, today, slug, &title, description, affected)
        .with_context(|| format!("failed to create change '{slug}'"))?;

    if json {
        print_json(&change.manifest)?;
    } else {
        println!("Created change: {} ({title})", change.id());
        println!("Next: openspec run {} --lane standard", change.id());
    }
    Ok(())
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let changes = Change::list(root).context("failed to list changes")?;

    let mut summaries = Vec::with_capacity(changes.len());
    for change in &changes {
        let todo = TodoList::load_or_empty(&change.todo_path())
            .with_context(|| format!("failed to read todo for '{}'", change.id()))?;
        summaries.push((change, todo.completed().len()));
    }

    if json {
        let values: Vec<_> = summaries
            .iter()
            .map(|(c, done)| {
                serde_json::json!({
                    "id": c.id(),
                    "title": c.manifest.title,
                    "location": c.location,
                    "completed_stages": done,
                })
            })
            .collect();
        print_json(&values)?;
        return Ok(());
    }

    if summaries.is_empty() {
        println!("No changes yet.");
        return Ok(());
    }

    let rows = summaries
        .iter()
        .map(|(c, done)| {
            vec![
                c.id().to_string(),
                if c.is_archived() { "archived" } else { "active" }.to_string(),
                format!("{done}/{STAGE_COUNT}"),
                c.manifest.title.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "STATUS", "PROGRESS", "TITLE"], rows);
    Ok(())
}

fn show(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let change = Change::locate(root, id).with_context(|| format!("change '{id}' not found"))?;
    let todo = TodoList::load_or_empty(&change.todo_path())?;
    let completed = todo.completed();
    let artifacts: Vec<ArtifactKind> = ArtifactKind::all()
        .iter()
        .copied()
        .filter(|k| change.artifact_path(*k).exists())
        .collect();

    if json {
        print_json(&serde_json::json!({
            "manifest": change.manifest,
            "location": change.location,
            "dir": change.dir(),
            "completed_stages": completed,
            "artifacts": artifacts,
            "last_run": WorkflowRun::load(&change.dir())?,
        }))?;
        return Ok(());
    }

    println!("Change:   {} ({})", change.id(), change.manifest.title);
    if let Some(desc) = &change.manifest.description {
        println!("Desc:     {desc}");
    }
    println!(
        "Location: {}",
        if change.is_archived() { "archived" } else { "active" }
    );
    println!("Created:  {}", change.manifest.created_at.format("%Y-%m-%d %H:%M"));
    if !change.manifest.affected_files.is_empty() {
        println!("Affects:  {}", change.manifest.affected_files.join(", "));
    }

    println!("\nStages:");
    for stage in Stage::all() {
        let mark = if completed.contains(&stage.id()) { "x" } else { " " };
        println!("  [{mark}] {stage}");
    }

    if !artifacts.is_empty() {
        println!("\nArtifacts:");
        for kind in artifacts {
            println!("  {}", kind.filename());
        }
    }
    Ok(())
}
