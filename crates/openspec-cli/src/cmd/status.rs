use crate::output::print_json;
use anyhow::Context;
use openspec_core::{change::Change, run::WorkflowRun, todo::TodoList, types::Stage};
use std::path::Path;

pub fn run(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let change = Change::locate(root, id).with_context(|| format!("change '{id}' not found"))?;
    let todo = TodoList::load_or_empty(&change.todo_path())
        .with_context(|| format!("failed to read todo for '{id}'"))?;
    let completed = todo.completed();
    let next = Stage::all()
        .iter()
        .copied()
        .find(|s| !completed.contains(&s.id()));
    let last_run = WorkflowRun::load(&change.dir())
        .with_context(|| format!("failed to read status for '{id}'"))?;

    if json {
        print_json(&serde_json::json!({
            "change_id": change.id(),
            "location": change.location,
            "completed_stages": completed,
            "next_stage": next,
            "last_run": last_run,
        }))?;
        return Ok(());
    }

    println!("Change:   {}", change.id());
    println!("Progress: {}/{} stages", completed.len(), Stage::all().len());
    match next {
        Some(stage) => println!("Next:     {stage}"),
        None => println!("Next:     (all stages complete)"),
    }

    match last_run {
        None => println!("Last run: never"),
        Some(run) => {
            println!(
                "Last run: {} on lane {} ({})",
                run.state,
                run.lane,
                run.start_time.format("%Y-%m-%d %H:%M:%S")
            );
            if let (Some(stage), Some(reason)) = (run.current_stage, &run.halt_reason) {
                println!("Halted:   {stage}: {reason}");
            }
        }
    }
    Ok(())
}
