use crate::lock::ChangeLock;
use crate::output::{first_line, print_json};
use anyhow::Context;
use clap::Args;
use openspec_core::{
    config::Config,
    lane::STANDARD_LANE,
    orchestrator::{GateReport, RunOptions, RunReport, WorkflowOrchestrator},
};
use std::path::Path;

#[derive(Args)]
pub struct RunArgs {
    /// Change id(s) (YYYY-MM-DD-<slug>)
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Lane: docs, standard, heavy, or a custom lane from config
    #[arg(long, default_value = STANDARD_LANE)]
    pub lane: String,

    /// Walk every stage without writing anything
    #[arg(long, visible_alias = "what-if")]
    pub dry_run: bool,

    /// Bypass the docs-lane guard; continue past a failing gate on a strict lane
    #[arg(long)]
    pub force: bool,

    /// Changes to run in parallel
    #[arg(long, default_value_t = 1)]
    pub jobs: usize,
}

pub fn run(root: &Path, args: RunArgs, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let orchestrator =
        WorkflowOrchestrator::new(root, &config).context("invalid lane configuration")?;
    if !orchestrator.lanes().contains(&args.lane) {
        tracing::warn!(lane = %args.lane, "unknown lane, using {STANDARD_LANE}");
    }

    let mut ids: Vec<String> = Vec::with_capacity(args.ids.len());
    for id in args.ids {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    // Locks are held until every run has finished.
    let _locks = if args.dry_run {
        Vec::new()
    } else {
        ids.iter()
            .map(|id| ChangeLock::acquire(root, id))
            .collect::<anyhow::Result<Vec<_>>>()?
    };

    let options = RunOptions {
        dry_run: args.dry_run,
        force: args.force,
    };
    let results = orchestrator.run_batch(&ids, &args.lane, options, args.jobs);

    let total = results.len();
    let incomplete = results
        .iter()
        .filter(|(_, r)| !matches!(r, Ok(report) if report.is_completed()))
        .count();

    if json {
        let values = results
            .iter()
            .map(|(id, r)| match r {
                Ok(report) => serde_json::to_value(report),
                Err(e) => Ok(serde_json::json!({ "change_id": id, "error": e.to_string() })),
            })
            .collect::<Result<Vec<_>, _>>()?;
        print_json(&values)?;
    } else {
        for (i, (id, result)) in results.iter().enumerate() {
            if i > 0 {
                println!();
            }
            match result {
                Ok(report) => print_report(report),
                Err(e) => eprintln!("error: {id}: {e}"),
            }
        }
    }

    if incomplete > 0 {
        anyhow::bail!("{incomplete} of {total} run(s) did not complete");
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!(
        "Change: {}  lane: {}{}",
        report.change_id,
        report.lane,
        if report.dry_run { "  (dry run)" } else { "" }
    );
    for stage in &report.skipped {
        println!("  skip  {stage}");
    }
    for outcome in &report.outcomes {
        let status = match (outcome.success, report.dry_run) {
            (true, true) => "plan",
            (true, false) => "ok",
            (false, _) => "FAIL",
        };
        println!(
            "  {status:<4}  {:<22}  {}",
            outcome.stage.to_string(),
            first_line(&outcome.output, 80)
        );
    }
    match &report.gate {
        Some(GateReport::WouldRun) => {
            println!("  gate  quality gates would run after implementation")
        }
        Some(GateReport::Evaluated { result, forced }) => {
            println!(
                "  gate  {}{}",
                result.overall,
                if *forced { " (forced)" } else { "" }
            );
            for (tool, tool_report) in &result.tools {
                println!(
                    "          {:<10} {:<4}  {}",
                    tool.as_str(),
                    tool_report.status.to_string(),
                    tool_report.message
                );
            }
        }
        None => {}
    }
    match (&report.halted_at, &report.halt_reason) {
        (Some(stage), Some(reason)) => {
            println!("Result: {} at {stage}: {reason}", report.state);
            if let Some(last) = report.last_completed {
                println!("Last completed: {last}");
            }
        }
        _ => println!("Result: {}", report.state),
    }
}
