use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use openspec_core::{
    change::Change,
    config::Config,
    lane::STANDARD_LANE,
    quality::{QualityGateEvaluator, QualityGateResult},
};
use std::path::Path;

#[derive(Subcommand)]
pub enum GateSubcommand {
    /// Evaluate quality gates for a change and save the report
    Run {
        id: String,
        #[arg(long, default_value = STANDARD_LANE)]
        lane: String,
    },
    /// Show the latest saved quality report for a change
    Show { id: String },
}

pub fn run(root: &Path, subcmd: GateSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        GateSubcommand::Run { id, lane } => run_gates(root, &id, &lane, json),
        GateSubcommand::Show { id } => show(root, &id, json),
    }
}

fn run_gates(root: &Path, id: &str, lane_name: &str, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let registry = config
        .lane_registry()
        .context("invalid lane configuration")?;
    let lane = registry.get_lane(lane_name);
    let change = Change::locate(root, id).with_context(|| format!("change '{id}' not found"))?;

    let targets = config.guard.code_files(&change.manifest.affected_files);
    let result = QualityGateEvaluator::with_shell(config.quality.clone()).run_all(
        lane,
        &change.root,
        &targets,
    );
    let saved = result
        .save(&change.dir())
        .context("failed to save quality report")?;
    tracing::debug!(path = %saved.display(), "saved quality report");

    if json {
        print_json(&result)?;
    } else {
        print_result(&result);
    }

    if !result.passed() {
        anyhow::bail!("quality gate failed: {}", join_tools(&result));
    }
    Ok(())
}

fn show(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let change = Change::locate(root, id).with_context(|| format!("change '{id}' not found"))?;
    let Some(result) = QualityGateResult::load_latest(&change.dir())
        .context("failed to read quality report")?
    else {
        anyhow::bail!("no quality report for '{id}'; run 'openspec gate run {id}'");
    };
    if json {
        print_json(&result)
    } else {
        print_result(&result);
        Ok(())
    }
}

fn print_result(result: &QualityGateResult) {
    println!(
        "Quality gates ({} lane, {}):",
        result.lane,
        result.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if !result.enabled {
        println!("  disabled for this lane");
    } else {
        let rows = result
            .tools
            .iter()
            .map(|(tool, r)| vec![tool.to_string(), r.status.to_string(), r.message.clone()])
            .collect();
        print_table(&["TOOL", "STATUS", "DETAIL"], rows);
    }
    println!("Overall: {}", result.overall);
}

fn join_tools(result: &QualityGateResult) -> String {
    result
        .failing_tools()
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
