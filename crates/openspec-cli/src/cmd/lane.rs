use crate::output::{print_json, print_table};
use clap::Subcommand;
use openspec_core::lane::Lane;
use std::path::Path;

#[derive(Subcommand)]
pub enum LaneSubcommand {
    /// List built-in and custom lanes
    List,
    /// Show the stages and policy of one lane
    Show { name: String },
}

pub fn run(root: &Path, subcmd: LaneSubcommand, json: bool) -> anyhow::Result<()> {
    let registry = super::load_lanes(root)?;
    match subcmd {
        LaneSubcommand::List => {
            let lanes: Vec<&Lane> = registry.lanes().collect();
            if json {
                return print_json(&lanes);
            }
            let rows = lanes
                .iter()
                .map(|l| {
                    vec![
                        l.name.clone(),
                        l.stage_ids
                            .iter()
                            .map(|id| id.to_string())
                            .collect::<Vec<_>>()
                            .join(","),
                        gates_label(l).to_string(),
                        format!("{}m", l.max_duration.as_secs() / 60),
                        l.description.clone(),
                    ]
                })
                .collect();
            print_table(&["LANE", "STAGES", "GATES", "BUDGET", "DESCRIPTION"], rows);
            Ok(())
        }
        LaneSubcommand::Show { name } => {
            if !registry.contains(&name) {
                anyhow::bail!("unknown lane '{name}'");
            }
            let lane = registry.get_lane(&name);
            if json {
                return print_json(lane);
            }
            println!("Lane:    {} ({})", lane.name, lane.display_name);
            println!("About:   {}", lane.description);
            println!("Gates:   {}", gates_label(lane));
            println!("Budget:  {} minutes", lane.max_duration.as_secs() / 60);
            println!("\nStages:");
            for stage in lane.stages() {
                println!("  {stage}");
            }
            Ok(())
        }
    }
}

fn gates_label(lane: &Lane) -> &'static str {
    match (lane.quality_gates_enabled, lane.strict_thresholds) {
        (false, _) => "off",
        (true, false) => "standard",
        (true, true) => "strict",
    }
}
