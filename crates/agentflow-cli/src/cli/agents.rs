//! `agentflow agents`: list registered agent types.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};

use crate::state::AppState;

pub fn list_agents(state: &AppState, json: bool) -> Result<()> {
    let agents = state.service.list_agents();

    if json {
        println!("{}", serde_json::to_string_pretty(&agents)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Agent").fg(Color::Cyan),
            Cell::new("Description"),
        ]);
    for agent in &agents {
        table.add_row(vec![
            Cell::new(&agent.agent_type),
            Cell::new(&agent.description),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}
