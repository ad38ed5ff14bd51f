//! Command handlers for CLI subcommands
//!
//! This module contains the implementation logic for each CLI subcommand.

mod completions;
mod config;
mod utils;

pub use completions::handle_completions;
pub use config::handle_config;

use crate::cli::{MapArgs, PlanArgs};
use crate::config::{Config, FileFormat};
use crate::error::{Error, Result};
use crate::output::OutputWriter;
use shapemap_core::{Engine, Record};
use std::fs;
use utils::{read_json_input, record_mapping};

/// Handle the map command
pub fn handle_map(args: MapArgs, config: &Config, output: &mut OutputWriter) -> Result<()> {
    let engine = Engine::builder().config(config.mapper.clone()).build()?;
    let mapping = record_mapping(&engine, &args.mapping)?;

    let input = read_json_input(&args.input)?;
    let (items, single) = match input {
        serde_json::Value::Array(items) => (items, false),
        object @ serde_json::Value::Object(_) => (vec![object], true),
        _ => {
            return Err(Error::InvalidFormat {
                path: args.input.clone(),
                expected: "a JSON object or an array of objects".to_string(),
            })
        }
    };

    output.info(&format!(
        "Mapping {} record(s) from {} to {}",
        items.len(),
        args.mapping.from,
        args.mapping.to
    ))?;

    let progress = if single {
        None
    } else {
        output.progress_bar(items.len() as u64, "mapping")
    };

    let mut results = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let record = Record::from_json(mapping.source.clone(), item).map_err(|e| Error::InvalidRecord {
            index,
            message: e.to_string(),
        })?;
        let mapped = mapping.mapper.transform(&record)?;
        results.push(mapped.to_json());
        if let Some(pb) = &progress {
            pb.inc(1);
        }
    }
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    tracing::info!(
        records = results.len(),
        tier = %mapping.mapper.active_tier(),
        "Mapped records"
    );

    let mapped = match (single, results.pop()) {
        (true, Some(only)) => only,
        (_, last) => {
            results.extend(last);
            serde_json::Value::Array(results)
        }
    };

    match args.save_to {
        Some(path) => {
            let content = match FileFormat::from_path(&path) {
                FileFormat::Yaml => serde_yaml::to_string(&mapped)?,
                _ => serde_json::to_string_pretty(&mapped)?,
            };
            fs::write(&path, content)?;
            output.success(&format!("✓ Saved mapped records to {}", path.display()))
        }
        None => output.data(&mapped),
    }
}

/// Handle the plan command
pub fn handle_plan(args: PlanArgs, config: &Config, output: &mut OutputWriter) -> Result<()> {
    let engine = Engine::builder().config(config.mapper.clone()).build()?;
    let mapping = record_mapping(&engine, &args.mapping)?;
    output.plan(&mapping.mapper.plan().summary())
}
