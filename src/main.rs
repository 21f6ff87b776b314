use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use cbt_engine::RepairArgs;

#[tokio::main]
async fn main() -> Result<()> {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e:#}");
            eprintln!("usage: cbt-engine [--results PATH] [--exams PATH] [--dry-run]");
            std::process::exit(2);
        }
    };

    match cbt_engine::run_repair(args).await {
        Ok(report) => {
            println!("{report}");
            if let Some(rendered) = cbt_engine::core::metrics::render() {
                println!("{rendered}");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("cbt-engine fatal: {e:#}");
            std::process::exit(1);
        }
    }
}

fn parse_args() -> Result<RepairArgs> {
    let mut parsed = RepairArgs::default();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--results" => {
                let value = args.next().ok_or_else(|| anyhow!("--results missing value"))?;
                parsed.results_path = Some(PathBuf::from(value));
            }
            "--exams" => {
                let value = args.next().ok_or_else(|| anyhow!("--exams missing value"))?;
                parsed.exams_path = Some(PathBuf::from(value));
            }
            "--dry-run" => parsed.dry_run = true,
            _ => return Err(anyhow!("Unknown argument: {arg}")),
        }
    }

    Ok(parsed)
}
