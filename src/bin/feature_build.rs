use std::path::PathBuf;

use churnflow::{
    init_logging, log_app_start, logging_config_from_env, run_pipeline, PipelineConfig,
};

const USAGE: &str =
    "usage: feature_build [--input PATH] [--output PATH] [--manifest PATH] [--horizon-days N]";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging = logging_config_from_env();
    init_logging(&logging)?;
    log_app_start(&logging);

    let cfg = parse_args(std::env::args().skip(1))?;
    let manifest = run_pipeline(&cfg)?;

    println!("\nFEATURE ENGINEERING SUMMARY");
    println!("----------------------------------------");
    println!("Customers: {}", manifest.total_customers);
    println!("Features: {}", manifest.total_features);
    println!("Churn rate: {:.2} %", manifest.churn_rate * 100.0);
    println!("Training cutoff: {}", manifest.training_cutoff);
    println!("Observation end: {}", manifest.observation_end);
    println!("----------------------------------------");

    Ok(())
}

fn parse_args(
    args: impl Iterator<Item = String>,
) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut cfg = PipelineConfig::default();
    let mut args = args.into_iter();

    while let Some(flag) = args.next() {
        match flag.as_str() {
            "--input" => cfg.input_path = PathBuf::from(required_value(&mut args, "--input")?),
            "--output" => {
                cfg.feature_table_path = PathBuf::from(required_value(&mut args, "--output")?)
            }
            "--manifest" => {
                cfg.manifest_path = PathBuf::from(required_value(&mut args, "--manifest")?)
            }
            "--horizon-days" => {
                cfg.horizon_days = required_value(&mut args, "--horizon-days")?.parse()?
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => return Err(format!("unknown flag '{other}'\n{USAGE}").into()),
        }
    }

    Ok(cfg)
}

fn required_value(
    args: &mut impl Iterator<Item = String>,
    flag: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    args.next()
        .ok_or_else(|| format!("{flag} requires a value\n{USAGE}").into())
}
