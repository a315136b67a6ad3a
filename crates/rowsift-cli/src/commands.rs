use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use rowsift_common::FilterSortConfig;
use rowsift_engine::{ClientConfig, EvaluatorClient, FilterPipeline, PassSummary};
use rowsift_sandbox::ThreadSandbox;
use rowsift_table::RowId;
use rowsift_cli::input::{load_config, load_document, resolve_config};
use rowsift_cli::settings::SettingsStore;
use serde::Serialize;
use tracing::info;

use crate::cli::{ConfigCommand, DiagnoseArgs, InputArgs, RunArgs};

fn prepare(input: &InputArgs) -> Result<(FilterPipeline<EvaluatorClient>, FilterSortConfig)> {
    let doc = load_document(&input.docs)?;
    let config = resolve_config(input.config.as_deref(), input.origin.as_deref(), &input.settings)?;
    let client = EvaluatorClient::with_config(
        ThreadSandbox::default(),
        ClientConfig {
            timeout: Duration::from_millis(input.timeout_ms),
        },
    );
    client.connect().context("failed to start the expression sandbox")?;
    Ok((FilterPipeline::new(client, doc), config))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

pub async fn run(args: &RunArgs) -> Result<()> {
    let (pipeline, config) = prepare(&args.input)?;
    let summary = pipeline.run_filter_pass(&config).await;
    report_summary(&summary, args.input.json)?;

    if args.summary_only {
        return Ok(());
    }
    let doc = pipeline.document().await;
    let rendered = serde_json::to_string_pretty(&*doc).context("failed to encode document")?;
    match &args.output {
        Some(path) => {
            fs::write(path, rendered + "\n")
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "document written");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn report_summary(summary: &PassSummary, json: bool) -> Result<()> {
    if json {
        return print_json(summary);
    }
    eprintln!("{summary}");
    Ok(())
}

pub async fn preview(input: &InputArgs) -> Result<()> {
    let (pipeline, config) = prepare(input)?;
    let info = pipeline.table_info(&config).await;
    let variables = pipeline.preview_variables(&config).await;
    let rows = pipeline.preview_filter(&config).await;

    if input.json {
        return print_json(&serde_json::json!({
            "tables": info,
            "variables": variables,
            "rows": rows,
        }));
    }
    println!("Total rows: {info}");
    println!("Variables:");
    for var in &variables {
        println!("  {var}");
    }
    println!("Filter preview:");
    for row in &rows {
        println!("  {row}");
    }
    Ok(())
}

pub async fn info(input: &InputArgs) -> Result<()> {
    let (pipeline, config) = prepare(input)?;
    let info = pipeline.table_info(&config).await;
    if input.json {
        return print_json(&info);
    }
    println!("{info}");
    Ok(())
}

pub async fn diagnose(args: &DiagnoseArgs) -> Result<()> {
    let (pipeline, config) = prepare(&args.input)?;
    let summary = pipeline.run_filter_pass(&config).await;
    report_summary(&summary, false)?;

    let rows: Vec<RowId> = if args.rows.is_empty() {
        let doc = pipeline.document().await;
        doc.tables()
            .iter()
            .filter(|t| !t.is_derived())
            .flat_map(|t| t.row_ids())
            .collect()
    } else {
        args.rows.iter().copied().map(RowId::new).collect()
    };

    let mut reports = Vec::with_capacity(rows.len());
    for row in rows {
        reports.push(pipeline.row_diagnostics(row).await);
    }
    if args.input.json {
        return print_json(&reports);
    }
    for report in &reports {
        println!("{report}");
    }
    Ok(())
}

pub fn config(command: &ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Default => {
            println!("{}", FilterSortConfig::default().to_json_pretty()?);
        }
        ConfigCommand::Schema => print_json(&FilterSortConfig::json_schema())?,
        ConfigCommand::Validate { file } => {
            let config = load_config(file)?;
            let issues = config.validate();
            if issues.is_empty() {
                println!("{}: ok", file.display());
            } else {
                for issue in &issues {
                    println!("{}: {issue}", file.display());
                }
            }
        }
        ConfigCommand::Export {
            origin,
            settings,
            out,
        } => {
            let store = SettingsStore::open(settings)?;
            let rendered = store.load(origin).to_json_pretty()?;
            match out {
                Some(path) => write_file(path, &rendered)?,
                None => println!("{rendered}"),
            }
        }
        ConfigCommand::Import {
            file,
            origin,
            settings,
        } => {
            let config = load_config(file)?;
            let mut store = SettingsStore::open(settings)?;
            store.save(origin, &config)?;
            eprintln!("saved configuration for {origin}");
        }
        ConfigCommand::Reset { origin, settings } => {
            let mut store = SettingsStore::open(settings)?;
            if !store.remove(origin)? {
                bail!("no configuration saved for {origin}");
            }
            eprintln!("removed configuration for {origin}");
        }
    }
    Ok(())
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, format!("{contents}\n"))
        .with_context(|| format!("failed to write {}", path.display()))
}
