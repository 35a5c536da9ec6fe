// Entry point and high-level CLI flow.
//
// - load the activity sheet and sanitize it, printing diagnostics;
// - build the program rollup and the health-indicator rollup;
// - write the flat report, both templates, a CSV mirror and a JSON summary,
//   then print short previews.
use activity_report::config::{INDICATOR_ROLLUP_LAYOUT, PROGRAM_ROLLUP_LAYOUT};
use activity_report::export::{
    export_flat_report, export_template, flat_report_rows, TemplateBlock,
};
use activity_report::indicator::{aggregate_by_indicator, IndicatorOptions};
use activity_report::types::{AggregatedResult, IndicatorAggregatedResult, MonthSelection, RawRow};
use activity_report::util::format_int;
use activity_report::{
    aggregate_sanitized, loader, output, sanitize, validate, ReportError, Result, Taxonomy,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "activity_report",
    about = "Aggregate activity spreadsheets into program and indicator reports"
)]
struct Args {
    /// Activity spreadsheet (.xlsx, .xls, .xlsb, .ods or .csv).
    #[arg(long)]
    input: PathBuf,
    /// Months to include, e.g. `1-3,7`.
    #[arg(long, default_value = "1-12")]
    months: MonthSelection,
    /// Restrict the indicator view to one indicator id.
    #[arg(long)]
    indicator: Option<String>,
    /// Merge the program groups of every indicator.
    #[arg(long)]
    all_groupings: bool,
    /// JSON taxonomy replacing the built-in one.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
    /// Abort when the strict row validation fails.
    #[arg(long)]
    strict: bool,
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn period_label(months: &MonthSelection) -> String {
    let list: Vec<String> = months.months().map(|m| m.to_string()).collect();
    format!("Months: {}", list.join(", "))
}

/// Load, validate and sanitize the input, printing a short summary.
fn handle_load(args: &Args, taxonomy: &Taxonomy) -> Result<Vec<RawRow>> {
    let (rows, report) = loader::load_path(&args.input, &taxonomy.headers)?;
    println!(
        "Processing dataset... ({} rows loaded from '{}', {} blank rows skipped)",
        format_int(report.kept_rows),
        report.sheet_name,
        format_int(report.blank_rows)
    );

    let check = validate::validate_sheet(&rows, &report.columns, &taxonomy.headers);
    if let Some(err) = &check.error {
        if args.strict {
            return Err(ReportError::Processing(format!("validation failed: {}", err)));
        }
        println!("Note: {}", err);
    }
    Ok(rows)
}

fn write_outputs(
    out_dir: &Path,
    months: &MonthSelection,
    core: &AggregatedResult,
    indicator: &IndicatorAggregatedResult,
) -> Result<()> {
    std::fs::create_dir_all(out_dir)?;
    let period = period_label(months);

    let file1 = out_dir.join("report.xlsx");
    if export_flat_report(&file1, &core.tree, "Activity report") {
        println!("(Flat report exported to {})", file1.display());
    }

    let program_blocks = [TemplateBlock {
        heading: None,
        tree: &core.tree,
    }];
    let file2 = out_dir.join("template_program.xlsx");
    let title = "Programme activity";
    if export_template(&file2, &PROGRAM_ROLLUP_LAYOUT, title, &period, &program_blocks) {
        println!("(Programme template exported to {})", file2.display());
    }

    let indicator_blocks: Vec<TemplateBlock<'_>> = indicator
        .by_category
        .iter()
        .map(|(category, tree)| TemplateBlock {
            heading: Some(category.label().to_string()),
            tree,
        })
        .collect();
    let file3 = out_dir.join("template_indicator.xlsx");
    let title = "Health indicators";
    if export_template(&file3, &INDICATOR_ROLLUP_LAYOUT, title, &period, &indicator_blocks) {
        println!("(Indicator template exported to {})", file3.display());
    }

    let flat_rows = flat_report_rows(&core.tree)?;
    let file4 = out_dir.join("report.csv");
    if let Err(e) = output::write_csv(&file4, &flat_rows) {
        error!(error = %e, "write error");
    }

    let summary = output::build_summary(core, indicator);
    let file5 = out_dir.join("summary.json");
    if let Err(e) = output::write_json(&file5, &summary) {
        error!(error = %e, "write error");
    }

    println!("\nProgramme rollup ({})\n", period);
    output::preview_table_rows(&flat_rows, 12);
    println!("Health categories\n");
    output::preview_table_rows(&output::category_rows(indicator), 10);
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let taxonomy = match &args.config {
        Some(path) => Taxonomy::from_json_path(path)?,
        None => Taxonomy::builtin().clone(),
    };

    let raw = handle_load(&args, &taxonomy)?;
    let clean = sanitize::sanitize(&raw, &taxonomy.headers);
    if clean.incomplete_rows > 0 {
        println!(
            "Note: {} incomplete rows were skipped.",
            format_int(clean.incomplete_rows)
        );
    }
    let core = aggregate_sanitized(&clean, &args.months)?;
    for msg in &core.warnings {
        println!("Warning: {}", msg);
    }
    let options = IndicatorOptions {
        indicator_id: args.indicator.clone(),
        use_all_groupings: args.all_groupings,
    };
    let indicator = aggregate_by_indicator(&clean.rows, Some(&args.months), &options, &taxonomy)?;

    println!(
        "Totals: {} participants, {} actions",
        format_int(core.all_people),
        format_int(core.all_actions)
    );
    write_outputs(&args.out_dir, &args.months, &core, &indicator)
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_json);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
