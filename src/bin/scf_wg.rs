use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use scf_wealth_gap::aggregate::Transforms;
use scf_wealth_gap::app::{
    App, NoProgress, OvertimeResult, PlotResult, ProgressSink, SummaryOptions,
};
use scf_wealth_gap::chart::ChartOptions;
use scf_wealth_gap::config::{
    ConfigLoader, DEFAULT_OVERTIME_START, DEFAULT_OVERTIME_UNTIL, ResolvedConfig,
};
use scf_wealth_gap::domain::{FileType, Statistic, SurveyYear};
use scf_wealth_gap::error::ScfError;
use scf_wealth_gap::loader::{NET_WORTH, RACE};
use scf_wealth_gap::output::{JsonOutput, OutputMode};
use scf_wealth_gap::overtime::{OvertimeOptions, OvertimeTable};
use scf_wealth_gap::publish::{
    ChartPublisher, ChartStudioPublisher, HtmlPublisher, PublishOutcome,
};
use scf_wealth_gap::report::{ConsoleReport, ReportSink};
use scf_wealth_gap::scf::ScfHttpClient;
use scf_wealth_gap::store::Store;
use scf_wealth_gap::tui::{Operation, Tui};

#[derive(Parser)]
#[command(name = "scf-wg")]
#[command(about = "Survey of Consumer Finances downloads and the racial wealth gap over time")]
#[command(version, author)]
struct Cli {
    /// JSON config file (defaults to ./scf-wg.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print JSON instead of the terminal progress view
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download and extract every survey year in a range")]
    Fetch(FetchArgs),
    #[command(about = "Download and extract one survey year")]
    FetchYear(FetchYearArgs),
    #[command(about = "Weighted statistics by group for one extracted year")]
    Summary(SummaryArgs),
    #[command(about = "Share of households with zero or negative wealth across years")]
    Overtime(OvertimeArgs),
    #[command(about = "Chart an overtime CSV")]
    Plot(PlotArgs),
}

#[derive(Args)]
struct FetchArgs {
    #[arg(long)]
    start: Option<SurveyYear>,

    /// Last year is `until + 2`
    #[arg(long)]
    until: Option<SurveyYear>,

    #[arg(long = "filetype", value_enum)]
    filetypes: Vec<FileType>,
}

#[derive(Args)]
struct FetchYearArgs {
    year: SurveyYear,

    #[arg(long, value_enum, default_value_t = FileType::Summary)]
    filetype: FileType,
}

#[derive(Args)]
struct TransformArgs {
    /// Subtract vehicle value from net worth
    #[arg(long)]
    subtract_vehicles: bool,

    /// Report black and Hispanic households as one group
    #[arg(long)]
    group_black_hispanic: bool,
}

impl TransformArgs {
    fn transforms(&self) -> Transforms {
        Transforms::new(self.subtract_vehicles, self.group_black_hispanic)
    }
}

#[derive(Args)]
struct SummaryArgs {
    year: SurveyYear,

    #[arg(long = "var", default_value = NET_WORTH)]
    variable: String,

    #[arg(long = "by", default_value = RACE)]
    grouper: String,

    /// Return the weighted average instead of the non-positive share
    #[arg(long)]
    avg_worth: bool,

    #[command(flatten)]
    transforms: TransformArgs,
}

#[derive(Args)]
struct OvertimeArgs {
    #[arg(long)]
    start: Option<SurveyYear>,

    /// Exclusive upper bound
    #[arg(long)]
    until: Option<SurveyYear>,

    #[command(flatten)]
    transforms: TransformArgs,

    /// Also chart the result
    #[arg(long)]
    plot: bool,

    /// Upload the chart to Chart Studio (implies --plot)
    #[arg(long)]
    upload: bool,
}

#[derive(Args)]
struct PlotArgs {
    csv: PathBuf,

    /// Open the HTML chart in the browser
    #[arg(long)]
    open: bool,

    /// Upload the chart to Chart Studio
    #[arg(long)]
    upload: bool,
}

#[derive(Serialize)]
struct OvertimeRun {
    overtime: OvertimeResult,
    plot: Option<PlotResult>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<ScfError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ScfError) -> u8 {
    match error {
        ScfError::MissingConfig(_)
        | ScfError::ConfigRead(_)
        | ScfError::DataFileNotFound(_)
        | ScfError::InvalidYear(_)
        | ScfError::InvalidFileType(_)
        | ScfError::InvalidRange { .. }
        | ScfError::MissingCredentials => 2,
        ScfError::ScfHttp(_)
        | ScfError::ScfStatus { .. }
        | ScfError::ChartStudioHttp(_)
        | ScfError::ChartStudioStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = OutputMode::detect(cli.non_interactive);
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let store = Store::new(config.data_dir.clone())?;
    let client = ScfHttpClient::new(config.timeout)?;
    let app = App::new(store, client);

    match cli.command {
        Commands::Fetch(args) => run_fetch(args, app, config, output_mode),
        Commands::FetchYear(args) => run_fetch_year(args, app, output_mode),
        Commands::Summary(args) => run_summary(args, app, output_mode),
        Commands::Overtime(args) => run_overtime(args, app, config, output_mode),
        Commands::Plot(args) => run_plot(args, app, config, output_mode),
    }
}

/// Runs `work` with the sinks that belong to `mode`. JSON mode prints the
/// result; the other modes leave printing to the caller.
fn execute<R, F>(mode: OutputMode, operation: Operation, work: F) -> miette::Result<R>
where
    F: FnOnce(&dyn ProgressSink, &dyn ReportSink) -> Result<R, ScfError> + Send + 'static,
    R: Serialize + Send + 'static,
{
    match mode {
        OutputMode::Json => {
            let result = work(&JsonOutput, &JsonOutput)?;
            JsonOutput::print(&result).into_diagnostic()?;
            Ok(result)
        }
        OutputMode::Plain => Ok(work(&NoProgress, &ConsoleReport)?),
        OutputMode::Interactive => Tui::new(operation).run(work),
    }
}

fn run_fetch(
    args: FetchArgs,
    app: App<ScfHttpClient>,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let start = args.start.unwrap_or(config.start);
    let until = args.until.unwrap_or(config.until);
    let filetypes = if args.filetypes.is_empty() {
        config.filetypes
    } else {
        args.filetypes
    };
    let result = execute(output_mode, Operation::Fetch, move |sink, _| {
        app.scrape(start, until, &filetypes, sink)
    })?;
    if output_mode != OutputMode::Json {
        for (year, files) in &result.years {
            for (file_type, path) in files {
                println!("{year} {file_type}: {}", path.display());
            }
        }
    }
    Ok(())
}

fn run_fetch_year(
    args: FetchYearArgs,
    app: App<ScfHttpClient>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let FetchYearArgs { year, filetype } = args;
    let result = execute(output_mode, Operation::Fetch, move |sink, _| {
        app.fetch_year(year, filetype, sink)
    })?;
    if output_mode != OutputMode::Json {
        for path in &result.files {
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn run_summary(
    args: SummaryArgs,
    app: App<ScfHttpClient>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let options = SummaryOptions {
        variable: args.variable,
        grouper: args.grouper,
        statistic: if args.avg_worth {
            Statistic::WeightedAverage
        } else {
            Statistic::NonPositiveShare
        },
        transforms: args.transforms.transforms(),
    };
    let year = args.year;
    let result = execute(output_mode, Operation::Summary, move |sink, report| {
        app.summary(year, &options, report, sink)
    })?;
    if output_mode == OutputMode::Interactive {
        for entry in &result.values.entries {
            println!("{}: {}", entry.category, entry.value);
        }
    }
    Ok(())
}

fn run_overtime(
    args: OvertimeArgs,
    app: App<ScfHttpClient>,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let start = match args.start {
        Some(start) => start,
        None => SurveyYear::new(DEFAULT_OVERTIME_START)?,
    };
    let until = match args.until {
        Some(until) => until,
        None => SurveyYear::new(DEFAULT_OVERTIME_UNTIL)?,
    };
    let years = SurveyYear::range_exclusive(start, until);
    let options = OvertimeOptions {
        transforms: args.transforms.transforms(),
        ..OvertimeOptions::default()
    };
    let plot = args.plot || args.upload;
    let upload = args.upload;

    let result = execute(output_mode, Operation::Overtime, move |sink, report| {
        let overtime = app.overtime(&years, &options, &config.output_dir, report, sink)?;
        let plot = if plot {
            Some(publish_chart(&app, &overtime.table, &config, false, upload, sink)?)
        } else {
            None
        };
        Ok(OvertimeRun { overtime, plot })
    })?;
    if output_mode != OutputMode::Json {
        println!("{}", result.overtime.path.display());
        if let Some(plot) = &result.plot {
            print_outcomes(&plot.outcomes);
        }
    }
    Ok(())
}

fn run_plot(
    args: PlotArgs,
    app: App<ScfHttpClient>,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let table = OvertimeTable::read_csv(&args.csv)?;
    let result = execute(output_mode, Operation::Plot, move |sink, _| {
        publish_chart(&app, &table, &config, args.open, args.upload, sink)
    })?;
    if output_mode != OutputMode::Json {
        print_outcomes(&result.outcomes);
    }
    Ok(())
}

fn publish_chart(
    app: &App<ScfHttpClient>,
    table: &OvertimeTable,
    config: &ResolvedConfig,
    open: bool,
    upload: bool,
    sink: &dyn ProgressSink,
) -> Result<PlotResult, ScfError> {
    let options = ChartOptions {
        labels: config.labels.clone(),
        ..ChartOptions::default()
    };
    let html = HtmlPublisher::new(
        config.chart.html_path.as_std_path(),
        open || config.chart.open_browser,
    );
    let studio = if upload {
        Some(ChartStudioPublisher::new(
            config.chart.credentials.clone(),
            config.chart.filename.clone(),
            config.timeout,
        )?)
    } else {
        None
    };
    let mut publishers: Vec<&dyn ChartPublisher> = vec![&html];
    if let Some(studio) = &studio {
        publishers.push(studio);
    }
    app.plot(table, &options, &publishers, sink)
}

fn print_outcomes(outcomes: &[PublishOutcome]) {
    for outcome in outcomes {
        match outcome {
            PublishOutcome::Html { path, .. } => println!("{}", path.display()),
            PublishOutcome::ChartStudio { url } => println!("{url}"),
        }
    }
}
