use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use prism::alerts::{build_alert_payload, AlertPayload};
use prism::config::Config;
use prism::dashboard::build_dashboard_payload;
use prism::suggest::comment::{
    extract_alert_suggestions_from_comments, extract_dashboard_suggestions_from_comments,
    render_alert_comment, render_create_all_comment, render_dashboard_comment,
    render_inline_suggestion, CommentKind,
};
use prism::suggest::{
    extract_alert_suggestions, extract_batch, extract_dashboard_suggestions,
    extract_file_suggestions, extract_summary, AlertSuggestion, DashboardSuggestion,
};
use prism::translate::layout::{panels_from_values, queries_from_values};
use prism::translate::{
    reconcile_dashboard_layout, threshold_or_default, QueryTranslator, SourceDialect,
    TargetDialect,
};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "prism",
    about = "Extract review suggestions from model output and translate their queries",
    version
)]
struct Cli {
    /// Config file (defaults to $PRISM_CONFIG, then ./.prism.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract suggestions and print them as JSON
    Extract {
        what: ExtractKind,
        /// Read from a file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = InputFormat::Llm)]
        format: InputFormat,
    },
    /// Translate a query into the target dialect
    Translate {
        #[arg(long)]
        query: String,
        #[arg(long, conflicts_with = "threshold_text")]
        threshold: Option<f64>,
        /// Free-text threshold such as "> 5 per minute"
        #[arg(long)]
        threshold_text: Option<String>,
        /// Source dialect (detected from the query when omitted)
        #[arg(long)]
        dialect: Option<SourceDialect>,
        #[arg(long, default_value = "datadog")]
        target: TargetDialect,
    },
    /// Place dashboard panels on the grid
    Layout {
        /// JSON array of panels
        #[arg(long)]
        panels: PathBuf,
        /// JSON array of `{refId, expr}` queries
        #[arg(long)]
        queries: Option<PathBuf>,
    },
    /// Print the backend payload for every extracted alert
    RenderAlert {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = InputFormat::Llm)]
        format: InputFormat,
    },
    /// Print the backend payload for every extracted dashboard
    RenderDashboard {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = InputFormat::Llm)]
        format: InputFormat,
    },
    /// Print PR comment markdown for every extracted suggestion
    RenderComments {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, value_enum)]
        kind: RenderKind,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ExtractKind {
    Files,
    Alerts,
    Dashboards,
    Summary,
    All,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum InputFormat {
    /// Labeled blocks as the model writes them
    Llm,
    /// Markdown PR comments
    Comment,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RenderKind {
    Alerts,
    Dashboards,
    Files,
}

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let translator = QueryTranslator::new(config.defaults);

    match cli.command {
        Command::Extract { what, input, format } => {
            let text = read_input(input.as_deref())?;
            extract(what, format, &text)
        }
        Command::Translate {
            query,
            threshold,
            threshold_text,
            dialect,
            target,
        } => {
            let threshold = match (threshold, threshold_text) {
                (Some(value), _) => value,
                (None, Some(text)) => threshold_or_default(&text, translator.defaults().threshold),
                (None, None) => translator.defaults().threshold,
            };
            let source = dialect.unwrap_or_else(|| SourceDialect::detect(&query));
            println!("{}", translator.translate(&query, threshold, source, target));
            Ok(())
        }
        Command::Layout { panels, queries } => {
            let panels = panels_from_values(&read_json_array(&panels)?);
            let queries = match queries {
                Some(path) => queries_from_values(&read_json_array(&path)?),
                None => Vec::new(),
            };
            print_json(&reconcile_dashboard_layout(&panels, &queries, translator.defaults()))
        }
        Command::RenderAlert { input, format } => {
            let text = read_input(input.as_deref())?;
            render_alerts(&alerts_in(&text, format), &translator)
        }
        Command::RenderDashboard { input, format } => {
            let text = read_input(input.as_deref())?;
            let mut payloads = Vec::new();
            for dashboard in dashboards_in(&text, format) {
                let payload = build_dashboard_payload(&dashboard, &translator)
                    .with_context(|| format!("Failed to build dashboard '{}'", dashboard.name))?;
                payloads.push(payload);
            }
            print_json(&payloads)
        }
        Command::RenderComments { input, kind } => {
            let text = read_input(input.as_deref())?;
            render_comments(kind, &text);
            Ok(())
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn extract(what: ExtractKind, format: InputFormat, text: &str) -> Result<()> {
    match (what, format) {
        (ExtractKind::Alerts, _) => print_json(&alerts_in(text, format)),
        (ExtractKind::Dashboards, _) => print_json(&dashboards_in(text, format)),
        (ExtractKind::Files, InputFormat::Llm) => print_json(&extract_file_suggestions(text)),
        (ExtractKind::Summary, InputFormat::Llm) => print_json(&extract_summary(text)),
        (ExtractKind::All, InputFormat::Llm) => print_json(&extract_batch(text)),
        (other, InputFormat::Comment) => {
            bail!("{:?} can only be extracted from model output (--format llm)", other)
        }
    }
}

fn alerts_in(text: &str, format: InputFormat) -> Vec<AlertSuggestion> {
    match format {
        InputFormat::Llm => extract_alert_suggestions(text),
        InputFormat::Comment => extract_alert_suggestions_from_comments(text),
    }
}

fn dashboards_in(text: &str, format: InputFormat) -> Vec<DashboardSuggestion> {
    match format {
        InputFormat::Llm => extract_dashboard_suggestions(text),
        InputFormat::Comment => extract_dashboard_suggestions_from_comments(text),
    }
}

/// Prometheus rules print as YAML, monitors as JSON. Alerts with an
/// unsupported type are reported and skipped.
fn render_alerts(alerts: &[AlertSuggestion], translator: &QueryTranslator) -> Result<()> {
    for alert in alerts {
        match build_alert_payload(alert, translator) {
            Ok(AlertPayload::Prometheus(rule)) => print!("{}", rule),
            Ok(AlertPayload::Datadog(monitor)) => print_json(&monitor)?,
            Err(err) => warn!(alert = %alert.name, error = %err, "skipping alert"),
        }
    }
    info!(count = alerts.len(), "rendered alerts");
    Ok(())
}

fn render_comments(kind: RenderKind, text: &str) {
    let batch = extract_batch(text);
    let comments: Vec<String> = match kind {
        RenderKind::Alerts => batch.alerts.iter().map(render_alert_comment).collect(),
        RenderKind::Dashboards => batch.dashboards.iter().map(render_dashboard_comment).collect(),
        RenderKind::Files => batch.files.iter().map(render_inline_suggestion).collect(),
    };
    for comment in &comments {
        println!("{}", comment);
    }

    let create_all = match kind {
        RenderKind::Alerts => Some(CommentKind::Alert),
        RenderKind::Dashboards => Some(CommentKind::Dashboard),
        RenderKind::Files => None,
    };
    if let Some(kind) = create_all.filter(|_| comments.len() > 1) {
        println!("{}", render_create_all_comment(kind));
    }
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn read_json_array(path: &Path) -> Result<Vec<Value>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", rendered);
    Ok(())
}
