//! Praeparo CLI - Render YAML visuals through DAX
//!
//! Usage:
//!   praeparo render <visual.yaml> [--out <html>] [--png-out <png>] [--print-dax]
//!   praeparo dax <visual.yaml> [--param KEY=VALUE]...
//!   praeparo validate <visual.yaml>
//!
//! Examples:
//!   praeparo render visuals/sales.yaml --provider mock
//!   praeparo render visuals/sales.yaml --data-source finance --png-out build/sales.png
//!   praeparo dax visuals/sales.yaml --param region=EMEA

use clap::{Args, Parser, Subcommand};
use praeparo::config::Settings;
use praeparo::dax::compile_visual;
use praeparo::loader::LoadedVisual;
use praeparo::model::Visual;
use praeparo::pipeline::{
    ExecutionContext, OutputTarget, Pipeline, PipelineOptions, PlannerProvider,
    VisualExecutionResult,
};
use praeparo::VisualLoader;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "praeparo")]
#[command(about = "Praeparo - Declarative matrix visuals compiled to DAX")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a visual and write its outputs
    Render {
        #[command(flatten)]
        visual: VisualArgs,

        /// HTML output path (defaults to <project>/build/<name>.html)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Also write a PNG to this path
        #[arg(long)]
        png_out: Option<PathBuf>,

        /// Datasource name or path overriding the visual's own
        #[arg(long)]
        data_source: Option<String>,

        /// Execute against this dataset, bypassing datasource lookup
        #[arg(long)]
        dataset_id: Option<String>,

        /// Workspace containing the dataset
        #[arg(long)]
        workspace_id: Option<String>,

        /// Data provider key (e.g. `mock`)
        #[arg(long)]
        provider: Option<String>,

        /// Print the compiled DAX statements
        #[arg(long)]
        print_dax: bool,
    },

    /// Compile a visual to DAX without executing it
    Dax {
        #[command(flatten)]
        visual: VisualArgs,
    },

    /// Load and validate a visual without executing it
    Validate {
        #[command(flatten)]
        visual: VisualArgs,
    },
}

#[derive(Args)]
struct VisualArgs {
    /// Path to the visual YAML document
    config: PathBuf,

    /// Parameter override (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    params: Vec<(String, String)>,
}

impl VisualArgs {
    fn load(&self) -> Result<LoadedVisual, ExitCode> {
        let parameters: Map<String, Value> = self
            .params
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();

        VisualLoader::new()
            .load_with_parameters(&self.config, &parameters)
            .map_err(|e| {
                eprintln!("Error loading '{}': {}", self.config.display(), e);
                ExitCode::FAILURE
            })
    }
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("parameter name is empty in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Render {
            visual,
            out,
            png_out,
            data_source,
            dataset_id,
            workspace_id,
            provider,
            print_dax,
        } => cmd_render(RenderRequest {
            visual,
            out,
            png_out,
            data_source,
            dataset_id,
            workspace_id,
            provider,
            print_dax,
        }),
        Commands::Dax { visual } => cmd_dax(visual),
        Commands::Validate { visual } => cmd_validate(visual),
    };

    result.unwrap_or_else(|code| code)
}

struct RenderRequest {
    visual: VisualArgs,
    out: Option<PathBuf>,
    png_out: Option<PathBuf>,
    data_source: Option<String>,
    dataset_id: Option<String>,
    workspace_id: Option<String>,
    provider: Option<String>,
    print_dax: bool,
}

fn cmd_render(request: RenderRequest) -> Result<ExitCode, ExitCode> {
    let settings = Settings::load().map_err(|e| {
        eprintln!("Error loading settings: {}", e);
        ExitCode::FAILURE
    })?;
    let default_datasource = settings.default_datasource().map_err(|e| {
        eprintln!("Error loading settings: {}", e);
        ExitCode::FAILURE
    })?;

    let loaded = request.visual.load()?;
    let project_root = project_root(&loaded.source);
    let case_key = file_stem(&loaded.source);

    let mut options = PipelineOptions::from_settings(&settings.pipeline);
    options.print_dax = request.print_dax;
    options.data.datasource_override = request.data_source;
    options.data.default_datasource = default_datasource;
    options.data.dataset_id = request.dataset_id;
    options.data.workspace_id = request.workspace_id;
    options.data.provider_key = request.provider;

    let html = request
        .out
        .unwrap_or_else(|| project_root.join("build").join(format!("{case_key}.html")));
    options.outputs.push(OutputTarget::html(html));
    if let Some(png) = request.png_out {
        options.outputs.push(OutputTarget::png(png, None));
    }

    let context = ExecutionContext {
        project_root: Some(project_root),
        ..ExecutionContext::new(&loaded.source, options)
    };

    let pipeline = Pipeline::with_planners(PlannerProvider::from_settings(&settings));
    let result = match pipeline.execute(&loaded.visual, &context) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Execution failed at {}: {}", e.stage(), e);
            return Err(ExitCode::FAILURE);
        }
    };

    if context.options.print_dax {
        println!("{}", dax_listing(&result));
    }

    for failure in &result.output_failures {
        eprintln!("Output error: {}", failure);
    }

    if !result.outputs.is_empty() {
        let paths: Vec<String> = result
            .outputs
            .iter()
            .map(|artifact| artifact.path.display().to_string())
            .collect();
        println!(
            "Wrote {} visualization to {}",
            result.visual.visual_type(),
            paths.join(", ")
        );
    }

    if result.has_output_failures() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn cmd_dax(args: VisualArgs) -> Result<ExitCode, ExitCode> {
    let loaded = args.load()?;

    let statements = match &loaded.visual {
        Visual::Matrix(matrix) => compile_visual(matrix).map(|plan| vec![(None, plan.statement)]),
        Visual::Frame(frame) => frame
            .children()
            .iter()
            .enumerate()
            .filter_map(|(index, child)| {
                let matrix = child.visual().as_matrix()?;
                let heading = matrix
                    .title()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Child {}", index + 1));
                Some(compile_visual(matrix).map(|plan| (Some(heading), plan.statement)))
            })
            .collect(),
    };

    match statements {
        Ok(statements) => {
            let rendered: Vec<String> = statements
                .into_iter()
                .map(|(heading, statement)| match heading {
                    Some(heading) => format!("-- {heading}\n{statement}"),
                    None => statement,
                })
                .collect();
            println!("{}", rendered.join("\n\n"));
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("Compilation error: {}", e);
            Err(ExitCode::FAILURE)
        }
    }
}

fn cmd_validate(args: VisualArgs) -> Result<ExitCode, ExitCode> {
    let loaded = args.load()?;

    let detail = match &loaded.visual {
        Visual::Matrix(matrix) => format!(
            "matrix, {} rows, {} values",
            matrix.rows().len(),
            matrix.values().len()
        ),
        Visual::Frame(frame) => format!("frame, {} children", frame.children().len()),
    };
    println!("OK: {} is valid ({})", loaded.source.display(), detail);
    Ok(ExitCode::SUCCESS)
}

/// DAX printed by `render --print-dax`.
fn dax_listing(result: &VisualExecutionResult) -> String {
    if result.children.is_empty() {
        return result
            .plans
            .iter()
            .map(|plan| plan.statement.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
    }

    result
        .children
        .iter()
        .enumerate()
        .map(|(index, child)| {
            let heading = child
                .visual
                .title()
                .map(str::to_string)
                .unwrap_or_else(|| format!("Child {}", index + 1));
            format!("-- {heading}\n{}", dax_listing(child))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("visual")
        .to_string()
}

/// Nearest ancestor that is, or contains, a `visuals` directory.
fn project_root(config: &Path) -> PathBuf {
    let start = config.parent().unwrap_or(config);
    for ancestor in start.ancestors() {
        if ancestor.file_name().is_some_and(|name| name == "visuals") {
            if let Some(parent) = ancestor.parent() {
                return parent.to_path_buf();
            }
        }
        if ancestor.join("visuals").is_dir() {
            return ancestor.to_path_buf();
        }
    }
    start.to_path_buf()
}
