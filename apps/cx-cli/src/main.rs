use clap::{Args, Parser, Subcommand};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cx_app::{
    AppError, AppResult, ModelSummary, RunOptions, RunProgressEvent, RunRequest, RunStage, query,
    run_service, sweep,
};
use cx_core::Tolerances;
use cx_sim::RunConfiguration;
use cx_solver::SolverRegistry;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cellex")]
#[command(about = "Cellex - equation model simulation engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that a model file parses and compiles
    Validate {
        /// Path to the model YAML file
        model_path: PathBuf,
    },
    /// List available solvers
    Solvers,
    /// Run a simulation
    Run {
        /// Path to the model YAML file
        model_path: PathBuf,
        #[command(flatten)]
        settings: RunSettings,
        /// Skip the archive and force a re-run
        #[arg(long)]
        no_cache: bool,
        /// Do not archive the run
        #[arg(long)]
        no_save: bool,
    },
    /// Run one parameter over a range of values
    Sweep {
        /// Path to the model YAML file
        model_path: PathBuf,
        /// Parameter to vary
        parameter: String,
        #[arg(long)]
        from: f64,
        #[arg(long)]
        to: f64,
        #[arg(long, default_value_t = 5)]
        count: usize,
        /// Worker threads (defaults to one per core)
        #[arg(long)]
        threads: Option<usize>,
        #[command(flatten)]
        settings: RunSettings,
    },
    /// List archived runs for a model
    Runs {
        /// Path to the model YAML file
        model_path: PathBuf,
    },
    /// Show details of an archived run
    ShowRun {
        /// Path to the model YAML file
        model_path: PathBuf,
        /// Run ID to display
        run_id: String,
    },
    /// Export an archived run as CSV
    Export {
        /// Path to the model YAML file
        model_path: PathBuf,
        /// Run ID
        run_id: String,
        /// Variables to export (uri or name); all when omitted
        #[arg(short, long, value_delimiter = ',')]
        vars: Vec<String>,
        /// Output CSV file path (optional, defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Clone)]
struct RunSettings {
    /// Run configuration YAML; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Solver name or KiSAO id (see `solvers`)
    #[arg(long)]
    solver: Option<String>,
    #[arg(long)]
    t_start: Option<f64>,
    #[arg(long)]
    t_end: Option<f64>,
    /// Fixed step, or initial step for adaptive solvers
    #[arg(long)]
    step: Option<f64>,
    /// Spacing of recorded points
    #[arg(long)]
    output_interval: Option<f64>,
    #[arg(long)]
    rtol: Option<f64>,
    #[arg(long)]
    atol: Option<f64>,
    /// Parameter override, NAME=VALUE (repeatable)
    #[arg(short, long = "param", value_parser = parse_param)]
    params: Vec<(String, f64)>,
    /// Abort the run after this many seconds
    #[arg(long)]
    timeout: Option<f64>,
}

fn parse_param(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    Ok((name.trim().to_string(), value))
}

impl RunSettings {
    fn configuration(&self) -> AppResult<RunConfiguration> {
        let mut config = match &self.config {
            Some(path) => {
                let src = fs::read_to_string(path)?;
                serde_yaml::from_str(&src)?
            }
            None => RunConfiguration::default(),
        };
        if let Some(name) = &self.solver {
            config.solver = SolverRegistry::builtin().kind_for(name)?;
        }
        if let Some(t) = self.t_start {
            config.start_time = t;
        }
        if let Some(t) = self.t_end {
            config.end_time = t;
        }
        if let Some(h) = self.step {
            config.step = h;
        }
        if let Some(dt) = self.output_interval {
            config.output_interval = dt;
        }
        if self.rtol.is_some() || self.atol.is_some() {
            config.tolerances = Tolerances {
                abs: self.atol.unwrap_or(config.tolerances.abs),
                rel: self.rtol.unwrap_or(config.tolerances.rel),
            };
        }
        config.validate()?;
        Ok(config)
    }

    fn timeout(&self) -> AppResult<Option<Duration>> {
        match self.timeout {
            Some(s) if s.is_finite() && s > 0.0 => Ok(Some(Duration::from_secs_f64(s))),
            Some(s) => Err(AppError::InvalidInput(format!("timeout must be positive, got {s}"))),
            None => Ok(None),
        }
    }
}

fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { model_path } => cmd_validate(&model_path),
        Commands::Solvers => cmd_solvers(),
        Commands::Run {
            model_path,
            settings,
            no_cache,
            no_save,
        } => cmd_run(&model_path, &settings, !no_cache, !no_save),
        Commands::Sweep {
            model_path,
            parameter,
            from,
            to,
            count,
            threads,
            settings,
        } => cmd_sweep(&model_path, &parameter, from, to, count, threads, &settings),
        Commands::Runs { model_path } => cmd_runs(&model_path),
        Commands::ShowRun { model_path, run_id } => cmd_show_run(&model_path, &run_id),
        Commands::Export {
            model_path,
            run_id,
            vars,
            output,
        } => cmd_export(&model_path, &run_id, &vars, output.as_deref()),
    }
}

fn cmd_validate(model_path: &Path) -> AppResult<()> {
    println!("Validating model: {}", model_path.display());
    let model = cx_app::load_model(model_path)?;
    let routines = run_service::compile_model(&model)?;
    let summary = ModelSummary::of(&model);
    println!("✓ Model '{}' is valid ({:?})", summary.name, summary.model_type);
    println!("  States:     {}", summary.state_count);
    println!("  Algebraic:  {}", summary.algebraic_count);
    println!("  Parameters: {}", summary.parameter_count);
    println!(
        "  Jacobian:   {}",
        if routines.jacobian.is_some() {
            "symbolic"
        } else {
            "finite differences"
        }
    );
    println!("  Fingerprint: {}", summary.fingerprint);
    Ok(())
}

fn cmd_solvers() -> AppResult<()> {
    let registry = SolverRegistry::builtin();
    println!("Available solvers:");
    for d in registry.solvers() {
        println!("  {:<12} {}  {}", d.name, d.kisao, d.description);
        for p in &d.properties {
            println!("      {:<22} default {:<10} {}", p.id, p.default, p.description);
        }
    }
    println!("  {:<12} picks bdf for stiff models, heun_euler otherwise", "auto");
    Ok(())
}

fn cmd_run(
    model_path: &Path,
    settings: &RunSettings,
    use_cache: bool,
    save: bool,
) -> AppResult<()> {
    let config = settings.configuration()?;
    println!("Running model: {}", model_path.display());
    println!(
        "  t = {} .. {}, output every {}",
        config.start_time, config.end_time, config.output_interval
    );

    let request = RunRequest {
        model_path,
        config,
        parameters: settings.params.clone(),
        options: RunOptions {
            use_cache,
            save,
            timeout: settings.timeout()?,
            ..RunOptions::default()
        },
    };

    let mut last_emit = Instant::now();
    let mut last_stage = RunStage::LoadingModel;
    let response = run_service::run_model_with_progress(
        &request,
        Some(&mut |event: RunProgressEvent| {
            let emit_now = event.stage != last_stage || last_emit.elapsed().as_millis() >= 100;
            if emit_now {
                render_cli_progress(&event);
                last_stage = event.stage;
                last_emit = Instant::now();
            }
        }),
    )?;
    clear_progress_line();

    if response.loaded_from_cache {
        println!("✓ Loaded from archive: {}", response.run_id);
    } else if response.manifest.status == "completed" {
        println!("✓ Simulation completed: {}", response.run_id);
    } else {
        println!("✗ Simulation {}: {}", response.manifest.status, response.run_id);
        if let Some(error) = &response.manifest.error {
            println!("  Error: {error}");
        }
    }

    let m = &response.manifest;
    println!("  Solver:      {}", m.solver);
    println!("  Points:      {}", m.point_count);
    println!("  Compute:     {:.3}s", m.elapsed_ms as f64 / 1000.0);
    if let Some(last) = response.table.rows.last() {
        println!("  Final state at t = {}:", last[0]);
        for (header, value) in response.table.headers.iter().zip(last).skip(1) {
            println!("    {header:<24} {value:.6e}");
        }
    }
    Ok(())
}

fn cmd_sweep(
    model_path: &Path,
    parameter: &str,
    from: f64,
    to: f64,
    count: usize,
    threads: Option<usize>,
    settings: &RunSettings,
) -> AppResult<()> {
    if count == 0 {
        return Err(AppError::InvalidInput("count must be positive".to_string()));
    }
    let config = settings.configuration()?;
    let model = Arc::new(cx_app::load_model(model_path)?);
    let mut cases = sweep::linear_cases(parameter, from, to, count);
    for case in &mut cases {
        case.parameters.extend(settings.params.iter().cloned());
    }

    println!("Sweeping {parameter} over {count} values");
    let started = Instant::now();
    let outcomes = sweep::run_sweep(model, &config, &cases, threads)?;
    println!("✓ Sweep finished in {:.2}s", started.elapsed().as_secs_f64());

    for outcome in outcomes {
        match (&outcome.error, &outcome.last) {
            (Some(error), _) => println!("  {:<20} {}: {error}", outcome.label, outcome.status),
            (None, Some(last)) => {
                let values: Vec<String> = outcome
                    .table
                    .headers
                    .iter()
                    .skip(1)
                    .zip(&last.values)
                    .map(|(h, v)| format!("{h}={v:.4e}"))
                    .collect();
                println!(
                    "  {:<20} {}  t={}  {}",
                    outcome.label,
                    outcome.status,
                    last.time,
                    values.join(" ")
                );
            }
            (None, None) => println!("  {:<20} {}", outcome.label, outcome.status),
        }
    }
    Ok(())
}

fn clear_progress_line() {
    print!("\r{}\r", " ".repeat(100));
    let _ = io::stdout().flush();
}

fn render_cli_progress(event: &RunProgressEvent) {
    match (event.stage, event.fraction) {
        (RunStage::Running, Some(fraction)) => {
            let width = 28usize;
            let filled = ((fraction * width as f64).round() as usize).min(width);
            print!(
                "\r[{}{}] {:>6.2}%  elapsed={:.1}s",
                "#".repeat(filled),
                "-".repeat(width - filled),
                fraction * 100.0,
                event.elapsed_wall_s
            );
        }
        _ => {
            let spinner = ['|', '/', '-', '\\'];
            let spin_idx = ((event.elapsed_wall_s * 10.0) as usize) % spinner.len();
            let mut line = format!(
                "\r{} {}  elapsed={:.2}s",
                spinner[spin_idx],
                event.stage.label(),
                event.elapsed_wall_s
            );
            if let Some(msg) = &event.message {
                line.push_str(&format!("  {msg}"));
            }
            print!("{line}");
        }
    }
    let _ = io::stdout().flush();
}

fn cmd_runs(model_path: &Path) -> AppResult<()> {
    let runs = run_service::list_runs(model_path, None)?;

    if runs.is_empty() {
        println!("No archived runs for {}", model_path.display());
    } else {
        println!("Archived runs:");
        for m in runs {
            println!(
                "  {}  {}  {}  {} points  ({})",
                m.run_id, m.model_name, m.solver, m.point_count, m.timestamp
            );
        }
    }
    Ok(())
}

fn cmd_show_run(model_path: &Path, run_id: &str) -> AppResult<()> {
    println!("Loading run: {run_id}");

    let (manifest, table) = run_service::load_run(model_path, run_id)?;
    let summary = query::get_run_summary(&table)?;

    println!("\nRun Summary:");
    println!("  Model:       {}", manifest.model_name);
    println!("  Solver:      {}", manifest.solver);
    println!("  Status:      {}", manifest.status);
    println!("  Recorded:    {}", manifest.timestamp);
    println!("  Time points: {}", summary.point_count);
    println!(
        "  Time range:  {} - {}",
        summary.time_range.0, summary.time_range.1
    );
    println!("  Variables:");
    for column in &manifest.columns {
        if column.unit.is_empty() {
            println!("    {}", column.uri);
        } else {
            println!("    {} [{}]", column.uri, column.unit);
        }
    }
    Ok(())
}

fn cmd_export(
    model_path: &Path,
    run_id: &str,
    vars: &[String],
    output: Option<&Path>,
) -> AppResult<()> {
    let (_manifest, table) = run_service::load_run(model_path, run_id)?;
    let selection: Vec<&str> = vars.iter().map(String::as_str).collect();
    let table = query::select_columns(&table, &selection)?;
    let csv = table.to_csv();

    match output {
        Some(path) => {
            fs::write(path, csv)?;
            println!(
                "✓ Exported {} points x {} variables to {}",
                table.row_count(),
                table.column_count() - 1,
                path.display()
            );
        }
        None => print!("{csv}"),
    }
    Ok(())
}
