use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mpbuild::build::{BuildRequest, Builder, VariantSpec};
use mpbuild::catalog::Catalog;
use mpbuild::command::{BuildMode, HostEnv};
use mpbuild::config::{self, LogFormat, Settings};
use mpbuild::executor::SystemRunner;
use mpbuild::listing::ListFormat;
use mpbuild::{Error, Result, complete, images, listing, workspace};

const LOG_DIR: &str = "mpbuild-logs";

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// More log output (repeatable)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Less log output (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    quiet: u8,
    /// Settings TOML (default: <root>/mpbuild.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// MicroPython checkout (default: $MICROPY_DIR or the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormat>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build firmware for BOARD (or BOARD-VARIANT) in a container
    Build {
        board: String,
        variant: Option<String>,
        /// Extra make arguments, after `--`
        #[arg(last = true)]
        extra: Vec<String>,
        /// Use this image instead of the port default
        #[arg(long)]
        build_container: Option<String>,
        /// esp32 toolchain (IDF) version tag
        #[arg(long)]
        idf: Option<String>,
        /// Capture output instead of attaching the terminal
        #[arg(long)]
        capture: bool,
    },
    /// Remove build output of BOARD (or BOARD-VARIANT)
    Clean {
        board: String,
        variant: Option<String>,
    },
    /// List ports, boards and variants
    List {
        port: Option<String>,
        #[arg(long, value_enum, default_value_t = ListFormat::Tree)]
        format: ListFormat,
    },
    /// Check board images in the micropython-media repository
    CheckImages {
        #[arg(long)]
        verbose: bool,
    },
    /// Print completion candidates for a BOARD[-VARIANT] word
    Complete { word: String },
    /// Print the container command for BOARD without running it
    ShowCmd {
        board: String,
        variant: Option<String>,
        #[arg(long)]
        clean: bool,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    config::load_dotenv();

    // Completion must stay silent outside a MicroPython tree.
    if let Command::Complete { word } = &args.cmd {
        if let Ok(catalog) = workspace::find_root(args.root.as_deref()).and_then(|r| Catalog::load(&r)) {
            for c in complete::complete_board_variant(&catalog, word) {
                println!("{c}");
            }
        }
        return ExitCode::SUCCESS;
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let root = workspace::find_root(args.root.as_deref())?;
    let settings = Settings::discover(args.config.as_deref(), &root)?;
    setup_logging(
        args.verbose,
        args.quiet,
        args.log_format.unwrap_or(settings.log_format),
    )?;
    tracing::debug!(root = %root.display(), engine = %settings.container_engine, "using MicroPython tree");

    let catalog = Catalog::load(&root)?;

    match args.cmd {
        Command::Build {
            board,
            variant,
            extra,
            build_container,
            idf,
            capture,
        } => {
            let spec = target_spec(&catalog, board, variant);
            let port = catalog.board(&spec.board)?.port.clone();
            let mut req = BuildRequest::from_spec(&spec, BuildMode::Build);
            req.extra_args = extra;
            req.container = settings.container_options(&port, build_container, idf);
            req.interactive = !capture && std::io::stdin().is_terminal();
            cmd_build(&catalog, &settings, req)
        }
        Command::Clean { board, variant } => {
            let spec = target_spec(&catalog, board, variant);
            let port = catalog.board(&spec.board)?.port.clone();
            let mut req = BuildRequest::from_spec(&spec, BuildMode::Clean);
            req.container = settings.container_options(&port, None, None);
            req.interactive = std::io::stdin().is_terminal();
            cmd_build(&catalog, &settings, req)
        }
        Command::List { port, format } => {
            if let Some(p) = port.as_deref()
                && catalog.port(p).is_none()
            {
                return Err(Error::msg(format!(
                    "unknown port '{p}' (known: {})",
                    complete::list_ports(&catalog).join(", ")
                )));
            }
            print!("{}", listing::render(&catalog, port.as_deref(), format));
            Ok(())
        }
        Command::CheckImages { verbose } => {
            let probe = images::HttpProbe::new()?;
            let report = images::check_images(&catalog, &probe);
            if verbose || !report.is_clean() {
                print!("{}", report.render());
            } else {
                println!("All {} boards have reachable images of acceptable size", report.boards_checked);
            }
            Ok(())
        }
        Command::ShowCmd {
            board,
            variant,
            clean,
        } => {
            let spec = target_spec(&catalog, board, variant);
            let port = catalog.board(&spec.board)?.port.clone();
            let mode = if clean { BuildMode::Clean } else { BuildMode::Build };
            let mut req = BuildRequest::from_spec(&spec, mode);
            req.container = settings.container_options(&port, None, None);
            let runner = SystemRunner::new();
            let builder = Builder::new(&catalog, &runner, HostEnv::detect(&settings.container_engine));
            let (_, inv) = builder.plan(&req)?;
            println!("{inv}");
            Ok(())
        }
        Command::Complete { .. } => Ok(()),
    }
}

// `BOARD VARIANT`, or `BOARD-VARIANT` in one word when that is not itself a board.
fn target_spec(catalog: &Catalog, board: String, variant: Option<String>) -> VariantSpec {
    if variant.is_none() && catalog.board(&board).is_err() {
        return VariantSpec::parse(&board);
    }
    VariantSpec { board, variant }
}

fn cmd_build(catalog: &Catalog, settings: &Settings, req: BuildRequest) -> Result<()> {
    let runner = SystemRunner::new();
    let builder = Builder::new(catalog, &runner, HostEnv::detect(&settings.container_engine));

    let outcome = match builder.build(&req) {
        Ok(o) => o,
        Err(e) => {
            if let Error::BuildFailed {
                board,
                variant,
                stdout,
                stderr,
                ..
            } = &e
                && !req.interactive
            {
                match write_failure_log(board, variant, stdout, stderr) {
                    Ok(path) => eprintln!("build log written to {}", path.display()),
                    Err(log_err) => tracing::warn!(error = %log_err, "could not write build log"),
                }
            }
            return Err(e);
        }
    };

    if let Some(fw) = &outcome.firmware {
        println!("{}", fw.path.display());
    }
    if let Some(doc) = &outcome.deploy_doc {
        match std::fs::read_to_string(doc) {
            Ok(text) => println!("\n{text}"),
            Err(e) => tracing::warn!(path = %doc.display(), error = %e, "could not read deploy instructions"),
        }
    }
    Ok(())
}

fn write_failure_log(board: &str, variant: &str, stdout: &str, stderr: &str) -> Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
    let dir = Path::new(LOG_DIR).join(stamp);
    std::fs::create_dir_all(&dir)?;
    let name = if variant.is_empty() {
        format!("{board}.log")
    } else {
        format!("{board}-{variant}.log")
    };
    let path = dir.join(name);
    std::fs::write(&path, format!("=== stdout ===\n{stdout}\n=== stderr ===\n{stderr}\n"))?;
    Ok(path)
}

fn setup_logging(verbose: u8, quiet: u8, format: LogFormat) -> Result<()> {
    let log_level = match (verbose, quiet) {
        (0, 0) => "info",
        (1, 0) => "debug",
        (_, 0) => "trace",
        (0, 1) => "warn",
        (0, 2) => "error",
        (0, _) => "off",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let res = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    res.map_err(|e| Error::msg(format!("failed to install log subscriber: {e}")))
}
