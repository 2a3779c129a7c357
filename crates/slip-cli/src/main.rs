use std::{env, path::PathBuf, process::ExitCode};

use slip::{Core, Options};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn usage() {
    println!("slip - S-expression language runtime");
    println!();
    println!("Usage:");
    println!("  slip [options] <file.slip>     Run a script");
    println!();
    println!("Options:");
    println!("  -w, --working-dir <path>   Set working directory");
    println!("  -i, --include <path>       Add include path (repeatable)");
    println!("  -v, --verbose              Enable verbose logging");
    println!("  -q, --quiet                Suppress all output except errors");
    println!("  -l, --log-level <level>    Set log level (trace, debug, info, warn, error)");
    println!("      --strict-match         Treat match pattern mismatches as errors");
    println!();
    println!("Commands:");
    println!("  version                    Show version info");
    println!("  help                       Show this help message");
}

struct Args {
    file_path: PathBuf,
    include_paths: Vec<PathBuf>,
    working_dir: PathBuf,
    log_filter: String,
    strict_match: bool,
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut file_path: Option<PathBuf> = None;
    let mut include_paths = Vec::new();
    let mut working_dir = env::current_dir().map_err(|e| e.to_string())?;
    let mut log_filter = "info".to_owned();
    let mut strict_match = false;

    let mut index = 0;
    while index < args.len() {
        let arg = args[index].as_str();
        match arg {
            "-w" | "--working-dir" => {
                index += 1;
                let value = args.get(index).ok_or("missing value for --working-dir")?;
                working_dir = PathBuf::from(value);
            }
            "-i" | "--include" => {
                index += 1;
                let value = args.get(index).ok_or("missing value for --include")?;
                include_paths.push(PathBuf::from(value));
            }
            "-v" | "--verbose" => log_filter = "debug".to_owned(),
            "-q" | "--quiet" => log_filter = "error".to_owned(),
            "-l" | "--log-level" => {
                index += 1;
                let value = args.get(index).ok_or("missing value for --log-level")?;
                match value.as_str() {
                    "trace" | "debug" | "info" | "warn" | "error" => {
                        log_filter = value.clone();
                    }
                    other => return Err(format!("unknown log level: {other}")),
                }
            }
            "--strict-match" => strict_match = true,
            _ if file_path.is_none() => file_path = Some(PathBuf::from(arg)),
            _ => return Err(format!("unexpected argument: {arg}")),
        }
        index += 1;
    }

    let mut file_path = file_path.ok_or("no script file specified")?;
    if !file_path.is_absolute() {
        file_path = working_dir.join(file_path);
    }

    // A SLIP_HOME installation contributes its kernel tree as an implicit
    // include root.
    if let Ok(home) = env::var("SLIP_HOME") {
        let kernel_path = PathBuf::from(home).join("lib").join("kernels");
        if kernel_path.exists() && !include_paths.contains(&kernel_path) {
            include_paths.push(kernel_path);
        }
    }

    Ok(Args {
        file_path,
        include_paths,
        working_dir,
        log_filter,
        strict_match,
    })
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        None => {
            usage();
            return ExitCode::from(1);
        }
        Some("-h" | "--help" | "help") => {
            usage();
            return ExitCode::SUCCESS;
        }
        Some("version") => {
            println!("slip {VERSION}");
            return ExitCode::SUCCESS;
        }
        _ => {}
    }

    let args = match parse_args(&args) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("error: {message}");
            eprintln!("run 'slip help' for usage information");
            return ExitCode::from(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            env::var("RUST_LOG").unwrap_or_else(|_| format!("slip={}", args.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut options = Options::new(args.file_path);
    options.include_paths = args.include_paths;
    options.working_directory = args.working_dir;
    options.strict_match = args.strict_match;

    let core = match Core::new(options) {
        Ok(core) => core,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match u8::try_from(core.run()) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    }
}
