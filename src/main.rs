//! Lizzy command-line interface.
//!
//! `lizzy` prints the banner and the available commands; `lizzy info`
//! reports the build and the compiled-in solver backends.

use clap::{Parser, Subcommand};

/// Lizzy resin infusion solver.
#[derive(Parser)]
#[command(name = "lizzy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "FE/CV resin infusion filling simulation", long_about = None)]
struct Cli {
    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Display information on the installed Lizzy solver.
    Info,
}

const LOGO: &str = r#"
    __    _
   / /   (_)_______  __
  / /   / /_  /_  / / / /
 / /___/ / / /_/ /_/ /_/ /
/_____/_/ /___/___/\__, /
                  /____/
"#;

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.parse().unwrap_or(log::LevelFilter::Info))
        .format_timestamp(None)
        .init();

    match cli.command {
        None => {
            println!("{LOGO}");
            println!("Available commands:");
            println!("  info    Display information on the installed Lizzy solver");
        }
        Some(Commands::Info) => {
            println!("Lizzy Solver - v{}", env!("CARGO_PKG_VERSION"));
            println!("FE/CV filling simulation for liquid composite moulding");
            println!();
            println!("Solver backends:");
            println!("  direct dense   faer full-pivot LU (baseline)");
            println!("  direct sparse  faer sparse Cholesky (default)");
            println!("  iterative      Jacobi-preconditioned conjugate gradients");
            println!();
            println!("Mesh input:      Gmsh MSH v4.1 ASCII (triangles)");
            println!("Results output:  VTK XML series (.vtu/.pvd), CV wireframe (.vtp)");
        }
    }
}
