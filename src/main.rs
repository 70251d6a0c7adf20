use clap::{Parser, Subcommand};
use polysite::{config, generate, output};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    if env!("POLYSITE_TAGGED") == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let commit = env!("POLYSITE_COMMIT");
        if commit.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{commit}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "polysite")]
#[command(about = "Static site builder for multilingual sites")]
#[command(long_about = "\
Static site builder for multilingual sites

Every language has its own content tree. Directories holding a page.md
become pages; images, documents and sibling Markdown files become values
templates can use. Output links are relative, so the build directory can be
served from anywhere.

Project structure:

  project/
  ├── site.toml                    # Languages, domain, default template
  ├── templates/main.html          # minijinja templates
  ├── resources/
  │   ├── static/                  # css/ js/ img/ icon/ → build/static/
  │   ├── en/
  │   │   └── home/
  │   │       ├── page.md          # id: home / title: Home / template: main
  │   │       ├── intro.md         # available as {{ intro }}
  │   │       ├── dawn.jpg         # available as {{ page.dawn }}
  │   │       └── catalog.en       # dawn:Title,Alt text,Description
  │   └── fr/
  │       └── home/page.md         # same id links the translations
  └── build/                       # output

Run 'polysite gen-config' to print a documented site.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Log progress (same as RUST_LOG=info)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the site of a project directory
    Build {
        /// Project directory containing site.toml
        project: PathBuf,
    },
    /// Print a stock site.toml with all options documented
    GenConfig,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Build { project } => {
            println!("==> Building {}", project.display());
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    output::print_build_event(&event);
                }
            });
            let result = generate::build(&project, Some(tx));
            // The sender is dropped with the build, which ends the printer.
            let _ = printer.join();
            match result {
                Ok(report) => output::print_build_summary(&report),
                Err(e) => {
                    eprintln!("error: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }
    ExitCode::SUCCESS
}
