//! annoscene CLI - inspect saved projects and run the exporters headlessly.

use std::path::{Path, PathBuf};
use std::process;

use annoscene::{AnnotationSession, AppConfig, SessionError};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "annoscene")]
#[command(author, version, about = "Inspect and convert image annotation projects", long_about = None)]
struct Cli {
    /// Log at debug level regardless of the configured level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the per-user config directory)
    #[arg(long, global = true, env = "ANNOSCENE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Export a saved project with one of the converters
    Export {
        /// Project file written by a session
        #[arg(short, long)]
        project: PathBuf,

        /// Format id: voc, yolo, mask or annoscene
        #[arg(short, long)]
        format: String,

        /// Output directory (or file, for the project format)
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Summarize a saved project
    Info {
        /// Project file written by a session
        #[arg(short, long)]
        project: PathBuf,
    },

    /// List the available formats
    Formats,
}

fn main() {
    let cli = Cli::parse();
    let config = AppConfig::load_or_default(cli.config.as_deref());

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        config.preferences.log_level.to_level_filter()
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    if let Err(e) = run(cli.command, config) {
        log::error!("{}", e);
        process::exit(1);
    }
}

fn run(command: Commands, config: AppConfig) -> Result<(), SessionError> {
    let mut session = AnnotationSession::new(config);
    match command {
        Commands::Export {
            project,
            format,
            out,
        } => export(&mut session, &project, &format, &out),
        Commands::Info { project } => info(&mut session, &project),
        Commands::Formats => {
            for format in session.registry().all() {
                let import = if format.supports_import() { "import/export" } else { "export" };
                println!(
                    "{:<10} {:<24} .{:<16} {}",
                    format.id(),
                    format.display_name(),
                    format.extensions().join(", ."),
                    import
                );
            }
            Ok(())
        }
    }
}

fn export(session: &mut AnnotationSession, project: &Path, format: &str, out: &Path) -> Result<(), SessionError> {
    session.load_project(project)?;

    let per_image = session
        .registry()
        .get(format)
        .ok_or_else(|| SessionError::UnknownFormat(format.to_string()))?
        .supports_per_image();
    if per_image {
        std::fs::create_dir_all(out)?;
    }

    let result = session.export(format, out)?;
    println!(
        "Exported {} annotations from {} images ({} files) to {}",
        result.annotations_exported,
        result.images_exported,
        result.files_created.len(),
        out.display()
    );
    if result.has_warnings() {
        println!("{} warnings, see log", result.warnings.len());
    }
    Ok(())
}

fn info(session: &mut AnnotationSession, project: &Path) -> Result<(), SessionError> {
    let warnings = session.load_project(project)?;
    let data = session.snapshot();

    println!("Project: {}", project.display());
    println!("Folder:  {}", data.folder.display());
    println!(
        "{} images, {} labels, {} shapes",
        data.images.len(),
        data.total_labels(),
        data.total_shapes()
    );
    for image in &data.images {
        let size = image
            .dimensions
            .map(|(w, h)| format!("{}x{}", w, h))
            .unwrap_or_else(|| "?x?".to_string());
        println!("  {} ({}): {} shapes", image.filename, size, image.shape_count());
        for label in &image.labels {
            println!("    {:<20} {}", label.name, label.shapes.len());
        }
    }

    let degenerate = session.degenerate_shapes();
    if !degenerate.is_empty() {
        println!("{} degenerate shapes need correction:", degenerate.len());
        let tree = session.synchronizer().tree();
        for node in degenerate.iter().filter_map(|id| tree.get(*id)) {
            println!("  {} in {}", node.name, node.file.display());
        }
    }
    for warning in &warnings {
        println!("warning: {}", warning.message);
    }
    Ok(())
}
