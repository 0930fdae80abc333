use clap::{Parser, Subcommand};
use std::path::PathBuf;

use course_rag::commands::{
    ask_question, delete_course, health_check, ingest_course, list_courses, load_service,
    read_course_content, search_course, show_course_info,
};
use course_rag::config::{get_config_dir, run_interactive_config, show_config};
use course_rag::course::{CourseContent, CourseId};
use course_rag::{CourseRagError, Result};

#[derive(Parser)]
#[command(name = "course-rag")]
#[command(about = "Index course material and answer learner questions from it")]
#[command(version)]
struct Cli {
    /// Configuration directory (defaults to ~/.course-rag)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure providers and ingestion settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Chunk, embed and store a course's content
    Ingest {
        /// Course identifier
        course: String,
        /// Course description
        #[arg(long, required_unless_present = "from_file")]
        description: Option<String>,
        /// A prerequisite; repeat for several
        #[arg(long = "prerequisite")]
        prerequisites: Vec<String>,
        /// A learning outcome; repeat for several
        #[arg(long = "outcome")]
        outcomes: Vec<String>,
        /// Read the course from a JSON or TOML file instead
        #[arg(long, conflicts_with_all = ["description", "prerequisites", "outcomes"])]
        from_file: Option<PathBuf>,
    },
    /// Ask a question about a course
    Ask {
        course: String,
        question: String,
    },
    /// Show the chunks most similar to a query
    Search {
        course: String,
        query: String,
        /// Number of chunks to return
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Show index details for a course
    Info { course: String },
    /// Delete a course's index
    Delete { course: String },
    /// List indexed courses
    List,
    /// Check that the vector store is reachable
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir().map_err(|e| CourseRagError::Config(e.to_string()))?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir).await?;
            }
        }
        Commands::Ingest {
            course,
            description,
            prerequisites,
            outcomes,
            from_file,
        } => {
            let course = CourseId::parse(&course)?;
            let content = match from_file {
                Some(path) => read_course_content(&path)?,
                None => CourseContent::new(description.unwrap_or_default())
                    .with_prerequisites(prerequisites)
                    .with_outcomes(outcomes),
            };
            let service = load_service(&config_dir).await?;
            ingest_course(&service, &course, &content).await?;
        }
        Commands::Ask { course, question } => {
            let course = CourseId::parse(&course)?;
            let service = load_service(&config_dir).await?;
            ask_question(&service, &course, &question).await?;
        }
        Commands::Search {
            course,
            query,
            top_k,
        } => {
            let course = CourseId::parse(&course)?;
            let service = load_service(&config_dir).await?;
            search_course(&service, &course, &query, top_k).await?;
        }
        Commands::Info { course } => {
            let course = CourseId::parse(&course)?;
            let service = load_service(&config_dir).await?;
            show_course_info(&service, &course).await?;
        }
        Commands::Delete { course } => {
            let course = CourseId::parse(&course)?;
            let service = load_service(&config_dir).await?;
            delete_course(&service, &course).await?;
        }
        Commands::List => {
            let service = load_service(&config_dir).await?;
            list_courses(&service).await?;
        }
        Commands::Health => {
            let service = load_service(&config_dir).await?;
            health_check(&service).await?;
        }
    }

    Ok(())
}
