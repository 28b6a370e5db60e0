//! CLI command definitions for imageforge.
//!
//! Provides commands for running a worker pool, submitting tasks, checking
//! status, inspecting workers and the dead-letter queue, and driving a
//! queue-less batch run over a local directory.

use crate::config::Config;
use crate::filters::FilterDescriptor;
use crate::pipeline::BatchProcessor;
use crate::registry::WorkerRegistry;
use crate::scheduler::task::Task;
use crate::scheduler::{TaskQueue, WorkerPool};
use clap::Parser;
use redis::aio::ConnectionManager;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Distributed image processing over a filter pipeline.
#[derive(Parser)]
#[command(name = "imageforge")]
#[command(about = "Run and drive a distributed image-filter pipeline")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Redis host.
    #[arg(long, env = "REDIS_HOST", default_value = "localhost", global = true)]
    pub redis_host: String,

    /// Redis port.
    #[arg(long, env = "REDIS_PORT", default_value = "6379", global = true)]
    pub redis_port: u16,

    /// Queue namespace.
    #[arg(long, env = "QUEUE_NAME", default_value = "image_processing_v2", global = true)]
    pub queue_name: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run a worker pool until interrupted.
    Worker(WorkerArgs),

    /// Submit a task to the queue.
    Submit(SubmitArgs),

    /// Print a task's current record.
    Status(StatusArgs),

    /// List registered workers and their liveness.
    Workers,

    /// Inspect or retry dead-letter tasks.
    #[command(subcommand)]
    DeadLetter(DeadLetterCommand),

    /// Run a filter pipeline over every image in a directory, no queue.
    Batch(BatchArgs),
}

#[derive(clap::Subcommand)]
pub enum DeadLetterCommand {
    /// List dead-letter task ids.
    List,
    /// Retry a dead-letter task, resetting its retry count.
    Retry { task_id: String },
}

/// Arguments for the worker command.
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Number of concurrent claim-loop workers.
    #[arg(short = 'n', long, env = "NUM_WORKERS", default_value = "4")]
    pub num_workers: usize,

    /// Maximum retries before a task is routed to the dead letter queue.
    #[arg(long, env = "MAX_RETRIES", default_value = "3")]
    pub max_retries: u32,
}

/// Arguments for the submit command.
#[derive(Parser, Debug)]
pub struct SubmitArgs {
    /// Path to the input image.
    #[arg(short = 'i', long)]
    pub input: PathBuf,

    /// Path to write the output image.
    #[arg(short = 'o', long)]
    pub output: PathBuf,

    /// Filters to apply, e.g. `grayscale` or `{"type":"blur","radius":3}`,
    /// in the order given.
    #[arg(short = 'f', long = "filter", required = true)]
    pub filters: Vec<String>,

    /// Keep running remaining steps after a failed step instead of aborting
    /// the pipeline (the pipeline aborts on first failure by default).
    #[arg(long)]
    pub no_stop_on_error: bool,

    /// Persist every intermediate step's output alongside the final image.
    #[arg(long)]
    pub save_intermediate: bool,
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    pub task_id: String,
}

/// Arguments for the batch command.
#[derive(Parser, Debug)]
pub struct BatchArgs {
    /// Directory to read input images from.
    #[arg(short = 'i', long)]
    pub input_dir: PathBuf,

    /// Directory to write output images to.
    #[arg(short = 'o', long)]
    pub output_dir: PathBuf,

    /// Filters to apply, in order.
    #[arg(short = 'f', long = "filter", required = true)]
    pub filters: Vec<String>,

    /// Recurse into subdirectories.
    #[arg(long, default_value = "true")]
    pub recursive: bool,

    /// Mirror the input directory structure under the output directory.
    #[arg(long, default_value = "true")]
    pub preserve_structure: bool,
}

/// Parses CLI arguments and returns the `Cli` struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before
/// running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = Config::new().with_redis(cli.redis_host.clone(), cli.redis_port).with_queue_name(cli.queue_name.clone());

    match cli.command {
        Commands::Worker(args) => run_worker_command(config, args).await,
        Commands::Submit(args) => run_submit_command(config, args).await,
        Commands::Status(args) => run_status_command(config, args).await,
        Commands::Workers => run_workers_command(config).await,
        Commands::DeadLetter(DeadLetterCommand::List) => run_dead_letter_list(config).await,
        Commands::DeadLetter(DeadLetterCommand::Retry { task_id }) => run_dead_letter_retry(config, task_id).await,
        Commands::Batch(args) => run_batch_command(args).await,
    }
}

async fn connection_manager(config: &Config) -> anyhow::Result<ConnectionManager> {
    let client = redis::Client::open(config.redis_url())?;
    Ok(ConnectionManager::new(client).await?)
}

async fn run_worker_command(mut config: Config, args: WorkerArgs) -> anyhow::Result<()> {
    config.num_workers = args.num_workers;
    config.max_retries = args.max_retries;

    let queue = TaskQueue::connect(&config.redis_url(), config.queue_name.clone(), config.max_retries, config.processing_timeout).await?;
    let registry = WorkerRegistry::new(connection_manager(&config).await?, config.heartbeat_timeout);

    let mut pool = WorkerPool::new(config.clone(), queue, registry);
    pool.start().await?;
    info!(worker_id = %config.worker_id, num_workers = config.num_workers, "worker pool running, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    pool.shutdown(Duration::from_secs(30)).await?;
    Ok(())
}

async fn run_submit_command(config: Config, args: SubmitArgs) -> anyhow::Result<()> {
    let queue = TaskQueue::connect(&config.redis_url(), config.queue_name.clone(), config.max_retries, config.processing_timeout).await?;

    let raw_filters: Vec<serde_json::Value> = args
        .filters
        .iter()
        .map(|f| serde_json::from_str(f).unwrap_or_else(|_| serde_json::Value::String(f.clone())))
        .collect();
    let descriptors = FilterDescriptor::normalize_wire(&raw_filters);

    let task = Task::new(args.input, args.output, descriptors)
        .with_stop_on_error(!args.no_stop_on_error)
        .with_save_intermediate(args.save_intermediate);

    let task_id = queue.add_task(task).await?;
    println!("{}", json!({ "task_id": task_id }));
    Ok(())
}

async fn run_status_command(config: Config, args: StatusArgs) -> anyhow::Result<()> {
    let queue = TaskQueue::connect(&config.redis_url(), config.queue_name.clone(), config.max_retries, config.processing_timeout).await?;
    match queue.get_task(&args.task_id).await? {
        Some(mut task) => {
            task.id = args.task_id;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        None => println!("{}", json!({ "error": "task not found" })),
    }
    Ok(())
}

async fn run_workers_command(config: Config) -> anyhow::Result<()> {
    let registry = WorkerRegistry::new(connection_manager(&config).await?, config.heartbeat_timeout);
    let stats = registry.stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn run_dead_letter_list(config: Config) -> anyhow::Result<()> {
    let queue = TaskQueue::connect(&config.redis_url(), config.queue_name.clone(), config.max_retries, config.processing_timeout).await?;
    let ids = queue.dead_letter_ids().await?;
    println!("{}", serde_json::to_string_pretty(&ids)?);
    Ok(())
}

async fn run_dead_letter_retry(config: Config, task_id: String) -> anyhow::Result<()> {
    let queue = TaskQueue::connect(&config.redis_url(), config.queue_name.clone(), config.max_retries, config.processing_timeout).await?;
    let retried = queue.retry_dead_letter(&task_id).await?;
    println!("{}", json!({ "task_id": task_id, "retried": retried }));
    Ok(())
}

async fn run_batch_command(args: BatchArgs) -> anyhow::Result<()> {
    use crate::filters::FilterFactory;

    let raw_filters: Vec<serde_json::Value> = args
        .filters
        .iter()
        .map(|f| serde_json::from_str(f).unwrap_or_else(|_| serde_json::Value::String(f.clone())))
        .collect();
    let descriptors = FilterDescriptor::normalize_wire(&raw_filters);

    let factory = FilterFactory::new();
    let pipeline = factory.create_pipeline(&descriptors, true, false)?;

    let processor = BatchProcessor::new(args.input_dir, args.output_dir, pipeline)?
        .with_recursive(args.recursive)
        .with_preserve_structure(args.preserve_structure);

    let report = processor.process_all();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
