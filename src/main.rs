use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use gearman_lite::config::normalize_addr;
use gearman_lite::protocol::Priority;
use gearman_lite::shutdown::install_shutdown_handler;
use gearman_lite::{Client, ClientConfig, GearmanError, Job};

#[derive(Parser, Debug)]
#[command(name = "gearman-lite")]
#[command(version)]
#[command(about = "Submit jobs to Gearman job servers and wait for their results")]
#[command(propagate_version = true)]
struct Args {
    /// Job servers (comma-separated, format: "host:port")
    #[arg(
        long,
        short = 's',
        env = "GEARMAN_SERVERS",
        value_delimiter = ',',
        default_value = "127.0.0.1:4730"
    )]
    servers: Vec<String>,

    /// Give up waiting for results after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// How long a server may take to accept a submission (milliseconds)
    #[arg(long, default_value = "5000")]
    handle_timeout_ms: u64,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Submit a single job
    Submit {
        /// Worker function name
        function: String,

        /// Job argument
        argument: String,

        /// Unique id; servers run jobs sharing it only once
        #[arg(long)]
        unique: Option<String>,

        #[arg(long, default_value = "normal")]
        priority: PriorityArg,

        /// Queue the job and return its handle without waiting
        #[arg(long)]
        background: bool,

        /// Resubmit a failed job up to this many times
        #[arg(long, default_value = "0")]
        retries: u32,
    },
    /// Run one job per argument in parallel
    Batch {
        /// Worker function name
        function: String,

        /// One job is submitted for each argument
        #[arg(required = true)]
        arguments: Vec<String>,

        /// Resubmit a failed job up to this many times
        #[arg(long, default_value = "0")]
        retries: u32,
    },
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PriorityArg {
    Normal,
    High,
    Low,
}

impl From<PriorityArg> for Priority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Normal => Priority::Normal,
            PriorityArg::High => Priority::High,
            PriorityArg::Low => Priority::Low,
        }
    }
}

// =============================================================================
// Output
// =============================================================================

#[derive(Serialize)]
struct JobOutput {
    job_id: String,
    function: String,
    state: String,
    handle: Option<String>,
    result: Option<String>,
    exception: Option<String>,
    warnings: Vec<String>,
    retries_done: u32,
}

impl From<&Job> for JobOutput {
    fn from(job: &Job) -> Self {
        let text = |bytes: &[u8]| String::from_utf8_lossy(bytes).into_owned();
        Self {
            job_id: job.id.to_string(),
            function: job.function.clone(),
            state: job.state.to_string(),
            handle: job.handle.clone(),
            result: job.result.as_deref().map(text),
            exception: job.exception.as_deref().map(text),
            warnings: job.warnings.iter().map(|w| text(w)).collect(),
            retries_done: job.retries_done,
        }
    }
}

#[derive(Serialize)]
struct BatchOutput {
    success: bool,
    jobs: Vec<JobOutput>,
}

fn print_jobs(jobs: &[Job], success: bool, format: &OutputFormat) -> Result<(), serde_json::Error> {
    match format {
        OutputFormat::Json => {
            let output = BatchOutput {
                success,
                jobs: jobs.iter().map(JobOutput::from).collect(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("{:<38} {:<10} {:<20} RESULT", "JOB ID", "STATE", "HANDLE");
            println!("{}", "-".repeat(80));
            for job in jobs {
                let out = JobOutput::from(job);
                let result = out.result.or(out.exception).unwrap_or_default();
                // Keep one job per line
                let result = match result.lines().next() {
                    Some(line) if line.chars().count() > 40 => {
                        format!("{}...", line.chars().take(37).collect::<String>())
                    }
                    Some(line) => line.to_string(),
                    None => String::new(),
                };
                println!(
                    "{:<38} {:<10} {:<20} {}",
                    out.job_id,
                    out.state,
                    out.handle.as_deref().unwrap_or("-"),
                    result
                );
            }
        }
    }
    Ok(())
}

// =============================================================================
// Commands
// =============================================================================

async fn run_command(
    client: &mut Client,
    command: Commands,
    timeout: Option<Duration>,
    format: &OutputFormat,
) -> Result<bool, Box<dyn std::error::Error>> {
    match command {
        Commands::Submit {
            function,
            argument,
            unique,
            priority,
            background: true,
            ..
        } => {
            let handle = client
                .dispatch_background_task(&function, argument, unique.as_deref(), priority.into())
                .await?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({ "handle": handle }));
                }
                OutputFormat::Table => println!("Job queued with handle {}", handle),
            }
            Ok(true)
        }
        Commands::Submit {
            function,
            argument,
            unique,
            priority,
            retries,
            ..
        } => {
            let mut job = Job::new(function, argument)
                .with_priority(priority.into())
                .with_retries(retries);
            if let Some(unique) = unique {
                job = job.with_unique(unique);
            }
            let success = client.do_tasks_in_parallel([&mut job], timeout).await?;
            print_jobs(std::slice::from_ref(&job), success, format)?;
            Ok(success)
        }
        Commands::Batch {
            function,
            arguments,
            retries,
        } => {
            let mut jobs: Vec<Job> = arguments
                .into_iter()
                .map(|arg| Job::new(function.clone(), arg).with_retries(retries))
                .collect();
            let success = client.do_tasks_in_parallel(jobs.iter_mut(), timeout).await?;
            print_jobs(&jobs, success, format)?;
            Ok(success)
        }
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig {
        servers: args.servers.iter().map(|s| normalize_addr(s)).collect(),
        handle_timeout_ms: args.handle_timeout_ms,
        ..ClientConfig::default()
    };
    tracing::debug!(servers = ?config.servers, "Using job servers");

    let timeout = args.timeout_secs.map(Duration::from_secs);
    let shutdown = install_shutdown_handler()?;
    let mut client = Client::new(config);

    // The batch future is dropped on cancellation, which closes its connections.
    let outcome = tokio::select! {
        outcome = run_command(&mut client, args.command, timeout, &args.output) => Some(outcome),
        _ = shutdown.cancelled() => None,
    };

    match outcome {
        Some(Ok(true)) => Ok(()),
        Some(Ok(false)) => {
            eprintln!("Error: not every job completed successfully");
            std::process::exit(1);
        }
        Some(Err(e)) => {
            if matches!(
                e.downcast_ref::<GearmanError>(),
                Some(GearmanError::NoServersAvailable)
            ) {
                eprintln!("Error: no job server accepted the job");
                eprintln!("Hint: check --servers or GEARMAN_SERVERS, e.g.:");
                eprintln!("  gearman-lite -s 127.0.0.1:4730 submit reverse hello");
            } else {
                eprintln!("Error: {}", e);
            }
            std::process::exit(1);
        }
        None => {
            eprintln!("Interrupted");
            std::process::exit(130);
        }
    }
}
