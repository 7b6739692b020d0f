use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use console::style;
use disp::prelude::*;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Run a simulated workload.
#[derive(Parser)]
pub struct RunCommand {
    /// Configuration file path.
    #[arg(short, long, default_value = "disp.toml")]
    pub config: String,

    /// Number of workers (overrides config).
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Number of jobs to submit.
    #[arg(short = 'n', long, default_value_t = 10)]
    pub jobs: u64,

    /// Base simulated work duration in milliseconds.
    #[arg(long, default_value_t = 500)]
    pub delay_ms: u64,

    /// Assign workers in submission order.
    #[arg(long)]
    pub fifo: bool,

    /// Print outcomes as JSON lines.
    #[arg(long)]
    pub json: bool,

    /// Make every K-th job fail.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub fail_every: Option<u64>,
}

impl RunCommand {
    /// Execute the run command.
    pub async fn execute(self) -> Result<()> {
        dotenvy::dotenv().ok();

        let mut config = super::load_config(&self.config)?;
        if let Some(workers) = self.workers {
            config.dispatcher.max_workers = workers;
        }
        if self.fifo {
            config.dispatcher.order = DispatchOrder::Fifo;
        }
        config.validate()?;

        init_tracing(&config.observability.level, config.observability.json_format)?;

        if !self.json {
            println!();
            println!(
                "  {} v{}  {} workers, {} jobs",
                style("disp").bold().cyan(),
                env!("CARGO_PKG_VERSION"),
                config.dispatcher.max_workers,
                self.jobs
            );
            println!();
        }

        let (jobs, rx) = queue::channel(config.dispatcher.queue_capacity)?;
        let (sink, mut outcomes) = mpsc::unbounded_channel();
        let handle = Dispatcher::new(rx, config.dispatcher.clone())
            .with_outcomes(sink)
            .run_default()?;

        let workload = self.workload();
        let submitter = tokio::spawn(async move {
            for job in workload {
                jobs.submit(job).await?;
            }
            Ok::<_, DispError>(())
        });

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let mut received = 0;
        while received < self.jobs {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Received shutdown signal");
                    break;
                }
                outcome = outcomes.recv() => match outcome {
                    Some(outcome) => {
                        self.print_outcome(&outcome)?;
                        received += 1;
                    }
                    None => break,
                },
            }
        }

        let report = handle.shutdown().await?;
        while let Ok(outcome) = outcomes.try_recv() {
            self.print_outcome(&outcome)?;
        }

        match submitter.await {
            Ok(Err(DispError::QueueClosed)) => info!("Submission stopped by shutdown"),
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(())) | Err(_) => {}
        }

        if !self.json {
            println!();
            if report.drained {
                println!(
                    "  {} Drained, {} workers stopped",
                    style("✓").green().bold(),
                    report.workers_joined
                );
            } else {
                println!(
                    "  {} {} jobs abandoned at drain timeout",
                    style("!").yellow().bold(),
                    report.abandoned
                );
            }
        }

        Ok(())
    }

    /// Delay jobs of 0.5x, 1x and 1.5x the base duration in rotation.
    fn workload(&self) -> Vec<Job> {
        (1..=self.jobs)
            .map(|i| {
                let name = format!("job-{}", i);
                let delay = Duration::from_millis(self.delay_ms.saturating_mul(i % 3 + 1) / 2);
                match self.fail_every {
                    Some(k) if i % k == 0 => Job::from_fn(name, move |_ctx| async move {
                        tokio::time::sleep(delay).await;
                        Err(DispError::job("simulated failure"))
                    }),
                    _ => Job::delay(name, delay),
                }
            })
            .collect()
    }

    fn print_outcome(&self, outcome: &JobOutcome) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(outcome)?);
            return Ok(());
        }

        let elapsed = outcome.elapsed().as_secs_f64();
        match &outcome.status {
            OutcomeStatus::Completed => println!(
                "  {} {} on worker {} in {:.2}s",
                style("✓").green(),
                outcome.job_name,
                outcome.worker_id,
                elapsed
            ),
            status => println!(
                "  {} {} on worker {}: {:?}",
                style("✗").red(),
                outcome.job_name,
                outcome.worker_id,
                status
            ),
        }
        Ok(())
    }
}

fn init_tracing(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let result = if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))
}
