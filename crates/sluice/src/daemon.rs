//! Daemon lifecycle
//!
//! Builds pipelines from the config file, runs them until a signal
//! arrives, and tears them down with a bounded deadline. `SIGHUP`
//! stops everything and rebuilds from the config file in place;
//! `SIGINT`/`SIGTERM` shut down for good. A fatally failed pipeline
//! (output gave up under the `fatal` policy) also ends the process,
//! with a non-zero exit.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sluice_config::{default_maxprocs, Config, OutputCommon, PipelineConfig};
use sluice_metrics::{parse_listen_addr, MetricsRegistry, MetricsServer};
use sluice_pipeline::{ActionSpec, BatcherOptions, Condition, Matcher, Pipeline, PipelineOptions};
use sluice_plugin::PluginRegistry;

/// Deadline for graceful pipeline shutdown, both on signals and on
/// SIGHUP restarts.
pub const STOP_DEADLINE: Duration = sluice_pipeline::DEFAULT_STOP_TIMEOUT;

/// Daemon invocation arguments (mirrors the CLI flags).
#[derive(Debug, Clone)]
pub struct DaemonArgs {
    pub config: PathBuf,
    /// Listen address for `/metrics`; `"off"` disables the endpoint.
    pub http: String,
}

/// Run until shutdown. Returns an error for fatal conditions: bad
/// config at start or reload, or a pipeline that failed fatally.
pub async fn run(args: DaemonArgs) -> Result<()> {
    let registry = sluice_plugins::default_registry();
    let metrics = MetricsRegistry::new();

    let http_cancel = CancellationToken::new();
    let http_task = if args.http == "off" {
        info!("http endpoint disabled");
        None
    } else {
        let addr = parse_listen_addr(&args.http).context("invalid --http address")?;
        Some(
            MetricsServer::new(metrics.clone(), addr)
                .spawn(http_cancel.clone())
                .await
                .context("can't start http endpoint")?,
        )
    };

    let (failure_tx, mut failure_rx) = mpsc::unbounded_channel::<String>();
    let mut pipelines = start_pipelines(&args.config, &registry, &metrics, &failure_tx).await?;

    let result = run_signal_loop(
        &args,
        &registry,
        &metrics,
        &failure_tx,
        &mut failure_rx,
        &mut pipelines,
    )
    .await;

    stop_pipelines(&mut pipelines).await;
    http_cancel.cancel();
    if let Some(task) = http_task {
        let _ = task.await;
    }

    info!("see you soon...");
    result
}

async fn run_signal_loop(
    args: &DaemonArgs,
    registry: &PluginRegistry,
    metrics: &MetricsRegistry,
    failure_tx: &mpsc::UnboundedSender<String>,
    failure_rx: &mut mpsc::UnboundedReceiver<String>,
    pipelines: &mut Vec<PipelineHandle>,
) -> Result<()> {
    let mut sighup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        .context("can't install SIGHUP handler")?;
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("can't install SIGTERM handler")?;

    loop {
        tokio::select! {
            _ = sighup.recv() => {
                info!("SIGHUP received, restarting pipelines");
                stop_pipelines(pipelines).await;
                *pipelines = start_pipelines(&args.config, registry, metrics, failure_tx)
                    .await
                    .context("restart after SIGHUP failed")?;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received");
                return Ok(());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("SIGINT received");
                return Ok(());
            }
            Some(name) = failure_rx.recv() => {
                error!(pipeline = %name, "pipeline failed, shutting down");
                anyhow::bail!("pipeline {name} failed");
            }
        }
    }
}

/// One running pipeline plus its failure watcher.
pub struct PipelineHandle {
    pub pipeline: Pipeline,
    watcher: JoinHandle<()>,
}

/// Load the config file and start every pipeline in it.
pub async fn start_pipelines(
    path: &Path,
    registry: &PluginRegistry,
    metrics: &MetricsRegistry,
    failure_tx: &mpsc::UnboundedSender<String>,
) -> Result<Vec<PipelineHandle>> {
    let config = Config::from_file(path).context("can't load config")?;
    metrics.reset();

    let mut handles = Vec::with_capacity(config.pipelines.len());
    for (name, pipeline_config) in &config.pipelines {
        let pipeline = build_pipeline(name, pipeline_config, registry, metrics)
            .with_context(|| format!("pipeline {name}"))?;
        pipeline
            .start(registry)
            .await
            .with_context(|| format!("pipeline {name}"))?;

        let watcher = {
            let failed = pipeline.failed_token();
            let tx = failure_tx.clone();
            let name = name.clone();
            tokio::spawn(async move {
                failed.cancelled().await;
                let _ = tx.send(name);
            })
        };
        handles.push(PipelineHandle { pipeline, watcher });
    }

    info!(count = handles.len(), "pipelines started");
    Ok(handles)
}

/// Stop every pipeline with the bounded deadline.
pub async fn stop_pipelines(pipelines: &mut Vec<PipelineHandle>) {
    for handle in pipelines.drain(..) {
        handle.watcher.abort();
        if let Err(e) = handle.pipeline.stop(STOP_DEADLINE).await {
            warn!(pipeline = %handle.pipeline.name(), error = %e, "pipeline stop reported an error");
        }
    }
}

/// Translate one pipeline's config into a wired [`Pipeline`].
pub fn build_pipeline(
    name: &str,
    config: &PipelineConfig,
    registry: &PluginRegistry,
    metrics: &MetricsRegistry,
) -> Result<Pipeline> {
    let settings = &config.settings;
    let env = settings.expression_env(default_maxprocs());

    let workers = settings.workers_count.resolve(&env)?.max(1) as usize;
    let common = OutputCommon::from_section(&config.output)?;
    let (output_workers, batch_count) = common.resolve(&env)?;

    let options = PipelineOptions {
        capacity: settings.capacity,
        workers,
        avg_event_size: settings.avg_log_size,
        max_event_size: settings.max_event_size,
        stream_field: settings.stream_field.clone(),
        antispam_threshold: settings.antispam_threshold,
        decoder: settings.decoder,
        strict_decoding: settings.strict_decoding,
        maintenance_interval: settings.maintenance_interval,
        event_timeout: settings.event_timeout,
        rate_limit_bytes: settings.rate_limit_bytes,
        batcher: BatcherOptions {
            workers: output_workers,
            size_count: batch_count,
            size_bytes: common.batch_size_bytes,
            flush_timeout: common.flush_timeout,
            retry_attempts: common.retry_attempts,
            retry_backoff: common.retry_backoff,
            fail_policy: common.fail_policy,
        },
    };

    let pipeline = Pipeline::new(name, options);
    metrics.with(|r| pipeline.register_metrics(r));

    let input = registry.create_input(&config.input.kind)?;
    pipeline.set_input(input, config.input.options_value());

    let output = registry.create_output(&config.output.kind)?;
    pipeline.set_output(output, config.output.options_value());

    let mut specs = Vec::with_capacity(config.actions.len());
    for action in &config.actions {
        if !registry.has_action(&action.kind) {
            anyhow::bail!("unknown action plugin: {}", action.kind);
        }
        let mut conditions = Vec::with_capacity(action.match_fields.len());
        for (field, needle) in &action.match_fields {
            conditions.push(Condition::new(field, needle)?);
        }
        specs.push(ActionSpec {
            name: action.kind.clone(),
            matcher: Matcher::new(conditions, action.match_mode, action.match_invert),
            config: action.options_value(),
        });
    }
    pipeline.set_actions(specs);

    Ok(pipeline)
}
