use std::{process, sync::Arc};

use purgeline::{
    application::{error::AppError, feed},
    cache::{
        AssetSweeper, HookRegistry, Invalidator, NotificationLog, PurgeStatus, RequestSignals,
        Scheduler, guards, spawn_maintenance, sweep_dir,
    },
    config,
    infra::{backends, error::InfraError, telemetry},
};
use tokio::io::BufReader;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Run(config::RunArgs::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Run(_) => run_service(settings).await,
        config::Command::Purge(args) => run_purge(settings, args).await,
        config::Command::Probe(args) => run_probe(settings, args).await,
        config::Command::Sweep(args) => run_sweep(settings, args).await,
        config::Command::Guard(args) => run_guard(settings, args).await,
    }
}

struct ApplicationContext {
    invalidator: Arc<Invalidator>,
    hooks: HookRegistry,
    scheduler: Scheduler,
    sweeper: AssetSweeper,
}

fn build_application_context(settings: &config::Settings) -> Result<ApplicationContext, AppError> {
    let notifications = Arc::new(NotificationLog::new());
    let invalidator = Arc::new(backends::invalidator(settings, notifications)?);
    let sweeper = AssetSweeper::new(settings.assets.directory.clone());
    let hooks = HookRegistry::new(invalidator.clone(), sweeper.clone());

    Ok(ApplicationContext {
        invalidator,
        hooks,
        scheduler: Scheduler::new(),
        sweeper,
    })
}

async fn run_service(settings: config::Settings) -> Result<(), AppError> {
    let app = build_application_context(&settings)?;

    let registered = app.hooks.register();
    let maintenance_handle = if app.invalidator.config().autoflush {
        spawn_maintenance(
            &app.scheduler,
            app.invalidator.clone(),
            app.sweeper.clone(),
            settings.assets.sweep_interval,
        )
    } else {
        None
    };

    info!(
        target = "purgeline::run",
        hooks = registered,
        hostname = app.invalidator.config().site.hostname(),
        maintenance = maintenance_handle.is_some(),
        "Purgeline started"
    );

    // Keep serving the schedule after stdin closes.
    let feed_task = async {
        let stdin = BufReader::new(tokio::io::stdin());
        match feed::dispatch_lines(stdin, &app.hooks).await {
            Ok(summary) => info!(
                target = "purgeline::run",
                dispatched = summary.dispatched,
                ignored = summary.ignored,
                rejected = summary.rejected,
                "Trigger feed closed"
            ),
            Err(err) => warn!(target = "purgeline::run", error = %err, "Trigger feed failed"),
        }
        std::future::pending::<()>().await
    };

    let result = tokio::select! {
        _ = feed_task => Ok(()),
        signal = tokio::signal::ctrl_c() => {
            info!(target = "purgeline::run", "Shutdown requested");
            signal.map_err(|err| AppError::from(InfraError::Io(err)))
        }
    };

    if let Some(handle) = maintenance_handle {
        handle.abort();
        let _ = handle.await;
    }

    let pending = app.invalidator.notifications().len();
    info!(target = "purgeline::run", notifications = pending, "Purgeline stopped");
    result
}

async fn run_purge(settings: config::Settings, args: config::PurgeArgs) -> Result<(), AppError> {
    let app = build_application_context(&settings)?;
    let invalidator = &app.invalidator;

    let status = match args.scope {
        config::PurgeScope::Everything => invalidator.purge_everything().await,
        config::PurgeScope::Index => invalidator.purge_index().await,
        config::PurgeScope::Rest => invalidator.purge_rest_representation().await,
        config::PurgeScope::Url { url, exact } => invalidator.purge_url(&url, !exact).await,
        config::PurgeScope::Content { id } => invalidator.purge_content_and_dependents(id).await,
    };

    println!("{status}");
    ensure_succeeded(&status)
}

async fn run_probe(settings: config::Settings, args: config::ProbeArgs) -> Result<(), AppError> {
    let probe = backends::probe(&settings)?;
    let report = probe.probe(&args.url, !args.static_page, args.cdn).await;

    println!("{} (attempts: {})", report.result, report.attempts);
    Ok(())
}

async fn run_sweep(settings: config::Settings, args: config::SweepArgs) -> Result<(), AppError> {
    let directory = args.dir.unwrap_or(settings.assets.directory);
    let report = sweep_dir(&directory).await;

    println!(
        "removed {} files from {}",
        report.files_removed,
        directory.display()
    );
    if report.is_clean() {
        Ok(())
    } else {
        Err(AppError::unexpected(format!(
            "{} entries could not be swept",
            report.failures.len()
        )))
    }
}

async fn run_guard(settings: config::Settings, args: config::GuardArgs) -> Result<(), AppError> {
    let app = build_application_context(&settings)?;
    let signals = RequestSignals::from_iter(args.fields);

    let results = guards::evaluate(&app.invalidator, &signals).await;
    if results.is_empty() {
        println!("no guard triggered");
        return Ok(());
    }

    for (guard, status) in &results {
        println!("{guard}: {status}");
    }
    results
        .iter()
        .try_for_each(|(_, status)| ensure_succeeded(status))
}

fn ensure_succeeded(status: &PurgeStatus) -> Result<(), AppError> {
    if status.succeeded() {
        Ok(())
    } else {
        Err(AppError::purge_unsuccessful(status.to_string()))
    }
}
