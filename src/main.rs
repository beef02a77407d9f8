use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use permit_desk::config::AppConfig;
use permit_desk::error::AppError;
use permit_desk::store::memory::{demo_store, InMemoryPermitStore};
use permit_desk::telemetry;
use permit_desk::workflows::permits::{
    permit_router, BuildOptions, BuildRequest, PermitBuildOutcome, PermitBuildService,
    StubDocumentGenerator,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "Permit Desk",
    about = "Assemble and track roofing permit applications from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Permit application tooling for demos and spot checks
    Permits {
        #[command(subcommand)]
        command: PermitsCommand,
    },
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum PermitsCommand {
    /// Run a permit application build against the bundled demo tenant
    Build(PermitsBuildArgs),
}

#[derive(Args, Debug)]
struct PermitsBuildArgs {
    /// Tenant to build for
    #[arg(long, default_value = "t-demo")]
    tenant: String,
    /// Job to assemble the application for
    #[arg(long, default_value = "job-1001")]
    job: String,
    /// Estimate backing the application
    #[arg(long, default_value = "est-5005")]
    estimate: String,
    /// Compute everything but persist nothing
    #[arg(long)]
    dry_run: bool,
    /// Generate the application PDF, checklist, and submission packet
    #[arg(long)]
    documents: bool,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Permits {
            command: PermitsCommand::Build(args),
        } => run_demo_build(args),
    }
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    // The in-memory store backs the service until relational persistence is
    // wired in behind the same trait. Outside production it ships pre-seeded
    // with the demo tenant so the API is explorable immediately.
    let store = if config.environment.exposes_diagnostics() {
        Arc::new(demo_store())
    } else {
        Arc::new(InMemoryPermitStore::new())
    };
    let service = Arc::new(PermitBuildService::new(
        store,
        Arc::new(StubDocumentGenerator::new()),
        config.permits.parcel_cache_ttl_days,
    ));

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .merge(permit_router(
            service,
            config.environment.exposes_diagnostics(),
        ))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "permit desk ready");

    axum::serve(listener, app).await?;
    Ok(())
}

fn run_demo_build(args: PermitsBuildArgs) -> Result<(), AppError> {
    let PermitsBuildArgs {
        tenant,
        job,
        estimate,
        dry_run,
        documents,
    } = args;

    let store = Arc::new(demo_store());
    let service = PermitBuildService::new(store, Arc::new(StubDocumentGenerator::new()), 30);

    let outcome = service.build(BuildRequest {
        tenant_id: tenant,
        job_id: job,
        estimate_id: Some(estimate),
        options: Some(BuildOptions {
            dry_run,
            generate_application_pdf: documents,
            generate_packet_zip: documents,
            include_checklist_pdf: documents,
            auto_link_approvals: documents,
            ..BuildOptions::default()
        }),
    })?;

    render_build_outcome(&outcome, dry_run);
    Ok(())
}

fn render_build_outcome(outcome: &PermitBuildOutcome, dry_run: bool) {
    println!("Permit application build");
    println!(
        "Case {} ({}){}",
        outcome.permit_case.id,
        outcome.permit_case.status,
        if dry_run { " [dry run]" } else { "" }
    );

    if let Some(county) = &outcome.permit_case.jurisdiction.county_name {
        match &outcome.context_preview.authority_name {
            Some(authority) => println!("Jurisdiction: {county} County via {authority}"),
            None => println!("Jurisdiction: {county} County (no authority matched)"),
        }
    }

    println!("\nApplication fields");
    if outcome.application_field_values.is_empty() {
        println!("- none (no active template)");
    }
    for (key, value) in &outcome.application_field_values {
        println!("- {key}: {value}");
    }

    if !outcome.calculation_errors.is_empty() {
        println!("\nCalculation errors");
        for failure in &outcome.calculation_errors {
            for issue in &failure.issues {
                println!("- {}: {}", failure.field, issue.message);
            }
        }
    }

    if outcome.missing_items.is_empty() {
        println!("\nMissing items: none");
    } else {
        println!("\nMissing items");
        for finding in &outcome.missing_items {
            println!(
                "- [{}] {}: {}",
                finding.severity.label(),
                finding.key,
                finding.message
            );
        }
    }

    if !outcome.documents.is_empty() {
        println!("\nDocuments");
        for document in &outcome.documents {
            println!("- {} -> {}", document.kind.label(), document.signed_url);
        }
    }

    if !outcome.next_actions.is_empty() {
        println!("\nNext actions");
        for action in &outcome.next_actions {
            match &action.url {
                Some(url) => println!("- {} ({url})", action.label),
                None => println!("- {}", action.label),
            }
        }
    }
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
