use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _};
use atelier_core::config::{PipelineConfig, RenderModel};
use atelier_core::job::JobType;
use atelier_core::selection::GarmentItem;
use atelier_imaging::{GridComposer, GridOptions};
use atelier_pipeline::composite::{encode_base64, CompositeProducer, GridCompositeProducer};
use atelier_pipeline::orchestrator::{GenerationOrchestrator, OutfitRenderRequest, ReferenceAssets};
use atelier_pipeline::poller::JobPoller;
use atelier_pipeline::precompositor::BackgroundPreCompositor;
use atelier_remote::{RemoteClient, RemoteConfig};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "atelier-worker", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compose local garment photos into a grid JPEG.
    Compose(ComposeArgs),
    /// Poll a job until it is terminal.
    Watch(WatchArgs),
    /// Run a single-image job (headshot, body composite, product shot).
    Single(SingleArgs),
    /// Run the outfit pipeline end to end.
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct ComposeArgs {
    /// Output JPEG path.
    out: PathBuf,
    /// Source images, in grid order.
    #[arg(required = true)]
    images: Vec<PathBuf>,
    #[arg(long, default_value_t = GridOptions::default().canvas_width)]
    width: u32,
    #[arg(long, default_value_t = GridOptions::default().canvas_height)]
    height: u32,
    /// Also print the composite as base64 on stdout.
    #[arg(long)]
    base64: bool,
}

#[derive(Parser, Debug)]
struct WatchArgs {
    job_id: Uuid,
    /// Override the render preset's read budget.
    #[arg(long)]
    max_attempts: Option<u32>,
}

#[derive(Parser, Debug)]
struct SingleArgs {
    #[arg(long)]
    owner: Uuid,
    /// `headshot_generate`, `body_composite` or `product_shot`.
    #[arg(long)]
    job_type: String,
    /// Job input as JSON.
    #[arg(long, default_value = "{}")]
    input: String,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    #[arg(long)]
    owner: Uuid,
    #[arg(long)]
    outfit: Uuid,
    /// Reference full-body image URL.
    #[arg(long)]
    body: Option<String>,
    /// Reference face image URL.
    #[arg(long)]
    face: Option<String>,
    /// Override the render model's per-request item limit.
    #[arg(long)]
    model_limit: Option<usize>,
    /// Garments as `id=url` or `id=url#category`.
    #[arg(required = true)]
    items: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atelier_worker=debug,atelier_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Compose(args) => cmd_compose(args).await,
        Command::Watch(args) => cmd_watch(args).await,
        Command::Single(args) => cmd_single(args).await,
        Command::Render(args) => cmd_render(args).await,
    }
}

async fn cmd_compose(args: ComposeArgs) -> anyhow::Result<()> {
    let mut sources = Vec::with_capacity(args.images.len());
    for path in &args.images {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("read image '{}'", path.display()))?;
        sources.push(bytes);
    }

    let composer = GridComposer::new(GridOptions {
        canvas_width: args.width,
        canvas_height: args.height,
        ..GridOptions::default()
    });
    let jpeg = tokio::task::spawn_blocking(move || composer.compose_encoded(&sources)).await??;

    tokio::fs::write(&args.out, &jpeg)
        .await
        .with_context(|| format!("write jpeg '{}'", args.out.display()))?;
    tracing::info!(out = %args.out.display(), size_bytes = jpeg.len(), "Composite written");
    if args.base64 {
        println!("{}", encode_base64(&jpeg));
    }
    Ok(())
}

async fn cmd_watch(args: WatchArgs) -> anyhow::Result<()> {
    let config = PipelineConfig::from_env()?;
    let client = remote_client()?;
    let poller = JobPoller::new(client);

    let mut options = config.render_poll;
    if let Some(max_attempts) = args.max_attempts {
        options.max_attempts = max_attempts;
    }

    let job = poller.wait_for_terminal(args.job_id, options).await?;
    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}

async fn cmd_single(args: SingleArgs) -> anyhow::Result<()> {
    let job_type = JobType::from_name(&args.job_type)?;
    let input: serde_json::Value =
        serde_json::from_str(&args.input).context("--input must be valid JSON")?;

    let orchestrator = orchestrator(PipelineConfig::from_env()?, None)?;
    let job = run_cancellable(&orchestrator, orchestrator.run_single(args.owner, job_type, input))
        .await?;
    println!("{}", job.output_image().unwrap_or_default());
    Ok(())
}

async fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(limit) = args.model_limit {
        if limit == 0 {
            bail!("--model-limit must be at least 1");
        }
        config.render_model = RenderModel::new(config.render_model.name.clone(), limit);
    }

    let items = args
        .items
        .iter()
        .map(|raw| parse_item(raw))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let orchestrator = orchestrator(config, Some((args.owner, items.as_slice())))?;
    let request = OutfitRenderRequest {
        owner_id: args.owner,
        outfit_id: args.outfit,
        items,
        references: ReferenceAssets {
            body_image: args.body,
            face_image: args.face,
        },
    };

    let outcome = run_cancellable(&orchestrator, orchestrator.generate_outfit(request)).await?;
    tracing::info!(
        job_id = %outcome.job.id,
        working_copy_id = %outcome.working_copy_id,
        mannequin = outcome.mannequin_job.is_some(),
        "Render finished",
    );
    println!("{}", outcome.image_url);
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn remote_client() -> anyhow::Result<Arc<RemoteClient>> {
    let config = RemoteConfig::from_env()?;
    Ok(Arc::new(RemoteClient::new(&config)?))
}

/// Build the orchestrator. With a selection, a pre-compositor starts on
/// its grid while the working copy is being made.
fn orchestrator(
    config: PipelineConfig,
    selection: Option<(Uuid, &[GarmentItem])>,
) -> anyhow::Result<GenerationOrchestrator> {
    let client = remote_client()?;
    let producer: Arc<dyn CompositeProducer> = Arc::new(GridCompositeProducer::new(
        client.clone(),
        client.clone(),
        config.composite_bucket.clone(),
        GridComposer::default(),
    ));

    let precompositor = match selection {
        Some((owner_id, items)) if wants_precomposite(&config, items.len()) => {
            let pre = BackgroundPreCompositor::new(
                owner_id,
                Arc::clone(&producer),
                config.precomposite_enabled,
                config.precomposite_debounce,
            );
            pre.update_selection(items.to_vec());
            Some(Arc::new(pre))
        }
        _ => None,
    };

    let orchestrator = GenerationOrchestrator::new(client.clone(), client, producer, config);
    Ok(match precompositor {
        Some(pre) => orchestrator.with_precompositor(pre),
        None => orchestrator,
    })
}

/// Only selections that go through the mannequin stage use a composite.
fn wants_precomposite(config: &PipelineConfig, item_count: usize) -> bool {
    config.precomposite_enabled && config.render_model.needs_mannequin(item_count)
}

/// Run a pipeline call, cancelling local tracking on Ctrl-C.
async fn run_cancellable<T>(
    orchestrator: &GenerationOrchestrator,
    run: impl std::future::Future<Output = Result<T, atelier_pipeline::GenerationError>>,
) -> anyhow::Result<T> {
    tokio::pin!(run);
    let result = tokio::select! {
        result = &mut run => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, stopping local tracking");
            orchestrator.cancel().await;
            run.await
        }
    };
    result.map_err(|e| {
        let message = e.user_message();
        anyhow::Error::new(e).context(message)
    })
}

/// Parse `id=url` or `id=url#category`.
fn parse_item(raw: &str) -> anyhow::Result<GarmentItem> {
    let (id, rest) = raw
        .split_once('=')
        .with_context(|| format!("item '{raw}' must look like id=url"))?;
    if id.is_empty() || rest.is_empty() {
        bail!("item '{raw}' must look like id=url");
    }
    Ok(match rest.rsplit_once('#') {
        Some((url, category)) if !category.is_empty() => {
            GarmentItem::new(id, url).with_category(category)
        }
        _ => GarmentItem::new(id, rest),
    })
}
