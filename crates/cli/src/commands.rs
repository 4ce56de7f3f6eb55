use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};

use texgen_client::api::JobApi;
use texgen_client::auth::AuthenticatedClient;
use texgen_client::auth_api::{AuthApi, RegisterCredentials};
use texgen_client::config::ClientConfig;
use texgen_client::orchestrator::GenerationOrchestrator;
use texgen_client::poller::PollOutcome;
use texgen_client::session::AuthSession;
use texgen_client::transport::ReqwestTransport;
use texgen_core::job::{JobResult, JobStatus};
use texgen_core::reference::ReferenceImage;
use texgen_core::resolution::Resolution;
use texgen_core::subscription::SubscriptionPlan;
use texgen_core::types::JobId;

use crate::cli::Command;
use crate::printer;

/// How long to let the printer flush notices after the orchestrator is gone.
const PRINTER_DRAIN: Duration = Duration::from_secs(1);

struct GenerateArgs {
    prompt: String,
    images: Vec<PathBuf>,
    select: Option<usize>,
    modifications: Vec<String>,
    finalize: Option<Resolution>,
    output: Option<PathBuf>,
}

pub(crate) async fn run(command: Command, config: ClientConfig) -> anyhow::Result<()> {
    let transport = ReqwestTransport::new(&config.api_url, config.request_timeout())?;
    let client = AuthenticatedClient::new(Arc::new(transport), AuthSession::new());
    let auth = AuthApi::new(client.clone());

    if let Command::Register { name } = &command {
        let credentials = config
            .credentials
            .as_ref()
            .context("Set TEXGEN_EMAIL and TEXGEN_PASSWORD to register")?;
        let response = auth
            .register(&RegisterCredentials {
                email: credentials.email.clone(),
                password: credentials.password.clone(),
                name: name.clone(),
            })
            .await?;
        println!("{}", serde_json::to_string_pretty(&response.user)?);
        return Ok(());
    }

    let mut plan = config.plan;
    if let Some(credentials) = &config.credentials {
        let response = auth.login(credentials).await.context("Sign-in failed")?;
        plan = response.user.plan();
    }

    let api = JobApi::new(client);
    match command {
        Command::Generate {
            prompt,
            images,
            select,
            modifications,
            finalize,
            output,
        } => {
            let args = GenerateArgs {
                prompt,
                images,
                select,
                modifications,
                finalize,
                output,
            };
            generate(api, &config, plan, args).await
        }
        Command::Download { job_id, output } => {
            let texture = api.download(&JobId::from(job_id)).await?;
            let path = texture.save(output.as_deref()).await?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Gallery { page, limit } => print_textures(&api.list_public_textures(page, limit).await?),
        Command::Mine => print_textures(&api.list_user_textures().await?),
        Command::Visibility { job_id, public, .. } => {
            api.update_visibility(&JobId::from(job_id), public).await?;
            Ok(())
        }
        Command::Whoami => {
            let user = auth.current_user().await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
            Ok(())
        }
        Command::Register { .. } => Ok(()),
    }
}

async fn generate(
    api: JobApi,
    config: &ClientConfig,
    plan: SubscriptionPlan,
    args: GenerateArgs,
) -> anyhow::Result<()> {
    let mut references = Vec::with_capacity(args.images.len());
    for path in &args.images {
        references.push(load_reference(path).await?);
    }

    let orchestrator = GenerationOrchestrator::new(api, config.poll, plan);
    let printer = tokio::spawn(printer::run(orchestrator.subscribe()));

    let result = drive(&orchestrator, references, &args).await;
    if result.is_ok() {
        println!("{}", serde_json::to_string_pretty(&orchestrator.snapshot())?);
    }

    drop(orchestrator);
    if tokio::time::timeout(PRINTER_DRAIN, printer).await.is_err() {
        tracing::debug!("Event printer still running at exit");
    }
    result
}

async fn drive(
    orchestrator: &GenerationOrchestrator,
    references: Vec<ReferenceImage>,
    args: &GenerateArgs,
) -> anyhow::Result<()> {
    orchestrator.generate(&args.prompt, references).await?;
    settled(orchestrator.wait_for_job().await?)?;

    if let Some(position) = args.select {
        let index = position.checked_sub(1).context("Variations are numbered from 1")?;
        if !orchestrator.select_variation(index) {
            bail!("There is no variation {position}");
        }
    }

    for prompt in &args.modifications {
        orchestrator.modify(prompt).await?;
        settled(orchestrator.wait_for_job().await?)?;
    }

    if let Some(resolution) = args.finalize {
        orchestrator.finalize(resolution).await?;
        let outcome = settled(orchestrator.wait_for_job().await?)?;

        if let Some(output) = &args.output {
            let texture = orchestrator.download(&outcome.job_id).await?;
            let path = texture.save(Some(output)).await?;
            println!("{}", path.display());
        }
    } else if args.output.is_some() {
        tracing::warn!("--output ignored: only finalized textures can be downloaded");
    }
    Ok(())
}

fn settled(outcome: PollOutcome) -> anyhow::Result<PollOutcome> {
    if outcome.status == JobStatus::Failed {
        bail!("Job {} failed", outcome.job_id);
    }
    Ok(outcome)
}

async fn load_reference(path: &Path) -> anyhow::Result<ReferenceImage> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "reference".to_string());
    Ok(ReferenceImage::from_bytes(file_name, bytes)?)
}

fn print_textures(textures: &[JobResult]) -> anyhow::Result<()> {
    for texture in textures {
        println!("{}", serde_json::to_string(texture)?);
    }
    Ok(())
}
