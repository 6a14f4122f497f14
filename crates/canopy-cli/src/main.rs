//! canopy - シナリオファイルを読み込んでオーケストレーションを一通り実行するデモ
//!
//! # フロー
//! 1. 設定（TOML）とシナリオ（JSON）を読む
//! 2. アプリケーションを登録して起動する
//! 3. シナリオ内のクラスタ報告を順に流す
//! 4. 必要なら undeploy してクラスタの終了を報告する
//! 5. 公開されたイベントと最終状態を JSON で出力する

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use canopy_core::app::BuildError;
use canopy_core::config::ConfigError;
use canopy_core::domain::{
    Application, ApplicationId, ApplicationPolicy, ClusterId, ClusterStatus, ControllerError,
    DeploymentPolicy, InstanceId, OrchestrationError,
};
use canopy_core::impls::{BroadcastEventSink, InMemoryPolicyStore};
use canopy_core::ports::{ApplicationClusterContext, CloudController};
use canopy_core::{Orchestrator, OrchestratorBuilder, OrchestratorConfig};

#[derive(Parser)]
#[command(name = "canopy")]
#[command(about = "Run a lifecycle orchestration scenario against in-memory adapters", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, env = "CANOPY_CONFIG")]
    config: Option<PathBuf>,

    /// Scenario file (JSON)
    #[arg(short, long, default_value = "demos/two_tier.json")]
    fixture: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Scenario はデモ 1 回分の入力
#[derive(Debug, Deserialize)]
struct Scenario {
    application: Application,
    application_policy: ApplicationPolicy,
    #[serde(default)]
    deployment_policies: Vec<DeploymentPolicy>,
    #[serde(default)]
    clusters: Vec<ApplicationClusterContext>,
    #[serde(default)]
    reports: Vec<ClusterReport>,
    #[serde(default)]
    undeploy: bool,
}

/// 省略した instance_id は起動した全アプリケーションインスタンスに適用する
#[derive(Debug, Deserialize)]
struct ClusterReport {
    cluster: ClusterId,
    #[serde(default)]
    instance_id: Option<InstanceId>,
    status: ClusterStatus,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to read scenario {path}: {source}")]
    Scenario {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scenario: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),
}

/// クラスタ作成依頼をログに出すだけのコントローラ
struct ConsoleCloudController;

#[async_trait]
impl CloudController for ConsoleCloudController {
    async fn create_application_clusters(
        &self,
        application_id: &ApplicationId,
        clusters: &[ApplicationClusterContext],
    ) -> Result<(), ControllerError> {
        for cluster in clusters {
            info!(
                application_id = %application_id,
                alias = %cluster.alias,
                cluster_id = %cluster.cluster_id,
                service_type = %cluster.service_type,
                "cluster requested"
            );
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "scenario failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => OrchestratorConfig::load(path)?,
        None => OrchestratorConfig::default(),
    };
    let raw = std::fs::read_to_string(&cli.fixture).map_err(|source| CliError::Scenario {
        path: cli.fixture.display().to_string(),
        source,
    })?;
    let scenario: Scenario = serde_json::from_str(&raw)?;

    let policies = Arc::new(InMemoryPolicyStore::new());
    for policy in scenario.deployment_policies {
        policies.add_deployment_policy(policy);
    }
    policies.add_application_policy(scenario.application_policy);

    let events = Arc::new(BroadcastEventSink::new(config.event_channel_capacity));
    let mut receiver = events.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => error!(error = %e, "failed to encode event"),
                },
                Err(RecvError::Lagged(skipped)) => error!(skipped, "event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let orchestrator = OrchestratorBuilder::new()
        .config(config)
        .policy_store(policies)
        .event_sink(events.clone())
        .cloud_controller(Arc::new(ConsoleCloudController))
        .build()
        .await?;

    let application_id = scenario.application.id.clone();
    let result = drive_scenario(
        &orchestrator,
        scenario.application,
        &scenario.clusters,
        &scenario.reports,
        scenario.undeploy,
    )
    .await;

    if let Some(view) = orchestrator.status(&application_id).await {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        info!(application_id = %application_id, "application no longer registered");
    }

    orchestrator.shutdown().await;
    drop(orchestrator);
    drop(events);
    // 送信側が全て落ちたので printer は残りを出し切って終わる
    let _ = printer.await;
    result
}

async fn drive_scenario(
    orchestrator: &Orchestrator,
    application: Application,
    clusters: &[ApplicationClusterContext],
    reports: &[ClusterReport],
    undeploy: bool,
) -> Result<(), CliError> {
    let application_id = application.id.clone();
    orchestrator.deploy_application(application, clusters).await?;
    let instances = orchestrator.start_application(&application_id).await?;
    info!(application_id = %application_id, instances = ?instances, "application started");

    for report in reports {
        let targets = match &report.instance_id {
            Some(id) => vec![id.clone()],
            None => instances.clone(),
        };
        for instance_id in &targets {
            orchestrator
                .on_cluster_status(&application_id, &report.cluster, instance_id, report.status)
                .await?;
        }
    }

    if undeploy {
        let aliases: Vec<ClusterId> = orchestrator
            .holder()
            .get_application(&application_id)
            .await
            .map(|app| {
                app.cluster_data_recursively()
                    .into_iter()
                    .map(|c| c.alias)
                    .collect()
            })
            .unwrap_or_default();
        orchestrator
            .application_builder()
            .handle_application_policy_undeployed(&application_id)
            .await;
        for alias in &aliases {
            for instance_id in &instances {
                orchestrator
                    .on_cluster_status(&application_id, alias, instance_id, ClusterStatus::Terminated)
                    .await?;
            }
        }
    }
    Ok(())
}
