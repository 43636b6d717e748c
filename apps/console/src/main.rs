use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use client_core::{ChannelOptions, ConsoleClient, ConsoleHandle, PublishParams};
use shared::domain::ConfigId;
use shared::protocol::Deployment;

mod settings;

use settings::load_settings;

#[derive(Parser, Debug)]
#[command(name = "console", about = "Operator console for the deploy control plane")]
struct Cli {
    /// Control API base url; overrides console.toml and the environment
    #[arg(long)]
    server_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List managed application ids
    Apps,
    /// Sync apps from the config repository, or one app when given
    Sync { app_id: Option<String> },
    /// List published configs for an app, newest first
    Configs { app_id: String },
    /// List config repository commits for an app
    Commits { app_id: String },
    /// List running instances for an app
    Instances { app_id: String },
    /// Publish a config for a commit
    Publish {
        app_id: String,
        #[arg(long)]
        commit_id: String,
        #[arg(long)]
        host: String,
        #[arg(long)]
        instance_id: String,
        #[arg(long)]
        version: String,
    },
    /// Remove a published config by id
    Rollback {
        app_id: String,
        #[arg(long)]
        id: i64,
    },
    /// List managed workloads
    Deployments,
    /// List image tags for a workload
    Tags { name: String },
    /// Show one workload with its autoscaler bounds
    Detail { name: String },
    /// Roll the workload image to a tag
    SetTag {
        name: String,
        #[arg(long)]
        tag: String,
    },
    /// Roll the workload back one revision
    RollbackDeployment { name: String },
    /// Restart the workload
    Restart { name: String },
    /// Scale the workload
    SetReplicas {
        name: String,
        #[arg(long)]
        replicas: i32,
    },
    /// Follow the live event stream for one workload until Ctrl-C
    Watch {
        name: String,
        /// Drop a status line identical to the previous one
        #[arg(long)]
        dedup: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = load_settings();
    let filter = settings
        .log_filter
        .clone()
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let cli = Cli::parse();
    let server_url = cli.server_url.unwrap_or(settings.server_url);
    debug!(server_url = %server_url, "console starting");
    let client = ConsoleClient::new(server_url);

    match cli.command {
        Command::Watch { name, dedup } => watch(&client, &name, dedup).await,
        command => run(&client, command).await,
    }
}

async fn run(client: &impl ConsoleHandle, command: Command) -> Result<()> {
    match command {
        Command::Apps => {
            let payload = client.list_apps().await?;
            for app_id in payload.app_ids {
                println!("{app_id}");
            }
        }
        Command::Sync { app_id } => {
            let payload = client.sync_app(app_id.as_deref()).await?;
            println!("synced {} apps", payload.app_ids.len());
            if let Some(head) = payload.head {
                println!("head {} @ {}", head.app_id, head.commit_id);
            }
        }
        Command::Configs { app_id } => {
            let payload = client.list_configs(&app_id).await?;
            for config in payload.configs {
                println!(
                    "#{} v{} host={} instance={} commit={}",
                    config.id.0, config.version, config.host, config.instance_id, config.commit_id
                );
            }
        }
        Command::Commits { app_id } => {
            let payload = client.list_commits(&app_id).await?;
            for commit in payload.commits {
                println!(
                    "{} {} ({} <{}>)",
                    commit.commit_id, commit.message, commit.author.name, commit.author.email
                );
            }
        }
        Command::Instances { app_id } => {
            let payload = client.list_instances(&app_id).await?;
            for instance in payload.instances {
                println!(
                    "{}/{} config #{} {}",
                    instance.host,
                    instance.instance_id,
                    instance.config_id.0,
                    instance.status.as_str()
                );
            }
        }
        Command::Publish {
            app_id,
            commit_id,
            host,
            instance_id,
            version,
        } => {
            let payload = client
                .publish_config(
                    &app_id,
                    PublishParams {
                        commit_id,
                        host,
                        instance_id,
                        version,
                    },
                )
                .await?;
            println!("published config #{}", payload.config.id.0);
        }
        Command::Rollback { app_id, id } => {
            let payload = client.rollback_config(&app_id, ConfigId(id)).await?;
            println!("rolled back config #{}", payload.config.id.0);
        }
        Command::Deployments => {
            let payload = client.list_deployments().await?;
            for deployment in payload.deployments {
                print_deployment(&deployment);
            }
        }
        Command::Tags { name } => {
            let payload = client.list_tags(&name).await?;
            for tag in payload.tags {
                println!("{tag}");
            }
        }
        Command::Detail { name } => {
            let payload = client.get_detail(&name).await?;
            match payload.deployment {
                Some(deployment) => {
                    print_deployment(&deployment);
                    if let Some(hpa) = payload.hpa {
                        println!("hpa replicas: {} - {}", hpa.min_replicas, hpa.max_replicas);
                    }
                }
                None => println!("workload {name} not found"),
            }
        }
        Command::SetTag { name, tag } => {
            let payload = client.set_version_tag(&name, &tag).await?;
            print_deployment(&payload.deployment);
        }
        Command::RollbackDeployment { name } => {
            let payload = client.rollback_deployment(&name).await?;
            print_deployment(&payload.deployment);
        }
        Command::Restart { name } => {
            let payload = client.restart_deployment(&name).await?;
            print_deployment(&payload.deployment);
        }
        Command::SetReplicas { name, replicas } => {
            let payload = client.set_replicas(&name, replicas).await?;
            print_deployment(&payload.deployment);
        }
        Command::Watch { .. } => unreachable!("watch is dispatched in main"),
    }
    Ok(())
}

fn print_deployment(deployment: &Deployment) {
    println!(
        "{} replicas={} revision={} image={}",
        deployment.name, deployment.replicas, deployment.revision, deployment.image
    );
}

async fn watch(client: &ConsoleClient, name: &str, dedup: bool) -> Result<()> {
    let options = ChannelOptions {
        dedup_consecutive: dedup,
        ..ChannelOptions::default()
    };
    let mut channel = client.open_events(name, options).await?;
    let mut updates = channel.log_updates();
    let mut printed = 0u64;

    for entry in channel.log_entries().await {
        println!("{}", entry.message);
        printed = entry.id;
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                channel.close().await;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        for entry in channel.log_entries().await {
            if entry.id > printed {
                println!("{}", entry.message);
                printed = entry.id;
            }
        }
        if channel.is_closed() {
            break;
        }
    }

    Ok(())
}
