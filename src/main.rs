// SPDX-License-Identifier: MIT

use clap::{Parser, Subcommand};
use dotenv::dotenv;

use accessflow::config::Settings;
use accessflow::engine::gateway::ResumptionGateway;
use accessflow::engine::nodes::{
    ApprovalOpsNode, CommunicationNode, ProvisioningNode, TicketingNode,
};
use accessflow::engine::resolver::{ApprovalHierarchy, ApprovalResolver};
use accessflow::engine::router::{Router, RouterConfig};
use accessflow::engine::store::WorkflowStore;
use accessflow::oracle::llm::ChatOracle;
use accessflow::ports::jira::JiraClient;
use accessflow::ports::mail::MailRelayClient;
use accessflow::ports::provisioning::HttpProvisioner;
use accessflow::ports::slack::SlackClient;
use accessflow::ports::{CommunicationPort, IssueTrackerPort, MailPort, ProvisioningPort};

use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the webhook server and approval poller
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },
    /// Resolve the approver chain for a requester and exit
    Resolve {
        /// Requester id (email)
        #[arg(short, long)]
        email: String,
    },
}

fn load_resolver(settings: &Settings) -> ApprovalResolver {
    match ApprovalResolver::from_file(&settings.hierarchy_path) {
        Ok(resolver) => resolver,
        Err(e) => {
            log::warn!(
                "Could not load hierarchy from {}: {}; using empty hierarchy",
                settings.hierarchy_path,
                e
            );
            ApprovalResolver::new(ApprovalHierarchy::default())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let settings = Settings::from_env();

    match args.command {
        Commands::Serve { port } => {
            let resolver = Arc::new(load_resolver(&settings));

            let chat: Arc<dyn CommunicationPort> = Arc::new(SlackClient::new()?);
            let tracker: Arc<dyn IssueTrackerPort> = Arc::new(JiraClient::new()?);
            let mail: Arc<dyn MailPort> = Arc::new(MailRelayClient::new()?);
            let provisioner: Arc<dyn ProvisioningPort> = Arc::new(HttpProvisioner::new()?);
            let oracle = Arc::new(ChatOracle::new(settings.oracle_model.clone())?);

            let router = Arc::new(Router::new(
                WorkflowStore::new(),
                oracle,
                RouterConfig {
                    cap_simple: settings.cap_simple,
                    cap_full: settings.cap_full,
                    poll_interval: settings.poll_interval,
                },
                CommunicationNode::new(chat.clone()),
                TicketingNode::new(tracker.clone(), settings.tracker_project.clone()),
                ApprovalOpsNode::new(resolver, tracker.clone(), mail),
                ProvisioningNode::new(provisioner),
            ));

            let gateway = Arc::new(ResumptionGateway::new(router, tracker, chat));
            accessflow::server::serve(port, gateway, settings.poll_interval).await?;
        }
        Commands::Resolve { email } => {
            let resolver = load_resolver(&settings);
            let approvers = resolver.resolve(&email)?;
            println!("Approvers for {}:", email);
            for approver in approvers {
                println!("  {}", approver);
            }
        }
    }

    Ok(())
}
