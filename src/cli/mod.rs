mod agent_cmd;
mod chat;
mod workflow_cmd;

use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;
use tracing::{error, info};

use agentdesk::config::{self, ClientConfig};
use agentdesk::core::conversation::{ConversationError, ConversationOrchestrator};
use agentdesk::core::gateway::{Gateway, HttpGateway};
use agentdesk::core::notify::{Notice, Notifier};
use agentdesk::core::poller::PollingController;
use agentdesk::core::terminal::{self, GuideSection, print_error, print_status, print_success};
use agentdesk::core::workflow::{WorkflowError, WorkflowOrchestrator};
use agentdesk::logging;

/// Prints blocking notices the way the rest of the CLI prints errors.
struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, notice: Notice) {
        error!("{} failed: {}", notice.operation, notice.message);
        print_error(&notice.message);
    }
}

/// A failure the notifier has already shown; the process only needs to exit
/// non-zero.
#[derive(Debug, thiserror::Error)]
#[error("operation failed")]
pub struct AlreadyReported;

pub(crate) trait Notified<T> {
    fn notified(self) -> Result<T>;
}

impl<T> Notified<T> for Result<T, ConversationError> {
    fn notified(self) -> Result<T> {
        match self {
            Ok(v) => Ok(v),
            Err(ConversationError::Gateway(_)) => Err(AlreadyReported.into()),
            Err(e) => Err(e.into()),
        }
    }
}

impl<T> Notified<T> for Result<T, WorkflowError> {
    fn notified(self) -> Result<T> {
        match self {
            Ok(v) => Ok(v),
            Err(WorkflowError::Gateway(_)) => Err(AlreadyReported.into()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Everything a command needs: one gateway and poller shared by both
/// orchestrators.
pub(crate) struct Desk {
    pub config: ClientConfig,
    pub gateway: Arc<dyn Gateway>,
    pub chat: ConversationOrchestrator,
    pub flows: WorkflowOrchestrator,
}

impl Desk {
    fn connect(config: ClientConfig) -> Result<Self> {
        let gateway: Arc<dyn Gateway> = Arc::new(
            HttpGateway::new(&config.api_url)
                .with_context(|| format!("cannot use API base {}", config.api_url))?,
        );
        let poller = PollingController::new();
        let notifier: Arc<dyn Notifier> = Arc::new(TerminalNotifier);
        let chat = ConversationOrchestrator::new(
            Arc::clone(&gateway),
            poller.clone(),
            Arc::clone(&notifier),
            config.conversation_settings(),
        );
        let flows = WorkflowOrchestrator::new(
            Arc::clone(&gateway),
            poller,
            notifier,
            config.workflow_settings(),
        );
        Ok(Self {
            config,
            gateway,
            chat,
            flows,
        })
    }
}

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Core")
        .command("health", "Check that the backend is reachable")
        .command("chat --agent <id|name>", "Open an interactive chat with an agent")
        .print();

    GuideSection::new("Agents")
        .command("agents", "List agents")
        .command("agent create", "Create an agent (--name, --model, --instructions, --tool)")
        .command("agent delete <id|name>", "Delete an agent")
        .print();

    GuideSection::new("Workflows")
        .command("workflows", "List available workflows")
        .command("workflow run <name>", "Run a workflow (--input key=value ...)")
        .command("workflow history", "List past executions, newest first")
        .command("workflow show <id>", "Show an execution and follow it if active")
        .command("workflow delete <id>", "Delete an execution")
        .print();

    GuideSection::new("Options")
        .command("--api-url <url>", "Backend API base (overrides config and env)")
        .blank()
        .hint("agentdesk chat --agent Analyst", "")
        .hint("agentdesk workflow run hr-onboarding --input name=Kim --input role=Engineer", "")
        .print();

    println!(
        "\n {} {} <command> [subcommand]\n",
        style("Usage:").bold(),
        style("agentdesk").green()
    );
}

/// Removes `--api-url <url>` from anywhere in `args`.
pub(crate) fn parse_global_flags(args: &[String]) -> (Option<String>, Vec<String>) {
    let mut api_url = None;
    let mut rest = Vec::with_capacity(args.len());
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--api-url" => {
                if i + 1 < args.len() {
                    api_url = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => {
                rest.push(args[i].clone());
                i += 1;
            }
        }
    }
    (api_url, rest)
}

/// Value following `flag` (or its short form), if any.
pub(crate) fn flag_value(args: &[String], long: &str, short: &str) -> Option<String> {
    args.iter()
        .position(|a| a == long || (!short.is_empty() && a == short))
        .and_then(|i| args.get(i + 1))
        .cloned()
}

/// Every value following `flag` (or its short form), in order.
pub(crate) fn flag_values(args: &[String], long: &str, short: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == long || (!short.is_empty() && args[i] == short) {
            if let Some(v) = args.get(i + 1) {
                out.push(v.clone());
            }
            i += 2;
        } else {
            i += 1;
        }
    }
    out
}

/// Backend timestamps are unix seconds; shown in local time.
pub(crate) fn format_time(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_else(|| ts.to_string())
}

pub async fn run_main() -> Result<()> {
    let raw: Vec<String> = std::env::args().collect();
    let (api_url_flag, args) = parse_global_flags(&raw);

    let data_dir = config::data_dir();
    let mut cfg = ClientConfig::load(&data_dir)?;
    if let Some(url) = api_url_flag {
        cfg.api_url = url;
    }
    let log_file = logging::init(&data_dir, &cfg.log_level, cfg.log_to_stderr)?;
    info!("agentdesk starting against {}", cfg.api_url);

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    let desk = Desk::connect(cfg)?;
    let cmd = args[1].as_str();
    match cmd {
        "health" => {
            let health = desk.gateway.health().await.with_context(|| {
                format!("backend at {} is not reachable", desk.config.api_url)
            })?;
            print_success(&format!("Backend is {}", health.status));
            if let Some(service) = health.service {
                print_status("Service", &service);
            }
            print_status("API", &desk.config.api_url);
            print_status("Log file", &log_file.display().to_string());
        }
        "agents" => agent_cmd::list_agents(&desk).await?,
        "agent" => agent_cmd::run_agent_command(&desk, &args).await?,
        "chat" => chat::run_chat(&desk, &args).await?,
        "workflows" => workflow_cmd::list_workflows(&desk).await?,
        "workflow" => workflow_cmd::run_workflow_command(&desk, &args).await?,
        "help" | "--help" | "-h" => print_help(),
        other => {
            print_error(&format!("Unknown command '{}'.", other));
            print_help();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn api_url_flag_is_removed_wherever_it_appears() {
        let (url, rest) = parse_global_flags(&argv(&[
            "agentdesk",
            "chat",
            "--api-url",
            "http://10.0.0.2:8000/api/v1",
            "--agent",
            "Analyst",
        ]));
        assert_eq!(url.as_deref(), Some("http://10.0.0.2:8000/api/v1"));
        assert_eq!(rest, argv(&["agentdesk", "chat", "--agent", "Analyst"]));

        let (url, rest) = parse_global_flags(&argv(&["agentdesk", "agents", "--api-url"]));
        assert!(url.is_none());
        assert_eq!(rest, argv(&["agentdesk", "agents"]));
    }

    #[test]
    fn repeated_flags_keep_order() {
        let args = argv(&["workflow", "run", "x", "--input", "a=1", "-i", "b=2", "--input"]);
        assert_eq!(flag_values(&args, "--input", "-i"), vec!["a=1", "b=2"]);
        assert_eq!(flag_value(&args, "--input", "-i").as_deref(), Some("a=1"));
        assert_eq!(flag_value(&args, "--agent", ""), None);
    }
}
