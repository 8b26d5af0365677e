use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use anyhow::{Result, bail};
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

use agentdesk::core::conversation::{ConversationError, RunSettlement, SendOutcome, SkipReason};
use agentdesk::core::terminal::{
    self, GuideSection, print_attachment, print_info, print_message, print_success, print_waiting,
    print_warn,
};
use agentdesk::core::types::{Agent, FileUpload, Role};

use super::{Desk, Notified, flag_value};

fn print_chat_help() {
    GuideSection::new("Chat")
        .command("<text>", "Send a message to the agent")
        .command("/attach <path>", "Upload a file and attach it to the next message")
        .command("/detach <file_id>", "Drop a pending attachment")
        .command("/files", "List pending attachments")
        .command("/new", "Start a fresh thread with this agent")
        .command("/cancel", "Cancel the in-flight run")
        .command("/quit", "Leave the chat")
        .print();
}

fn prompt() {
    print!("{} ", style("›").cyan().bold());
    let _ = std::io::stdout().flush();
}

async fn pick_agent(desk: &Desk, requested: Option<String>) -> Result<Agent> {
    let agents = desk.chat.load_agents().await.notified()?;
    if let Some(target) = requested {
        return match desk.chat.find_agent(&target) {
            Some(agent) => Ok(agent),
            None => bail!("no agent matches '{}'", target),
        };
    }
    if agents.is_empty() {
        bail!("no agents exist yet; create one with `agentdesk agent create`");
    }
    let names: Vec<String> = agents.iter().map(|a| a.name.clone()).collect();
    let choice = inquire::Select::new("Chat with which agent?", names).prompt()?;
    desk.chat
        .find_agent(&choice)
        .ok_or_else(|| anyhow::anyhow!("agent '{}' disappeared", choice))
}

/// Prints messages of the open thread not shown yet.
fn print_unseen(desk: &Desk, agent_name: &str, seen: &mut HashSet<String>) {
    for message in desk.chat.snapshot().messages {
        if !seen.insert(message.id.clone()) {
            continue;
        }
        let is_user = message.role == Role::User;
        let speaker = if is_user { "You" } else { agent_name };
        print_message(speaker, is_user, &message.text());
        for id in message.attachment_ids() {
            println!("  {} {}", terminal::PAPERCLIP, style(id).dim());
        }
    }
}

async fn attach(desk: &Desk, path: &str) {
    let upload = match FileUpload::from_path(Path::new(path)).await {
        Ok(upload) => upload,
        Err(e) => {
            print_warn(&format!("Cannot read {}: {}", path, e));
            return;
        }
    };
    print_waiting(&format!("Uploading {}...", upload.filename));
    if let Ok(file) = desk.chat.upload_attachment(upload).await {
        print_attachment(&file.filename, &file.id);
    }
}

fn report_settlement(settled: RunSettlement) {
    match settled {
        RunSettlement::Completed(_) => {}
        // The notifier has already reported these.
        RunSettlement::Unsuccessful(_) | RunSettlement::PollFailed(_) => {}
        RunSettlement::Abandoned => print_info("Stopped waiting for the previous run."),
    }
}

pub async fn run_chat(desk: &Desk, args: &[String]) -> Result<()> {
    let requested = flag_value(args, "--agent", "-a")
        .or_else(|| args.get(2).filter(|a| !a.starts_with('-')).cloned());
    let agent = pick_agent(desk, requested).await?;
    let agent_name = agent.name.clone();

    print_waiting(&format!("Opening a thread with {}...", agent_name));
    let thread = desk.chat.select_agent(agent).await.notified()?;
    print_success(&format!("Chatting with {} (thread {}).", agent_name, thread.id));
    print_chat_help();
    println!();

    let mut seen = HashSet::new();
    print_unseen(desk, &agent_name, &mut seen);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending: Option<JoinHandle<RunSettlement>> = None;
    prompt();

    loop {
        tokio::select! {
            settled = async {
                match pending.as_mut() {
                    Some(handle) => handle.await,
                    None => std::future::pending().await,
                }
            } => {
                pending = None;
                if let Ok(settled) = settled {
                    report_settlement(settled);
                }
                print_unseen(desk, &agent_name, &mut seen);
                prompt();
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let line = line.trim();
                let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
                let rest = rest.trim();
                match cmd {
                    "/quit" | "/exit" => break,
                    "/help" => print_chat_help(),
                    "/attach" if !rest.is_empty() => attach(desk, rest).await,
                    "/detach" if !rest.is_empty() => match desk.chat.remove_attachment(rest) {
                        Some(file) => print_info(&format!("Detached {}.", file.filename)),
                        None => print_warn(&format!("No pending attachment {}.", rest)),
                    },
                    "/files" => {
                        let files = desk.chat.snapshot().attachments;
                        if files.is_empty() {
                            print_info("No pending attachments.");
                        }
                        for file in files {
                            print_attachment(&file.filename, &file.id);
                        }
                    }
                    "/new" => match desk.chat.new_chat().await {
                        Ok(thread) => {
                            seen.clear();
                            print_success(&format!("New thread {}.", thread.id));
                        }
                        Err(ConversationError::Gateway(_) | ConversationError::Superseded) => {}
                        Err(e) => print_warn(&format!("Could not start a new thread: {}", e)),
                    },
                    "/cancel" => match desk.chat.cancel_run().await {
                        Ok(true) => print_waiting("Cancelling run..."),
                        Ok(false) => print_info("No run in flight."),
                        Err(_) => {}
                    },
                    c if c.starts_with('/') => {
                        print_warn(&format!("Unknown command {}. Try /help.", c))
                    }
                    _ => match desk.chat.send_message(line).await {
                        Ok(SendOutcome::Started(ticket)) => {
                            seen.insert(ticket.message.id.clone());
                            print_waiting(&format!("{} is thinking...", agent_name));
                            pending = Some(tokio::spawn(ticket.settled()));
                            continue;
                        }
                        Ok(SendOutcome::Skipped(SkipReason::RunInFlight)) => {
                            print_warn("Still waiting on the agent. Use /cancel to stop it.");
                        }
                        Ok(SendOutcome::Skipped(_)) => {}
                        Err(_) => {}
                    },
                }
                prompt();
            }
        }
    }

    terminal::print_goodbye();
    Ok(())
}
