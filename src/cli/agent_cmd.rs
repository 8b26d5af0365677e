use anyhow::Result;
use console::style;

use agentdesk::core::terminal::{print_error, print_info, print_success, print_warn};
use agentdesk::core::types::AgentDraft;

use super::{Desk, Notified, flag_value, flag_values, format_time};

pub async fn list_agents(desk: &Desk) -> Result<()> {
    let agents = desk.chat.load_agents().await.notified()?;
    if agents.is_empty() {
        print_info("No agents yet. Create one with `agentdesk agent create`.");
        return Ok(());
    }
    println!();
    for agent in &agents {
        println!(
            "  {} {} {}",
            style(format!("{:<20}", agent.name)).bold().green(),
            style(format!("{:<14}", agent.model)).cyan(),
            style(&agent.id).dim()
        );
        if !agent.tools.is_empty() {
            println!("    tools: {}", agent.tools.join(", "));
        }
        println!("    created {}", style(format_time(agent.created_at)).dim());
    }
    println!();
    Ok(())
}

pub async fn run_agent_command(desk: &Desk, args: &[String]) -> Result<()> {
    let sub_cmd = if args.len() > 2 { args[2].as_str() } else { "" };
    match sub_cmd {
        "create" | "new" => create_agent(desk, &args[3..]).await,
        "delete" | "remove" => {
            let Some(target) = args.get(3) else {
                print_error("Usage: agentdesk agent delete <id|name>");
                return Ok(());
            };
            delete_agent(desk, target).await
        }
        _ => {
            println!("{}", style("Usage: agentdesk agent <command>").bold());
            println!("  • create           Create an agent");
            println!("                     Options: --name <n> --model <m> --instructions <text>");
            println!("                              --tool <t> (repeatable)");
            println!("  • delete <id|name> Delete an agent permanently");
            Ok(())
        }
    }
}

async fn create_agent(desk: &Desk, args: &[String]) -> Result<()> {
    let name = match flag_value(args, "--name", "-n") {
        Some(name) => name,
        None => inquire::Text::new("Agent name:")
            .with_help_message("Shown in the agent list and used to pick it for chat")
            .prompt()?,
    };
    let instructions = match flag_value(args, "--instructions", "") {
        Some(text) => text,
        None => inquire::Text::new("Instructions:")
            .with_help_message("System prompt the agent runs with")
            .prompt()?,
    };
    let model = flag_value(args, "--model", "-m").unwrap_or_default();
    let draft =
        AgentDraft::new(name, model, instructions).with_tools(flag_values(args, "--tool", "-t"));

    match desk.chat.create_agent(draft).await.notified()? {
        Some(agent) => {
            print_success(&format!("Agent '{}' created ({}).", agent.name, agent.id));
        }
        None => print_warn("Name and instructions are both required; nothing was created."),
    }
    Ok(())
}

async fn delete_agent(desk: &Desk, target: &str) -> Result<()> {
    desk.chat.load_agents().await.notified()?;
    let Some(agent) = desk.chat.find_agent(target) else {
        print_error(&format!("No agent matches '{}'.", target));
        return Ok(());
    };
    let confirm = inquire::Confirm::new(&format!("Delete agent '{}'?", agent.name))
        .with_default(false)
        .prompt()?;
    if !confirm {
        print_info("Kept.");
        return Ok(());
    }
    desk.chat.delete_agent(&agent.id).await.notified()?;
    print_success(&format!("Agent '{}' deleted.", agent.name));
    Ok(())
}
