use anyhow::{Result, bail};
use console::style;

use agentdesk::core::terminal::{
    GuideSection, print_error, print_info, print_status, print_step, print_success, print_waiting,
};
use agentdesk::core::types::{WorkflowExecution, WorkflowInputs};
use agentdesk::core::workflow::{ExecutionTicket, WorkflowSettlement};

use super::{Desk, Notified, flag_values, format_time};

pub async fn list_workflows(desk: &Desk) -> Result<()> {
    let names = desk.flows.list_workflows().await.notified()?;
    if names.is_empty() {
        print_info("The backend has no workflows.");
        return Ok(());
    }
    let mut section = GuideSection::new("Workflows");
    for name in &names {
        let required = desk.flows.required_inputs(name);
        let about = if required.is_empty() {
            String::new()
        } else {
            format!("requires {}", required.join(", "))
        };
        section = section.command(name, &about);
    }
    section.print();
    println!();
    Ok(())
}

pub async fn run_workflow_command(desk: &Desk, args: &[String]) -> Result<()> {
    let sub_cmd = if args.len() > 2 { args[2].as_str() } else { "" };
    let target = args.get(3).filter(|a| !a.starts_with('-')).cloned();
    match (sub_cmd, target) {
        ("run", Some(name)) => run(desk, &name, &args[4..]).await,
        ("history", _) => history(desk).await,
        ("show", Some(id)) => show(desk, &id).await,
        ("delete", Some(id)) => {
            desk.flows.delete(&id).await.notified()?;
            print_success(&format!("Execution {} deleted.", id));
            Ok(())
        }
        _ => {
            println!("{}", style("Usage: agentdesk workflow <command>").bold());
            println!("  • run <name>       Run a workflow");
            println!("                     Options: --input key=value (repeatable)");
            println!("  • history          List past executions, newest first");
            println!("  • show <id>        Show an execution, following it while active");
            println!("  • delete <id>      Delete an execution");
            Ok(())
        }
    }
}

/// Collects `--input key=value` pairs.
pub(crate) fn parse_inputs(args: &[String]) -> Result<WorkflowInputs> {
    let mut inputs = WorkflowInputs::new();
    for pair in flag_values(args, "--input", "-i") {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("input '{}' must look like key=value", pair);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("input '{}' has an empty key", pair);
        }
        inputs.insert(key.to_string(), value.to_string());
    }
    Ok(inputs)
}

async fn run(desk: &Desk, name: &str, args: &[String]) -> Result<()> {
    let mut inputs = parse_inputs(args)?;
    for field in desk.flows.missing_inputs(name, &inputs) {
        let value = inquire::Text::new(&format!("{}:", field))
            .with_help_message(&format!("Required by {}", name))
            .prompt()?;
        inputs.insert(field, value);
    }

    print_waiting(&format!("Submitting {}...", name));
    let ticket = desk.flows.start(name, inputs).await.notified()?;
    print_status("Execution", &ticket.execution.execution_id);
    follow(desk, ticket).await
}

/// Waits on an execution, asking for approval each time it pauses.
async fn follow(desk: &Desk, mut ticket: ExecutionTicket) -> Result<()> {
    loop {
        print_waiting(&format!(
            "{} is {}...",
            ticket.execution.workflow_name,
            ticket.execution.status.as_str()
        ));
        match ticket.settled().await {
            WorkflowSettlement::AwaitingApproval(exec) => {
                print_execution(&exec);
                match ask_approval(desk, &exec).await? {
                    Some(next) => ticket = next,
                    None => return Ok(()),
                }
            }
            WorkflowSettlement::Completed(exec) => {
                print_execution(&exec);
                print_success(&format!("{} completed.", exec.workflow_name));
                return Ok(());
            }
            WorkflowSettlement::Failed(exec) => {
                print_execution(&exec);
                return Err(super::AlreadyReported.into());
            }
            WorkflowSettlement::PollFailed(_) => return Err(super::AlreadyReported.into()),
            WorkflowSettlement::Abandoned => {
                print_info("Stopped following the execution.");
                return Ok(());
            }
        }
    }
}

async fn ask_approval(desk: &Desk, exec: &WorkflowExecution) -> Result<Option<ExecutionTicket>> {
    let approve = inquire::Confirm::new("Approve and continue?")
        .with_default(true)
        .with_help_message("The workflow stays paused until approved")
        .prompt()?;
    if !approve {
        print_info(&format!(
            "Left waiting. Resume with `agentdesk workflow show {}`.",
            exec.execution_id
        ));
        return Ok(None);
    }
    let ticket = desk.flows.approve(&exec.execution_id).await.notified()?;
    Ok(Some(ticket))
}

async fn history(desk: &Desk) -> Result<()> {
    desk.flows.refresh_history().await.notified()?;
    let history = desk.flows.snapshot().history;
    if history.is_empty() {
        print_info("No executions yet.");
        return Ok(());
    }
    println!();
    for exec in &history {
        println!(
            "  {} {} {} {}",
            style(format_time(exec.created_at)).dim(),
            style(format!("{:<20}", exec.workflow_name)).bold(),
            style(format!("{:<20}", exec.status.as_str())).cyan(),
            style(&exec.execution_id).dim()
        );
    }
    println!();
    Ok(())
}

async fn show(desk: &Desk, execution_id: &str) -> Result<()> {
    desk.flows.refresh_history().await.notified()?;
    let Some(exec) = desk.flows.find_in_history(execution_id) else {
        print_error(&format!("No execution {} in history.", execution_id));
        return Ok(());
    };
    match desk.flows.select_from_history(exec.clone()) {
        Some(ticket) => follow(desk, ticket).await,
        None => {
            print_execution(&exec);
            if exec.status.is_waiting()
                && let Some(ticket) = ask_approval(desk, &exec).await?
            {
                return follow(desk, ticket).await;
            }
            Ok(())
        }
    }
}

fn print_execution(exec: &WorkflowExecution) {
    println!();
    print_status("Workflow", &exec.workflow_name);
    print_status("Status", exec.status.as_str());
    print_status("Started", &format_time(exec.created_at));
    if let Some(plan) = exec.plan() {
        print_step("Plan");
        for line in plan.lines() {
            println!("  {}", line);
        }
    }
    for step in exec.steps() {
        let when = step
            .timestamp
            .as_ref()
            .map(|t| format!("{} ", t))
            .unwrap_or_default();
        println!(
            "  {}{} {} {}",
            style(when).dim(),
            style(&step.agent).bold().magenta(),
            style(&step.action).cyan(),
            step.display_details()
        );
    }
    println!();
}
