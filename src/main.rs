mod cli;

use agentdesk::core::terminal;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_main().await {
        let err_msg = e.to_string();
        if err_msg.contains("canceled") || err_msg.contains("OperationInterrupted") {
            terminal::print_goodbye();
        } else if e.downcast_ref::<cli::AlreadyReported>().is_some() {
            std::process::exit(1);
        } else {
            terminal::print_error(&format!("{:#}", e));
            std::process::exit(1);
        }
    }
}
