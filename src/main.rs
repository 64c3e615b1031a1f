use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match policyctl_lib::cli::run_cli().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}
