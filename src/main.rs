use std::sync::Arc;

use clap::Parser;

use fnjudge::config::{CliArgs, Config};
use fnjudge::judge::Judge;
use fnjudge::language::Languages;
use fnjudge::sandbox::LocalSandboxProvider;
use fnjudge::web_server::build_server;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let Config {
        server: server_config,
        evaluation,
        languages,
        problems,
    } = cli.to_config()?;

    if evaluation.concurrency == 0 {
        log::warn!("Concurrency of 0 requested, running test cases one at a time");
    }

    let sandbox_root = evaluation.sandbox_root();
    std::fs::create_dir_all(&sandbox_root)?;
    log::info!(
        "Loaded {} problem(s), sandboxes under {}",
        problems.len(),
        sandbox_root.display()
    );

    let provider = Arc::new(LocalSandboxProvider::new(sandbox_root));
    let judge = Judge::new(evaluation, Languages::new(&languages), provider);

    let server = build_server(server_config, problems, judge)?;
    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
        }
    }

    server_handle.stop(true).await;
    log::info!("Shutdown complete");
    Ok(())
}
