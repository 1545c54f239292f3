//! Builds or loads the launch index and keeps it current until stdin closes.
//!
//! Reads its configuration from `LAUNCH_INDEX_CONFIG` (a JSON file) when set,
//! otherwise from the platform's well-known folders.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;

use launch_index::{IndexConfig, IndexService};

const CONFIG_ENV: &str = "LAUNCH_INDEX_CONFIG";

fn main() -> ExitCode {
    env_logger::init();

    let config = match std::env::var_os(CONFIG_ENV) {
        Some(path) => IndexConfig::from_file(&PathBuf::from(path)),
        None => IndexConfig::from_env(),
    };
    let config = match config {
        Ok(config) => config,
        Err(error) => {
            log::error!("failed to load index configuration: {error}");
            return ExitCode::FAILURE;
        }
    };

    let service = IndexService::new(config);
    service.on_index_changed(|items| {
        log::info!("index changed items={}", items.len());
    });

    let items = service.get_index();
    let stats = service.stats();
    log::info!(
        "index ready path={} total={} applications={} files={}",
        service.store().snapshot_path().display(),
        items.len(),
        stats.applications,
        stats.files,
    );
    for (extension, count) in &stats.by_extension {
        log::debug!("index extension={extension} count={count}");
    }

    if let Err(error) = service.start_watching() {
        log::warn!("index watcher disabled: {error}");
    }

    // Commands on stdin: `refresh`, `launch <path>`, anything else is ignored.
    for line in io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line == "refresh" {
            service.refresh();
        } else if let Some(path) = line.strip_prefix("launch ") {
            let outcome = service.launch(&PathBuf::from(path.trim()));
            log::info!("launch path={} ok={}", path.trim(), outcome.ok);
        }
    }

    service.close();
    ExitCode::SUCCESS
}
