//! feedhaul daemon entry point.
//!
//! Loads the YAML config, initializes logging, and runs one poller thread
//! per configured feed. The process exits when every poller has stopped
//! (suppression or transfer limit) or as soon as one fails fatally.

use std::path::Path;
use std::thread;

use anyhow::{bail, Context};
use tracing::{error, info};

use feedhaul::audit::FeedAuditor;
use feedhaul::config::AppConfig;
use feedhaul::logging;
use feedhaul::poller::{FeedPoller, NoSuppress, SuppressCheck, SuppressFlagFile};
use feedhaul::transport::SftpConnector;

// ============================================================
// ARGUMENTS
// ============================================================

fn get_config_path() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "feedhaul.yml".to_string()
}

fn get_feed_filter() -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--feed" && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

fn get_force() -> bool {
    std::env::args().any(|a| a == "--force")
}

// ============================================================
// MAIN
// ============================================================

fn main() -> anyhow::Result<()> {
    let config_path = get_config_path();
    let config = AppConfig::load(Path::new(&config_path))
        .with_context(|| format!("loading {config_path}"))?;
    let _guard = logging::init_logging(&config.logging);

    let force = get_force();
    let only = get_feed_filter();
    info!(
        config = %config_path,
        feeds = config.feeds.len(),
        force,
        "feedhaul starting"
    );

    let mut handles = Vec::new();
    for feed in &config.feeds {
        if only.as_deref().is_some_and(|name| name != feed.name) {
            continue;
        }

        let audit = FeedAuditor::open(&config.audit_dir, &feed.name)
            .with_context(|| format!("opening audit record for feed '{}'", feed.name))?;
        let suppress: Box<dyn SuppressCheck> = match &config.suppress_dir {
            Some(dir) => Box::new(SuppressFlagFile::new(dir.clone())),
            None => Box::new(NoSuppress),
        };
        let mut poller = FeedPoller::new(feed.clone(), audit, Box::new(SftpConnector))
            .with_context(|| format!("starting feed '{}'", feed.name))?
            .with_suppress(suppress);

        let name = feed.name.clone();
        let handle = thread::Builder::new()
            .name(format!("feed-{name}"))
            .spawn(move || poller.run(force))
            .with_context(|| format!("spawning poller thread for feed '{name}'"))?;
        handles.push((name, handle));
    }

    if handles.is_empty() {
        bail!("no feeds selected (config has {}, filter {:?})", config.feeds.len(), only);
    }

    let mut failed = false;
    for (name, handle) in handles {
        match handle.join() {
            Ok(Ok(())) => info!(feed = %name, "feed poller stopped"),
            Ok(Err(e)) => {
                error!(feed = %name, error = %e, "feed poller failed");
                failed = true;
            }
            Err(_) => {
                error!(feed = %name, "feed poller panicked");
                failed = true;
            }
        }
    }

    if failed {
        bail!("one or more feed pollers failed");
    }
    Ok(())
}
