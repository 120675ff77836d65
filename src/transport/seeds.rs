//! Seed resolution for the launch step.

use std::collections::HashSet;
use std::net::SocketAddr;

use tokio::net::lookup_host;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::NetworkConfig;
use crate::error::AppError;

/// Addresses to hand to the pool at launch.
///
/// Explicit `seeds` (`host:port`) win; DNS seeds are only queried when none
/// are configured. Lookups run concurrently and a failing seed is skipped.
pub async fn resolve_seeds(config: &NetworkConfig) -> Result<Vec<SocketAddr>, AppError> {
    let targets: Vec<String> = if config.seeds.is_empty() {
        config
            .dns_seeds
            .iter()
            .map(|host| format!("{}:{}", host, config.port))
            .collect()
    } else {
        config.seeds.clone()
    };

    let mut lookups = JoinSet::new();
    for target in targets {
        lookups.spawn(async move {
            let result = lookup_host(target.clone()).await;
            (target, result)
        });
    }

    let mut seen = HashSet::new();
    let mut addrs = Vec::new();
    while let Some(joined) = lookups.join_next().await {
        let (target, result) = joined?;
        match result {
            Ok(resolved) => {
                let before = addrs.len();
                addrs.extend(resolved.filter(|addr| seen.insert(*addr)));
                debug!("🌱 {} resolved to {} addresses", target, addrs.len() - before);
            }
            Err(e) => warn!("Failed to resolve seed {}: {}", target, e),
        }
    }

    if addrs.is_empty() {
        return Err(AppError::NoSeeds);
    }
    info!("🌱 {} seed addresses", addrs.len());
    Ok(addrs)
}
