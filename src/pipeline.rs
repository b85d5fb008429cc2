use crate::configuration::Settings;
use crate::error::{Error, Result};
use crate::executor::TaskExecutor;
use crate::orchestrator::{Orchestrator, RunSummary};
use crate::pool::EndpointPool;
use crate::providers::cool_proxy::CoolProxy;
use crate::providers::free_proxy_list::FreeProxyList;
use crate::providers::geonode::Geonode;
use crate::providers::proxyscrape::ProxyScrape;
use crate::source::EndpointSource;
use crate::status::{StatusAggregator, StatusReporter};
use crate::store::EndpointStore;
use crate::vetting::Vetter;
use log::{error, info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Endpoint source with the providers enabled in `settings`.
pub fn build_source(settings: &Settings) -> anyhow::Result<EndpointSource> {
    let mut source = EndpointSource::new()?;
    let p = &settings.providers;
    if p.free_proxy_list.enabled {
        source.add_provider(FreeProxyList::new());
    }
    if p.geonode.enabled {
        source.add_provider(Geonode::new());
    }
    if p.proxyscrape.enabled {
        source.add_provider(ProxyScrape::new());
    }
    if p.cool_proxy.enabled {
        source.add_provider(CoolProxy::new());
    }
    Ok(source)
}

/// Produces the pool the workers draw from, scraping and vetting first when
/// configured to.
///
/// An empty pool is an error only when `allow_direct` is off.
pub async fn prepare_endpoints(
    settings: &Settings,
    source: &mut EndpointSource,
    vetter: &Vetter,
    store: &EndpointStore,
) -> Result<EndpointPool> {
    if !settings.use_proxies {
        info!("proxy usage disabled, running direct");
        return Ok(EndpointPool::disabled());
    }

    let existing = store.load().await;
    let reuse = match settings.vetting.reuse_threshold {
        _ if !settings.scan_proxies => true,
        Some(min) => !existing.is_empty() && existing.len() >= min,
        None => false,
    };

    let pool = if reuse {
        info!("using {} existing working proxies", existing.len());
        EndpointPool::new(existing)
    } else {
        info!("scraping proxies from {} sources", source.provider_count());
        let candidates = source.scrape_all_sources().await;
        if candidates.is_empty() {
            warn!("failed to scrape any proxies");
        } else {
            if let Err(e) = source.save_to_file(&settings.storage.raw_path).await {
                warn!("cannot save raw proxies: {}", e);
            }
            let (report, written) = vetter
                .vet_and_persist(&candidates, settings.time_budget(), store)
                .await?;
            if !written {
                warn!(
                    "vetting produced no working proxies out of {} candidates",
                    report.candidates
                );
            }
        }
        EndpointPool::load(store).await
    };

    if pool.is_empty() {
        if !settings.allow_direct {
            return Err(Error::NoEndpoints);
        }
        warn!("no working proxies available, continuing with direct connections");
    }
    Ok(pool)
}

/// Everything a full run needs besides the settings.
pub struct Fleet {
    pub source: EndpointSource,
    pub vetter: Vetter,
    pub store: EndpointStore,
    pub executor: Arc<dyn TaskExecutor>,
    pub status: Arc<StatusAggregator>,
    pub reporter: StatusReporter,
    pub shutdown: CancellationToken,
}

/// Endpoint setup followed by the worker fleet. On error the aggregator is
/// left in its terminal "not running" state.
pub async fn run_fleet(
    settings: &Settings,
    fleet: &mut Fleet,
    workers: usize,
    cycles: usize,
) -> Result<RunSummary> {
    let pool = match prepare_endpoints(settings, &mut fleet.source, &fleet.vetter, &fleet.store).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("endpoint setup failed: {}", e);
            fleet.status.finish();
            return Err(e);
        }
    };

    let stop_reporting = CancellationToken::new();
    let reporter = fleet
        .reporter
        .spawn(fleet.status.clone(), stop_reporting.clone());

    let orchestrator = Orchestrator::new(fleet.executor.clone(), pool, fleet.status.clone())
        .with_config(settings.orchestrator())
        .with_shutdown(fleet.shutdown.clone());
    let summary = orchestrator.run(workers, cycles).await;

    stop_reporting.cancel();
    if let Some(handle) = reporter {
        if let Err(e) = handle.await {
            warn!("status reporter ended abnormally: {}", e);
        }
    }
    Ok(summary)
}
