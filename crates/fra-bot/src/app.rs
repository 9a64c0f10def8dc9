//! Wires every `fra-*` component into a running engine (spec §4, §10.1).
//!
//! `Application<R, K, A>` is generic over the `Repository`, `Keystore`,
//! and `ExchangeAdapter` implementations a deployment runs, mirroring
//! the same generic pattern used throughout `fra-position`/`fra-executor`
//! (those traits use `async fn` and are therefore not object-safe).
//! [`build`] assembles the concrete binary: `InMemoryRepository`,
//! [`crate::keystore::EnvKeystore`], and [`fra_adapter::AnyAdapter`] — the
//! enum-of-venues that lets one registry hold Binance, OKX, Gate.io, and
//! BingX adapters side by side (spec §4 names all four).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fra_adapter::{AdapterEvent, AdapterRegistry, AnyAdapter, ExchangeAdapter};
use fra_core::ids::{Symbol, Venue};
use fra_core::model::DataType;
use fra_core::repository::{Keystore, Repository};
use fra_dashboard::{broadcast::run_event_relay, run_server, DashboardState};
use fra_detector::OpportunityDetector;
use fra_executor::{PositionCloser, TriggerDetector};
use fra_feed::RateAggregator;
use fra_notifier::{NotifiableEvent, NotifierDispatcher};
use fra_persistence::InMemoryRepository;
use fra_position::PositionExitMonitor;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::keystore::EnvKeystore;

/// The concrete application this binary runs.
pub type DefaultApplication = Application<InMemoryRepository, EnvKeystore, AnyAdapter>;

pub struct Application<R: Repository, K: Keystore, A: ExchangeAdapter> {
    config: AppConfig,
    repository: Arc<R>,
    keystore: Arc<K>,
    adapters: Arc<AdapterRegistry<A>>,
    datasource: Arc<fra_datasource::DataSourceManager>,
    aggregator: Arc<RateAggregator>,
    detector: Arc<OpportunityDetector<R>>,
    exit_monitor: Arc<PositionExitMonitor<R, K, A>>,
    closer: Arc<PositionCloser<R, A>>,
    trigger_detector: Arc<TriggerDetector<R, A>>,
    notifier: Arc<NotifierDispatcher<R>>,
    shutdown: CancellationToken,
}

impl<R, K, A> Application<R, K, A>
where
    R: Repository + 'static,
    K: Keystore + 'static,
    A: ExchangeAdapter + 'static,
{
    pub fn new(config: AppConfig, repository: Arc<R>, keystore: Arc<K>, adapters: Arc<AdapterRegistry<A>>) -> Self {
        let aggregator = Arc::new(RateAggregator::new(config.data_source.target_basis_hours));
        let datasource =
            fra_datasource::DataSourceManager::new(Duration::from_millis(config.data_source.stale_threshold_ms));
        let detector = Arc::new(OpportunityDetector::new(config.detector.clone(), repository.clone()));
        let exit_monitor = Arc::new(PositionExitMonitor::new(
            config.exit_monitor.clone(),
            repository.clone(),
            keystore.clone(),
            adapters.clone(),
        ));
        let closer = Arc::new(PositionCloser::new(repository.clone(), adapters.clone()));
        let trigger_detector = Arc::new(TriggerDetector::new(config.trigger_detector.clone(), closer.clone()));
        let notifier = Arc::new(NotifierDispatcher::new(repository.clone()));

        Self {
            config,
            repository,
            keystore,
            adapters,
            datasource,
            aggregator,
            detector,
            exit_monitor,
            closer,
            trigger_detector,
            notifier,
            shutdown: CancellationToken::new(),
        }
    }

    /// Connect every registered adapter before the engine starts
    /// consuming data (spec §11 startup health check), then place each
    /// venue's configured symbols on its WebSocket subscription set.
    pub async fn run_preflight(&self) -> AppResult<()> {
        for venue in self.adapters.venues() {
            let adapter = self
                .adapters
                .get(&venue)
                .expect("venue came from adapters.venues(), still registered");
            adapter.connect().await?;
            self.datasource.ensure_tracked(&venue, DataType::FundingRate);
            info!(%venue, "adapter connected");

            let Some(venue_config) = self.config.venues.iter().find(|v| v.name == venue.as_str()) else {
                continue;
            };
            for symbol in &venue_config.symbols {
                if let Err(e) = adapter.subscribe(&Symbol::new(symbol.clone())).await {
                    warn!(%venue, %symbol, error = %e, "failed to subscribe symbol on connect");
                }
            }
        }
        Ok(())
    }

    /// Run the engine until a shutdown signal arrives.
    pub async fn run(self: Arc<Self>) -> AppResult<()> {
        let mut tasks = Vec::new();

        for venue in self.adapters.venues() {
            let Some(venue_config) = self.config.venues.iter().find(|v| v.name == venue.as_str()) else {
                warn!(%venue, "adapter registered but not present in configuration, skipping poll loop");
                continue;
            };
            let symbols: Vec<Symbol> = venue_config.symbols.iter().map(Symbol::new).collect();
            tasks.push(tokio::spawn(self.clone().run_rate_poll_loop(venue, symbols)));
        }

        for venue in self.adapters.venues() {
            tasks.push(tokio::spawn(self.clone().run_adapter_event_relay(venue)));
        }
        tasks.push(tokio::spawn(self.clone().run_aggregator_consumer()));
        tasks.push(tokio::spawn(self.clone().run_detector_consumer()));
        tasks.push(tokio::spawn(self.clone().run_exit_monitor_consumer()));
        tasks.push(self.datasource.spawn_staleness_sweep());
        tasks.push(tokio::spawn(self.clone().run_maintenance_sweep()));

        if self.config.dashboard.enabled {
            tasks.push(tokio::spawn(self.clone().run_dashboard()));
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
            }
            _ = self.shutdown.cancelled() => {
                info!("shutdown requested internally");
            }
        }
        self.shutdown.cancel();

        for task in tasks {
            task.abort();
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Poll one venue's funding rates on a fixed interval, feeding the
    /// aggregator (spec §4.2/§4.4: the REST fallback path, running
    /// alongside the WebSocket event relay rather than instead of it, so
    /// a stream still gets updates if its WS push stalls).
    async fn run_rate_poll_loop(self: Arc<Self>, venue: Venue, symbols: Vec<Symbol>) {
        let Some(adapter) = self.adapters.get(&venue) else { return };
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.data_source.poll_interval_ms));
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let started = std::time::Instant::now();
            match adapter.get_funding_rates(&symbols).await {
                Ok(rates) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    for (symbol, rate) in rates {
                        if let Err(e) = self.aggregator.update(&symbol, rate) {
                            error!(%venue, %symbol, error = %e, "failed to apply funding-rate update");
                        }
                    }
                    self.datasource
                        .update_last_data_received(&venue, DataType::FundingRate, Some(latency_ms));
                }
                Err(e) => {
                    warn!(%venue, error = %e, "funding-rate poll failed");
                }
            }
        }
    }

    /// Consume one venue's adapter event channel (spec §4.1): funding-rate
    /// pushes feed the aggregator directly (the WebSocket-primary path,
    /// with `run_rate_poll_loop`'s REST polling as the fallback for
    /// venues or symbols the WS leg hasn't caught yet), `Connected`/
    /// `Disconnected` drive the Data-Source Manager's mode tracking (spec
    /// §4.3), and order-status events still go to the trigger detector
    /// (spec §4.8).
    async fn run_adapter_event_relay(self: Arc<Self>, venue: Venue) {
        let Some(adapter) = self.adapters.get(&venue) else { return };
        let mut events = adapter.events();
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = events.recv() => {
                    match event {
                        Ok(event) => self.handle_adapter_event(&venue, event).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "adapter event relay lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    }

    async fn handle_adapter_event(&self, venue: &Venue, event: AdapterEvent) {
        match &event {
            AdapterEvent::FundingRate { symbol, rate } => {
                if let Err(e) = self.aggregator.update(symbol, rate.clone()) {
                    error!(%venue, %symbol, error = %e, "failed to apply websocket funding-rate update");
                }
                self.datasource.update_last_data_received(venue, DataType::FundingRate, None);
            }
            AdapterEvent::FundingRateBatch(rates) => {
                for (symbol, rate) in rates {
                    if let Err(e) = self.aggregator.update(symbol, rate.clone()) {
                        error!(%venue, %symbol, error = %e, "failed to apply websocket funding-rate update");
                    }
                }
                self.datasource.update_last_data_received(venue, DataType::FundingRate, None);
            }
            AdapterEvent::MarkPrice { .. } => {
                self.datasource.update_last_data_received(venue, DataType::FundingRate, None);
            }
            AdapterEvent::Connected => {
                self.datasource.enable_websocket(venue, DataType::FundingRate);
            }
            AdapterEvent::Disconnected { reason } => {
                self.datasource.disable_websocket(venue, DataType::FundingRate, reason);
            }
            AdapterEvent::Error { message } => {
                warn!(%venue, %message, "adapter reported an error");
            }
            AdapterEvent::OrderStatusChanged(_) => {}
        }

        if let Err(e) = self.trigger_detector.handle_adapter_event(&event).await {
            error!(%venue, error = %e, "trigger detector failed to handle adapter event");
        }
    }

    /// Feed every aggregator `rate-updated` snapshot into the opportunity
    /// detector and position exit monitor (spec §4.6, §4.7).
    async fn run_aggregator_consumer(self: Arc<Self>) {
        let mut events = self.aggregator.events();
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = events.recv() => {
                    match event {
                        Ok(fra_feed::AggregatorEvent::RateUpdated { symbol, snapshot }) => {
                            let now = Utc::now();
                            if let Err(e) = self.detector.process_snapshot(&symbol, &snapshot, now).await {
                                error!(%symbol, error = %e, "opportunity detector failed to process snapshot");
                            }
                            if let Err(e) = self.exit_monitor.process_snapshot(&symbol, &snapshot, now).await {
                                error!(%symbol, error = %e, "exit monitor failed to process snapshot");
                            }
                        }
                        Ok(fra_feed::AggregatorEvent::Opportunity { .. }) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "aggregator consumer lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    }

    /// Fan detector lifecycle events out to every configured user's
    /// webhooks (spec §4.10). Opportunities aren't user-owned, so every
    /// `notify_users` entry is treated as a subscriber.
    async fn run_detector_consumer(self: Arc<Self>) {
        let mut events = self.detector.events();
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = events.recv() => {
                    match event {
                        Ok(event) => self.dispatch_detector_event(event).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "detector consumer lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    }

    async fn dispatch_detector_event(&self, event: fra_detector::DetectorEvent) {
        for user_id in &self.config.notify_users {
            let notifiable = match &event {
                fra_detector::DetectorEvent::OpportunityDetected(opportunity) => {
                    Some(NotifiableEvent::OpportunityDetected {
                        user_id: user_id.clone(),
                        opportunity_id: opportunity.id,
                        symbol: opportunity.symbol.clone(),
                        long_venue: opportunity.long_venue.clone(),
                        short_venue: opportunity.short_venue.clone(),
                        rate_difference: opportunity.current_rate_difference,
                        at: Utc::now(),
                    })
                }
                fra_detector::DetectorEvent::OpportunityExpired { opportunity, history } => {
                    Some(NotifiableEvent::OpportunityExpired {
                        user_id: user_id.clone(),
                        opportunity_id: opportunity.id,
                        symbol: opportunity.symbol.clone(),
                        long_venue: opportunity.long_venue.clone(),
                        short_venue: opportunity.short_venue.clone(),
                        reason: history.disappearance_reason,
                        at: Utc::now(),
                    })
                }
                fra_detector::DetectorEvent::OpportunityUpdated(_)
                | fra_detector::DetectorEvent::OpportunityClosed { .. } => None,
            };

            if let Some(notifiable) = notifiable {
                self.notifier.dispatch(notifiable).await;
            }
        }
    }

    async fn run_exit_monitor_consumer(self: Arc<Self>) {
        let mut events = self.exit_monitor.events();
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = events.recv() => {
                    match event {
                        Ok(fra_position::PositionMonitorEvent::ExitSuggested { position, reason, at }) => {
                            let event = NotifiableEvent::ExitSuggested {
                                user_id: position.user_id,
                                position_id: position.id,
                                symbol: position.symbol,
                                reason,
                                at,
                            };
                            self.notifier.dispatch(event).await;
                        }
                        Ok(fra_position::PositionMonitorEvent::ExitCanceled { .. }) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "exit monitor consumer lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    }

    /// Periodic maintenance: re-derives opportunity expiry from whatever
    /// the aggregator currently holds, so a symbol with no further rate
    /// updates still has its opportunities timed out (spec §11).
    async fn run_maintenance_sweep(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.maintenance.sweep_interval_ms));
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let now = Utc::now();
            for symbol in self.aggregator.symbols() {
                if let Some(snapshot) = self.aggregator.snapshot(&symbol) {
                    let aggregated = fra_feed::AggregatedSnapshot {
                        snapshot,
                        normalized_variants: Default::default(),
                    };
                    if let Err(e) = self.detector.process_snapshot(&symbol, &aggregated, now).await {
                        error!(%symbol, error = %e, "maintenance sweep failed to process snapshot");
                    }
                }
            }
        }
    }

    async fn run_dashboard(self: Arc<Self>) {
        let dashboard_state = DashboardState::new(self.aggregator.clone(), self.repository.clone());
        let (broadcast_tx, _) = broadcast::channel(1024);

        tokio::spawn(run_event_relay(
            self.aggregator.events(),
            self.detector.events(),
            self.exit_monitor.events(),
            self.trigger_detector.events(),
            self.closer.events(),
            broadcast_tx.clone(),
        ));

        if let Err(e) = run_server(dashboard_state, broadcast_tx, self.config.dashboard.clone()).await {
            error!(error = %e, "dashboard server exited");
        }
    }
}

/// Assemble the binary's concrete `Application`: an in-memory repository,
/// the environment-backed keystore, and one [`AnyAdapter`] per configured
/// venue, each picking up credentials from that venue's
/// `FRA_<VENUE>_API_KEY`/`FRA_<VENUE>_API_SECRET` environment pair.
pub fn build(config: AppConfig) -> AppResult<Arc<DefaultApplication>> {
    let repository = Arc::new(InMemoryRepository::new());
    let keystore = Arc::new(EnvKeystore::new());

    let adapters = Arc::new(AdapterRegistry::new());
    for venue_config in &config.venues {
        let env_prefix = venue_config.name.to_uppercase();
        let api_key = std::env::var(format!("FRA_{env_prefix}_API_KEY")).ok();
        let api_secret = std::env::var(format!("FRA_{env_prefix}_API_SECRET")).ok();

        let Some(built) = AnyAdapter::build(&venue_config.name, api_key, api_secret) else {
            warn!(venue = %venue_config.name, "unrecognized venue in configuration, skipping");
            continue;
        };
        let adapter = built
            .map_err(|e| AppError::Preflight(format!("failed to construct {} adapter: {e}", venue_config.name)))?;
        adapters.register(Arc::new(adapter));
    }

    Ok(Arc::new(Application::new(config, repository, keystore, adapters)))
}
