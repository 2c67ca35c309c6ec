//! Pipeline wiring and lifecycle.
//!
//! `Pipeline` owns every component — buffer registry, event bus, event
//! tracker, species tracker, job queue, detection processor — and injects
//! them into each other at startup. Lifecycle is
//! `init → running → shutdown(timeout)`.

use crate::actions::{ActionDeps, ActionPlanner, RangeFilterState};
use crate::config::Settings;
use crate::detect::{
    DetectionProcessor, EventTracker, IncludeFilter, LabelTaxonomy, SpeciesStateTracker,
    TaxonomyResolver,
};
use crate::external::{Datastore, LiveBroadcaster, MessageBroker, SoundscapeUploader};
use crate::jobqueue::{JobQueue, JobStatsSnapshot};
use crate::notes::ClassifierOutput;
use aviary_audio::BufferRegistry;
use aviary_events::{ErrorEvent, EventBus, EventBusConfig, EventConsumer};
use aviary_foundation::{real_clock, AppError, PipelineState, SharedClock, StateManager};
use aviary_telemetry::PipelineMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// External collaborators injected into the pipeline. Only the store and
/// taxonomy are mandatory; everything else degrades to "not configured".
pub struct PipelineDeps {
    pub store: Arc<dyn Datastore>,
    pub taxonomy: Arc<dyn TaxonomyResolver>,
    pub uploader: Option<Arc<dyn SoundscapeUploader>>,
    pub broker: Option<Arc<dyn MessageBroker>>,
    pub broadcaster: Option<Arc<dyn LiveBroadcaster>>,
    pub include_filter: Option<IncludeFilter>,
    pub clock: Option<SharedClock>,
}

impl PipelineDeps {
    /// Minimal dependency set: the given store, label-string taxonomy,
    /// nothing optional.
    pub fn with_store(store: Arc<dyn Datastore>) -> Self {
        Self {
            store,
            taxonomy: Arc::new(LabelTaxonomy::new()),
            uploader: None,
            broker: None,
            broadcaster: None,
            include_filter: None,
            clock: None,
        }
    }
}

/// Handle to the running pipeline.
pub struct Pipeline {
    pub metrics: Arc<PipelineMetrics>,
    pub registry: Arc<BufferRegistry>,
    state: StateManager,
    results_tx: mpsc::UnboundedSender<ClassifierOutput>,
    queue: Arc<JobQueue>,
    bus: Option<Arc<EventBus>>,
    shutdown_tx: watch::Sender<bool>,
    result_loop: JoinHandle<()>,
    flusher: JoinHandle<()>,
}

/// Bridges pipeline error events into the log. Registering it also arms
/// the event bus workers.
struct LogConsumer;

impl EventConsumer for LogConsumer {
    fn name(&self) -> &str {
        "log"
    }

    fn process_error(&self, event: &ErrorEvent) -> Result<(), String> {
        warn!(
            component = %event.component,
            category = %event.category,
            operation = %event.operation,
            "{}",
            event.message
        );
        Ok(())
    }
}

impl Pipeline {
    /// Build and start every component. On return the pipeline is running
    /// and accepting classifier output through `results_sender`.
    pub async fn start(settings: Settings, deps: PipelineDeps) -> Result<Self, AppError> {
        let mut settings = settings;
        settings.canonicalize_species();
        let settings = Arc::new(settings);

        let state = StateManager::new();
        let clock = deps.clock.unwrap_or_else(real_clock);
        let metrics = Arc::new(PipelineMetrics::default());

        let registry = Arc::new(BufferRegistry::new(metrics.clone()));
        for source in &settings.capture.sources {
            registry
                .allocate_if_needed(
                    i64::from(settings.capture.buffer_seconds),
                    i64::from(settings.analyzer.sample_rate),
                    i64::from(settings.analyzer.bytes_per_sample),
                    source,
                )
                .map_err(|e| AppError::Config(format!("capture buffer for {source}: {e}")))?;
        }

        let bus = if settings.eventbus.enabled {
            let bus = EventBus::new(EventBusConfig {
                buffer_size: settings.eventbus.buffer_size,
                workers: settings.eventbus.workers,
                ..Default::default()
            });
            bus.register_consumer(Arc::new(LogConsumer));
            Some(bus)
        } else {
            None
        };

        let event_tracker = Arc::new(EventTracker::with_config(
            Duration::from_secs(settings.realtime.interval),
            settings.realtime.species.clone(),
            clock.clone(),
        ));

        let species_tracker = if settings.realtime.species_tracking.enabled {
            let tracker = Arc::new(SpeciesStateTracker::new(
                deps.store.clone(),
                settings.realtime.species_tracking.new_species_window_days,
                clock.clone(),
            ));
            tracker.init_from_store().await;
            info!(
                window_days = settings.realtime.species_tracking.new_species_window_days,
                "species tracking enabled"
            );
            Some(tracker)
        } else {
            None
        };

        let queue = JobQueue::new(
            settings.jobqueue.capacity,
            settings.jobqueue.workers,
            metrics.clone(),
            clock.clone(),
        );
        queue.start();

        let planner = ActionPlanner::new(
            settings.clone(),
            ActionDeps {
                store: deps.store,
                uploader: deps.uploader,
                broker: deps.broker,
                broadcaster: deps.broadcaster,
                event_tracker,
                range_filter: Arc::new(RangeFilterState::new()),
            },
            clock.clone(),
        );

        let processor = Arc::new(DetectionProcessor::new(
            settings.clone(),
            clock,
            deps.taxonomy,
            species_tracker,
            planner,
            queue.clone(),
            metrics.clone(),
            bus.clone(),
            deps.include_filter,
        ));

        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let result_loop = processor.spawn_result_loop(results_rx, shutdown_rx.clone());
        let flusher = processor.spawn_flusher(shutdown_rx);

        state.transition(PipelineState::Running)?;
        info!("pipeline running");

        Ok(Self {
            metrics,
            registry,
            state,
            results_tx,
            queue,
            bus,
            shutdown_tx,
            result_loop,
            flusher,
        })
    }

    /// Feed for the classifier: unbounded and ordered.
    pub fn results_sender(&self) -> mpsc::UnboundedSender<ClassifierOutput> {
        self.results_tx.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.state.current()
    }

    pub fn job_stats(&self) -> JobStatsSnapshot {
        self.queue.stats()
    }

    /// Graceful stop: stop intake, finish in-flight work, wait up to
    /// `timeout` per component.
    pub async fn shutdown(self, timeout: Duration) -> Result<(), AppError> {
        info!(?timeout, "pipeline shutting down");
        self.state.transition(PipelineState::Stopping)?;

        let _ = self.shutdown_tx.send(true);
        let _ = self.result_loop.await;
        let _ = self.flusher.await;

        if let Err(err) = self.queue.stop_with_timeout(timeout).await {
            warn!(error = %err, "job queue did not stop cleanly");
        }

        if let Some(bus) = self.bus.clone() {
            // The bus joins its worker threads; keep that off the runtime.
            match tokio::task::spawn_blocking(move || bus.shutdown(timeout)).await {
                Ok(Err(err)) => warn!(error = %err, "event bus did not stop cleanly"),
                Err(err) => warn!(error = %err, "event bus shutdown task failed"),
                Ok(Ok(())) => {}
            }
        }

        self.state.transition(PipelineState::Stopped)?;
        info!("pipeline stopped");
        Ok(())
    }
}
