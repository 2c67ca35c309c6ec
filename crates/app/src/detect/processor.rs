use crate::actions::ActionPlanner;
use crate::config::Settings;
use crate::detect::dynamic_threshold::DynamicThreshold;
use crate::detect::species_tracker::SpeciesStateTracker;
use crate::detect::taxonomy::{Taxon, TaxonomyResolver};
use crate::jobqueue::{JobQueue, QueueError, Task};
use crate::notes::{ClassifierOutput, Detection, Note, Prediction};
use crate::privacy::sanitize_source;
use aviary_events::{DetectionEvent, EventBus};
use aviary_foundation::SharedClock;
use aviary_telemetry::{DiscardReason, FpsTracker, PipelineMetrics};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Location-allowlist predicate over raw classifier labels.
pub type IncludeFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// One entry per species currently being debounced.
#[derive(Debug, Clone)]
pub struct PendingDetection {
    pub detection: Detection,
    pub confidence: f32,
    pub source: String,
    pub first_detected: SystemTime,
    pub last_updated: SystemTime,
    pub flush_deadline: SystemTime,
    pub count: u32,
}

/// Last side-channel sighting per source, gating flushes.
#[derive(Default)]
struct SideChannels {
    last_dog: HashMap<String, SystemTime>,
    last_human: HashMap<String, SystemTime>,
}

/// The detection aggregator: filters raw classifier results, debounces
/// repeated hits per species, and hands confirmed detections to the action
/// planner and job queue.
pub struct DetectionProcessor {
    settings: Arc<Settings>,
    clock: SharedClock,
    taxonomy: Arc<dyn TaxonomyResolver>,
    species_tracker: Option<Arc<SpeciesStateTracker>>,
    planner: ActionPlanner,
    queue: Arc<JobQueue>,
    metrics: Arc<PipelineMetrics>,
    bus: Option<Arc<EventBus>>,
    include_filter: IncludeFilter,

    /// Pending map: one exclusive lock per `process` call and flusher tick.
    pending: Mutex<HashMap<String, PendingDetection>>,
    /// Side-channel maps have their own lock, never held together with the
    /// pending lock.
    side_channels: RwLock<SideChannels>,
    dynamic_thresholds: RwLock<HashMap<String, DynamicThreshold>>,
    results_rate: Mutex<FpsTracker>,
}

impl DetectionProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Arc<Settings>,
        clock: SharedClock,
        taxonomy: Arc<dyn TaxonomyResolver>,
        species_tracker: Option<Arc<SpeciesStateTracker>>,
        planner: ActionPlanner,
        queue: Arc<JobQueue>,
        metrics: Arc<PipelineMetrics>,
        bus: Option<Arc<EventBus>>,
        include_filter: Option<IncludeFilter>,
    ) -> Self {
        Self {
            settings,
            clock,
            taxonomy,
            species_tracker,
            planner,
            queue,
            metrics,
            bus,
            include_filter: include_filter.unwrap_or_else(|| Arc::new(|_| true)),
            pending: Mutex::new(HashMap::new()),
            side_channels: RwLock::new(SideChannels::default()),
            dynamic_thresholds: RwLock::new(HashMap::new()),
            results_rate: Mutex::new(FpsTracker::new()),
        }
    }

    /// Minimum raw hits a species needs inside the debounce window, derived
    /// from the analysis overlap.
    pub fn min_detections(&self) -> u32 {
        let segment_length = (3.0 - self.settings.analyzer.overlap).max(0.1);
        ((3.0 / segment_length).floor() as u32).max(1)
    }

    /// Ingest one classifier output: filter each prediction and fold the
    /// survivors into the pending-detections map.
    pub fn process(&self, output: &ClassifierOutput) {
        self.metrics.record_result_processed();
        if let Some(fps) = self.results_rate.lock().tick() {
            self.metrics.update_results_fps(fps);
        }
        self.metrics
            .set_classifier_process_time_ms(output.elapsed.as_millis() as u64);

        if let Some(tracker) = &self.species_tracker {
            tracker.maybe_spawn_sync();
        }

        for prediction in &output.predictions {
            self.process_prediction(output, prediction);
        }

        self.metrics.set_pending_detections(self.pending.lock().len());
    }

    fn process_prediction(&self, output: &ClassifierOutput, prediction: &Prediction) {
        let taxon = self.taxonomy.resolve(&prediction.species);
        if taxon.common_name.is_empty() && taxon.scientific_name.is_empty() {
            debug!(species = %prediction.species, "skipping unresolvable species label");
            return;
        }

        let species_lower = if taxon.common_name.is_empty() {
            taxon.scientific_name.to_lowercase()
        } else {
            taxon.common_name.to_lowercase()
        };

        self.record_dog_detection(output, &species_lower, prediction);
        self.record_human_detection(output, &species_lower, prediction);

        let base_threshold = self.settings.base_threshold(&species_lower);

        // Humans never reach the actions stage. Confidence comparisons stay
        // in f32, the classifier's native precision.
        if taxon.common_name.to_lowercase().contains("human")
            && prediction.confidence > base_threshold as f32
        {
            return;
        }

        let threshold = if self.settings.realtime.dynamic_threshold.enabled {
            self.adjusted_threshold(&species_lower, base_threshold)
        } else {
            base_threshold
        };
        if prediction.confidence <= threshold as f32 {
            return;
        }

        if !(self.include_filter)(&prediction.species) {
            debug!(species = %prediction.species, "species not on location allowlist");
            return;
        }

        if self.settings.realtime.dynamic_threshold.enabled {
            self.update_dynamic_threshold(&species_lower, base_threshold, prediction.confidence);
        }

        let clip_name = self.generate_clip_name(&taxon.scientific_name, prediction.confidence);
        let note = self.build_note(
            &taxon,
            prediction.confidence,
            &output.source,
            clip_name,
            output.start_time,
            output.elapsed,
        );
        let detection = Detection {
            pcm: output.pcm.clone(),
            note,
            predictions: output.predictions.clone(),
        };

        self.aggregate(&species_lower, detection, prediction.confidence, output);
    }

    /// Fold one surviving prediction into the pending map. Repeated hits
    /// bump the count and keep the best-confidence sighting; the flush
    /// deadline set at first sight is never extended.
    fn aggregate(
        &self,
        species_lower: &str,
        detection: Detection,
        confidence: f32,
        output: &ClassifierOutput,
    ) {
        let now = self.clock.system_now();
        let debounce = Duration::from_secs(self.settings.realtime.debounce_seconds);
        let mut pending = self.pending.lock();
        match pending.get_mut(species_lower) {
            Some(existing) => {
                if confidence > existing.confidence {
                    existing.detection = detection;
                    existing.confidence = confidence;
                    existing.source = output.source.clone();
                }
                existing.count += 1;
                existing.last_updated = now;
            }
            None => {
                pending.insert(
                    species_lower.to_string(),
                    PendingDetection {
                        detection,
                        confidence,
                        source: output.source.clone(),
                        first_detected: output.start_time,
                        last_updated: now,
                        flush_deadline: output.start_time + debounce,
                        count: 1,
                    },
                );
            }
        }
    }

    fn record_dog_detection(
        &self,
        output: &ClassifierOutput,
        species_lower: &str,
        prediction: &Prediction,
    ) {
        let filter = &self.settings.realtime.dog_bark_filter;
        if filter.enabled
            && species_lower.contains("dog")
            && prediction.confidence > filter.confidence
        {
            info!(
                confidence = prediction.confidence,
                threshold = filter.confidence,
                source = %sanitize_source(&output.source),
                "dog bark detected"
            );
            self.side_channels
                .write()
                .last_dog
                .insert(output.source.clone(), output.start_time);
        }
    }

    fn record_human_detection(
        &self,
        output: &ClassifierOutput,
        species_lower: &str,
        prediction: &Prediction,
    ) {
        let filter = &self.settings.realtime.privacy_filter;
        if filter.enabled
            && species_lower.contains("human ")
            && prediction.confidence > filter.confidence
        {
            info!(
                confidence = prediction.confidence,
                threshold = filter.confidence,
                source = %sanitize_source(&output.source),
                "human vocal detected"
            );
            self.side_channels
                .write()
                .last_human
                .insert(output.source.clone(), output.start_time);
        }
    }

    fn adjusted_threshold(&self, species_lower: &str, base_threshold: f64) -> f64 {
        let now = self.clock.system_now();
        let thresholds = self.dynamic_thresholds.read();
        match thresholds.get(species_lower) {
            Some(dt) if !dt.is_expired(now) => dt.effective(),
            _ => base_threshold,
        }
    }

    fn update_dynamic_threshold(&self, species_lower: &str, base_threshold: f64, confidence: f32) {
        let now = self.clock.system_now();
        let config = &self.settings.realtime.dynamic_threshold;
        let mut thresholds = self.dynamic_thresholds.write();
        let entry = thresholds
            .entry(species_lower.to_string())
            .or_insert_with(|| DynamicThreshold::new(base_threshold, config, now));
        entry.record(confidence, config, now);
    }

    /// Drop dynamic-threshold records whose validity window lapsed.
    pub fn cleanup_dynamic_thresholds(&self) {
        let now = self.clock.system_now();
        self.dynamic_thresholds
            .write()
            .retain(|_, dt| !dt.is_expired(now));
    }

    /// One flusher tick: move every pending entry past its deadline out of
    /// the map, discarding or dispatching it. Runs in a single critical
    /// section so confirmed detections leave in first-detected order.
    pub fn flush_due(&self) {
        let now = self.clock.system_now();
        let min_detections = self.min_detections();

        let mut pending = self.pending.lock();
        let due: Vec<String> = pending
            .iter()
            .filter(|(_, item)| now > item.flush_deadline)
            .map(|(species, _)| species.clone())
            .collect();

        for species in due {
            let item = match pending.remove(&species) {
                Some(item) => item,
                None => continue,
            };
            if let Some((reason, metric)) = self.discard_reason(&item, min_detections) {
                info!(
                    species = %species,
                    source = %sanitize_source(&item.source),
                    reason = %reason,
                    "discarding detection"
                );
                self.metrics.record_detection_discarded(metric);
                continue;
            }
            self.dispatch(&species, item);
        }
        self.metrics.set_pending_detections(pending.len());
    }

    fn discard_reason(
        &self,
        item: &PendingDetection,
        min_detections: u32,
    ) -> Option<(String, DiscardReason)> {
        if item.count < min_detections {
            return Some((
                format!("false positive, matched {}/{} times", item.count, min_detections),
                DiscardReason::FalsePositive,
            ));
        }

        if self.settings.realtime.privacy_filter.enabled {
            let side = self.side_channels.read();
            if let Some(last_human) = side.last_human.get(&item.source) {
                if *last_human > item.first_detected {
                    return Some(("privacy filter".to_string(), DiscardReason::PrivacyFilter));
                }
            }
        }

        if self.dog_bark_matches(item) {
            return Some(("recent dog bark".to_string(), DiscardReason::DogBark));
        }

        None
    }

    /// A recent bark on the same source invalidates species the bark filter
    /// covers: barks excite exactly the call-like matches listed there.
    fn dog_bark_matches(&self, item: &PendingDetection) -> bool {
        let filter = &self.settings.realtime.dog_bark_filter;
        if !filter.enabled {
            return false;
        }
        let species_listed = filter.species.iter().any(|s| {
            let s = s.to_lowercase();
            s == item.detection.note.common_name.to_lowercase()
                || s == item.detection.note.scientific_name.to_lowercase()
        });
        if !species_listed {
            return false;
        }
        let side = self.side_channels.read();
        let Some(last_dog) = side.last_dog.get(&item.source) else {
            return false;
        };
        *last_dog + Duration::from_secs(filter.remember) > item.first_detected
    }

    /// Confirmed detection: stamp the true begin time, plan actions and
    /// enqueue one task per action, then annotate and announce.
    fn dispatch(&self, species: &str, mut item: PendingDetection) {
        info!(
            species,
            source = %sanitize_source(&item.source),
            count = item.count,
            confidence = item.confidence,
            "approving detection"
        );

        item.detection.note.begin_time = DateTime::<Utc>::from(item.first_detected);

        let is_new_species = match &self.species_tracker {
            Some(tracker) => {
                let is_new = tracker.is_new(&item.detection.note.scientific_name);
                tracker.update(&item.detection.note.scientific_name, item.first_detected);
                is_new
            }
            None => false,
        };

        let actions = self.planner.actions_for(&item.detection);
        for action in actions {
            let task = Task {
                action,
                detection: item.detection.clone(),
            };
            match self.queue.enqueue(task) {
                Ok(()) => {}
                Err(QueueError::QueueFull) => {
                    error!(species, "worker queue is full, dropping task");
                }
                Err(err) => {
                    error!(species, error = %err, "failed to enqueue task");
                }
            }
        }

        self.metrics.record_detection_confirmed();

        if let Some(bus) = &self.bus {
            bus.try_publish_detection(DetectionEvent {
                common_name: item.detection.note.common_name.clone(),
                scientific_name: item.detection.note.scientific_name.clone(),
                confidence: item.detection.note.confidence,
                source: sanitize_source(&item.source),
                is_new_species,
            });
        }
    }

    fn generate_clip_name(&self, scientific_name: &str, confidence: f32) -> String {
        let formatted = scientific_name.to_lowercase().replace(' ', "_");
        let pct = format!("{:.0}p", confidence * 100.0);
        let now: DateTime<Utc> = self.clock.system_now().into();
        format!(
            "{}/{}/{}_{}_{}.wav",
            now.format("%Y"),
            now.format("%m"),
            formatted,
            pct,
            now.format("%Y%m%dT%H%M%SZ"),
        )
    }

    fn build_note(
        &self,
        taxon: &Taxon,
        confidence: f32,
        source: &str,
        clip_name: String,
        start_time: SystemTime,
        elapsed: Duration,
    ) -> Note {
        let analyzer = &self.settings.analyzer;
        let now: DateTime<Utc> = self.clock.system_now().into();
        // Stamped slightly behind the wall clock to account for analysis
        // latency between capture and confirmation.
        let detection_time = now - chrono::Duration::seconds(2);
        let rounded_confidence = (f64::from(confidence) * 100.0).round() / 100.0;

        Note {
            source_node: self.settings.main.name.clone(),
            date: now.format("%Y-%m-%d").to_string(),
            time: detection_time.format("%H:%M:%S").to_string(),
            source: sanitize_source(source),
            begin_time: DateTime::<Utc>::from(start_time),
            end_time: DateTime::<Utc>::from(
                start_time + Duration::from_secs(self.settings.realtime.debounce_seconds),
            ),
            species_code: taxon.species_code.clone(),
            scientific_name: taxon.scientific_name.clone(),
            common_name: taxon.common_name.clone(),
            confidence: rounded_confidence,
            latitude: analyzer.latitude,
            longitude: analyzer.longitude,
            threshold: analyzer.threshold,
            sensitivity: analyzer.sensitivity,
            clip_name,
            processing_time_ms: elapsed.as_millis() as u64,
        }
    }

    /// Drain classifier outputs until the channel closes or shutdown fires.
    pub fn spawn_result_loop(
        self: &Arc<Self>,
        mut results_rx: mpsc::UnboundedReceiver<ClassifierOutput>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let processor = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    maybe = results_rx.recv() => match maybe {
                        Some(output) => processor.process(&output),
                        None => break,
                    },
                }
            }
            debug!("detection result loop stopped");
        })
    }

    /// Tick the flusher every second until shutdown.
    pub fn spawn_flusher(
        self: &Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let processor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        processor.flush_due();
                        processor.cleanup_dynamic_thresholds();
                    }
                }
            }
            debug!("pending detection flusher stopped");
        })
    }

    /// Copy of the pending-detections map, for status surfaces and tests.
    pub fn pending_snapshot(&self) -> HashMap<String, PendingDetection> {
        self.pending.lock().clone()
    }
}
