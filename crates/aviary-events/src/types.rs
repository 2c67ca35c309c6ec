use aviary_foundation::ErrorKind;

/// Structured runtime-failure notification.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub component: String,
    pub category: ErrorKind,
    pub operation: String,
    pub message: String,
}

impl ErrorEvent {
    /// Stable content identity used by the deduplicator.
    pub(crate) fn content_key(&self) -> (String, ErrorKind, String) {
        (self.component.clone(), self.category, self.message.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceSeverity {
    Info,
    Warning,
    Critical,
}

/// Resource-usage notification (disk, memory, queue depth).
#[derive(Debug, Clone)]
pub struct ResourceEvent {
    pub resource: String,
    pub current_value: f64,
    pub severity: ResourceSeverity,
}

/// Confirmed-detection notification.
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub common_name: String,
    pub scientific_name: String,
    pub confidence: f64,
    pub source: String,
    pub is_new_species: bool,
}

/// A registered event sink. Consumers opt into the families they care about
/// by overriding the matching method; the defaults accept and ignore.
///
/// Handlers run on bus worker threads under a panic guard, so a misbehaving
/// consumer cannot take the bus down. Handlers that take longer than the
/// slow-consumer threshold are logged.
pub trait EventConsumer: Send + Sync {
    fn name(&self) -> &str;

    fn process_error(&self, _event: &ErrorEvent) -> Result<(), String> {
        Ok(())
    }

    fn process_resource(&self, _event: &ResourceEvent) -> Result<(), String> {
        Ok(())
    }

    fn process_detection(&self, _event: &DetectionEvent) -> Result<(), String> {
        Ok(())
    }
}
