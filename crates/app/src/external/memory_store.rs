use crate::error::ActionError;
use crate::external::Datastore;
use crate::notes::Note;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::SystemTime;

/// In-memory datastore. The default for stations that have not configured a
/// database yet, and the workhorse of the test suite.
#[derive(Default)]
pub struct MemoryDatastore {
    notes: RwLock<Vec<Note>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.notes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.read().is_empty()
    }

    pub fn all(&self) -> Vec<Note> {
        self.notes.read().clone()
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn save(&self, note: &Note) -> Result<(), ActionError> {
        self.notes.write().push(note.clone());
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<Vec<Note>, ActionError> {
        let needle = query.to_lowercase();
        Ok(self
            .notes
            .read()
            .iter()
            .filter(|n| {
                n.common_name.to_lowercase().contains(&needle)
                    || n.scientific_name.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }

    async fn init_species_history(&self) -> Result<Vec<(String, SystemTime)>, ActionError> {
        let mut first_seen: HashMap<String, SystemTime> = HashMap::new();
        for note in self.notes.read().iter() {
            let seen_at = SystemTime::from(note.begin_time);
            first_seen
                .entry(note.scientific_name.clone())
                .and_modify(|existing| {
                    if seen_at < *existing {
                        *existing = seen_at;
                    }
                })
                .or_insert(seen_at);
        }
        Ok(first_seen.into_iter().collect())
    }
}
