use std::sync::RwLock;

use async_trait::async_trait;
use sensorcast_core::{DataSource, RawTable, Result};

/// In-memory table that can be swapped between loads.
pub struct MemorySource {
    name: String,
    table: RwLock<RawTable>,
}

impl MemorySource {
    pub fn new(table: RawTable) -> Self {
        Self {
            name: "memory".to_string(),
            table: RwLock::new(table),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Replace the table returned by subsequent loads.
    pub fn replace(&self, table: RawTable) {
        let mut guard = self.table.write().unwrap_or_else(|e| e.into_inner());
        *guard = table;
    }
}

#[async_trait]
impl DataSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<RawTable> {
        let guard = self.table.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard.clone())
    }
}
