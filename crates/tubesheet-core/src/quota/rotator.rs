use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiKeySlot {
    pub key: String,
    pub status: KeyStatus,
    pub quota_used: u64,
}

/// Round-robin over an ordered key list, skipping failed keys.
#[derive(Debug, Clone, Default)]
pub struct KeyRotator {
    slots: Vec<ApiKeySlot>,
    /// Index of the last key handed out (or marked failed).
    cursor: Option<usize>,
}

impl KeyRotator {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slots = keys
            .into_iter()
            .map(|k| ApiKeySlot {
                key: k.into(),
                status: KeyStatus::Active,
                quota_used: 0,
            })
            .collect();
        Self {
            slots,
            cursor: None,
        }
    }

    /// Next active key after the last-returned one, or `None` when every key is failed.
    pub fn next(&mut self) -> Option<String> {
        let n = self.slots.len();
        let start = self.cursor.map(|c| c + 1).unwrap_or(0);
        for offset in 0..n {
            let idx = (start + offset) % n;
            if self.slots[idx].status == KeyStatus::Active {
                self.cursor = Some(idx);
                return Some(self.slots[idx].key.clone());
            }
        }
        None
    }

    /// Flip `key` to failed and move the cursor past it. Returns false for unknown keys.
    pub fn mark_failed(&mut self, key: &str) -> bool {
        let Some(idx) = self.index_of(key) else {
            return false;
        };
        self.slots[idx].status = KeyStatus::Failed;
        self.cursor = Some(idx);
        true
    }

    /// Restore every key to active (quota window rollover).
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.status = KeyStatus::Active;
            slot.quota_used = 0;
        }
    }

    pub fn record_usage(&mut self, key: &str, units: u32) {
        if let Some(idx) = self.index_of(key) {
            let slot = &mut self.slots[idx];
            slot.quota_used = slot.quota_used.saturating_add(u64::from(units));
        }
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.index_of(key)
            .map(|i| self.slots[i].status == KeyStatus::Active)
            .unwrap_or(false)
    }

    pub fn active_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.status == KeyStatus::Active)
            .count()
    }

    pub fn slots(&self) -> &[ApiKeySlot] {
        &self.slots
    }

    fn index_of(&self, key: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.key == key)
    }
}
