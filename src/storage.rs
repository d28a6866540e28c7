use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{manual::ManualSlotEntry, prelude::*, prices::PriceCache, slots::SlotStore};

pub const VALUES: &str = "values.toml";
pub const CONFIG: &str = "config.toml";
pub const MANUAL_SLOTS: &str = "manual_slots.toml";
pub const SOC_HISTORY: &str = "soc_history.toml";

/// Flat-file document store under the data directory.
pub struct Storage {
    data_dir: PathBuf,
}

impl Storage {
    pub const fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    /// Read a document, falling back to its default when the file is absent.
    #[instrument(skip_all, fields(name))]
    pub fn read<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        let path = self.path(name);
        if path.is_file() {
            toml::from_str(&fs::read_to_string(&path)?)
                .with_context(|| format!("failed to parse `{}`", path.display()))
        } else {
            Ok(T::default())
        }
    }

    /// Write a document: no-op when the on-disk content is already identical,
    /// otherwise an atomic write-then-rename.
    #[instrument(skip_all, fields(name))]
    pub fn write<T: Serialize>(&self, name: &str, document: &T) -> Result {
        fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create `{}`", self.data_dir.display()))?;
        let serialized = toml::to_string(document)?;
        let path = self.path(name);
        if fs::read_to_string(&path).is_ok_and(|current| current == serialized) {
            debug!(name, "content did not change, not writing");
            return Ok(());
        }
        let staged = path.with_extension("toml.new");
        fs::write(&staged, serialized)
            .with_context(|| format!("failed to write `{}`", staged.display()))?;
        fs::rename(&staged, &path)
            .with_context(|| format!("failed to replace `{}`", path.display()))?;
        Ok(())
    }
}

/// The device schedule and the misc values that travel with it.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValuesDocument {
    #[serde(default)]
    pub slots: SlotStore,

    #[serde(default)]
    pub price_cache: PriceCache,
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ManualSlotsDocument {
    #[serde(default)]
    pub slots: Vec<ManualSlotEntry>,
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{
        planner::ScheduleSegment,
        slots::{Slot, SlotState},
    };

    fn scratch_storage(test_name: &str) -> Storage {
        let data_dir =
            std::env::temp_dir().join(format!("stoat-{}-{test_name}", std::process::id()));
        let _ = fs::remove_dir_all(&data_dir);
        Storage::new(data_dir)
    }

    #[test]
    fn test_missing_file_reads_default() -> Result {
        let storage = scratch_storage("missing");
        let document: ValuesDocument = storage.read(VALUES)?;
        assert_eq!(document, ValuesDocument::default());
        Ok(())
    }

    #[test]
    fn test_values_round_trip() -> Result {
        let storage = scratch_storage("round-trip");
        let mut document = ValuesDocument::default();
        document.slots.write_segments(0, &[
            ScheduleSegment {
                start: Utc.with_ymd_and_hms(2025, 6, 1, 2, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2025, 6, 1, 3, 0, 0).unwrap(),
                state: SlotState::Charge,
                soc: 100,
            },
            ScheduleSegment {
                start: Utc.with_ymd_and_hms(2025, 6, 1, 3, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2025, 6, 1, 6, 0, 0).unwrap(),
                state: SlotState::SellExcess,
                soc: 20,
            },
        ]);
        document.slots.get_mut(0).active = false;

        storage.write(VALUES, &document)?;
        let reloaded: ValuesDocument = storage.read(VALUES)?;
        assert_eq!(reloaded, document);

        // Unchanged content is a no-op, and re-reads stay identical.
        storage.write(VALUES, &document)?;
        let reloaded: ValuesDocument = storage.read(VALUES)?;
        assert_eq!(reloaded, document);
        Ok(())
    }

    #[test]
    fn test_manual_slots_round_trip() -> Result {
        let storage = scratch_storage("manual");
        let document = ManualSlotsDocument {
            slots: vec![ManualSlotEntry {
                start: Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2025, 6, 1, 11, 0, 0).unwrap(),
                state: SlotState::Sell,
                soc: Some(80),
            }],
        };
        storage.write(MANUAL_SLOTS, &document)?;
        let reloaded: ManualSlotsDocument = storage.read(MANUAL_SLOTS)?;
        assert_eq!(reloaded, document);
        Ok(())
    }

    #[test]
    fn test_slot_default_survives_serialization() -> Result {
        let storage = scratch_storage("default-slot");
        let document = ValuesDocument::default();
        storage.write(VALUES, &document)?;
        let reloaded: ValuesDocument = storage.read(VALUES)?;
        assert_eq!(*reloaded.slots.get(49), Slot::default());
        Ok(())
    }
}
