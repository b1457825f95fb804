//! Latest-value cache
//!
//! The most recent write accepted for each output point, keyed by point type
//! and index. The outstation's command handlers record here on the Select
//! phase already, so a later read sees the value even before the Operate
//! lands; a write the engine rejects is discarded again.

use crate::value::PointValue;
use dashmap::DashMap;
use mesa_model::PointType;
use tracing::debug;

/// Concurrent store of the latest received value per output point.
#[derive(Debug, Default)]
pub struct LatestValues {
    values: DashMap<(PointType, u16), PointValue>,
}

impl LatestValues {
    pub fn new() -> Self {
        LatestValues::default()
    }

    /// Remember `value` as the latest for its point.
    pub fn record(&self, value: &PointValue) {
        self.values
            .insert((value.value.point_type(), value.index), value.clone());
    }

    /// Forget the cached value for a point, if any.
    pub fn discard(&self, point_type: PointType, index: u16) {
        if self.values.remove(&(point_type, index)).is_some() {
            debug!(%point_type, index, "Discarded cached point value");
        }
    }

    /// The latest value recorded for a point.
    pub fn get(&self, point_type: PointType, index: u16) -> Option<PointValue> {
        self.values.get(&(point_type, index)).map(|v| v.clone())
    }

    /// Snapshot of every cached value.
    pub fn all(&self) -> Vec<PointValue> {
        self.values.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{CommandPhase, PointWriteValue};
    use mesa_model::{PointDefinition, PointRecord};
    use std::sync::Arc;

    fn analog_write(index: u16, value: f64) -> PointValue {
        let record = PointRecord {
            name: format!("p{}", index),
            group: Some(41),
            variation: Some(2),
            index: Some(index),
            ..Default::default()
        };
        PointValue::new(
            CommandPhase::Select,
            Arc::new(PointDefinition::from_record(record).unwrap()),
            index,
            PointWriteValue::Analog(value),
            None,
        )
    }

    #[test]
    fn record_get_discard() {
        let cache = LatestValues::new();
        cache.record(&analog_write(91, 180.0));
        let cached = cache.get(PointType::AnalogOutput, 91).unwrap();
        assert_eq!(cached.value, PointWriteValue::Analog(180.0));

        cache.record(&analog_write(91, 200.0));
        assert_eq!(cache.len(), 1);

        cache.discard(PointType::AnalogOutput, 91);
        assert!(cache.get(PointType::AnalogOutput, 91).is_none());
        assert!(cache.is_empty());
    }
}
