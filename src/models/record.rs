// Aggregate record: one row per successful cycle, never updated by the collector.
// A failed fetch is an explicit `None` payload and is stored as a null property.

use super::SourceField;
use crate::table_store::{EntityValue, StoreError, TableEntity};

/// Flag left for the downstream consumer; always written as `false`.
pub const PROCESSED_PROPERTY: &str = "processed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRecord {
    pub partition_key: String,
    pub row_key: String,
    pub bus_arrival: Option<String>,
    pub carpark_availability: Option<String>,
    pub estimated_travel_times: Option<String>,
    pub platform_crowd_nel: Option<String>,
    pub platform_crowd_nsl: Option<String>,
    pub platform_crowd_ccl: Option<String>,
    pub taxi_availability: Option<String>,
    pub traffic_speed_band: Option<String>,
    pub rainfall: Option<String>,
    pub processed: bool,
}

impl AggregateRecord {
    /// Empty record (all payloads missing, not processed).
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            bus_arrival: None,
            carpark_availability: None,
            estimated_travel_times: None,
            platform_crowd_nel: None,
            platform_crowd_nsl: None,
            platform_crowd_ccl: None,
            taxi_availability: None,
            traffic_speed_band: None,
            rainfall: None,
            processed: false,
        }
    }

    pub fn payload(&self, field: SourceField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    pub fn set_payload(&mut self, field: SourceField, payload: Option<String>) {
        *self.slot_mut(field) = payload;
    }

    /// Fields whose fetch failed, in column order.
    pub fn missing_fields(&self) -> Vec<SourceField> {
        SourceField::ALL
            .into_iter()
            .filter(|f| self.slot(*f).is_none())
            .collect()
    }

    fn slot(&self, field: SourceField) -> &Option<String> {
        match field {
            SourceField::BusArrival => &self.bus_arrival,
            SourceField::CarparkAvailability => &self.carpark_availability,
            SourceField::EstimatedTravelTimes => &self.estimated_travel_times,
            SourceField::PlatformCrowdNel => &self.platform_crowd_nel,
            SourceField::PlatformCrowdNsl => &self.platform_crowd_nsl,
            SourceField::PlatformCrowdCcl => &self.platform_crowd_ccl,
            SourceField::TaxiAvailability => &self.taxi_availability,
            SourceField::TrafficSpeedBand => &self.traffic_speed_band,
            SourceField::Rainfall => &self.rainfall,
        }
    }

    fn slot_mut(&mut self, field: SourceField) -> &mut Option<String> {
        match field {
            SourceField::BusArrival => &mut self.bus_arrival,
            SourceField::CarparkAvailability => &mut self.carpark_availability,
            SourceField::EstimatedTravelTimes => &mut self.estimated_travel_times,
            SourceField::PlatformCrowdNel => &mut self.platform_crowd_nel,
            SourceField::PlatformCrowdNsl => &mut self.platform_crowd_nsl,
            SourceField::PlatformCrowdCcl => &mut self.platform_crowd_ccl,
            SourceField::TaxiAvailability => &mut self.taxi_availability,
            SourceField::TrafficSpeedBand => &mut self.traffic_speed_band,
            SourceField::Rainfall => &mut self.rainfall,
        }
    }

    /// Flat entity: nine payload properties (text or null) plus `processed`.
    pub fn to_entity(&self) -> TableEntity {
        let mut entity = TableEntity::new(self.partition_key.clone(), self.row_key.clone());
        for field in SourceField::ALL {
            let value = match self.slot(field) {
                Some(text) => EntityValue::Text(text.clone()),
                None => EntityValue::Null,
            };
            entity.properties.insert(field.column().to_string(), value);
        }
        entity.properties.insert(
            PROCESSED_PROPERTY.to_string(),
            EntityValue::Bool(self.processed),
        );
        entity
    }

    /// Inverse of [`to_entity`](Self::to_entity). A missing payload property reads as `None`.
    pub fn from_entity(entity: &TableEntity) -> Result<Self, StoreError> {
        let mut record = Self::new(entity.partition_key.clone(), entity.row_key.clone());
        for field in SourceField::ALL {
            let payload = match entity.properties.get(field.column()) {
                None | Some(EntityValue::Null) => None,
                Some(EntityValue::Text(text)) => Some(text.clone()),
                Some(EntityValue::Bool(_)) => {
                    return Err(StoreError::Malformed(format!(
                        "property '{}' is not text",
                        field.column()
                    )));
                }
            };
            record.set_payload(field, payload);
        }
        record.processed = match entity.properties.get(PROCESSED_PROPERTY) {
            Some(EntityValue::Bool(b)) => *b,
            None | Some(EntityValue::Null) => false,
            Some(EntityValue::Text(_)) => {
                return Err(StoreError::Malformed(format!(
                    "property '{}' is not a boolean",
                    PROCESSED_PROPERTY
                )));
            }
        };
        Ok(record)
    }
}
