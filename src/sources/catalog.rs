// Endpoint table: eight transport endpoints (fetch order) then the rainfall feed.
// The three platform-crowd endpoints form one failure group.

use crate::config::SourcesConfig;
use crate::models::SourceField;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Api {
    /// Rainfall; `date_time` query, JSON content type.
    Weather,
    /// Transport; `AccountKey` header.
    Transport,
}

/// Failure scope. A `Single` endpoint fails alone; members of any other group fail together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchGroup {
    Single,
    PlatformCrowd,
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub field: SourceField,
    pub api: Api,
    pub url: String,
    /// Fixed query parameters (the weather timestamp is added per cycle).
    pub query: Vec<(String, String)>,
    pub group: FetchGroup,
}

impl Endpoint {
    fn transport(base: &str, field: SourceField, path: &str) -> Self {
        Self {
            field,
            api: Api::Transport,
            url: format!("{}/{}", base, path),
            query: Vec::new(),
            group: FetchGroup::Single,
        }
    }

    fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    fn in_group(mut self, group: FetchGroup) -> Self {
        self.group = group;
        self
    }
}

pub fn catalog(config: &SourcesConfig) -> Vec<Endpoint> {
    let base = config.transport_base_url.trim_end_matches('/');
    let crowd = |field, line: &str| {
        Endpoint::transport(base, field, "PCDRealTime")
            .with_query("TrainLine", line)
            .in_group(FetchGroup::PlatformCrowd)
    };
    vec![
        Endpoint::transport(base, SourceField::BusArrival, "BusArrivalv2")
            .with_query("BusStopCode", &config.bus_stop_code),
        Endpoint::transport(base, SourceField::TaxiAvailability, "Taxi-Availability"),
        Endpoint::transport(base, SourceField::CarparkAvailability, "CarParkAvailabilityv2"),
        Endpoint::transport(base, SourceField::EstimatedTravelTimes, "EstTravelTimes"),
        Endpoint::transport(base, SourceField::TrafficSpeedBand, "v3/TrafficSpeedBands"),
        crowd(SourceField::PlatformCrowdNel, "NEL"),
        crowd(SourceField::PlatformCrowdNsl, "NSL"),
        crowd(SourceField::PlatformCrowdCcl, "CCL"),
        Endpoint {
            field: SourceField::Rainfall,
            api: Api::Weather,
            url: config.weather_url.clone(),
            query: Vec::new(),
            group: FetchGroup::Single,
        },
    ]
}
