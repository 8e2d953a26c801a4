// The nine payload columns of an aggregate record, one per upstream endpoint.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceField {
    BusArrival,
    CarparkAvailability,
    EstimatedTravelTimes,
    PlatformCrowdNel,
    PlatformCrowdNsl,
    PlatformCrowdCcl,
    TaxiAvailability,
    TrafficSpeedBand,
    Rainfall,
}

impl SourceField {
    /// Column order of the stored entity.
    pub const ALL: [SourceField; 9] = [
        SourceField::BusArrival,
        SourceField::CarparkAvailability,
        SourceField::EstimatedTravelTimes,
        SourceField::PlatformCrowdNel,
        SourceField::PlatformCrowdNsl,
        SourceField::PlatformCrowdCcl,
        SourceField::TaxiAvailability,
        SourceField::TrafficSpeedBand,
        SourceField::Rainfall,
    ];

    /// Property name in the table entity.
    pub fn column(self) -> &'static str {
        match self {
            SourceField::BusArrival => "bus_arrival",
            SourceField::CarparkAvailability => "carpark_availability",
            SourceField::EstimatedTravelTimes => "estimated_travel_times",
            SourceField::PlatformCrowdNel => "platform_crowd_nel",
            SourceField::PlatformCrowdNsl => "platform_crowd_nsl",
            SourceField::PlatformCrowdCcl => "platform_crowd_ccl",
            SourceField::TaxiAvailability => "taxi_availability",
            SourceField::TrafficSpeedBand => "traffic_speed_band",
            SourceField::Rainfall => "rainfall",
        }
    }

    pub fn from_column(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.column() == name)
    }
}

impl std::fmt::Display for SourceField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}
