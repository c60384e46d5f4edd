quantity!(
    /// Euro per kilowatt-hour.
    KilowattHourPrice, via: f64, suffix: "€/kWh", precision: 4
);
