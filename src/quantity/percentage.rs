quantity!(Percentage, via: f64, suffix: "%", precision: 1);

impl Percentage {
    /// Convert the percentage into a multiplier on top of the base: 6% becomes `1.06`.
    pub fn to_surcharge_factor(self) -> f64 {
        1.0 + self.0 / 100.0
    }
}
