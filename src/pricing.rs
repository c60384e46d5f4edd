//! Ecopower retail price formulas.

use crate::{
    coefficients::Coefficient,
    core::interval::Interval,
    quantity::{percentage::Percentage, price::KilowattHourPrice},
    source::PriceInterval,
};

/// Immutable set of the formula coefficients, used for one computation.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Coefficients {
    pub consumption_multiplier: f64,
    pub supplier_cost: KilowattHourPrice,
    pub injection_multiplier: f64,
    pub injection_deduction: KilowattHourPrice,
    pub green_certificates: KilowattHourPrice,
    pub chp_certificates: KilowattHourPrice,
    pub distribution_cost: KilowattHourPrice,
    pub energy_contribution: KilowattHourPrice,
    pub excise_tax: KilowattHourPrice,
    pub vat_rate: Percentage,
}

impl Default for Coefficients {
    fn default() -> Self {
        Self::from_fn(Coefficient::default_value)
    }
}

impl Coefficients {
    pub fn from_fn(mut value_of: impl FnMut(Coefficient) -> f64) -> Self {
        Self {
            consumption_multiplier: value_of(Coefficient::ConsumptionMultiplier),
            supplier_cost: KilowattHourPrice(value_of(Coefficient::SupplierCost)),
            injection_multiplier: value_of(Coefficient::InjectionMultiplier),
            injection_deduction: KilowattHourPrice(value_of(Coefficient::InjectionDeduction)),
            green_certificates: KilowattHourPrice(value_of(Coefficient::GreenCertificates)),
            chp_certificates: KilowattHourPrice(value_of(Coefficient::ChpCertificates)),
            distribution_cost: KilowattHourPrice(value_of(Coefficient::DistributionCost)),
            energy_contribution: KilowattHourPrice(value_of(Coefficient::EnergyContribution)),
            excise_tax: KilowattHourPrice(value_of(Coefficient::ExciseTax)),
            vat_rate: Percentage(value_of(Coefficient::VatRate)),
        }
    }

    #[must_use]
    pub const fn get(&self, coefficient: Coefficient) -> f64 {
        match coefficient {
            Coefficient::ConsumptionMultiplier => self.consumption_multiplier,
            Coefficient::SupplierCost => self.supplier_cost.0,
            Coefficient::InjectionMultiplier => self.injection_multiplier,
            Coefficient::InjectionDeduction => self.injection_deduction.0,
            Coefficient::GreenCertificates => self.green_certificates.0,
            Coefficient::ChpCertificates => self.chp_certificates.0,
            Coefficient::DistributionCost => self.distribution_cost.0,
            Coefficient::EnergyContribution => self.energy_contribution.0,
            Coefficient::ExciseTax => self.excise_tax.0,
            Coefficient::VatRate => self.vat_rate.0,
        }
    }

    /// Fixed costs added to the consumption price before VAT.
    pub fn consumption_surcharges(&self) -> KilowattHourPrice {
        self.supplier_cost
            + self.green_certificates
            + self.chp_certificates
            + self.distribution_cost
            + self.energy_contribution
            + self.excise_tax
    }
}

/// Price of the energy drawn from the grid.
///
/// `((market × consumption_multiplier) + surcharges) × (1 + VAT)`
pub fn consumption_price(
    market_price: KilowattHourPrice,
    coefficients: &Coefficients,
) -> KilowattHourPrice {
    (market_price * coefficients.consumption_multiplier + coefficients.consumption_surcharges())
        * coefficients.vat_rate.to_surcharge_factor()
}

/// Price paid for the energy fed into the grid.
///
/// `(market × injection_multiplier) − injection_deduction`
pub fn injection_price(
    market_price: KilowattHourPrice,
    coefficients: &Coefficients,
) -> KilowattHourPrice {
    market_price * coefficients.injection_multiplier - coefficients.injection_deduction
}

/// Which of the derived prices to look at.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PriceKind {
    Consumption,
    Injection,
}

impl PriceKind {
    pub const ALL: [Self; 2] = [Self::Consumption, Self::Injection];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Consumption => "consumption",
            Self::Injection => "injection",
        }
    }
}

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PricedInterval {
    pub interval: Interval,
    pub market_price: KilowattHourPrice,
    pub consumption_price: KilowattHourPrice,
    pub injection_price: KilowattHourPrice,
}

impl PricedInterval {
    pub fn new(interval: &PriceInterval, coefficients: &Coefficients) -> Self {
        Self {
            interval: interval.interval,
            market_price: interval.market_price,
            consumption_price: consumption_price(interval.market_price, coefficients),
            injection_price: injection_price(interval.market_price, coefficients),
        }
    }

    #[must_use]
    pub const fn price(&self, kind: PriceKind) -> KilowattHourPrice {
        match kind {
            PriceKind::Consumption => self.consumption_price,
            PriceKind::Injection => self.injection_price,
        }
    }
}

/// Apply the formulas to the whole series with the same coefficients.
pub fn price_series(series: &[PriceInterval], coefficients: &Coefficients) -> Vec<PricedInterval> {
    series.iter().map(|interval| PricedInterval::new(interval, coefficients)).collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_consumption_price_with_defaults() {
        let price = consumption_price(KilowattHourPrice(0.10), &Coefficients::default());
        assert_abs_diff_eq!(price.0, 0.242_952, epsilon = 1e-12);
        assert_abs_diff_eq!(price.rounded(), 0.2430);
    }

    #[test]
    fn test_injection_price_with_defaults() {
        let price = injection_price(KilowattHourPrice(0.10), &Coefficients::default());
        assert_abs_diff_eq!(price.0, 0.083, epsilon = 1e-12);
    }

    #[test]
    fn test_negative_market_price_is_not_clamped() {
        let coefficients = Coefficients::default();
        let market_price = KilowattHourPrice(-0.25);
        assert_abs_diff_eq!(
            consumption_price(market_price, &coefficients).0,
            (-0.25 * 1.02 + 0.1272) * 1.06,
            epsilon = 1e-12,
        );
        assert_abs_diff_eq!(
            injection_price(market_price, &coefficients).0,
            -0.25 * 0.98 - 0.015,
            epsilon = 1e-12,
        );
    }

    #[test]
    fn test_custom_coefficients() {
        let coefficients = Coefficients {
            consumption_multiplier: 1.0,
            vat_rate: Percentage(21.0),
            injection_multiplier: 1.0,
            injection_deduction: KilowattHourPrice::ZERO,
            ..Coefficients::default()
        };
        let market_price = KilowattHourPrice(0.2);
        assert_abs_diff_eq!(
            consumption_price(market_price, &coefficients).0,
            (0.2 + 0.1272) * 1.21,
            epsilon = 1e-12,
        );
        assert_abs_diff_eq!(injection_price(market_price, &coefficients).0, 0.2);
    }

    #[test]
    fn test_deterministic() {
        let coefficients = Coefficients::default();
        for market_price in [-0.5, 0.0, 0.0123, 0.4] {
            let market_price = KilowattHourPrice(market_price);
            assert_eq!(
                consumption_price(market_price, &coefficients),
                consumption_price(market_price, &coefficients),
            );
            assert_eq!(
                injection_price(market_price, &coefficients),
                injection_price(market_price, &coefficients),
            );
        }
    }

    #[test]
    fn test_from_fn_round_trips_through_get() {
        let coefficients = Coefficients::default();
        for coefficient in Coefficient::all() {
            assert_abs_diff_eq!(coefficients.get(coefficient), coefficient.default_value());
        }
    }
}
