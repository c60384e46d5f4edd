use std::{
    collections::BTreeMap,
    fmt::{Debug, Display, Formatter},
    fs,
    ops::RangeInclusive,
    path::Path,
    str::FromStr,
    sync::{Mutex, MutexGuard, PoisonError},
};

use enumset::EnumSet;

use crate::{error::PriceError, prelude::*, pricing::Coefficients};

/// Tunable parameter of the price formulas.
#[derive(Debug, Hash, Ord, PartialOrd, enumset::EnumSetType)]
pub enum Coefficient {
    /// Ecopower margin on the market price for consumption.
    ConsumptionMultiplier,

    /// Ecopower administration cost.
    SupplierCost,

    /// Ecopower margin on the market price for injection.
    InjectionMultiplier,

    /// Ecopower fee withheld from injection.
    InjectionDeduction,

    /// Green power certificates («groenestroomcertificaten»).
    GreenCertificates,

    /// Combined heat and power certificates («warmte-krachtkoppeling»).
    ChpCertificates,

    /// Distribution grid offtake tariff («afnametarief»).
    DistributionCost,

    /// Federal energy contribution («bijdrage op energie»).
    EnergyContribution,

    /// Special excise duty («bijzondere accijns»).
    ExciseTax,

    /// VAT percentage.
    VatRate,
}

impl Coefficient {
    pub fn all() -> EnumSet<Self> {
        EnumSet::all()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::ConsumptionMultiplier => "consumption_multiplier",
            Self::SupplierCost => "supplier_cost",
            Self::InjectionMultiplier => "injection_multiplier",
            Self::InjectionDeduction => "injection_deduction",
            Self::GreenCertificates => "green_certificates",
            Self::ChpCertificates => "chp_certificates",
            Self::DistributionCost => "distribution_cost",
            Self::EnergyContribution => "energy_contribution",
            Self::ExciseTax => "excise_tax",
            Self::VatRate => "vat_rate",
        }
    }

    pub const fn default_value(self) -> f64 {
        match self {
            Self::ConsumptionMultiplier => 1.02,
            Self::SupplierCost => 0.004,
            Self::InjectionMultiplier => 0.98,
            Self::InjectionDeduction => 0.015,
            Self::GreenCertificates => 0.011,
            Self::ChpCertificates => 0.0039,
            Self::DistributionCost => 0.0589,
            Self::EnergyContribution => 0.0019,
            Self::ExciseTax => 0.0475,
            Self::VatRate => 6.0,
        }
    }

    pub const fn unit(self) -> &'static str {
        match self {
            Self::ConsumptionMultiplier | Self::InjectionMultiplier => "×",
            Self::VatRate => "%",
            Self::SupplierCost
            | Self::InjectionDeduction
            | Self::GreenCertificates
            | Self::ChpCertificates
            | Self::DistributionCost
            | Self::EnergyContribution
            | Self::ExciseTax => "€/kWh",
        }
    }

    /// Accepted values, inclusive.
    pub const fn bounds(self) -> RangeInclusive<f64> {
        match self {
            Self::ConsumptionMultiplier => 0.5..=2.0,
            Self::InjectionMultiplier => 0.5..=1.5,
            Self::DistributionCost | Self::ExciseTax => 0.0..=0.2,
            Self::VatRate => 0.0..=30.0,
            Self::SupplierCost
            | Self::InjectionDeduction
            | Self::GreenCertificates
            | Self::ChpCertificates
            | Self::EnergyContribution => 0.0..=0.1,
        }
    }

    pub fn validate(self, value: f64) -> Result<f64, PriceError> {
        if !value.is_finite() {
            return Err(self.invalid(value, "the value must be finite".to_owned()));
        }
        let bounds = self.bounds();
        if !bounds.contains(&value) {
            return Err(self.invalid(
                value,
                format!("expected between {} and {}", bounds.start(), bounds.end()),
            ));
        }
        Ok(value)
    }

    fn invalid(self, value: f64, reason: String) -> PriceError {
        PriceError::InvalidValue { coefficient: self, value, reason }
    }
}

impl Display for Coefficient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Coefficient {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        Self::all()
            .iter()
            .find(|coefficient| coefficient.name() == name)
            .with_context(|| format!("unknown coefficient `{name}`"))
    }
}

/// Last known values of the coefficients of one price source.
///
/// Only the explicitly set values are stored, everything else falls back to the defaults.
#[derive(Default)]
pub struct CoefficientStore(Mutex<BTreeMap<Coefficient, f64>>);

impl Debug for CoefficientStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.lock().iter()).finish()
    }
}

impl CoefficientStore {
    #[must_use]
    pub fn get(&self, coefficient: Coefficient) -> f64 {
        self.lock().get(&coefficient).copied().unwrap_or_else(|| coefficient.default_value())
    }

    /// Set the coefficient and return the previous value.
    ///
    /// Invalid values are rejected and leave the stored value untouched.
    pub fn set(&self, coefficient: Coefficient, value: f64) -> Result<f64, PriceError> {
        let value = coefficient.validate(value)?;
        let previous = self.lock().insert(coefficient, value);
        debug!(%coefficient, value, ?previous, "set");
        Ok(previous.unwrap_or_else(|| coefficient.default_value()))
    }

    /// Immutable copy of all the current values.
    pub fn coefficients(&self) -> Coefficients {
        Coefficients::from_fn(|coefficient| self.get(coefficient))
    }

    /// Restore the values saved by [`CoefficientStore::save_to`].
    ///
    /// A missing file is not an error. Invalid entries are skipped.
    #[instrument(skip(self), name = "restoring coefficients…")]
    pub fn restore_from<P: AsRef<Path> + Debug>(&self, path: P) -> Result {
        let path = path.as_ref();
        if !path.is_file() {
            info!("nothing to restore");
            return Ok(());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        let saved: BTreeMap<String, f64> = toml::from_str(&contents)
            .with_context(|| format!("failed to parse `{}`", path.display()))?;
        for (name, value) in saved {
            match name.parse::<Coefficient>() {
                Ok(coefficient) => {
                    if let Err(error) = self.set(coefficient, value) {
                        warn!("skipped: {error:#}");
                    }
                }
                Err(error) => warn!("skipped: {error:#}"),
            }
        }
        info!(store = ?self, "restored");
        Ok(())
    }

    #[instrument(skip(self), name = "saving coefficients…")]
    pub fn save_to<P: AsRef<Path> + Debug>(&self, path: P) -> Result {
        let saved: BTreeMap<&'static str, f64> =
            self.lock().iter().map(|(coefficient, value)| (coefficient.name(), *value)).collect();
        fs::write(path.as_ref(), toml::to_string(&saved)?)
            .with_context(|| format!("failed to write `{}`", path.as_ref().display()))?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<Coefficient, f64>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
