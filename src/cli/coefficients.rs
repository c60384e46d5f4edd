use std::path::PathBuf;

use clap::Parser;

use crate::{
    coefficients::{Coefficient, CoefficientStore},
    prelude::*,
};

/// Initial coefficient values, the defaults apply to the omitted ones.
#[derive(Parser)]
pub struct CoefficientArgs {
    /// TOML file to save the coefficients changed at runtime and to restore them on start.
    ///
    /// The restored values take precedence over the command-line ones.
    #[clap(long, env = "COEFFICIENTS_FILE")]
    pub coefficients_file: Option<PathBuf>,

    #[clap(long, env = "CONSUMPTION_MULTIPLIER")]
    consumption_multiplier: Option<f64>,

    /// €/kWh.
    #[clap(long, env = "SUPPLIER_COST")]
    supplier_cost: Option<f64>,

    #[clap(long, env = "INJECTION_MULTIPLIER")]
    injection_multiplier: Option<f64>,

    /// €/kWh.
    #[clap(long, env = "INJECTION_DEDUCTION")]
    injection_deduction: Option<f64>,

    /// €/kWh.
    #[clap(long, env = "GREEN_CERTIFICATES")]
    green_certificates: Option<f64>,

    /// €/kWh.
    #[clap(long, env = "CHP_CERTIFICATES")]
    chp_certificates: Option<f64>,

    /// €/kWh.
    #[clap(long, env = "DISTRIBUTION_COST")]
    distribution_cost: Option<f64>,

    /// €/kWh.
    #[clap(long, env = "ENERGY_CONTRIBUTION")]
    energy_contribution: Option<f64>,

    /// €/kWh.
    #[clap(long, env = "EXCISE_TAX")]
    excise_tax: Option<f64>,

    /// Percent.
    #[clap(long, env = "VAT_RATE")]
    vat_rate: Option<f64>,
}

impl CoefficientArgs {
    const fn get(&self, coefficient: Coefficient) -> Option<f64> {
        match coefficient {
            Coefficient::ConsumptionMultiplier => self.consumption_multiplier,
            Coefficient::SupplierCost => self.supplier_cost,
            Coefficient::InjectionMultiplier => self.injection_multiplier,
            Coefficient::InjectionDeduction => self.injection_deduction,
            Coefficient::GreenCertificates => self.green_certificates,
            Coefficient::ChpCertificates => self.chp_certificates,
            Coefficient::DistributionCost => self.distribution_cost,
            Coefficient::EnergyContribution => self.energy_contribution,
            Coefficient::ExciseTax => self.excise_tax,
            Coefficient::VatRate => self.vat_rate,
        }
    }

    /// Build the store from the arguments and the coefficients file.
    ///
    /// An invalid argument is an error.
    pub fn build_store(&self) -> Result<CoefficientStore> {
        let store = CoefficientStore::default();
        for coefficient in Coefficient::all() {
            if let Some(value) = self.get(coefficient) {
                store
                    .set(coefficient, value)
                    .with_context(|| format!("invalid `{coefficient}` argument"))?;
            }
        }
        if let Some(path) = &self.coefficients_file {
            store.restore_from(path)?;
        }
        Ok(store)
    }
}
