use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::{
    coefficients::Coefficient,
    pricing::{Coefficients, PriceKind},
    quantity::price::KilowattHourPrice,
    snapshot::Snapshot,
    statistics::DaySummary,
};

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.enforce_styling();
    table
}

fn mean_price(snapshot: &Snapshot, kind: PriceKind) -> KilowattHourPrice {
    if snapshot.intervals.is_empty() {
        return KilowattHourPrice::ZERO;
    }
    #[allow(clippy::cast_precision_loss)]
    let n_intervals = snapshot.intervals.len() as f64;
    snapshot.intervals.iter().map(|interval| interval.price(kind)).sum::<KilowattHourPrice>()
        / n_intervals
}

pub fn build_prices_table(snapshot: &Snapshot) -> Table {
    let mean_consumption_price = mean_price(snapshot, PriceKind::Consumption);
    let mean_injection_price = mean_price(snapshot, PriceKind::Injection);

    let mut table = new_table();
    table.set_header(vec!["Date", "Start", "End", "Market", "Consumption", "Injection"]);
    for interval in &snapshot.intervals {
        let start = interval.interval.start.with_timezone(&snapshot.time_zone);
        let end = interval.interval.end.with_timezone(&snapshot.time_zone);
        table.add_row(vec![
            Cell::new(start.format("%b %d")).add_attribute(Attribute::Dim),
            Cell::new(start.format("%H:%M")),
            Cell::new(end.format("%H:%M")).add_attribute(Attribute::Dim),
            Cell::new(interval.market_price)
                .set_alignment(CellAlignment::Right)
                .add_attribute(Attribute::Dim),
            Cell::new(interval.consumption_price).set_alignment(CellAlignment::Right).fg(
                if interval.consumption_price >= mean_consumption_price {
                    Color::Red
                } else {
                    Color::Green
                },
            ),
            Cell::new(interval.injection_price).set_alignment(CellAlignment::Right).fg(
                if interval.injection_price >= mean_injection_price {
                    Color::Green
                } else {
                    Color::Red
                },
            ),
        ]);
    }
    table
}

pub fn build_summary_table(snapshot: &Snapshot) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Price", "Day", "Min", "Max", "Mean"]);
    for kind in PriceKind::ALL {
        let summaries = snapshot.summaries(kind);
        for (day, summary) in [("today", summaries.today), ("tomorrow", summaries.tomorrow)] {
            table.add_row(summary_row(kind, day, summary));
        }
    }
    table
}

fn summary_row(kind: PriceKind, day: &str, summary: DaySummary) -> Vec<Cell> {
    let cell = |price: Option<KilowattHourPrice>| match price {
        Some(price) => Cell::new(price).set_alignment(CellAlignment::Right),
        None => Cell::new("n/a").set_alignment(CellAlignment::Right).add_attribute(Attribute::Dim),
    };
    vec![
        Cell::new(kind.name()),
        Cell::new(day).fg(if summary.is_valid() { Color::Reset } else { Color::DarkYellow }),
        cell(summary.min),
        cell(summary.max),
        cell(summary.mean),
    ]
}

pub fn build_coefficients_table(coefficients: &Coefficients) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Coefficient", "Value", "Default", "Unit", "Bounds"]);
    for coefficient in Coefficient::all() {
        let value = coefficients.get(coefficient);
        let default_value = coefficient.default_value();
        let bounds = coefficient.bounds();
        #[allow(clippy::float_cmp)]
        let is_default = value == default_value;
        table.add_row(vec![
            Cell::new(coefficient.name()),
            Cell::new(value)
                .set_alignment(CellAlignment::Right)
                .fg(if is_default { Color::Reset } else { Color::Cyan }),
            Cell::new(default_value).set_alignment(CellAlignment::Right).add_attribute(Attribute::Dim),
            Cell::new(coefficient.unit()),
            Cell::new(format!("{} – {}", bounds.start(), bounds.end())).add_attribute(Attribute::Dim),
        ]);
    }
    table
}
