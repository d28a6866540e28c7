use chrono_tz::Tz;
use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::{
    prices::PricePoint,
    slots::{SlotState, SlotStore},
};

#[must_use]
pub fn build_slots_table(store: &SlotStore, timezone: Tz) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.enforce_styling();
    table.set_header(vec!["#", "Start", "State", "Active", "SOC"]);
    for (number, slot) in (1..).zip(store.iter()) {
        let start = slot.start.map_or_else(String::new, |start| {
            start.with_timezone(&timezone).format("%a %H:%M").to_string()
        });
        table.add_row(vec![
            Cell::new(number).add_attribute(Attribute::Dim),
            Cell::new(start),
            Cell::new(slot.state).fg(state_color(slot.state)),
            Cell::new(if slot.active { "yes" } else { "no" }).fg(if slot.active {
                Color::Reset
            } else {
                Color::DarkYellow
            }),
            Cell::new(format!("{}%", slot.soc)).set_alignment(CellAlignment::Right),
        ]);
        if slot.is_off() {
            // Whatever sits past the sentinel is stale residue.
            break;
        }
    }
    table
}

#[must_use]
pub fn build_prices_table(points: &[PricePoint], timezone: Tz) -> Table {
    let median = {
        let mut values: Vec<f64> =
            points.iter().map(|point| point.value).filter(|value| value.is_finite()).collect();
        values.sort_unstable_by(f64::total_cmp);
        values.get(values.len() / 2).copied().unwrap_or_default()
    };
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.enforce_styling();
    table.set_header(vec!["Start", "End", "Price"]);
    for point in points {
        table.add_row(vec![
            Cell::new(point.start.with_timezone(&timezone).format("%a %H:%M")),
            Cell::new(point.end.with_timezone(&timezone).format("%H:%M"))
                .add_attribute(Attribute::Dim),
            Cell::new(format!("{:.3}", point.value))
                .set_alignment(CellAlignment::Right)
                .fg(if point.value >= median { Color::Red } else { Color::Green }),
        ]);
    }
    table
}

const fn state_color(state: SlotState) -> Color {
    match state {
        SlotState::Charge => Color::Green,
        SlotState::Discharge => Color::Red,
        SlotState::Sell | SlotState::SellExcess => Color::Cyan,
        SlotState::DiscardExcess => Color::Magenta,
        SlotState::Pause => Color::DarkYellow,
        SlotState::Off => Color::Reset,
    }
}
