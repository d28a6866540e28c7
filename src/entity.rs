//! The bound-field registry: every configuration scalar and every slot
//! position exposed as a typed `(kind, id, store, value)` field that a UI
//! adapter can render and write back through.

use chrono::{DateTime, NaiveTime, Utc};
use clap::ValueEnum;

use crate::{
    area::{Area, KNOWN_AREAS},
    error::PlannerError,
    orchestrator::PlannerState,
    planner::Strategy,
    prelude::*,
    slots::{SLOT_COUNT, SlotState},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    DateTime,
    Time,
    Number,
    Select,
    Switch,
}

/// Which persisted document the field reads from and writes to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DataStore {
    Values,
    Config,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    DateTime(Option<DateTime<Utc>>),
    Time(NaiveTime),
    Number(f64),
    Select(String),
    Switch(bool),
}

pub struct BoundField {
    pub kind: FieldKind,
    pub id: String,
    pub store: DataStore,
    pub options: Vec<String>,
    pub value: Option<FieldValue>,
}

impl BoundField {
    fn new(kind: FieldKind, id: impl Into<String>, store: DataStore) -> Self {
        Self { kind, id: id.into(), store, options: Vec::new(), value: None }
    }

    fn with_options<S: ToString>(mut self, options: impl IntoIterator<Item = S>) -> Self {
        self.options = options.into_iter().map(|option| option.to_string()).collect();
        self
    }
}

pub struct EntityRegistry {
    fields: Vec<BoundField>,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry {
    pub fn new() -> Self {
        let state_options = SlotState::value_variants();
        let manual_state_options: Vec<&SlotState> =
            state_options.iter().filter(|state| **state != SlotState::Off).collect();

        let mut fields = Vec::new();
        for n in 1..=SLOT_COUNT {
            fields.push(BoundField::new(
                FieldKind::DateTime,
                format!("slot_{n}_date_time_start"),
                DataStore::Values,
            ));
            fields.push(
                BoundField::new(FieldKind::Select, format!("slot_{n}_state"), DataStore::Values)
                    .with_options(state_options),
            );
            fields.push(BoundField::new(
                FieldKind::Switch,
                format!("slot_{n}_active"),
                DataStore::Values,
            ));
            fields.push(BoundField::new(
                FieldKind::Number,
                format!("slot_{n}_soc"),
                DataStore::Values,
            ));
        }

        fields.push(BoundField::new(FieldKind::Time, "earliest_charge_time", DataStore::Config));
        fields.push(BoundField::new(
            FieldKind::Time,
            "earliest_discharge_time",
            DataStore::Config,
        ));
        for id in [
            "basic_nr_of_charge_hours",
            "basic_nr_of_discharge_hours",
            "cheapest_hours_nr_of_charge_hours",
            "price_peak_nr_of_charge_hours",
            "price_peak_nr_of_discharge_hours",
            "price_peak_efficiency_factor",
            "battery_max_soc",
            "battery_shutdown_soc",
        ] {
            fields.push(BoundField::new(FieldKind::Number, id, DataStore::Config));
        }
        fields.push(
            BoundField::new(FieldKind::Select, "planner_state", DataStore::Config)
                .with_options(Strategy::value_variants()),
        );
        for id in
            ["price_peak_cheap_state", "price_peak_expensive_state", "price_peak_inbetween_state"]
        {
            fields.push(
                BoundField::new(FieldKind::Select, id, DataStore::Config)
                    .with_options(manual_state_options.iter().copied()),
            );
        }
        fields.push(
            BoundField::new(FieldKind::Select, "area", DataStore::Config)
                .with_options(KNOWN_AREAS),
        );
        fields.push(
            BoundField::new(FieldKind::Select, "currency", DataStore::Config)
                .with_options(["DKK", "EUR", "NOK", "SEK"]),
        );
        Self { fields }
    }

    pub fn fields(&self) -> &[BoundField] {
        &self.fields
    }

    pub fn get(&self, id: &str) -> Option<&BoundField> {
        self.fields.iter().find(|field| field.id == id)
    }

    /// Pull current values out of the state after a batch of writes — the
    /// `update()` notification of the UI contract.
    pub fn refresh(&mut self, state: &PlannerState, values: bool, config: bool) {
        for field in &mut self.fields {
            let selected = match field.store {
                DataStore::Values => values,
                DataStore::Config => config,
            };
            if selected {
                field.value = read_field(state, &field.id);
            }
        }
    }
}

enum SlotField {
    Start,
    State,
    Active,
    Soc,
}

/// `slot_{n}_…` → zero-based index and the addressed slot field.
fn parse_slot_id(id: &str) -> Option<(usize, SlotField)> {
    let rest = id.strip_prefix("slot_")?;
    let (number, field) = rest.split_once('_')?;
    let number: usize = number.parse().ok()?;
    if !(1..=SLOT_COUNT).contains(&number) {
        return None;
    }
    let field = match field {
        "date_time_start" => SlotField::Start,
        "state" => SlotField::State,
        "active" => SlotField::Active,
        "soc" => SlotField::Soc,
        _ => return None,
    };
    Some((number - 1, field))
}

fn read_field(state: &PlannerState, id: &str) -> Option<FieldValue> {
    if let Some((index, field)) = parse_slot_id(id) {
        let slot = state.slots.get(index);
        return Some(match field {
            SlotField::Start => FieldValue::DateTime(slot.start),
            SlotField::State => FieldValue::Select(slot.state.to_string()),
            SlotField::Active => FieldValue::Switch(slot.active),
            SlotField::Soc => FieldValue::Number(f64::from(slot.soc)),
        });
    }
    let config = &state.config;
    let value = match id {
        "earliest_charge_time" => FieldValue::Time(config.earliest_charge_time),
        "earliest_discharge_time" => FieldValue::Time(config.earliest_discharge_time),
        "basic_nr_of_charge_hours" => FieldValue::Number(config.basic_nr_of_charge_hours),
        "basic_nr_of_discharge_hours" => FieldValue::Number(config.basic_nr_of_discharge_hours),
        "cheapest_hours_nr_of_charge_hours" => {
            FieldValue::Number(config.cheapest_hours_nr_of_charge_hours)
        }
        "price_peak_nr_of_charge_hours" => {
            FieldValue::Number(config.price_peak_nr_of_charge_hours)
        }
        "price_peak_nr_of_discharge_hours" => {
            FieldValue::Number(config.price_peak_nr_of_discharge_hours)
        }
        "price_peak_efficiency_factor" => FieldValue::Number(config.price_peak_efficiency_factor),
        "battery_max_soc" => FieldValue::Number(f64::from(config.battery_max_soc)),
        "battery_shutdown_soc" => FieldValue::Number(f64::from(config.battery_shutdown_soc)),
        "planner_state" => FieldValue::Select(config.strategy.to_string()),
        "price_peak_cheap_state" => FieldValue::Select(config.price_peak_cheap_state.to_string()),
        "price_peak_expensive_state" => {
            FieldValue::Select(config.price_peak_expensive_state.to_string())
        }
        "price_peak_inbetween_state" => {
            FieldValue::Select(config.price_peak_inbetween_state.to_string())
        }
        "area" => FieldValue::Select(
            config.area.as_ref().map(ToString::to_string).unwrap_or_default(),
        ),
        "currency" => FieldValue::Select(config.currency.clone()),
        _ => return None,
    };
    Some(value)
}

/// The write-back path of the UI contract: route a user edit into the state.
pub fn set_field(
    state: &mut PlannerState,
    id: &str,
    value: FieldValue,
) -> Result<(), PlannerError> {
    if let Some((index, field)) = parse_slot_id(id) {
        let slot = state.slots.get_mut(index);
        return match (field, value) {
            (SlotField::Start, FieldValue::DateTime(start)) => {
                slot.start = start;
                Ok(())
            }
            (SlotField::State, FieldValue::Select(name)) => {
                slot.state = parse_option::<SlotState>(&name)?;
                Ok(())
            }
            (SlotField::Active, FieldValue::Switch(active)) => {
                slot.active = active;
                Ok(())
            }
            (SlotField::Soc, FieldValue::Number(soc)) => {
                slot.soc = parse_soc(soc)?;
                Ok(())
            }
            _ => Err(mismatch(id)),
        };
    }
    match (id, value) {
        ("earliest_charge_time", FieldValue::Time(time)) => {
            state.config.earliest_charge_time = time;
        }
        ("earliest_discharge_time", FieldValue::Time(time)) => {
            state.config.earliest_discharge_time = time;
        }
        ("basic_nr_of_charge_hours", FieldValue::Number(hours)) => {
            state.config.basic_nr_of_charge_hours = parse_hours(hours)?;
        }
        ("basic_nr_of_discharge_hours", FieldValue::Number(hours)) => {
            state.config.basic_nr_of_discharge_hours = parse_hours(hours)?;
        }
        ("cheapest_hours_nr_of_charge_hours", FieldValue::Number(hours)) => {
            state.config.cheapest_hours_nr_of_charge_hours = parse_hours(hours)?;
        }
        ("price_peak_nr_of_charge_hours", FieldValue::Number(hours)) => {
            state.config.price_peak_nr_of_charge_hours = parse_hours(hours)?;
        }
        ("price_peak_nr_of_discharge_hours", FieldValue::Number(hours)) => {
            state.config.price_peak_nr_of_discharge_hours = parse_hours(hours)?;
        }
        ("price_peak_efficiency_factor", FieldValue::Number(factor)) => {
            state.config.price_peak_efficiency_factor = parse_hours(factor)?;
        }
        ("battery_max_soc", FieldValue::Number(soc)) => {
            state.config.battery_max_soc = parse_soc(soc)?;
        }
        ("battery_shutdown_soc", FieldValue::Number(soc)) => {
            state.config.battery_shutdown_soc = parse_soc(soc)?;
        }
        ("planner_state", FieldValue::Select(name)) => {
            state.config.strategy = parse_option::<Strategy>(&name)?;
        }
        ("price_peak_cheap_state", FieldValue::Select(name)) => {
            state.config.price_peak_cheap_state = parse_option::<SlotState>(&name)?;
        }
        ("price_peak_expensive_state", FieldValue::Select(name)) => {
            state.config.price_peak_expensive_state = parse_option::<SlotState>(&name)?;
        }
        ("price_peak_inbetween_state", FieldValue::Select(name)) => {
            state.config.price_peak_inbetween_state = parse_option::<SlotState>(&name)?;
        }
        ("area", FieldValue::Select(code)) => state.config.area = Some(code.parse::<Area>()?),
        ("currency", FieldValue::Select(currency)) => state.config.currency = currency,
        (id, _) if read_field(state, id).is_some() => return Err(mismatch(id)),
        (id, _) => {
            return Err(PlannerError::Validation(format!("unknown field `{id}`")));
        }
    }
    Ok(())
}

/// Parse a textual value into the field kind's typed value.
pub fn parse_field_value(kind: FieldKind, value: &str) -> Result<FieldValue, PlannerError> {
    let invalid = || PlannerError::Validation(format!("cannot parse `{value}` for {kind:?}"));
    let parsed = match kind {
        FieldKind::DateTime if value.is_empty() => FieldValue::DateTime(None),
        FieldKind::DateTime => FieldValue::DateTime(Some(value.parse().map_err(|_| invalid())?)),
        FieldKind::Time => FieldValue::Time(value.parse().map_err(|_| invalid())?),
        FieldKind::Number => FieldValue::Number(value.parse().map_err(|_| invalid())?),
        FieldKind::Select => FieldValue::Select(value.to_string()),
        FieldKind::Switch => match value {
            "on" | "true" | "yes" => FieldValue::Switch(true),
            "off" | "false" | "no" => FieldValue::Switch(false),
            _ => return Err(invalid()),
        },
    };
    Ok(parsed)
}

fn mismatch(id: &str) -> PlannerError {
    PlannerError::Validation(format!("value type does not match field `{id}`"))
}

fn parse_option<T: ValueEnum>(name: &str) -> Result<T, PlannerError> {
    T::from_str(name, false)
        .map_err(|_| PlannerError::Validation(format!("`{name}` is not a valid option")))
}

fn parse_soc(soc: f64) -> Result<u8, PlannerError> {
    if (0.0..=100.0).contains(&soc) && soc.fract() == 0.0 {
        #[expect(clippy::cast_possible_truncation)]
        #[expect(clippy::cast_sign_loss)]
        let soc = soc as u8;
        Ok(soc)
    } else {
        Err(PlannerError::Validation(format!("`{soc}` is not a valid SOC percentage")))
    }
}

fn parse_hours(hours: f64) -> Result<f64, PlannerError> {
    if hours.is_finite() && hours >= 0.0 {
        Ok(hours)
    } else {
        Err(PlannerError::Validation(format!("`{hours}` is not a valid hour count")))
    }
}
