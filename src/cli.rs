use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};

use crate::{area::Area, slots::SlotState};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
pub struct Args {
    /// Directory holding the persisted planner documents.
    #[clap(long, env = "STOAT_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one planning cycle with the configured strategy and persist it.
    #[clap(name = "plan")]
    Plan,

    /// Run the scheduler: plan daily and advance expired slots every minute.
    #[clap(name = "serve")]
    Serve(ServeArgs),

    /// Print the current slot schedule.
    #[clap(name = "slots")]
    Slots,

    /// Add a manual override window to the schedule.
    #[clap(name = "add-slot")]
    AddSlot(AddSlotArgs),

    /// Drop all manual override windows.
    #[clap(name = "clear-slots")]
    ClearSlots,

    /// Fetch and print one day's normalized price series.
    #[clap(name = "prices")]
    Prices(PricesArgs),

    /// Write a configuration or slot field, addressed by its field id.
    #[clap(name = "set")]
    Set(SetArgs),
}

#[derive(Parser)]
pub struct SetArgs {
    /// Field id, for example `planner_state` or `slot_3_active`.
    pub id: String,

    /// New value; an empty string clears a date-time field.
    pub value: String,
}

#[derive(Parser)]
pub struct ServeArgs {
    /// Local time of day at which to run the daily planning cycle.
    #[clap(long, env = "STOAT_PLAN_AT", default_value = "14:00:00")]
    pub plan_at: NaiveTime,
}

#[derive(Parser)]
pub struct AddSlotArgs {
    /// Window start, RFC 3339 (for example `2025-06-01T10:00:00+02:00`).
    #[clap(long)]
    pub start: DateTime<Utc>,

    /// Window end, exclusive.
    #[clap(long)]
    pub end: DateTime<Utc>,

    #[clap(long)]
    pub state: SlotState,

    /// Target state of charge; `sell` requires it.
    #[clap(long)]
    pub soc: Option<u8>,
}

#[derive(Parser)]
pub struct PricesArgs {
    /// Delivery day; defaults to the area's current day.
    #[clap(long)]
    pub date: Option<NaiveDate>,

    /// Override the configured area.
    #[clap(long)]
    pub area: Option<Area>,

    /// Override the configured currency.
    #[clap(long)]
    pub currency: Option<String>,
}
