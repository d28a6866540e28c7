mod area;
mod cli;
mod config;
mod disable;
mod entity;
mod error;
mod manual;
mod nordpool;
mod orchestrator;
mod planner;
mod prelude;
mod prices;
mod slots;
mod storage;
mod tables;

use chrono::{Days, Utc};
use chrono_tz::Tz;
use clap::Parser;

use crate::{
    cli::{Args, Command},
    entity::{parse_field_value, set_field},
    error::PlannerError,
    manual::ManualSlotEntry,
    nordpool::Nordpool,
    orchestrator::{App, serve},
    prelude::*,
    prices::{DayAheadProvider, join_and_slice},
    storage::Storage,
    tables::{build_prices_table, build_slots_table},
};

#[tokio::main]
async fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().without_time().compact().init();

    let args = Args::parse();
    let storage = Storage::new(args.data_dir);

    match args.command {
        Command::Plan => {
            let mut app = App::try_new(Nordpool::try_new()?, storage)?;
            app.run_cycle(Utc::now()).await
        }

        Command::Serve(serve_args) => {
            let app = App::try_new(Nordpool::try_new()?, storage)?;
            serve(app, serve_args.plan_at).await
        }

        Command::Slots => {
            let app = App::try_new(Nordpool::try_new()?, storage)?;
            let timezone = match &app.state.config.area {
                Some(area) => area.timezone()?,
                None => Tz::UTC,
            };
            println!("{}", build_slots_table(&app.state.slots, timezone));
            Ok(())
        }

        Command::AddSlot(slot_args) => {
            let mut app = App::try_new(Nordpool::try_new()?, storage)?;
            app.add_manual_slot(ManualSlotEntry {
                start: slot_args.start,
                end: slot_args.end,
                state: slot_args.state,
                soc: slot_args.soc,
            })?;
            info!(n_manual_slots = app.state.manual_slots.len(), "added the manual slot");
            Ok(())
        }

        Command::ClearSlots => {
            let mut app = App::try_new(Nordpool::try_new()?, storage)?;
            app.clear_manual_slots()?;
            info!("cleared the manual slots");
            Ok(())
        }

        Command::Prices(prices_args) => {
            let app = App::try_new(Nordpool::try_new()?, storage)?;
            let area = match prices_args.area {
                Some(area) => area,
                None => app.state.config.area()?.clone(),
            };
            let currency =
                prices_args.currency.unwrap_or_else(|| app.state.config.currency.clone());
            let timezone = area.timezone()?;
            let date = prices_args
                .date
                .unwrap_or_else(|| Utc::now().with_timezone(&timezone).date_naive());

            let provider = Nordpool::try_new()?;
            let day = provider.fetch_raw_day(&currency, &area, date).await?;
            let yesterday =
                provider.fetch_raw_day(&currency, &area, date - Days::new(1)).await.ok();
            let tomorrow =
                provider.fetch_raw_day(&currency, &area, date + Days::new(1)).await.ok();
            let points = join_and_slice(
                &[yesterday.as_deref(), Some(&day), tomorrow.as_deref()],
                date,
                timezone,
            );
            println!("{}", build_prices_table(&points, timezone));
            Ok(())
        }

        Command::Set(set_args) => {
            let mut app = App::try_new(Nordpool::try_new()?, storage)?;
            let kind = app
                .registry
                .get(&set_args.id)
                .ok_or_else(|| {
                    PlannerError::Validation(format!("unknown field `{}`", set_args.id))
                })?
                .kind;
            set_field(&mut app.state, &set_args.id, parse_field_value(kind, &set_args.value)?)?;
            app.registry.refresh(&app.state, true, true);
            app.state.save(&app.storage)?;
            info!(id = %set_args.id, "field updated");
            Ok(())
        }
    }
}
