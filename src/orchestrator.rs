use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, Utc};
use chrono_tz::Tz;
use tokio::{
    sync::Mutex,
    time::{MissedTickBehavior, interval},
};

use crate::{
    config::Config,
    disable::{restore_disable, store_disable},
    entity::EntityRegistry,
    error::PlannerError,
    manual::{ManualSlotEntry, add_manual_slots},
    planner::{self, DayContext, ScheduleSegment, Strategy},
    prelude::*,
    prices::{DayAheadProvider, PriceCache, fetch_planning_window},
    slots::SlotStore,
    storage::{CONFIG, MANUAL_SLOTS, ManualSlotsDocument, Storage, VALUES, ValuesDocument},
};

/// Everything the planner owns: the single mutable source of truth for what
/// the hardware should do next, plus its inputs.
pub struct PlannerState {
    pub config: Config,
    pub slots: SlotStore,
    pub manual_slots: Vec<ManualSlotEntry>,
    pub price_cache: PriceCache,
}

impl PlannerState {
    pub fn load(storage: &Storage) -> Result<Self> {
        let values: ValuesDocument = storage.read(VALUES)?;
        let config: Config = storage.read(CONFIG)?;
        let manual: ManualSlotsDocument = storage.read(MANUAL_SLOTS)?;
        let mut slots = values.slots;
        slots.normalize();
        Ok(Self {
            config,
            slots,
            manual_slots: manual.slots,
            price_cache: values.price_cache,
        })
    }

    pub fn save(&self, storage: &Storage) -> Result {
        storage.write(VALUES, &ValuesDocument {
            slots: self.slots.clone(),
            price_cache: self.price_cache.clone(),
        })?;
        storage.write(CONFIG, &self.config)?;
        storage.write(MANUAL_SLOTS, &ManualSlotsDocument { slots: self.manual_slots.clone() })?;
        Ok(())
    }
}

/// The planner application: state, its persistence, and the price source.
pub struct App<P> {
    pub provider: P,
    pub storage: Storage,
    pub state: PlannerState,
    pub registry: EntityRegistry,
}

impl<P: DayAheadProvider> App<P> {
    pub fn try_new(provider: P, storage: Storage) -> Result<Self> {
        let state = PlannerState::load(&storage)?;
        let mut registry = EntityRegistry::new();
        registry.refresh(&state, true, true);
        Ok(Self { provider, storage, state, registry })
    }

    /// One full planning cycle.
    ///
    /// All fallible steps come before the destructive `reset`: a cycle that
    /// cannot complete leaves the previously published schedule intact, and
    /// nothing is persisted until the whole cycle has succeeded.
    #[instrument(skip_all, fields(strategy = %self.state.config.strategy, now = %now))]
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result {
        let config = self.state.config.clone();
        let area = config.area()?.clone();
        let timezone = area.timezone()?;
        let strategy = config.strategy;

        let today = now.with_timezone(&timezone).date_naive();
        let today_context = DayContext {
            start_of_day: local_midnight(timezone, today)?,
            timezone,
            now,
        };
        let tomorrow_context = DayContext {
            start_of_day: local_midnight(timezone, today + Days::new(1))?,
            timezone,
            now,
        };

        let window = fetch_planning_window(
            &self.provider,
            &mut self.state.price_cache,
            &config.currency,
            &area,
            now,
        )
        .await?;

        // The fallible part is over; the store mutations below run to
        // completion.
        let disabled = store_disable(&self.state.slots);
        self.state.slots.reset();

        match strategy {
            Strategy::Basic | Strategy::CheapestHours => {
                let segments = planner::plan_day(
                    strategy,
                    &window.today,
                    &config,
                    &today_context,
                    &self.storage,
                );
                self.write_planned(&segments);
                if let Some(tomorrow) = &window.tomorrow {
                    let segments = planner::plan_day(
                        strategy,
                        tomorrow,
                        &config,
                        &tomorrow_context,
                        &self.storage,
                    );
                    self.write_planned(&segments);
                }
            }
            Strategy::PricePeak => {
                // Peak matching works across the day boundary, so it gets the
                // whole horizon in one piece.
                let mut horizon = window.today.clone();
                if let Some(tomorrow) = &window.tomorrow {
                    horizon.extend_from_slice(tomorrow);
                }
                let segments =
                    planner::plan_day(strategy, &horizon, &config, &today_context, &self.storage);
                self.write_planned(&segments);
            }
            Strategy::Dynamic => {
                let segments = planner::plan_day(
                    strategy,
                    &window.today,
                    &config,
                    &today_context,
                    &self.storage,
                );
                self.write_planned(&segments);
            }
        }

        add_manual_slots(&mut self.state.slots, &self.state.manual_slots, &config);
        restore_disable(&mut self.state.slots, &disabled);
        self.registry.refresh(&self.state, true, false);
        self.state.save(&self.storage)?;
        info!("planning cycle complete");
        Ok(())
    }

    fn write_planned(&mut self, segments: &[ScheduleSegment]) {
        if segments.is_empty() {
            return;
        }
        match self.state.slots.first_free_index() {
            Some(index) => self.state.slots.write_segments(index, segments),
            None => warn!("the slot array is completely occupied, dropping planned segments"),
        }
    }

    /// The once-per-minute tick: advance past expired slots and forget manual
    /// slots that are over.
    pub fn clear_passed_slots(&mut self, now: DateTime<Utc>) -> Result {
        let advanced = self.state.slots.advance_if_expired(now);
        let n_manual = self.state.manual_slots.len();
        self.state.manual_slots.retain(|entry| entry.end >= now);
        let pruned = self.state.manual_slots.len() != n_manual;
        if advanced || pruned {
            debug!(advanced, pruned, "slots expired");
            self.registry.refresh(&self.state, true, false);
            self.state.save(&self.storage)?;
        }
        Ok(())
    }

    /// Service surface: append a manual slot and splice it in right away.
    pub fn add_manual_slot(&mut self, entry: ManualSlotEntry) -> Result {
        entry.validate()?;
        add_manual_slots(
            &mut self.state.slots,
            std::slice::from_ref(&entry),
            &self.state.config,
        );
        self.state.manual_slots.push(entry);
        self.registry.refresh(&self.state, true, false);
        self.state.save(&self.storage)
    }

    /// Service surface: drop all manual slots.
    pub fn clear_manual_slots(&mut self) -> Result {
        self.state.manual_slots.clear();
        self.state.save(&self.storage)
    }
}

/// The instant the given local calendar day starts.
fn local_midnight(timezone: Tz, date: NaiveDate) -> Result<DateTime<Utc>, PlannerError> {
    date.and_time(NaiveTime::MIN)
        .and_local_timezone(timezone)
        .earliest()
        .map(|start| start.with_timezone(&Utc))
        .ok_or_else(|| PlannerError::TimezoneResolution(timezone.to_string()))
}

/// Long-running scheduler: the daily planning trigger and the per-minute
/// expiry tick, serialized through one lock because the splice operations are
/// multi-step.
pub async fn serve<P: DayAheadProvider + Send + 'static>(
    app: App<P>,
    plan_at: NaiveTime,
) -> Result {
    let app = Arc::new(Mutex::new(app));

    let tick_app = Arc::clone(&app);
    let tick_task = tokio::spawn(async move {
        let mut tick = interval(std::time::Duration::from_secs(60));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            if let Err(error) = tick_app.lock().await.clear_passed_slots(Utc::now()) {
                error!("slot expiry tick failed: {error:#}");
            }
        }
    });

    // Plan once at start-up, then every day at the configured time.
    if let Err(error) = app.lock().await.run_cycle(Utc::now()).await {
        error!("planning cycle failed: {error:#}");
    }
    loop {
        let pause = until_next_occurrence(plan_at);
        info!(seconds = pause.num_seconds(), "sleeping until the next planning run");
        let sleep = tokio::time::sleep(
            pause.to_std().unwrap_or(std::time::Duration::from_secs(60)),
        );
        tokio::select! {
            () = sleep => {
                if let Err(error) = app.lock().await.run_cycle(Utc::now()).await {
                    error!("planning cycle failed: {error:#}");
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for the interrupt signal")?;
                info!("interrupted, shutting down");
                break;
            }
        }
    }
    tick_task.abort();
    Ok(())
}

/// Time left until the next local occurrence of the given time of day.
fn until_next_occurrence(time_of_day: NaiveTime) -> TimeDelta {
    let now = chrono::Local::now();
    let today = now.date_naive().and_time(time_of_day);
    let target = if today > now.naive_local() {
        today
    } else {
        today + TimeDelta::days(1)
    };
    target - now.naive_local()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::TimeZone;

    use super::*;
    use crate::{
        area::Area,
        prices::PricePoint,
        slots::{SLOT_COUNT, SlotState},
    };

    /// Provider that serves a fixed flat horizon, or fails.
    struct FakeProvider {
        fail: bool,
    }

    #[async_trait]
    impl DayAheadProvider for FakeProvider {
        async fn fetch_raw_day(
            &self,
            _currency: &str,
            _area: &Area,
            date: NaiveDate,
        ) -> Result<Vec<PricePoint>> {
            ensure!(!self.fail, "provider is down");
            // One UTC day of quarter-hours, cheap in the early morning.
            let start = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
            Ok((0..96)
                .map(|index| {
                    let value = if (8..12).contains(&index) { 0.1 } else { 1.0 };
                    let point_start = start + TimeDelta::minutes(15 * index);
                    PricePoint::new(point_start, point_start + TimeDelta::minutes(15), value)
                })
                .collect())
        }
    }

    fn scratch_app(test_name: &str, fail: bool) -> App<FakeProvider> {
        let data_dir = std::env::temp_dir()
            .join(format!("stoat-orchestrator-{}-{test_name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&data_dir);
        let mut app =
            App::try_new(FakeProvider { fail }, Storage::new(data_dir)).unwrap();
        app.state.config.area = Some(Area::new("SE3"));
        app.state.config.currency = "SEK".to_string();
        app.state.config.strategy = Strategy::CheapestHours;
        app.state.config.cheapest_hours_nr_of_charge_hours = 1.0;
        app
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_cycle_plans_today_and_tomorrow() -> Result {
        let mut app = scratch_app("plan", false);
        app.run_cycle(noon()).await?;

        let first = app.state.slots.get(0);
        assert!(first.start.is_some());
        assert_ne!(first.state, SlotState::Off);
        // The sequence is chronological and terminated by a sentinel.
        let sentinel = app.state.slots.first_free_index().unwrap();
        assert!(sentinel > 0);
        let mut previous = None;
        for index in 0..sentinel {
            let start = app.state.slots.get(index).start.unwrap();
            if let Some(previous) = previous {
                assert!(start > previous);
            }
            previous = Some(start);
        }
        // Tomorrow's plan reaches past the current local day.
        let last_start = app.state.slots.get(sentinel - 1).start.unwrap();
        assert!(last_start > noon() + TimeDelta::hours(12));
        Ok(())
    }

    #[tokio::test]
    async fn test_provider_failure_aborts_before_reset() -> Result {
        let mut app = scratch_app("provider-down", false);
        app.run_cycle(noon()).await?;
        let planned = app.state.slots.clone();

        app.provider.fail = true;
        // The cached series would mask the outage.
        app.state.price_cache = PriceCache::default();
        let result = app.run_cycle(noon() + TimeDelta::hours(1)).await;
        assert!(result.is_err());
        // The previously published schedule is intact.
        assert_eq!(app.state.slots, planned);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_area_refuses_to_start() {
        let mut app = scratch_app("no-area", false);
        app.state.config.area = None;
        let error = app.run_cycle(noon()).await.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<PlannerError>(),
            Some(PlannerError::ConfigurationMissing("area")),
        ));
    }

    #[tokio::test]
    async fn test_cycle_reapplies_manual_slots_and_disable_state() -> Result {
        let mut app = scratch_app("reapply", false);
        app.run_cycle(noon()).await?;

        let manual_start = Utc.with_ymd_and_hms(2025, 6, 1, 15, 0, 0).unwrap();
        let manual_end = Utc.with_ymd_and_hms(2025, 6, 1, 16, 0, 0).unwrap();
        app.add_manual_slot(ManualSlotEntry {
            start: manual_start,
            end: manual_end,
            state: SlotState::Pause,
            soc: None,
        })?;
        // Disable the manual window.
        let index = (0..SLOT_COUNT)
            .find(|&index| app.state.slots.get(index).start == Some(manual_start))
            .unwrap();
        app.state.slots.get_mut(index).active = false;

        app.run_cycle(noon() + TimeDelta::minutes(30)).await?;
        let index = (0..SLOT_COUNT)
            .find(|&index| app.state.slots.get(index).start == Some(manual_start))
            .expect("the manual slot must be re-applied");
        assert_eq!(app.state.slots.get(index).state, SlotState::Pause);
        assert!(!app.state.slots.get(index).active, "the disabled flag must survive");
        Ok(())
    }

    #[tokio::test]
    async fn test_validation_failure_leaves_state_unchanged() -> Result {
        let mut app = scratch_app("validation", false);
        app.run_cycle(noon()).await?;
        let before = app.state.slots.clone();

        let result = app.add_manual_slot(ManualSlotEntry {
            start: noon(),
            end: noon() - TimeDelta::hours(1),
            state: SlotState::Charge,
            soc: None,
        });
        assert!(result.is_err());
        assert_eq!(app.state.slots, before);
        assert!(app.state.manual_slots.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_passed_slots_prunes_manual() -> Result {
        let mut app = scratch_app("tick", false);
        app.run_cycle(noon()).await?;
        app.add_manual_slot(ManualSlotEntry {
            start: Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 6, 1, 13, 0, 0).unwrap(),
            state: SlotState::Pause,
            soc: None,
        })?;
        assert_eq!(app.state.manual_slots.len(), 1);

        app.clear_passed_slots(Utc.with_ymd_and_hms(2025, 6, 1, 14, 0, 0).unwrap())?;
        assert!(app.state.manual_slots.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_state_round_trips_through_storage() -> Result {
        let mut app = scratch_app("round-trip", false);
        app.run_cycle(noon()).await?;
        let reloaded = PlannerState::load(&app.storage)?;
        assert_eq!(reloaded.slots, app.state.slots);
        assert_eq!(reloaded.config, app.state.config);
        assert_eq!(reloaded.manual_slots, app.state.manual_slots);
        Ok(())
    }
}
