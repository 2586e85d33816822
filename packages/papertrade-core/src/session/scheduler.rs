//! Automated session scheduler.
//!
//! Stages move `idle -> waiting_entry -> active -> idle`. Entry screens the
//! universe and buys; exit sells what the session opened. All ledger effects
//! go through the [`PaperBroker`]; the session mutex is never held across an
//! `.await`.

use super::clock::{Clock, SystemClock};
use super::config::{ExecutionMode, SessionConfig};
use super::filters;
use super::market::{MarketData, Quote};
use super::state::{SessionSnapshot, SessionStage, SessionState, SessionStore};
use super::strategies;
use crate::broker::PaperBroker;
use crate::position::QUANTITY_EPSILON;
use crate::protective::ProtectiveExit;
use crate::types::{OrderRequest, OrderSize};
use crate::{Error, Result};
use futures::future::join_all;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Instruments screened when the session config names none.
pub const DEFAULT_UNIVERSE: [&str; 10] = [
    "RELIANCE",
    "TCS",
    "HDFCBANK",
    "INFY",
    "ICICIBANK",
    "SBIN",
    "BHARTIARTL",
    "ITC",
    "LT",
    "HINDUNILVR",
];

/// Smallest effective budget a session will trade with.
pub const MIN_SESSION_BUDGET: f64 = 1_000.0;

/// Share of available cash a session may commit.
pub const CASH_UTILIZATION: f64 = 0.95;

/// Tag on entry orders.
pub const ENTRY_TAG: &str = "auto-session";
/// Tag on exit orders.
pub const EXIT_TAG: &str = "auto-session-exit";

/// Runs one automated session at a time against a broker.
#[derive(Debug)]
pub struct AutoTrader<M> {
    broker: Arc<PaperBroker>,
    market: M,
    clock: Arc<dyn Clock>,
    store: SessionStore,
    state: Mutex<SessionState>,
}

impl<M: MarketData> AutoTrader<M> {
    /// Create a scheduler, resuming any session persisted in `store`.
    pub fn new(broker: Arc<PaperBroker>, market: M, store: SessionStore) -> Self {
        let state = store.load();
        if state.stage != SessionStage::Idle {
            tracing::info!(stage = ?state.stage, run_id = ?state.run_id, "Resumed automated session");
        }

        Self {
            broker,
            market,
            clock: Arc::new(SystemClock),
            store,
            state: Mutex::new(state),
        }
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn broker(&self) -> &Arc<PaperBroker> {
        &self.broker
    }

    pub fn market(&self) -> &M {
        &self.market
    }

    /// Current stage, log feed and opened positions.
    pub fn state(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &SessionState) {
        if let Err(e) = self.store.save(state) {
            tracing::error!(error = %e, "Failed to persist session state");
        }
    }

    fn log(&self, state: &mut SessionState, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(run_id = ?state.run_id, "{}", message);
        state.push_log(self.clock.now(), message);
    }

    fn warn(&self, state: &mut SessionState, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(run_id = ?state.run_id, "{}", message);
        state.push_log(self.clock.now(), message);
    }

    /// Start a session.
    ///
    /// Before the entry time the session waits; otherwise entry runs before
    /// this returns.
    pub async fn start_session(&self, config: SessionConfig) -> Result<SessionSnapshot> {
        config.validate()?;
        let now = self.clock.now();
        let run_id = Uuid::new_v4();

        let enter_now = {
            let mut state = self.lock();
            if state.stage != SessionStage::Idle {
                return Err(Error::InvalidOperation(
                    "Automated session already running. Stop current session first.".to_string(),
                ));
            }
            if now.time() >= config.exit_time {
                return Err(Error::InvalidOperation(format!(
                    "Exit time {} has already passed",
                    config.exit_time
                )));
            }

            let entry_time = config.entry_time;
            let summary = format!(
                "Session started: {} strategy, budget {:.2}, entry {}, exit {}",
                config.strategy, config.budget, config.entry_time, config.exit_time
            );
            *state = SessionState {
                run_id: Some(run_id),
                config: Some(config),
                started_at: Some(now),
                ..Default::default()
            };
            self.log(&mut state, summary);

            let enter_now = now.time() >= entry_time;
            if enter_now {
                state.stage = SessionStage::Active;
            } else {
                state.stage = SessionStage::WaitingEntry;
                let wait = entry_time - now.time();
                self.log(
                    &mut state,
                    format!(
                        "Waiting for entry at {} ({}h {}m {}s)",
                        entry_time,
                        wait.num_hours(),
                        wait.num_minutes() % 60,
                        wait.num_seconds() % 60
                    ),
                );
            }
            self.persist(&state);
            enter_now
        };

        if enter_now {
            self.enter(run_id).await;
        }
        Ok(self.state())
    }

    /// Advance the schedule: enter at the entry time, unwind at the exit time.
    pub async fn tick(&self) {
        let now = self.clock.now().time();

        let pending_entry = {
            let mut state = self.lock();
            let Some((entry_time, exit_time)) =
                state.config.as_ref().map(|c| (c.entry_time, c.exit_time))
            else {
                return;
            };

            let stage = state.stage;
            match stage {
                SessionStage::Idle => None,
                SessionStage::WaitingEntry | SessionStage::Active if now >= exit_time => {
                    self.unwind(&mut state, "Exit time reached");
                    None
                }
                SessionStage::WaitingEntry if now >= entry_time => {
                    state.stage = SessionStage::Active;
                    self.log(&mut state, "Entry time reached");
                    self.persist(&state);
                    state.run_id
                }
                SessionStage::WaitingEntry => None,
                SessionStage::Active if !state.entered => state.run_id,
                SessionStage::Active => None,
            }
        };

        if let Some(run_id) = pending_entry {
            self.enter(run_id).await;
        }
    }

    /// Stop the running session and sell what it opened.
    pub fn stop_session(&self) -> Result<SessionSnapshot> {
        let mut state = self.lock();
        if state.stage == SessionStage::Idle {
            return Err(Error::InvalidOperation(
                "No automated session running".to_string(),
            ));
        }
        self.unwind(&mut state, "Session stopped");
        Ok(state.snapshot())
    }

    /// Re-arm percentage thresholds from the current average cost of every
    /// opened position and close any that are already crossed.
    ///
    /// The session's percentages own the thresholds of the symbols it opened:
    /// absolute thresholds set through [`PaperBroker::set_protection`] on those
    /// symbols are replaced on the next pass, and the replacement is logged.
    pub fn check_positions(&self) -> Vec<ProtectiveExit> {
        let mut state = self.lock();
        if state.stage != SessionStage::Active || state.opened.is_empty() {
            return Vec::new();
        }
        let Some((stop_loss_pct, take_profit_pct)) = state
            .config
            .as_ref()
            .map(|c| (c.stop_loss_pct, c.take_profit_pct))
        else {
            return Vec::new();
        };
        if stop_loss_pct.is_none() && take_profit_pct.is_none() {
            return Vec::new();
        }

        let symbols: Vec<String> = state.opened.iter().map(|p| p.symbol.clone()).collect();
        let mut exits = Vec::new();
        for symbol in symbols {
            if let Some(pos) = self.broker.position(&symbol) {
                let armed = crate::protective::percent_thresholds(
                    pos.average_price,
                    stop_loss_pct,
                    take_profit_pct,
                );
                let current = (pos.stop_loss, pos.take_profit);
                if current != armed && current != (None, None) {
                    self.log(
                        &mut state,
                        format!(
                            "Replacing protection on {} (stop {:?}, target {:?}) with session thresholds (stop {:?}, target {:?})",
                            symbol, current.0, current.1, armed.0, armed.1
                        ),
                    );
                }
            }
            if let Some(exit) =
                self.broker
                    .protect_by_percent(&symbol, stop_loss_pct, take_profit_pct)
            {
                self.log_exit(&mut state, &exit);
                exits.push(exit);
            }
        }

        if !exits.is_empty() {
            self.persist(&state);
        }
        exits
    }

    /// Fetch fresh prices for the watchlist and the session's open symbols.
    ///
    /// Returns the number of prices updated.
    pub async fn refresh_prices(&self) -> usize {
        let mut symbols = self.broker.watchlist();
        {
            let state = self.lock();
            for opened in &state.opened {
                if !symbols.contains(&opened.symbol) {
                    symbols.push(opened.symbol.clone());
                }
            }
        }
        if symbols.is_empty() {
            return 0;
        }

        let fetched = join_all(symbols.iter().map(|symbol| self.market.quote(symbol))).await;

        let mut updated = 0;
        for (symbol, result) in symbols.iter().zip(fetched) {
            match result.and_then(|quote| self.broker.set_price(symbol, quote.price)) {
                Ok(exit) => {
                    updated += 1;
                    if let Some(exit) = exit {
                        let mut state = self.lock();
                        if state.opened.iter().any(|p| p.symbol == exit.symbol) {
                            self.log_exit(&mut state, &exit);
                            self.persist(&state);
                        }
                    }
                }
                Err(e) => tracing::warn!(symbol = %symbol, error = %e, "Price refresh failed"),
            }
        }
        updated
    }

    async fn enter(&self, run_id: Uuid) {
        let (config, universe) = {
            let mut state = self.lock();
            if !state.is_current(run_id) || state.entered {
                return;
            }
            let Some(config) = state.config.clone() else {
                return;
            };
            state.entered = true;
            let universe = config.universe_or(&DEFAULT_UNIVERSE);
            self.log(
                &mut state,
                format!("Fetching quotes for {} instruments", universe.len()),
            );
            self.persist(&state);
            (config, universe)
        };

        let mut pending = PendingEntry {
            trader: self,
            run_id,
            fetching: true,
        };
        let fetched = join_all(universe.iter().map(|symbol| self.market.quote(symbol))).await;
        pending.fetching = false;

        let mut state = self.lock();
        if !state.is_current(run_id) {
            tracing::info!(%run_id, "Session run ended during quote fetch, discarding quotes");
            return;
        }
        self.place_entries(&mut state, &config, &universe, fetched);
        self.persist(&state);
    }

    fn place_entries(
        &self,
        state: &mut SessionState,
        config: &SessionConfig,
        universe: &[String],
        fetched: Vec<Result<Quote>>,
    ) {
        let mut quotes = Vec::with_capacity(universe.len());
        for (symbol, result) in universe.iter().zip(fetched) {
            match result {
                Ok(quote) => match self.broker.set_price(symbol, quote.price) {
                    Ok(_) => quotes.push(Quote {
                        symbol: symbol.clone(),
                        ..quote
                    }),
                    Err(e) => self.warn(state, format!("Skipped {}: {}", symbol, e)),
                },
                Err(e) => self.warn(state, format!("Quote for {} failed: {}", symbol, e)),
            }
        }

        let mut candidates = Vec::with_capacity(quotes.len());
        for quote in quotes {
            match filters::screen(&config.filters, &quote) {
                Ok(()) => candidates.push(quote),
                Err(miss) => self.log(state, format!("Filtered out {}: {}", quote.symbol, miss)),
            }
        }

        let Some(strategy) = strategies::get_strategy(&config.strategy) else {
            self.abort(state, format!("Unknown strategy {}", config.strategy));
            return;
        };
        strategy.rank(&mut candidates);
        candidates.truncate(config.max_trades_per_day);

        if candidates.is_empty() {
            self.abort(state, "No instruments passed the filters");
            return;
        }

        let available = self.broker.cash() * CASH_UTILIZATION;
        let budget = config.budget.min(available);
        if budget < config.budget {
            self.log(
                state,
                format!(
                    "Budget reduced from {:.2} to {:.2} ({:.0}% of available cash)",
                    config.budget,
                    budget,
                    CASH_UTILIZATION * 100.0
                ),
            );
        }
        if budget < MIN_SESSION_BUDGET {
            self.abort(
                state,
                format!(
                    "Effective budget {:.2} is below the minimum of {:.2}",
                    budget, MIN_SESSION_BUDGET
                ),
            );
            return;
        }

        let per_trade = config
            .sizing
            .cap(budget / candidates.len() as f64, budget);
        self.log(
            state,
            format!(
                "Selected {} instruments, {:.2} each",
                candidates.len(),
                per_trade
            ),
        );

        for quote in &candidates {
            if config.mode == ExecutionMode::DryRun {
                self.log(
                    state,
                    format!(
                        "[dry run] BUY {} for {:.2} at {:.2}",
                        quote.symbol, per_trade, quote.price
                    ),
                );
                continue;
            }

            let request = OrderRequest::buy(&quote.symbol, OrderSize::Amount(per_trade))
                .with_product(config.product)
                .with_tag(ENTRY_TAG);
            match self.broker.submit(request) {
                Ok(order) => {
                    state.record_opened(&order.symbol, order.quantity);
                    self.log(
                        state,
                        format!(
                            "Bought {} {} at {:.2} (net {:.2})",
                            order.quantity, order.symbol, order.price, order.net_amount
                        ),
                    );
                    if config.stop_loss_pct.is_some() || config.take_profit_pct.is_some() {
                        if let Some(exit) = self.broker.protect_by_percent(
                            &order.symbol,
                            config.stop_loss_pct,
                            config.take_profit_pct,
                        ) {
                            self.log_exit(state, &exit);
                        }
                    }
                }
                Err(rejection) => {
                    self.warn(state, format!("Buy {} rejected: {}", quote.symbol, rejection))
                }
            }
        }

        if state.opened.is_empty() {
            let reason = match config.mode {
                ExecutionMode::DryRun => "Dry run complete, no orders placed",
                ExecutionMode::Paper => "No positions opened",
            };
            self.abort(state, reason);
        } else {
            self.log(
                state,
                format!("Session active, exit at {}", config.exit_time),
            );
        }
    }

    fn abort(&self, state: &mut SessionState, reason: impl Into<String>) {
        self.warn(state, reason);
        state.finish();
        self.persist(state);
    }

    fn unwind(&self, state: &mut SessionState, reason: &str) {
        self.log(state, reason);

        for opened in std::mem::take(&mut state.opened) {
            let held = self
                .broker
                .position(&opened.symbol)
                .map(|p| p.quantity)
                .unwrap_or(0.0);
            if held <= QUANTITY_EPSILON {
                self.log(state, format!("{} no longer held, skipping", opened.symbol));
                continue;
            }

            let quantity = opened.quantity.min(held);
            let request = OrderRequest::sell(&opened.symbol, OrderSize::Quantity(quantity))
                .with_tag(EXIT_TAG);
            match self.broker.submit(request) {
                Ok(order) => self.log(
                    state,
                    format!(
                        "Sold {} {} at {:.2} (P&L {:.2})",
                        order.quantity,
                        order.symbol,
                        order.price,
                        order.realized_pnl.unwrap_or(0.0)
                    ),
                ),
                Err(rejection) => self.warn(
                    state,
                    format!("Sell {} failed: {}", opened.symbol, rejection),
                ),
            }
        }

        state.finish();
        self.log(state, "Session idle");
        self.persist(state);
    }

    fn log_exit(&self, state: &mut SessionState, exit: &ProtectiveExit) {
        match &exit.result {
            Ok(order) => self.log(
                state,
                format!(
                    "{} hit for {} at {:.2}, sold {}",
                    exit.trigger.tag(),
                    exit.symbol,
                    exit.trigger_price,
                    order.quantity
                ),
            ),
            Err(e) => self.warn(
                state,
                format!(
                    "{} hit for {} at {:.2}, close failed: {}",
                    exit.trigger.tag(),
                    exit.symbol,
                    exit.trigger_price,
                    e
                ),
            ),
        }
    }
}

/// Re-arms entry when an in-flight quote fetch is dropped, so the next tick
/// retries instead of leaving an active session that never bought.
struct PendingEntry<'a, M: MarketData> {
    trader: &'a AutoTrader<M>,
    run_id: Uuid,
    fetching: bool,
}

impl<M: MarketData> Drop for PendingEntry<'_, M> {
    fn drop(&mut self) {
        if !self.fetching {
            return;
        }
        let mut state = self.trader.lock();
        if state.is_current(self.run_id) && state.entered && state.opened.is_empty() {
            state.entered = false;
            self.trader
                .warn(&mut state, "Entry interrupted during quote fetch, will retry");
            self.trader.persist(&state);
        }
    }
}
