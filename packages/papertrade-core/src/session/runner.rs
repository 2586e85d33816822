//! Periodic tasks driving an [`AutoTrader`].
//!
//! - schedule tick: entry / exit transitions
//! - position check: percentage stop-loss / take-profit
//! - equity sampler: records an equity snapshot
//! - price poller: refreshes watchlist and session prices (optional)
//!
//! All tasks stop on a broadcast shutdown signal.

use super::market::MarketData;
use super::scheduler::AutoTrader;
use crate::config::RunnerConfig;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Task periods.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunnerIntervals {
    pub schedule_tick: Duration,
    pub position_check: Duration,
    pub equity_sample: Duration,
    /// `None` disables the price poller
    pub price_poll: Option<Duration>,
}

impl Default for RunnerIntervals {
    fn default() -> Self {
        Self::from(&RunnerConfig::default())
    }
}

impl From<&RunnerConfig> for RunnerIntervals {
    fn from(config: &RunnerConfig) -> Self {
        Self {
            schedule_tick: config.schedule_tick(),
            position_check: config.position_check(),
            equity_sample: config.equity_sample(),
            price_poll: config.watchlist_poll(),
        }
    }
}

/// Spawns the periodic session tasks.
pub struct SessionRunner;

impl SessionRunner {
    /// Start the tasks on the current tokio runtime.
    pub fn spawn<M>(trader: Arc<AutoTrader<M>>, intervals: RunnerIntervals) -> RunnerHandle
    where
        M: MarketData + 'static,
    {
        let (shutdown_tx, _) = broadcast::channel(4);
        let mut tasks = Vec::new();

        let t = trader.clone();
        tasks.push(spawn_periodic(
            "schedule",
            intervals.schedule_tick,
            shutdown_tx.subscribe(),
            move || {
                let t = t.clone();
                async move { t.tick().await }
            },
        ));

        let t = trader.clone();
        tasks.push(spawn_periodic(
            "position-check",
            intervals.position_check,
            shutdown_tx.subscribe(),
            move || {
                let t = t.clone();
                async move {
                    t.check_positions();
                }
            },
        ));

        let t = trader.clone();
        tasks.push(spawn_periodic(
            "equity",
            intervals.equity_sample,
            shutdown_tx.subscribe(),
            move || {
                let t = t.clone();
                async move {
                    t.broker().record_equity();
                }
            },
        ));

        if let Some(period) = intervals.price_poll {
            let t = trader;
            tasks.push(spawn_periodic(
                "price-poll",
                period,
                shutdown_tx.subscribe(),
                move || {
                    let t = t.clone();
                    async move {
                        t.refresh_prices().await;
                    }
                },
            ));
        }

        tracing::info!(tasks = tasks.len(), "Session runner started");
        RunnerHandle { shutdown_tx, tasks }
    }
}

fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // A job still running at shutdown is dropped at its next await point.
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::debug!(task = name, "Runner task shutting down");
                    break;
                }
                _ = async {
                    timer.tick().await;
                    job().await
                } => {}
            }
        }
    })
}

/// Handle to the running tasks.
#[derive(Debug)]
pub struct RunnerHandle {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunnerHandle {
    /// Stop every task and wait for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        for handle in self.tasks {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Runner task panicked");
            }
        }
        tracing::info!("Session runner stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{NoSlippage, OrderEngine};
    use crate::ledger::LedgerStore;
    use crate::session::clock::ManualClock;
    use crate::session::config::SessionConfig;
    use crate::session::market::{Quote, StaticMarket};
    use crate::session::state::{SessionStage, SessionStore};
    use crate::broker::PaperBroker;
    use crate::types::EngineConfig;
    use chrono::{NaiveDate, NaiveTime};
    use tokio::sync::Semaphore;

    #[tokio::test(start_paused = true)]
    async fn test_runner_drives_schedule_and_stops() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let broker = Arc::new(PaperBroker::new(
            LedgerStore::in_memory(EngineConfig::default()),
            OrderEngine::new(NoSlippage),
        ));
        broker.watch("SBIN");
        let market = StaticMarket::with_quotes([
            Quote::new("INFY", 1_500.0),
            Quote::new("SBIN", 750.0),
        ]);
        let trader = Arc::new(
            AutoTrader::new(broker.clone(), market, SessionStore::in_memory())
                .with_clock(clock.clone()),
        );

        let config = SessionConfig {
            universe: vec!["INFY".to_string()],
            entry_time: NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
            exit_time: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            ..Default::default()
        };
        trader.start_session(config).await.unwrap();
        assert_eq!(trader.state().stage, SessionStage::WaitingEntry);

        let handle = SessionRunner::spawn(trader.clone(), RunnerIntervals::default());

        clock.set(start + chrono::TimeDelta::minutes(15));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(trader.state().stage, SessionStage::Active);
        assert!(broker.position("INFY").is_some());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(broker.price("SBIN"), Some(750.0));

        clock.set(start + chrono::TimeDelta::hours(6));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(trader.state().stage, SessionStage::Idle);
        assert!(broker.position("INFY").is_none());

        handle.shutdown().await;
    }

    #[derive(Debug)]
    struct GatedMarket {
        gate: Arc<Semaphore>,
        inner: StaticMarket,
    }

    impl MarketData for GatedMarket {
        async fn quote(&self, symbol: &str) -> crate::Result<Quote> {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| crate::Error::MarketData(e.to_string()))?;
            self.inner.quote(symbol).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_slow_entry() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let gate = Arc::new(Semaphore::new(0));
        let market = GatedMarket {
            gate: gate.clone(),
            inner: StaticMarket::with_quotes([Quote::new("INFY", 1_500.0)]),
        };
        let broker = Arc::new(PaperBroker::new(
            LedgerStore::in_memory(EngineConfig::default()),
            OrderEngine::new(NoSlippage),
        ));
        let trader = Arc::new(
            AutoTrader::new(broker.clone(), market, SessionStore::in_memory())
                .with_clock(clock.clone()),
        );
        let config = SessionConfig {
            universe: vec!["INFY".to_string()],
            entry_time: NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
            exit_time: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            ..Default::default()
        };
        trader.start_session(config).await.unwrap();

        let handle = SessionRunner::spawn(trader.clone(), RunnerIntervals::default());
        clock.set(start + chrono::TimeDelta::minutes(30));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(trader.state().logs.iter().any(|l| l.message.contains("Fetching quotes")));

        // Entry is blocked on the gate; shutdown must not wait for it
        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("shutdown waited for the blocked entry");
        assert!(broker.orders().is_empty());

        gate.add_permits(1);
        trader.tick().await;
        assert!(broker.position("INFY").is_some());
    }

    #[test]
    fn test_intervals_from_config() {
        let config = RunnerConfig {
            watchlist_poll_ms: 0,
            ..Default::default()
        };
        let intervals = RunnerIntervals::from(&config);
        assert_eq!(intervals.schedule_tick, Duration::from_secs(1));
        assert_eq!(intervals.position_check, Duration::from_secs(3));
        assert!(intervals.price_poll.is_none());
    }
}
