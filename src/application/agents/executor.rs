//! Executor — `spec.md` §4.6. Kept the teacher's
//! pre-persist-before-ack idempotency pattern (metadata hits the database
//! before the broker order is treated as acknowledged); the guard list is
//! reordered and extended to the exact seven guards this specification
//! requires, and `EXECUTED_WITHOUT_TICKET` coherence reporting is added
//! inline rather than left solely to the periodic sweep.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::application::risk_management::filters::ValidationResult;
use crate::application::risk_management::risk_manager::RiskManager;
use crate::application::risk_management::sizing_engine::{determine_conversion, Sizer, SizingInput};
use crate::domain::coherence::{CoherenceEvent, CoherenceKind};
use crate::domain::ports::{BrokerConnector, OrderResult};
use crate::domain::repositories::{CoherenceEventRepository, PositionRepository, SignalRepository};
use crate::domain::risk::RiskState;
use crate::domain::trading::{AssetProfile, Direction, Position, Signal, SignalStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Executed { ticket: String },
    Rejected { guard: &'static str, reason: String },
}

pub struct Executor {
    broker: Arc<dyn BrokerConnector>,
    positions: Arc<dyn PositionRepository>,
    signals: Arc<dyn SignalRepository>,
    coherence_events: Arc<dyn CoherenceEventRepository>,
    risk_manager: Arc<RiskManager>,
    max_positions_per_symbol: usize,
}

impl Executor {
    pub fn new(
        broker: Arc<dyn BrokerConnector>,
        positions: Arc<dyn PositionRepository>,
        signals: Arc<dyn SignalRepository>,
        coherence_events: Arc<dyn CoherenceEventRepository>,
        risk_manager: Arc<RiskManager>,
        max_positions_per_symbol: usize,
    ) -> Self {
        Self {
            broker,
            positions,
            signals,
            coherence_events,
            risk_manager,
            max_positions_per_symbol,
        }
    }

    /// `spec.md` §4.6: the seven ordered guards, first failure wins.
    pub async fn execute(
        &self,
        signal: &mut Signal,
        account_currency: &str,
        conversion_rate: Option<Decimal>,
        profile: &AssetProfile,
        local_open_positions: &[Position],
        risk_state: &RiskState,
    ) -> anyhow::Result<ExecutionOutcome> {
        // Guard 1: signal payload validity. `Signal::new`'s bracket
        // validation already ran at construction; here we only need to
        // confirm the signal hasn't already been consumed.
        if signal.status != SignalStatus::Pending {
            return Ok(self.reject(signal, "payload_validity", "signal is not PENDING").await?);
        }

        // Guard 2: no existing open position on (symbol, direction) per the
        // broker's live view — deliberately not the local DB, to catch
        // phantom-execution drift between what Aethelgard thinks is open
        // and what the broker actually holds.
        let live_positions = self.broker.get_open_positions().await?;
        if live_positions
            .iter()
            .any(|p| p.symbol == signal.symbol && p.direction == signal.direction)
        {
            return Ok(self
                .reject(signal, "duplicate_live_position", "broker already holds this (symbol, direction)")
                .await?);
        }

        // Guard 3: lockdown inactive.
        if risk_state.lockdown {
            return Ok(self.reject(signal, "lockdown", "LOCKDOWN").await?);
        }

        // Guard 4: multi-timeframe concentration, against the same live
        // broker view guard 2 used.
        let live_same_symbol = live_positions.iter().filter(|p| p.symbol == signal.symbol).count();
        if live_same_symbol >= self.max_positions_per_symbol {
            return Ok(self
                .reject(signal, "concentration", "symbol concentration limit reached")
                .await?);
        }

        // Guard 5: Risk Manager's full validator pipeline against the
        // caller-supplied local-DB view (duplicate/concentration re-checked
        // here too, against a different data source — defense in depth).
        let signal_risk = risk_state.account_equity * risk_state.per_trade_risk_fraction;
        match self
            .risk_manager
            .can_take_new_trade(signal, local_open_positions, risk_state, signal_risk)
        {
            ValidationResult::Approved => {}
            ValidationResult::Rejected { reason } => {
                return Ok(self.reject(signal, "risk_manager", &reason).await?);
            }
        }

        // Guard 6: computed size must clear the broker's minimum volume
        // (its volume step doubles as the minimum tradable increment).
        let symbol_info = self.broker.get_symbol_info(&signal.symbol).await?;
        let conversion = determine_conversion(profile, account_currency, conversion_rate)?;
        let sizing_input = SizingInput::from_signal(
            signal,
            risk_state.account_equity,
            risk_state.per_trade_risk_fraction,
            conversion,
        );
        let volume = self.risk_manager.calculate_position_size(
            &sizing_input,
            profile.contract_size,
            symbol_info.volume_step,
        )?;
        if volume < symbol_info.volume_step {
            return Ok(self
                .reject(signal, "minimum_volume", "computed size below broker minimum volume")
                .await?);
        }

        // Guard 7: symbol must be visible in the broker's tradable set.
        if !symbol_info.visible {
            self.broker.ensure_visible(&signal.symbol).await?;
        }

        let tick = self.broker.get_tick(&signal.symbol).await?;
        let live_entry = match signal.direction {
            Direction::Buy => tick.ask,
            Direction::Sell => tick.bid,
        };
        let initial_risk = Sizer::initial_risk(&sizing_input, profile.contract_size, volume);

        // Pre-persist before the order is acknowledged: a placeholder
        // position keyed by the trace id survives a crash between order
        // submission and broker acknowledgement.
        let placeholder_ticket = format!("PENDING-{}", signal.trace_id);
        let mut position = Position::new(
            placeholder_ticket.clone(),
            signal.symbol.clone(),
            signal.direction,
            volume,
            live_entry,
            signal.stop_loss,
            signal.take_profit,
            chrono::Utc::now(),
            signal.regime_at_generation.clone(),
            initial_risk,
            signal.strategy.clone(),
        );
        self.positions.upsert(&position).await?;

        let order: OrderResult = self
            .broker
            .execute_order(
                &signal.symbol,
                signal.direction,
                volume,
                signal.stop_loss,
                signal.take_profit,
                &signal.trace_id.to_string(),
            )
            .await?;

        if !order.ok {
            self.positions.remove(&placeholder_ticket).await?;
            return Ok(self
                .reject(signal, "broker_rejected", order.error.unwrap_or_default())
                .await?);
        }

        let ticket = match order.ticket {
            Some(t) => t,
            None => {
                // Broker claims success with no ticket id — an
                // EXECUTED_WITHOUT_TICKET coherence fault in the making if we
                // let the signal transition; report it now rather than wait
                // for the periodic sweep to notice.
                let event = CoherenceEvent::new(
                    signal.trace_id,
                    signal.symbol.clone(),
                    signal.strategy.clone(),
                    CoherenceKind::ExecutedWithoutTicket,
                    serde_json::json!({ "reason": "broker acknowledged without ticket id" }),
                );
                self.coherence_events.insert(&event).await?;
                self.positions.remove(&placeholder_ticket).await?;
                return Ok(self
                    .reject(signal, "broker_ack", "acknowledged order carried no ticket id")
                    .await?);
            }
        };

        self.positions.remove(&placeholder_ticket).await?;
        position.ticket_id = ticket.clone();
        self.positions.upsert(&position).await?;

        signal.transition(SignalStatus::Executed)?;
        self.signals.update(signal).await?;

        Ok(ExecutionOutcome::Executed { ticket })
    }

    async fn reject(
        &self,
        signal: &mut Signal,
        guard: &'static str,
        reason: impl Into<String>,
    ) -> anyhow::Result<ExecutionOutcome> {
        let reason = reason.into();
        tracing::info!(trace_id = %signal.trace_id, guard, reason = %reason, "signal rejected at execution");
        signal.reject(format!("{guard}: {reason}"));
        self.signals.update(signal).await?;
        Ok(ExecutionOutcome::Rejected { guard, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{ClosedTradeEvent, SymbolInfo, Tick};
    use crate::domain::trading::AssetClass;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    fn sample_signal() -> Signal {
        Signal::new(
            Uuid::new_v4(),
            "EURUSD".into(),
            Direction::Buy,
            dec!(1.08),
            dec!(1.075),
            dec!(1.09),
            "dual_sma".into(),
            "M15".into(),
            chrono::Utc::now(),
            70,
            "TREND".into(),
        )
        .unwrap()
    }

    struct MockBroker {
        open_positions: Vec<Position>,
        symbol_info: SymbolInfo,
        tick: Tick,
        order: OrderResult,
    }

    #[async_trait]
    impl BrokerConnector for MockBroker {
        async fn initialize(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn shutdown(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get_symbol_info(&self, _symbol: &str) -> anyhow::Result<SymbolInfo> {
            Ok(self.symbol_info)
        }
        async fn ensure_visible(&self, _symbol: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get_tick(&self, _symbol: &str) -> anyhow::Result<Tick> {
            Ok(self.tick)
        }
        async fn get_open_positions(&self) -> anyhow::Result<Vec<Position>> {
            Ok(self.open_positions.clone())
        }
        async fn execute_order(
            &self,
            _symbol: &str,
            _direction: Direction,
            _volume: Decimal,
            _sl: Decimal,
            _tp: Decimal,
            _comment: &str,
        ) -> anyhow::Result<OrderResult> {
            Ok(self.order.clone())
        }
        async fn modify_position(&self, _ticket: &str, _sl: Decimal, _tp: Decimal) -> anyhow::Result<()> {
            Ok(())
        }
        async fn close_position(&self, _ticket: &str, _reason: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn reconcile_closed_trades(
            &self,
            _since: chrono::DateTime<chrono::Utc>,
        ) -> anyhow::Result<Vec<ClosedTradeEvent>> {
            Ok(vec![])
        }
        async fn subscribe_closed_trades(
            &self,
        ) -> anyhow::Result<tokio::sync::broadcast::Receiver<ClosedTradeEvent>> {
            let (_tx, rx) = tokio::sync::broadcast::channel(1);
            Ok(rx)
        }
    }

    #[derive(Default)]
    struct MemPositions {
        rows: Mutex<Vec<Position>>,
    }
    #[async_trait]
    impl PositionRepository for MemPositions {
        async fn upsert(&self, position: &Position) -> anyhow::Result<()> {
            let mut rows = self.rows.lock().unwrap();
            rows.retain(|p| p.ticket_id != position.ticket_id);
            rows.push(position.clone());
            Ok(())
        }
        async fn get(&self, ticket_id: &str) -> anyhow::Result<Option<Position>> {
            Ok(self.rows.lock().unwrap().iter().find(|p| p.ticket_id == ticket_id).cloned())
        }
        async fn list_open(&self) -> anyhow::Result<Vec<Position>> {
            Ok(self.rows.lock().unwrap().clone())
        }
        async fn remove(&self, ticket_id: &str) -> anyhow::Result<()> {
            self.rows.lock().unwrap().retain(|p| p.ticket_id != ticket_id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemSignals {
        rows: Mutex<Vec<Signal>>,
    }
    #[async_trait]
    impl SignalRepository for MemSignals {
        async fn insert(&self, signal: &Signal) -> anyhow::Result<()> {
            self.rows.lock().unwrap().push(signal.clone());
            Ok(())
        }
        async fn update(&self, signal: &Signal) -> anyhow::Result<()> {
            let mut rows = self.rows.lock().unwrap();
            rows.retain(|s| s.trace_id != signal.trace_id);
            rows.push(signal.clone());
            Ok(())
        }
        async fn get(&self, trace_id: Uuid) -> anyhow::Result<Option<Signal>> {
            Ok(self.rows.lock().unwrap().iter().find(|s| s.trace_id == trace_id).cloned())
        }
        async fn find_pending(
            &self,
            _symbol: &str,
            _direction: Direction,
            _strategy: &str,
            _timeframe: &str,
        ) -> anyhow::Result<Vec<Signal>> {
            Ok(vec![])
        }
        async fn list_pending_older_than(
            &self,
            _cutoff: chrono::DateTime<chrono::Utc>,
        ) -> anyhow::Result<Vec<Signal>> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct MemEvents;
    #[async_trait]
    impl CoherenceEventRepository for MemEvents {
        async fn insert(&self, _event: &CoherenceEvent) -> anyhow::Result<()> {
            Ok(())
        }
        async fn recent(&self, _limit: usize) -> anyhow::Result<Vec<CoherenceEvent>> {
            Ok(vec![])
        }
    }

    fn symbol_info(visible: bool) -> SymbolInfo {
        SymbolInfo {
            trade_contract_size: dec!(100000),
            tick_size: dec!(0.00001),
            digits: 5,
            freeze_level: dec!(0.0002),
            volume_step: dec!(0.01),
            visible,
        }
    }

    fn eurusd_profile() -> AssetProfile {
        AssetProfile::new(
            "EURUSD",
            AssetClass::Forex,
            dec!(100000),
            dec!(0.00001),
            5,
            dec!(0.0001),
            dec!(0.0002),
            "EURUSD",
            dec!(0.01),
            "USD",
            "EUR",
        )
    }

    fn executor(broker: MockBroker) -> Executor {
        Executor::new(
            Arc::new(broker),
            Arc::new(MemPositions::default()),
            Arc::new(MemSignals::default()),
            Arc::new(MemEvents::default()),
            Arc::new(RiskManager::new(2)),
            2,
        )
    }

    #[tokio::test]
    async fn rejects_when_broker_already_holds_the_same_symbol_direction() {
        let mut existing = Position::new(
            "T0",
            "EURUSD",
            Direction::Buy,
            dec!(0.1),
            dec!(1.07),
            dec!(1.065),
            dec!(1.08),
            chrono::Utc::now(),
            "TREND",
            dec!(50),
            "dual_sma",
        );
        existing.state = crate::domain::trading::position::PositionState::Active;

        let broker = MockBroker {
            open_positions: vec![existing],
            symbol_info: symbol_info(true),
            tick: Tick {
                bid: dec!(1.0799),
                ask: dec!(1.0801),
                time: chrono::Utc::now(),
            },
            order: OrderResult {
                ok: true,
                ticket: Some("BRK-1".into()),
                error: None,
            },
        };
        let exec = executor(broker);
        let mut signal = sample_signal();
        let state = RiskState::new(dec!(10000));

        let outcome = exec
            .execute(&mut signal, "USD", None, &eurusd_profile(), &[], &state)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            ExecutionOutcome::Rejected { guard: "duplicate_live_position", .. }
        ));
    }

    #[tokio::test]
    async fn executes_and_back_writes_ticket_on_clean_signal() {
        let broker = MockBroker {
            open_positions: vec![],
            symbol_info: symbol_info(true),
            tick: Tick {
                bid: dec!(1.0799),
                ask: dec!(1.0801),
                time: chrono::Utc::now(),
            },
            order: OrderResult {
                ok: true,
                ticket: Some("BRK-42".into()),
                error: None,
            },
        };
        let positions = Arc::new(MemPositions::default());
        let exec = Executor::new(
            Arc::new(broker),
            positions.clone(),
            Arc::new(MemSignals::default()),
            Arc::new(MemEvents::default()),
            Arc::new(RiskManager::new(2)),
            2,
        );
        let mut signal = sample_signal();
        let state = RiskState::new(dec!(10000));

        let outcome = exec
            .execute(&mut signal, "USD", None, &eurusd_profile(), &[], &state)
            .await
            .unwrap();
        assert_eq!(outcome, ExecutionOutcome::Executed { ticket: "BRK-42".into() });
        assert_eq!(signal.status, SignalStatus::Executed);

        let rows = positions.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ticket_id, "BRK-42");
    }

    #[tokio::test]
    async fn lockdown_rejects_before_broker_order_is_attempted() {
        let broker = MockBroker {
            open_positions: vec![],
            symbol_info: symbol_info(true),
            tick: Tick {
                bid: dec!(1.0799),
                ask: dec!(1.0801),
                time: chrono::Utc::now(),
            },
            order: OrderResult {
                ok: true,
                ticket: Some("BRK-1".into()),
                error: None,
            },
        };
        let exec = executor(broker);
        let mut signal = sample_signal();
        let mut state = RiskState::new(dec!(10000));
        state.lockdown = true;

        let outcome = exec
            .execute(&mut signal, "USD", None, &eurusd_profile(), &[], &state)
            .await
            .unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Rejected { guard: "lockdown", .. }));
    }
}
