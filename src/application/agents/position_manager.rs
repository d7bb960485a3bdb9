//! Position Manager — `spec.md` §4.7. No single teacher analog; the
//! modification protocol (cooldown/freeze-level/`CONTESTED`) is delegated to
//! `risk_management::trailing_stops`, built in the teacher's validator-style
//! idiom; the orphan-sync/emergency-close/regime-bracket/time-exit steps
//! that precede it are new, grounded in the same position-supervision shape.

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::application::risk_management::trailing_stops::{
    self, real_breakeven_stop, should_move_to_breakeven, trailing_stop_candidate, TrailingDecision,
    TrailingError,
};
use crate::domain::market::RegimeLabel;
use crate::domain::ports::BrokerConnector;
use crate::domain::repositories::PositionRepository;
use crate::domain::trading::position::PositionState;
use crate::domain::trading::{Direction, Position};

/// Per-cycle market facts for one symbol, gathered once by the caller and
/// reused across every open position on that symbol.
#[derive(Debug, Clone, Copy)]
pub struct SupervisionInput {
    pub current_regime: RegimeLabel,
    pub price: Decimal,
    pub atr: Decimal,
    pub freeze_level: Decimal,
    pub contract_size: Decimal,
    pub commission: Decimal,
    pub swap: Decimal,
    pub spread: Decimal,
    pub pip_value: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionAction {
    NoAction,
    OrphanSynced,
    EmergencyClosed,
    BracketAdjusted,
    BracketRejectedRolledBack,
    TimeExited,
    MovedToBreakeven,
    TrailingStopMoved,
    ModificationContested,
}

/// `spec.md` §4.7 step 3's regime-transition table: the ATR multiplier used
/// for the take-profit distance under each regime. Entering a narrower
/// regime tightens TP; entering a wider one does not widen an existing TP
/// that is already closer than the new multiplier would imply (adjustments
/// only ever tighten, never loosen, a standing target).
fn target_atr_multiplier(regime: RegimeLabel) -> Decimal {
    use rust_decimal_macros::dec;
    match regime {
        RegimeLabel::Trend => dec!(4.0),
        RegimeLabel::Range => dec!(1.5),
        RegimeLabel::Volatile => dec!(2.0),
        RegimeLabel::Shock | RegimeLabel::Crash => dec!(1.0),
        RegimeLabel::Normal => dec!(2.5),
    }
}

/// `spec.md` §4.7 step 3: recompute the take-profit bracket for a regime
/// change, tightening only. Returns `None` if the entry and current regimes
/// match or the recomputed target would not tighten the existing one.
fn regime_bracket_adjustment(
    position: &Position,
    current_regime: RegimeLabel,
    price: Decimal,
    atr: Decimal,
) -> Option<Decimal> {
    if position.entry_regime == format!("{:?}", current_regime).to_uppercase() {
        return None;
    }
    let distance = atr * target_atr_multiplier(current_regime);
    let candidate_tp = match position.direction {
        Direction::Buy => price + distance,
        Direction::Sell => price - distance,
    };
    let tighter = match position.direction {
        Direction::Buy => candidate_tp < position.current_target,
        Direction::Sell => candidate_tp > position.current_target,
    };
    if tighter {
        Some(candidate_tp)
    } else {
        None
    }
}

pub struct PositionManager {
    broker: Arc<dyn BrokerConnector>,
    positions: Arc<dyn PositionRepository>,
    orphan_synced: RwLock<HashSet<String>>,
}

impl PositionManager {
    pub fn new(broker: Arc<dyn BrokerConnector>, positions: Arc<dyn PositionRepository>) -> Self {
        Self {
            broker,
            positions,
            orphan_synced: RwLock::new(HashSet::new()),
        }
    }

    /// One supervision cycle over every broker-reported open position,
    /// reconciling against local metadata and applying steps 1-6 in order.
    pub async fn supervise_cycle(
        &self,
        inputs_by_symbol: &std::collections::HashMap<String, SupervisionInput>,
    ) -> anyhow::Result<Vec<(String, PositionAction)>> {
        let live_positions = self.broker.get_open_positions().await?;
        let mut results = Vec::new();

        for live in live_positions {
            let Some(input) = inputs_by_symbol.get(&live.symbol).copied() else {
                continue;
            };

            let mut position = match self.positions.get(&live.ticket_id).await? {
                Some(p) => p,
                None => {
                    let synced = self
                        .orphan_sync(&live, input.current_regime, input.contract_size)
                        .await?;
                    results.push((synced.ticket_id.clone(), PositionAction::OrphanSynced));
                    // Steps 2-6 apply starting next cycle, once metadata has settled.
                    continue;
                }
            };

            let action = self.supervise_one(&mut position, input).await?;
            results.push((position.ticket_id.clone(), action));
        }

        Ok(results)
    }

    /// `spec.md` §4.7 step 1. Reconstructs metadata for a position the
    /// broker reports but Aethelgard has no record of, estimating initial
    /// risk from the live stop distance. `contract_size` comes from the
    /// same `AssetProfile` lookup `Sizer::initial_risk()` uses, so a
    /// non-unity contract size (e.g. EURUSD's 100,000) is reflected here too.
    async fn orphan_sync(
        &self,
        live: &Position,
        current_regime: RegimeLabel,
        contract_size: Decimal,
    ) -> anyhow::Result<Position> {
        if self.orphan_synced.read().await.contains(&live.ticket_id) {
            return Ok(live.clone());
        }

        let stop_distance = (live.entry_price - live.current_stop).abs();
        let estimated_risk = stop_distance * live.volume * contract_size;

        let mut reconstructed = live.clone();
        reconstructed.strategy_origin = "ORPHAN_SYNC".to_string();
        reconstructed.initial_risk = estimated_risk;
        reconstructed.orphan_sync = true;
        reconstructed.entry_regime = format!("{:?}", current_regime).to_uppercase();

        self.positions.upsert(&reconstructed).await?;
        self.orphan_synced.write().await.insert(live.ticket_id.clone());
        Ok(reconstructed)
    }

    /// Steps 2-6 for one already-synced position.
    async fn supervise_one(
        &self,
        position: &mut Position,
        input: SupervisionInput,
    ) -> anyhow::Result<PositionAction> {
        if position.state == PositionState::Contested {
            return Ok(PositionAction::ModificationContested);
        }

        // Step 2: emergency close at >= 2x initial risk underwater.
        let unrealized = position.unrealized_pnl(input.price, input.contract_size);
        if unrealized <= -(Decimal::TWO * position.initial_risk) {
            self.broker.close_position(&position.ticket_id, "EMERGENCY_DRAWDOWN").await?;
            position.state = PositionState::Closed;
            self.positions.upsert(position).await?;
            return Ok(PositionAction::EmergencyClosed);
        }

        // Step 3: regime-based bracket adjustment, with rollback on reject.
        if let Some(new_tp) = regime_bracket_adjustment(position, input.current_regime, input.price, input.atr)
        {
            let required_distance = input.freeze_level * Decimal::new(110, 2);
            if (input.price - new_tp).abs() >= required_distance {
                match self
                    .broker
                    .modify_position(&position.ticket_id, position.current_stop, new_tp)
                    .await
                {
                    Ok(()) => {
                        // move_target enforces the same daily modification
                        // cap move_stop does; a broker-accepted change that
                        // would blow the cap surfaces as an error here.
                        position.move_target(new_tp, chrono::Utc::now())?;
                        position.record_modification_accepted();
                        self.positions.upsert(position).await?;
                        return Ok(PositionAction::BracketAdjusted);
                    }
                    Err(_) => {
                        position.record_modification_rejection(trailing_stops::CONTEST_THRESHOLD);
                        self.positions.upsert(position).await?;
                        return Ok(PositionAction::BracketRejectedRolledBack);
                    }
                }
            }
        }

        // Step 4: time-based exit on the current regime's max age.
        let age = chrono::Utc::now() - position.open_time;
        if age >= input.current_regime.max_position_age() {
            self.broker.close_position(&position.ticket_id, "TIME_EXIT").await?;
            position.state = PositionState::Closed;
            self.positions.upsert(position).await?;
            return Ok(PositionAction::TimeExited);
        }

        // Step 5: breakeven move.
        if !position.breakeven_reached {
            let candidate = real_breakeven_stop(
                position.direction,
                position.entry_price,
                input.commission,
                input.swap,
                input.spread,
                input.pip_value,
            );
            let seconds_since_open = age.num_seconds();
            if should_move_to_breakeven(
                position.direction,
                unrealized,
                seconds_since_open,
                candidate,
                position.current_stop,
            ) {
                match self.try_modify_stop(position, candidate, input).await? {
                    Some(_new_stop) => {
                        position.mark_breakeven_reached();
                        self.positions.upsert(position).await?;
                        return Ok(PositionAction::MovedToBreakeven);
                    }
                    None => return Ok(PositionAction::BracketRejectedRolledBack),
                }
            }
        }

        // Step 6: trailing stop.
        if unrealized > input.atr * Decimal::ONE {
            let candidate = trailing_stop_candidate(position.direction, input.price, input.atr, input.current_regime);
            match evaluate_and_apply_trailing(position, candidate, input) {
                Ok(TrailingDecision::Hold) => {}
                Ok(TrailingDecision::MoveStop { new_stop }) => {
                    match self.try_modify_stop(position, new_stop, input).await? {
                        Some(_new_stop) => {
                            self.positions.upsert(position).await?;
                            return Ok(PositionAction::TrailingStopMoved);
                        }
                        None => return Ok(PositionAction::BracketRejectedRolledBack),
                    }
                }
                Err(TrailingError::CooldownActive { .. }) | Err(TrailingError::FreezeLevelViolation { .. }) => {}
            }
        }

        Ok(PositionAction::NoAction)
    }

    /// Attempts a broker stop modification; on rejection the caller's
    /// in-memory bracket is left untouched (no DB write happened yet) and
    /// `None` signals the rollback to the caller. On acceptance the move is
    /// recorded through `Position::move_stop`, so the daily modification cap
    /// and breakeven-monotonicity check apply to every caller uniformly.
    async fn try_modify_stop(
        &self,
        position: &mut Position,
        new_stop: Decimal,
        _input: SupervisionInput,
    ) -> anyhow::Result<Option<Decimal>> {
        match self
            .broker
            .modify_position(&position.ticket_id, new_stop, position.current_target)
            .await
        {
            Ok(()) => {
                position.move_stop(new_stop, chrono::Utc::now())?;
                position.record_modification_accepted();
                Ok(Some(new_stop))
            }
            Err(_) => {
                position.record_modification_rejection(trailing_stops::CONTEST_THRESHOLD);
                self.positions.upsert(position).await?;
                Ok(None)
            }
        }
    }
}

fn evaluate_and_apply_trailing(
    position: &Position,
    candidate: Decimal,
    input: SupervisionInput,
) -> Result<TrailingDecision, TrailingError> {
    trailing_stops::evaluate_trailing_move(
        position.direction,
        candidate,
        position.current_stop,
        input.price,
        input.freeze_level,
        position.last_modification_time,
        chrono::Utc::now(),
    )
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{ClosedTradeEvent, OrderResult, SymbolInfo, Tick};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    fn sample_position() -> Position {
        Position::new(
            "T1",
            "EURUSD",
            Direction::Buy,
            dec!(0.3),
            dec!(1.08),
            dec!(1.075),
            dec!(1.10),
            chrono::Utc::now() - chrono::Duration::hours(1),
            "TREND",
            dec!(150),
            "dual_sma",
        )
    }

    fn input() -> SupervisionInput {
        SupervisionInput {
            current_regime: RegimeLabel::Trend,
            price: dec!(1.081),
            atr: dec!(0.002),
            freeze_level: dec!(0.0002),
            contract_size: dec!(100000),
            commission: dec!(0.5),
            swap: dec!(0.1),
            spread: dec!(0.2),
            pip_value: dec!(10),
        }
    }

    struct StubBroker {
        open_positions: Vec<Position>,
        modify_ok: bool,
        closed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BrokerConnector for StubBroker {
        async fn initialize(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn shutdown(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get_symbol_info(&self, _symbol: &str) -> anyhow::Result<SymbolInfo> {
            unimplemented!()
        }
        async fn ensure_visible(&self, _symbol: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get_tick(&self, _symbol: &str) -> anyhow::Result<Tick> {
            unimplemented!()
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
            unimplemented!()
        }
        async fn modify_position(&self, _ticket: &str, _sl: Decimal, _tp: Decimal) -> anyhow::Result<()> {
            if self.modify_ok {
                Ok(())
            } else {
                anyhow::bail!("broker rejected modification")
            }
        }
        async fn close_position(&self, ticket: &str, _reason: &str) -> anyhow::Result<()> {
            self.closed.lock().unwrap().push(ticket.to_string());
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

    #[tokio::test]
    async fn emergency_close_fires_at_exactly_two_times_initial_risk() {
        let mut position = sample_position();
        position.entry_price = dec!(1.08);
        position.initial_risk = dec!(150);
        // unrealized_pnl = (price - entry) * volume * contract_size
        // Force exactly -2*150 = -300 with volume=0.3, contract_size=100000:
        // diff * 0.3 * 100000 = -300 -> diff = -0.01
        let broker = Arc::new(StubBroker {
            open_positions: vec![position.clone()],
            modify_ok: true,
            closed: Mutex::new(vec![]),
        });
        let positions = Arc::new(MemPositions::default());
        positions.upsert(&position).await.unwrap();
        let manager = PositionManager::new(broker.clone(), positions);

        let mut input = input();
        input.price = dec!(1.07);
        input.contract_size = dec!(100000);

        let action = manager.supervise_one(&mut position, input).await.unwrap();
        assert_eq!(action, PositionAction::EmergencyClosed);
        assert_eq!(broker.closed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn time_exit_fires_after_regime_max_age() {
        let mut position = sample_position();
        position.open_time = chrono::Utc::now() - chrono::Duration::hours(73);
        let broker = Arc::new(StubBroker {
            open_positions: vec![],
            modify_ok: true,
            closed: Mutex::new(vec![]),
        });
        let positions = Arc::new(MemPositions::default());
        let manager = PositionManager::new(broker.clone(), positions);

        let mut i = input();
        i.price = position.entry_price; // no emergency/bracket trigger
        let action = manager.supervise_one(&mut position, i).await.unwrap();
        assert_eq!(action, PositionAction::TimeExited);
    }

    #[tokio::test]
    async fn orphan_sync_reconstructs_missing_metadata() {
        let live = Position::new(
            "BRK-99",
            "EURUSD",
            Direction::Buy,
            dec!(0.1),
            dec!(1.08),
            dec!(1.075),
            dec!(1.09),
            chrono::Utc::now(),
            "UNKNOWN",
            dec!(0),
            "",
        );
        let broker = Arc::new(StubBroker {
            open_positions: vec![live.clone()],
            modify_ok: true,
            closed: Mutex::new(vec![]),
        });
        let positions = Arc::new(MemPositions::default());
        let manager = PositionManager::new(broker, positions.clone());

        let reconstructed = manager
            .orphan_sync(&live, RegimeLabel::Trend, dec!(100000))
            .await
            .unwrap();
        assert_eq!(reconstructed.strategy_origin, "ORPHAN_SYNC");
        assert!(reconstructed.orphan_sync);
        // 0.005 distance * 0.1 volume * 100000 contract_size
        assert_eq!(reconstructed.initial_risk, dec!(50));
        assert_eq!(positions.rows.lock().unwrap().len(), 1);
    }
}
