use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use ledger_common::Amount;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

pub type AccountId = i64;
pub type FlowId = i64;

/// Longest transaction hash accepted for a watch. EVM hashes are 66 characters with the `0x` prefix.
pub const MAX_TX_HASH_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(String);

//--------------------------------------      ChainId        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainId(u64);

impl ChainId {
    pub fn new(id: u64) -> Result<Self, ConversionError> {
        if id == 0 {
            return Err(ConversionError("Chain id 0 is not a valid chain".into()));
        }
        Ok(Self(id))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl FromStr for ChainId {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim().parse::<u64>().map_err(|e| ConversionError(format!("Invalid chain id '{s}': {e}")))?;
        Self::new(id)
    }
}

impl Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------       TxHash        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(String);

impl TxHash {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl FromStr for TxHash {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ConversionError("Transaction hash is empty".into()));
        }
        if s.len() > MAX_TX_HASH_LEN {
            return Err(ConversionError(format!("Transaction hash is longer than {MAX_TX_HASH_LEN} characters")));
        }
        if !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConversionError(format!("Transaction hash '{s}' contains invalid characters")));
        }
        Ok(Self(s.to_string()))
    }
}

impl Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//--------------------------------------     BalanceOp       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum BalanceOp {
    /// Funds arriving from the chain. Credits the available balance.
    Recharge,
    /// Funds leaving to the chain. Settles a hold when it references a Freeze, otherwise spends available funds.
    Withdraw,
    /// Moves funds from the available balance into the held balance.
    Freeze,
    /// Returns held funds to the available balance. Always references a Freeze.
    Unfreeze,
}

impl BalanceOp {
    /// The change a confirmation of this operation makes to the owning account.
    ///
    /// Returns `None` when the operation and the presence of a reference flow do not form a valid pairing, e.g. an
    /// `Unfreeze` that does not reference a hold, or a `Recharge` that does.
    pub fn confirmation_delta(&self, amount: Amount, ref_flow_id: FlowId) -> Option<BalanceDelta> {
        let zero = Amount::zero();
        match (self, ref_flow_id > 0) {
            (BalanceOp::Recharge, false) => Some(BalanceDelta::new(amount, zero)),
            (BalanceOp::Freeze, false) => Some(BalanceDelta::new(-amount, amount)),
            (BalanceOp::Unfreeze, true) => Some(BalanceDelta::new(amount, -amount)),
            (BalanceOp::Withdraw, true) => Some(BalanceDelta::new(zero, -amount)),
            (BalanceOp::Withdraw, false) => Some(BalanceDelta::new(-amount, zero)),
            _ => None,
        }
    }

    /// Operations that may settle an earlier Freeze.
    pub fn settles_hold(&self) -> bool {
        matches!(self, BalanceOp::Withdraw | BalanceOp::Unfreeze)
    }
}

impl Display for BalanceOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BalanceOp::Recharge => write!(f, "Recharge"),
            BalanceOp::Withdraw => write!(f, "Withdraw"),
            BalanceOp::Freeze => write!(f, "Freeze"),
            BalanceOp::Unfreeze => write!(f, "Unfreeze"),
        }
    }
}

impl FromStr for BalanceOp {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Recharge" => Ok(Self::Recharge),
            "Withdraw" => Ok(Self::Withdraw),
            "Freeze" => Ok(Self::Freeze),
            "Unfreeze" => Ok(Self::Unfreeze),
            s => Err(ConversionError(format!("Invalid balance operation: {s}"))),
        }
    }
}

//--------------------------------------     FlowStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum FlowStatus {
    /// Waiting for the backing transaction to reach a terminal state on chain.
    Pending,
    Confirmed,
    Failed,
}

impl FlowStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FlowStatus::Pending)
    }
}

impl Display for FlowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowStatus::Pending => write!(f, "Pending"),
            FlowStatus::Confirmed => write!(f, "Confirmed"),
            FlowStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl FromStr for FlowStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Confirmed" => Ok(Self::Confirmed),
            "Failed" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Invalid flow status: {s}"))),
        }
    }
}

//--------------------------------------    ChainOutcome     ---------------------------------------------------------
/// A terminal result observed on chain for a watched transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainOutcome {
    Confirmed,
    Failed,
}

impl From<ChainOutcome> for FlowStatus {
    fn from(value: ChainOutcome) -> Self {
        match value {
            ChainOutcome::Confirmed => FlowStatus::Confirmed,
            ChainOutcome::Failed => FlowStatus::Failed,
        }
    }
}

impl Display for ChainOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        FlowStatus::from(*self).fmt(f)
    }
}

//--------------------------------------    BalanceDelta     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct BalanceDelta {
    pub available: Amount,
    pub held: Amount,
}

impl BalanceDelta {
    pub fn new(available: Amount, held: Amount) -> Self {
        Self { available, held }
    }

    pub fn is_zero(&self) -> bool {
        self.available.is_zero() && self.held.is_zero()
    }
}

//--------------------------------------       Account       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub available: Amount,
    pub held: Amount,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// The balances this account would have after applying `delta`, or `None` if either would go negative.
    pub fn after(&self, delta: &BalanceDelta) -> Option<BalanceDelta> {
        let available = self.available.checked_add(delta.available)?;
        let held = self.held.checked_add(delta.held)?;
        if available.is_negative() || held.is_negative() {
            return None;
        }
        Some(BalanceDelta::new(available, held))
    }
}

//--------------------------------------     BalanceFlow     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct BalanceFlow {
    pub id: FlowId,
    pub account_id: AccountId,
    /// Stored verbatim. Use [`BalanceFlow::watch_target`] to get a validated chain id.
    pub chain_id: String,
    /// Empty until the transaction has been submitted to the chain.
    pub tx_hash: String,
    pub op: BalanceOp,
    /// The Freeze this flow settles, or zero for standalone operations.
    pub ref_flow_id: FlowId,
    pub amount: Amount,
    pub status: FlowStatus,
    /// The change this flow made to the account's available balance. Zero unless Confirmed.
    pub available_delta: Amount,
    /// The change this flow made to the account's held balance. Zero unless Confirmed.
    pub held_delta: Amount,
    pub sweep_count: i64,
    pub last_swept_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BalanceFlow {
    /// Validates the chain id and transaction hash stored on this flow.
    pub fn watch_target(&self) -> Result<(ChainId, TxHash), ConversionError> {
        let chain_id = self.chain_id.parse::<ChainId>()?;
        let tx_hash = self.tx_hash.parse::<TxHash>()?;
        Ok((chain_id, tx_hash))
    }

    pub fn delta(&self) -> BalanceDelta {
        BalanceDelta::new(self.available_delta, self.held_delta)
    }
}

//--------------------------------------   NewBalanceFlow    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBalanceFlow {
    pub account_id: AccountId,
    pub chain_id: ChainId,
    pub tx_hash: Option<TxHash>,
    pub op: BalanceOp,
    pub ref_flow_id: FlowId,
    pub amount: Amount,
}

impl NewBalanceFlow {
    pub fn new(account_id: AccountId, chain_id: ChainId, op: BalanceOp, amount: Amount) -> Self {
        Self { account_id, chain_id, tx_hash: None, op, ref_flow_id: 0, amount }
    }

    pub fn with_tx_hash(mut self, tx_hash: TxHash) -> Self {
        self.tx_hash = Some(tx_hash);
        self
    }

    pub fn with_ref_flow(mut self, ref_flow_id: FlowId) -> Self {
        self.ref_flow_id = ref_flow_id;
        self
    }

    /// Checks the parts of the flow that do not depend on stored state.
    pub fn validate(&self) -> Result<(), ConversionError> {
        if !self.amount.is_positive() {
            return Err(ConversionError(format!("Flow amount must be positive, got {}", self.amount)));
        }
        if self.ref_flow_id < 0 {
            return Err(ConversionError(format!("Invalid reference flow id {}", self.ref_flow_id)));
        }
        if self.op.confirmation_delta(self.amount, self.ref_flow_id).is_none() {
            let detail = if self.ref_flow_id > 0 { "cannot reference another flow" } else { "must reference a Freeze" };
            return Err(ConversionError(format!("A {} flow {detail}", self.op)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn chain_ids() {
        assert_eq!("56".parse::<ChainId>().unwrap().value(), 56);
        assert!("0".parse::<ChainId>().is_err());
        assert!("-1".parse::<ChainId>().is_err());
        assert!("".parse::<ChainId>().is_err());
        assert!("eth".parse::<ChainId>().is_err());
    }

    #[test]
    fn tx_hashes() {
        let hash = format!("0x{}", "ab".repeat(32));
        assert_eq!(hash.parse::<TxHash>().unwrap().as_str(), hash);
        assert!("".parse::<TxHash>().is_err());
        assert!("0xab cd".parse::<TxHash>().is_err());
        assert!("0xab'--".parse::<TxHash>().is_err());
        assert!("a".repeat(MAX_TX_HASH_LEN + 1).parse::<TxHash>().is_err());
    }

    #[test]
    fn confirmation_deltas() {
        let amt = Amount::from(30);
        let zero = Amount::zero();
        let delta = |op: BalanceOp, r: FlowId| op.confirmation_delta(amt, r);
        assert_eq!(delta(BalanceOp::Recharge, 0), Some(BalanceDelta::new(amt, zero)));
        assert_eq!(delta(BalanceOp::Freeze, 0), Some(BalanceDelta::new(-amt, amt)));
        assert_eq!(delta(BalanceOp::Unfreeze, 7), Some(BalanceDelta::new(amt, -amt)));
        assert_eq!(delta(BalanceOp::Withdraw, 7), Some(BalanceDelta::new(zero, -amt)));
        assert_eq!(delta(BalanceOp::Withdraw, 0), Some(BalanceDelta::new(-amt, zero)));
        assert_eq!(delta(BalanceOp::Unfreeze, 0), None);
        assert_eq!(delta(BalanceOp::Recharge, 7), None);
        assert_eq!(delta(BalanceOp::Freeze, 7), None);
    }

    #[test]
    fn new_flow_validation() {
        let chain = ChainId::new(1).unwrap();
        let ok = NewBalanceFlow::new(1, chain, BalanceOp::Unfreeze, Amount::from(5)).with_ref_flow(3);
        assert!(ok.validate().is_ok());
        let no_ref = NewBalanceFlow::new(1, chain, BalanceOp::Unfreeze, Amount::from(5));
        assert!(no_ref.validate().is_err());
        let zero = NewBalanceFlow::new(1, chain, BalanceOp::Recharge, Amount::zero());
        assert!(zero.validate().is_err());
    }

    #[test]
    fn statuses() {
        assert!(!FlowStatus::Pending.is_terminal());
        assert!(FlowStatus::Confirmed.is_terminal());
        assert_eq!(FlowStatus::from(ChainOutcome::Failed), FlowStatus::Failed);
        assert_eq!("Confirmed".parse::<FlowStatus>().unwrap(), FlowStatus::Confirmed);
        assert_eq!("Freeze".parse::<BalanceOp>().unwrap(), BalanceOp::Freeze);
        assert_eq!(BalanceOp::Unfreeze.to_string(), "Unfreeze");
    }
}
