//! # Reconciliation
//!
//! The long-running side of the ledger:
//! * the [`ConfirmationConsumer`] drains the registry's confirmation stream and hands each event to the applier,
//! * the [`FlowSweeper`] periodically re-submits `Pending` flows to the registry, so that flows whose watch was lost
//!   (e.g. to a restart) are always picked up again,
//! * [`Reconciler`] wires both to a watch registry and owns their shared shutdown signal.
mod config;
mod consumer;
mod lifecycle;
mod sweeper;

pub use config::{ReconcilerConfig, SweepConfig};
pub use consumer::{ConfirmationConsumer, ConsumerReport};
pub use lifecycle::{Reconciler, ReconcilerHandle, ShutdownReport};
pub use sweeper::{FlowSweeper, SweepReport};
