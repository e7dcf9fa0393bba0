//! Chain Registry
//!
//! Owns every live chain. The map sits behind one `parking_lot::RwLock`
//! held only for lookups and insert/remove; each chain sits behind its own
//! `tokio::sync::Mutex` so work on one chain (including its exchange calls)
//! is serialized without blocking any other chain.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::order_chain::{Chain, ChainKind, PositionSide};
use crate::domain::shared::{ChainId, Symbol};

/// Shared handle to one chain.
pub type ChainHandle = Arc<Mutex<Chain>>;

/// Index data readable without locking the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEntry {
    /// Chain id.
    pub chain_id: ChainId,
    /// Symbol.
    pub symbol: Symbol,
    /// Direction.
    pub position_side: PositionSide,
    /// Primary or hedge.
    pub kind: ChainKind,
}

#[derive(Debug)]
struct Slot {
    entry: ChainEntry,
    handle: ChainHandle,
}

/// Returned when a chain id is registered twice.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("chain already registered: {0}")]
pub struct DuplicateChain(pub ChainId);

/// Registry of live chains.
#[derive(Debug, Default)]
pub struct ChainRegistry {
    chains: RwLock<HashMap<ChainId, Slot>>,
}

impl ChainRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened chain.
    pub fn insert(&self, chain: Chain) -> Result<ChainHandle, DuplicateChain> {
        let entry = ChainEntry {
            chain_id: chain.chain_id().clone(),
            symbol: chain.symbol().clone(),
            position_side: chain.position_side(),
            kind: chain.kind().clone(),
        };
        let mut chains = self.chains.write();
        if chains.contains_key(&entry.chain_id) {
            return Err(DuplicateChain(entry.chain_id));
        }
        let handle = Arc::new(Mutex::new(chain));
        chains.insert(
            entry.chain_id.clone(),
            Slot {
                entry,
                handle: Arc::clone(&handle),
            },
        );
        Ok(handle)
    }

    /// Handle to a chain.
    #[must_use]
    pub fn get(&self, chain_id: &ChainId) -> Option<ChainHandle> {
        self.chains
            .read()
            .get(chain_id)
            .map(|slot| Arc::clone(&slot.handle))
    }

    /// Lock a chain for exclusive use.
    pub async fn lock(&self, chain_id: &ChainId) -> Option<OwnedMutexGuard<Chain>> {
        let handle = self.get(chain_id)?;
        Some(handle.lock_owned().await)
    }

    /// Copy of a chain's current state.
    pub async fn snapshot(&self, chain_id: &ChainId) -> Option<Chain> {
        let handle = self.get(chain_id)?;
        let chain = handle.lock().await;
        Some(chain.clone())
    }

    /// Drop a chain from the registry.
    pub fn remove(&self, chain_id: &ChainId) -> bool {
        self.chains.write().remove(chain_id).is_some()
    }

    /// Ids of all registered chains.
    #[must_use]
    pub fn chain_ids(&self) -> Vec<ChainId> {
        let mut ids: Vec<ChainId> = self.chains.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Index entries of all registered chains, ordered by id.
    #[must_use]
    pub fn entries(&self) -> Vec<ChainEntry> {
        let mut entries: Vec<ChainEntry> = self
            .chains
            .read()
            .values()
            .map(|slot| slot.entry.clone())
            .collect();
        entries.sort_by(|a, b| a.chain_id.cmp(&b.chain_id));
        entries
    }

    /// Chains on `symbol`, primaries and hedges.
    #[must_use]
    pub fn entries_for_symbol(&self, symbol: &Symbol) -> Vec<ChainEntry> {
        self.entries()
            .into_iter()
            .filter(|e| &e.symbol == symbol)
            .collect()
    }

    /// The primary chain on `symbol` with `side`, if one is registered.
    #[must_use]
    pub fn primary_for(&self, symbol: &Symbol, side: PositionSide) -> Option<ChainEntry> {
        self.entries().into_iter().find(|e| {
            &e.symbol == symbol && e.position_side == side && e.kind == ChainKind::Primary
        })
    }

    /// Hedge chains linked to `parent`.
    #[must_use]
    pub fn hedges_of(&self, parent: &ChainId) -> Vec<ChainEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.kind.parent() == Some(parent))
            .collect()
    }

    /// Registered primary chains; each is one open position slot.
    #[must_use]
    pub fn primary_count(&self) -> usize {
        self.chains
            .read()
            .values()
            .filter(|slot| slot.entry.kind == ChainKind::Primary)
            .count()
    }

    /// Registered chains.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chains.read().len()
    }

    /// Whether no chain is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chains.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_chain::{
        ChainPolicy, LegOrderType, LegStatus, LegUpdate, NewLeg, OpenChain, OrderLeg,
        ProtectionTargets, TradingMode,
    };
    use crate::domain::shared::{ClientOrderId, ExchangeOrderId};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn chain(id: &str, symbol: &str, side: PositionSide, kind: ChainKind) -> Chain {
        let role = kind.entry_role();
        let mut entry = OrderLeg::new(NewLeg {
            leg_id: ClientOrderId::new(format!("{id}-{}", role.code())),
            chain_id: ChainId::new(id),
            role,
            order_type: LegOrderType::Market,
            side: side.entry_side(),
            price: None,
            stop_price: None,
            quantity: dec!(1),
            created_at: Utc::now(),
        });
        entry
            .apply(LegUpdate {
                status: LegStatus::Filled,
                exchange_order_id: Some(ExchangeOrderId::new("1")),
                filled_quantity: dec!(1),
                avg_fill_price: Some(dec!(100)),
                observed_at: Utc::now(),
            })
            .unwrap();
        Chain::open(OpenChain {
            chain_id: ChainId::new(id),
            symbol: Symbol::new(symbol),
            position_side: side,
            kind,
            mode: TradingMode::Scalp,
            policy: ChainPolicy::default(),
            targets: ProtectionTargets::default(),
            entry,
            opened_at: Utc::now(),
        })
        .unwrap()
    }

    #[test]
    fn insert_rejects_duplicates() {
        let registry = ChainRegistry::new();
        let c = chain("SCA-16OCT-00001", "BTCUSDT", PositionSide::Long, ChainKind::Primary);
        registry.insert(c.clone()).unwrap();
        assert_eq!(
            registry.insert(c).unwrap_err(),
            DuplicateChain(ChainId::new("SCA-16OCT-00001"))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookups_by_symbol_side_and_parent() {
        let registry = ChainRegistry::new();
        let parent = ChainId::new("SCA-16OCT-00001");
        registry
            .insert(chain(parent.as_str(), "BTCUSDT", PositionSide::Long, ChainKind::Primary))
            .unwrap();
        registry
            .insert(chain(
                "SCA-16OCT-00002",
                "BTCUSDT",
                PositionSide::Short,
                ChainKind::Hedge {
                    parent: parent.clone(),
                },
            ))
            .unwrap();
        registry
            .insert(chain("SCA-16OCT-00003", "ETHUSDT", PositionSide::Short, ChainKind::Primary))
            .unwrap();

        assert_eq!(registry.primary_count(), 2);
        assert_eq!(registry.entries_for_symbol(&Symbol::new("BTCUSDT")).len(), 2);
        assert_eq!(registry.hedges_of(&parent).len(), 1);
        assert_eq!(
            registry
                .primary_for(&Symbol::new("BTCUSDT"), PositionSide::Long)
                .map(|e| e.chain_id),
            Some(parent)
        );
        assert!(registry
            .primary_for(&Symbol::new("BTCUSDT"), PositionSide::Short)
            .is_none());
    }

    #[tokio::test]
    async fn lock_and_remove() {
        let registry = ChainRegistry::new();
        let id = ChainId::new("SCA-16OCT-00001");
        registry
            .insert(chain(id.as_str(), "BTCUSDT", PositionSide::Long, ChainKind::Primary))
            .unwrap();

        {
            let guard = registry.lock(&id).await.unwrap();
            assert_eq!(guard.legs().len(), 1);
            // Held lock does not block map reads.
            assert_eq!(registry.chain_ids(), vec![id.clone()]);
        }
        assert!(registry.snapshot(&id).await.is_some());
        assert!(registry.remove(&id));
        assert!(!registry.remove(&id));
        assert!(registry.is_empty());
    }
}
