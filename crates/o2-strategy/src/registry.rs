//! Strategy lookup by config kind.

use crate::balance_threshold::BalanceThresholdStrategy;
use crate::gateway::DynGateway;
use crate::market_making::MarketMakingStrategy;
use crate::strategy::DynStrategy;
use o2_core::{DynClock, StrategyConfig, StrategyKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Strategy family without parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyType {
    MarketMaking,
    BalanceThreshold,
}

impl StrategyType {
    pub const ALL: [StrategyType; 2] = [Self::MarketMaking, Self::BalanceThreshold];

    pub fn of(kind: &StrategyKind) -> Self {
        match kind {
            StrategyKind::MarketMaking(_) => Self::MarketMaking,
            StrategyKind::BalanceThreshold(_) => Self::BalanceThreshold,
        }
    }
}

impl fmt::Display for StrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarketMaking => write!(f, "MarketMaking"),
            Self::BalanceThreshold => write!(f, "BalanceThreshold"),
        }
    }
}

impl FromStr for StrategyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['_', '-', ' '], "").as_str() {
            "marketmaking" => Ok(Self::MarketMaking),
            "balancethreshold" => Ok(Self::BalanceThreshold),
            other => Err(format!("unknown strategy type: {other}")),
        }
    }
}

/// Name and description of a registered strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyInfo {
    pub kind: StrategyType,
    pub name: &'static str,
    pub description: &'static str,
}

/// One instance of every strategy, sharing a gateway and clock.
pub struct StrategyRegistry {
    market_making: DynStrategy,
    balance_threshold: DynStrategy,
}

impl StrategyRegistry {
    pub fn new(gateway: DynGateway, clock: DynClock) -> Self {
        Self {
            market_making: Arc::new(MarketMakingStrategy::new(gateway.clone(), clock.clone())),
            balance_threshold: Arc::new(BalanceThresholdStrategy::new(gateway, clock)),
        }
    }

    pub fn get(&self, kind: StrategyType) -> DynStrategy {
        match kind {
            StrategyType::MarketMaking => self.market_making.clone(),
            StrategyType::BalanceThreshold => self.balance_threshold.clone(),
        }
    }

    /// Strategy that runs configs of this kind.
    pub fn for_config(&self, kind: &StrategyKind) -> DynStrategy {
        self.get(StrategyType::of(kind))
    }

    pub fn available(&self) -> Vec<StrategyInfo> {
        StrategyType::ALL
            .into_iter()
            .map(|kind| {
                let strategy = self.get(kind);
                StrategyInfo {
                    kind,
                    name: strategy.name(),
                    description: strategy.description(),
                }
            })
            .collect()
    }

    pub fn default_config(&self, kind: StrategyType, market_id: &str) -> StrategyConfig {
        self.get(kind).default_config(market_id)
    }
}
