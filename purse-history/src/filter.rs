use std::fmt;
use std::str::FromStr;

use purse_core::WalletType;
use serde::{Deserialize, Serialize};

use crate::HistoryGroup;

/// Wallet selector for grouped history.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletFilter {
    #[default]
    All,
    Virtual,
    Actual,
}

impl WalletFilter {
    pub fn matches(self, group: &HistoryGroup) -> bool {
        match self {
            WalletFilter::All => true,
            WalletFilter::Virtual => group.touches_wallet(WalletType::Virtual),
            WalletFilter::Actual => group.touches_wallet(WalletType::Actual),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WalletFilter::All => "all",
            WalletFilter::Virtual => "virtual",
            WalletFilter::Actual => "actual",
        }
    }
}

impl From<WalletType> for WalletFilter {
    fn from(wallet: WalletType) -> Self {
        match wallet {
            WalletType::Virtual => WalletFilter::Virtual,
            WalletType::Actual => WalletFilter::Actual,
        }
    }
}

impl fmt::Display for WalletFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(WalletFilter::All),
            "virtual" => Ok(WalletFilter::Virtual),
            "actual" => Ok(WalletFilter::Actual),
            other => Err(format!("unknown wallet filter '{other}'")),
        }
    }
}

/// Flow selector for grouped history.
///
/// `Income` and `Spends` only ever keep single rows; conversions have their own selector.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowFilter {
    #[default]
    All,
    Income,
    Spends,
    Conversions,
}

impl FlowFilter {
    pub fn matches(self, group: &HistoryGroup) -> bool {
        match (self, group) {
            (FlowFilter::All, _) => true,
            (FlowFilter::Conversions, group) => group.is_conversion(),
            (FlowFilter::Income, HistoryGroup::Single { transaction }) => {
                transaction.signed_amount() > 0
            }
            (FlowFilter::Spends, HistoryGroup::Single { transaction }) => {
                transaction.signed_amount() < 0
            }
            (FlowFilter::Income | FlowFilter::Spends, HistoryGroup::Conversion { .. }) => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FlowFilter::All => "all",
            FlowFilter::Income => "income",
            FlowFilter::Spends => "spends",
            FlowFilter::Conversions => "conversions",
        }
    }
}

impl fmt::Display for FlowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(FlowFilter::All),
            "income" => Ok(FlowFilter::Income),
            "spends" => Ok(FlowFilter::Spends),
            "conversions" => Ok(FlowFilter::Conversions),
            other => Err(format!("unknown flow filter '{other}'")),
        }
    }
}

/// Keep the groups accepted by both selectors, preserving order.
pub fn apply_filters(
    groups: Vec<HistoryGroup>,
    wallet: WalletFilter,
    flow: FlowFilter,
) -> Vec<HistoryGroup> {
    groups
        .into_iter()
        .filter(|group| wallet.matches(group) && flow.matches(group))
        .collect()
}
