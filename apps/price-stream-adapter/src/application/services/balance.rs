//! Balance Lookup
//!
//! Batch balance reads against a [`BalanceSource`]. Every item is looked up
//! concurrently and resolves on its own: an unsupported chain or coin, or a
//! failing provider call, yields a zero balance with a warning while its
//! siblings resolve normally.

use std::collections::{HashMap, HashSet};

use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::application::ports::BalanceSource;

/// One address to look up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRequest {
    /// Chain identifier, e.g. `mainnet`.
    pub chain: String,
    /// Address on that chain.
    pub address: String,
    /// Coin type; `None` when the caller left it out.
    #[serde(default)]
    pub coin: Option<String>,
}

/// Result for one requested address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceOutcome {
    /// Address the outcome belongs to.
    pub address: String,
    /// Chain the address was looked up on.
    pub chain: String,
    /// Balance, zero when a warning is set.
    pub balance: Decimal,
    /// Why the balance is a placeholder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl BalanceOutcome {
    fn resolved(request: &BalanceRequest, balance: Decimal) -> Self {
        Self {
            address: request.address.clone(),
            chain: request.chain.clone(),
            balance,
            warning: None,
        }
    }

    fn zeroed(request: &BalanceRequest, warning: String) -> Self {
        tracing::warn!(
            chain = %request.chain,
            address = %request.address,
            warning = %warning,
            "Balance lookup degraded"
        );
        Self {
            address: request.address.clone(),
            chain: request.chain.clone(),
            balance: Decimal::ZERO,
            warning: Some(warning),
        }
    }
}

/// Coins the source can report, per chain.
#[derive(Debug, Clone, Default)]
pub struct SupportedAssets {
    coins_by_chain: HashMap<String, HashSet<String>>,
}

impl SupportedAssets {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chain and its coin types.
    #[must_use]
    pub fn with_chain<I, S>(mut self, chain: impl Into<String>, coins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.coins_by_chain
            .entry(chain.into())
            .or_default()
            .extend(coins.into_iter().map(Into::into));
        self
    }

    /// Check a request against the table, returning the coin to query.
    fn check<'a>(&self, request: &'a BalanceRequest) -> Result<&'a str, String> {
        let Some(coins) = self.coins_by_chain.get(&request.chain) else {
            return Err(format!("chain `{}` is not supported", request.chain));
        };
        let Some(coin) = request.coin.as_deref() else {
            return Err(format!(
                "coin type missing for address `{}`",
                request.address
            ));
        };
        if !coins.contains(coin) {
            return Err(format!(
                "coin `{coin}` is not supported on chain `{}`",
                request.chain
            ));
        }
        Ok(coin)
    }
}

/// Look up every request concurrently. Output order matches input order.
pub async fn lookup_balances(
    source: &dyn BalanceSource,
    supported: &SupportedAssets,
    requests: &[BalanceRequest],
) -> Vec<BalanceOutcome> {
    let lookups = requests.iter().map(|request| async move {
        let coin = match supported.check(request) {
            Ok(coin) => coin,
            Err(warning) => return BalanceOutcome::zeroed(request, warning),
        };

        match source
            .fetch_balance(&request.chain, &request.address, coin)
            .await
        {
            Ok(balance) => BalanceOutcome::resolved(request, balance),
            Err(e) => BalanceOutcome::zeroed(request, e.to_string()),
        }
    });

    join_all(lookups).await
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::application::ports::{BalanceError, MockBalanceSource};

    fn supported() -> SupportedAssets {
        SupportedAssets::new().with_chain("mainnet", ["0x2::sui::SUI", "0x5::usdc::USDC"])
    }

    fn request(address: &str, coin: Option<&str>) -> BalanceRequest {
        BalanceRequest {
            chain: "mainnet".to_string(),
            address: address.to_string(),
            coin: coin.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn missing_coin_zeroes_one_item_only() {
        let mut source = MockBalanceSource::new();
        source
            .expect_fetch_balance()
            .withf(|_, address, _| address == "0xaaa")
            .times(1)
            .returning(|_, _, _| Ok(Decimal::from_str("12.5").unwrap()));

        let requests = [
            request("0xaaa", Some("0x2::sui::SUI")),
            request("0xbbb", None),
        ];
        let outcomes = lookup_balances(&source, &supported(), &requests).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].balance, Decimal::from_str("12.5").unwrap());
        assert_eq!(outcomes[0].warning, None);
        assert_eq!(outcomes[1].address, "0xbbb");
        assert_eq!(outcomes[1].balance, Decimal::ZERO);
        assert!(outcomes[1].warning.as_deref().unwrap().contains("coin type missing"));
    }

    #[tokio::test]
    async fn unsupported_coin_and_chain_are_warnings() {
        let mut source = MockBalanceSource::new();
        source.expect_fetch_balance().never();

        let mut other_chain = request("0xccc", Some("0x2::sui::SUI"));
        other_chain.chain = "devnet".to_string();
        let requests = [request("0xaaa", Some("0x9::doge::DOGE")), other_chain];
        let outcomes = lookup_balances(&source, &supported(), &requests).await;

        assert!(outcomes[0].warning.as_deref().unwrap().contains("not supported on chain"));
        assert!(outcomes[1].warning.as_deref().unwrap().contains("`devnet`"));
        assert!(outcomes.iter().all(|o| o.balance.is_zero()));
    }

    #[tokio::test]
    async fn provider_failure_does_not_abort_batch() {
        let mut source = MockBalanceSource::new();
        source
            .expect_fetch_balance()
            .returning(|_, address, _| match address {
                "0xbad" => Err(BalanceError::Provider("timeout".to_string())),
                _ => Ok(Decimal::ONE),
            });

        let requests = [
            request("0xaaa", Some("0x2::sui::SUI")),
            request("0xbad", Some("0x2::sui::SUI")),
            request("0xccc", Some("0x5::usdc::USDC")),
        ];
        let outcomes = lookup_balances(&source, &supported(), &requests).await;

        let balances: Vec<_> = outcomes.iter().map(|o| o.balance).collect();
        assert_eq!(balances, vec![Decimal::ONE, Decimal::ZERO, Decimal::ONE]);
        assert!(outcomes[1].warning.as_deref().unwrap().contains("timeout"));
    }

    #[test]
    fn outcome_omits_empty_warning() {
        let outcome = BalanceOutcome::resolved(&request("0xaaa", None), Decimal::ONE);
        let json = serde_json::to_value(&outcome).unwrap();
        assert!(json.get("warning").is_none());
        assert_eq!(json["balance"], "1");
    }
}
