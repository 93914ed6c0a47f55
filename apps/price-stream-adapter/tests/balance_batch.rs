//! Balance Batch Integration Tests
//!
//! Batched lookups through a static balance source.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;

use price_stream_adapter::{
    BalanceError, BalanceRequest, BalanceSource, SupportedAssets, lookup_balances,
};

const SUI: &str = "0x2::sui::SUI";

struct StaticBalances {
    balances: HashMap<String, Decimal>,
}

#[async_trait]
impl BalanceSource for StaticBalances {
    async fn fetch_balance(
        &self,
        _chain: &str,
        address: &str,
        _coin: &str,
    ) -> Result<Decimal, BalanceError> {
        self.balances
            .get(address)
            .copied()
            .ok_or_else(|| BalanceError::InvalidAddress(address.to_string()))
    }
}

fn request(address: &str, coin: Option<&str>) -> BalanceRequest {
    BalanceRequest {
        chain: "mainnet".to_string(),
        address: address.to_string(),
        coin: coin.map(str::to_string),
    }
}

#[tokio::test]
async fn missing_coin_type_is_zeroed_with_warning_while_siblings_resolve() {
    let source = StaticBalances {
        balances: HashMap::from([
            ("0xaaa".to_string(), Decimal::from_str("10.25").unwrap()),
            ("0xccc".to_string(), Decimal::from_str("3").unwrap()),
        ]),
    };
    let supported = SupportedAssets::new().with_chain("mainnet", [SUI]);

    let requests = vec![
        request("0xaaa", Some(SUI)),
        request("0xbbb", None),
        request("0xccc", Some(SUI)),
    ];
    let outcomes = lookup_balances(&source, &supported, &requests).await;

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].balance, Decimal::from_str("10.25").unwrap());
    assert!(outcomes[0].warning.is_none());

    assert_eq!(outcomes[1].address, "0xbbb");
    assert_eq!(outcomes[1].balance, Decimal::ZERO);
    assert!(outcomes[1].warning.is_some());

    assert_eq!(outcomes[2].balance, Decimal::from_str("3").unwrap());
    assert!(outcomes[2].warning.is_none());
}

#[tokio::test]
async fn unknown_address_degrades_only_its_item() {
    let source = StaticBalances {
        balances: HashMap::from([("0xaaa".to_string(), Decimal::ONE)]),
    };
    let supported = SupportedAssets::new().with_chain("mainnet", [SUI]);

    let requests = vec![request("0xaaa", Some(SUI)), request("0xzzz", Some(SUI))];
    let outcomes = lookup_balances(&source, &supported, &requests).await;

    assert_eq!(outcomes[0].balance, Decimal::ONE);
    assert_eq!(outcomes[1].balance, Decimal::ZERO);
    assert!(outcomes[1].warning.as_deref().unwrap().contains("0xzzz"));
}
