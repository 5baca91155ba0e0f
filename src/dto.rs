use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::stores::AccountSnapshot;

/// One account, as read from the opening-balances file and written to the
/// final-balances output.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AccountRow {
    pub account: String,
    #[serde(deserialize_with = "deserialize_decimal_4dp")]
    pub balance: Decimal,
}

impl From<AccountSnapshot> for AccountRow {
    fn from(snapshot: AccountSnapshot) -> Self {
        Self {
            account: snapshot.id,
            balance: snapshot.balance,
        }
    }
}

/// One transfer instruction from the transfers file.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TransferRow {
    pub from: String,
    pub to: String,
    #[serde(deserialize_with = "deserialize_decimal_4dp")]
    pub amount: Decimal,
}

/// Balances and amounts share one precision: 4 decimal places, truncated.
fn deserialize_decimal_4dp<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let dec = <Decimal as Deserialize>::deserialize(deserializer)?;
    let truncated = dec.round_dp_with_strategy(4, RoundingStrategy::ToZero);
    if truncated != dec {
        warn!(original = %dec, %truncated, "decimal truncated to 4 places");
    }
    Ok(truncated)
}
