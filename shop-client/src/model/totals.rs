//! Financial totals of the authenticated user

use serde::{Deserialize, Deserializer, Serialize};

/// Income, expense and balance as computed by the remote API
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Totals {
    #[serde(rename = "total_ingresos", default, deserialize_with = "amount")]
    pub income: f64,
    #[serde(rename = "total_gastos", default, deserialize_with = "amount")]
    pub expense: f64,
    #[serde(rename = "saldo_total", default, deserialize_with = "amount")]
    pub balance: f64,
}

/// Decimal amounts come either as JSON numbers, or as strings when serialized from a decimal
/// field. Sums over no records come as `null`, read as zero.
fn amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Number(f64),
        Text(String),
    }

    match Option::<Amount>::deserialize(deserializer)? {
        None => Ok(0.0),
        Some(Amount::Number(amount)) => Ok(amount),
        Some(Amount::Text(amount)) => amount.trim().parse().map_err(serde::de::Error::custom),
    }
}
