//! API Request and Response Models

use crate::games::catalog::NewPrize;
use crate::games::types::{LedgerEntry, PlayResult, User, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Optional body of `POST /games/:id/play`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayBody {
    /// Price shown to the player; the play is refused if it no longer matches
    #[serde(default)]
    pub expected_price: Option<Decimal>,
}

impl PlayBody {
    /// An absent or blank body places no price guard; anything else must parse
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(bytes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayResponse {
    #[serde(flatten)]
    pub result: PlayResult,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub user_id: UserId,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse<T> {
    pub items: Vec<T>,
    pub total_returned: usize,
}

impl<T> HistoryResponse<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            total_returned: items.len(),
            items,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalBody {
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositBody {
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterUserBody {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrizeTableBody {
    pub prizes: Vec<NewPrize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStatusBody {
    pub active: bool,
}

/// Operator view of one player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDetailsResponse {
    pub user: User,
    /// Newest first
    pub transactions: Vec<LedgerEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_play_response_is_flat() {
        let response = PlayResponse {
            result: PlayResult {
                play_id: 9,
                is_winner: false,
                prize_value: dec!(0),
                multiplier: dec!(0),
                new_balance: dec!(0.00),
                ledger_entry_ids: vec![4],
            },
            message: "No prize this time".to_string(),
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["playId"], 9);
        assert_eq!(value["isWinner"], false);
        assert_eq!(value["ledgerEntryIds"][0], 4);
        assert_eq!(value["message"], "No prize this time");
    }

    #[test]
    fn test_play_body_accepts_empty_object() {
        let body: PlayBody = serde_json::from_str("{}").unwrap();
        assert_eq!(body.expected_price, None);

        let body: PlayBody = serde_json::from_str(r#"{"expectedPrice":"10.00"}"#).unwrap();
        assert_eq!(body.expected_price, Some(dec!(10.00)));
    }

    #[test]
    fn test_play_body_from_bytes() {
        assert_eq!(PlayBody::from_bytes(b"").unwrap().expected_price, None);
        assert_eq!(PlayBody::from_bytes(b" \n").unwrap().expected_price, None);
        assert_eq!(
            PlayBody::from_bytes(br#"{"expectedPrice":"2.50"}"#)
                .unwrap()
                .expected_price,
            Some(dec!(2.50))
        );

        assert!(PlayBody::from_bytes(br#"{"expectedPrice":"abc"}"#).is_err());
        assert!(PlayBody::from_bytes(b"expectedPrice=2.50").is_err());
    }
}
