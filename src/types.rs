/// file: src/types.rs
/// description: frame envelope, event categories and typed payload models pushed by the dashboard server
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr};

/// Routing bucket for server-pushed events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Market,
    Transaction,
    Investment,
    Notification,
    User,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Market,
        Category::Transaction,
        Category::Investment,
        Category::Notification,
        Category::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Market => "market",
            Category::Transaction => "transaction",
            Category::Investment => "investment",
            Category::Notification => "notification",
            Category::User => "user",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event category '{}'", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

// Wire shape before the category is validated. Both fields are optional so a
// frame without `type` is told apart from one that is not JSON at all.
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    payload: Value,
}

/// A frame whose category is one of the recognized [`Category`] values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub category: Category,
    pub payload: Value,
}

/// Outcome of decoding one text message from the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedFrame {
    Routable(InboundFrame),
    MissingCategory,
    UnknownCategory(String),
    Malformed(String),
}

impl InboundFrame {
    pub fn new(category: Category, payload: Value) -> Self {
        Self { category, payload }
    }

    /// Classifies a text message. Never fails; bad input becomes a variant.
    pub fn parse(text: &str) -> ParsedFrame {
        let raw = match serde_json::from_str::<RawFrame>(text) {
            Ok(raw) => raw,
            Err(e) => return ParsedFrame::Malformed(e.to_string()),
        };

        match raw.kind {
            None => ParsedFrame::MissingCategory,
            Some(kind) => match kind.parse::<Category>() {
                Ok(category) => ParsedFrame::Routable(InboundFrame {
                    category,
                    payload: raw.payload,
                }),
                Err(UnknownCategory(kind)) => ParsedFrame::UnknownCategory(kind),
            },
        }
    }

    /// Decodes the payload into one of the typed models below.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

// Typed payload models. The registry hands callbacks the raw JSON payload;
// these are for consumers that want structure.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketTick {
    pub symbol: String,
    pub price: f64,
    #[serde(default)]
    pub change_percent: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<i64>, // unix millis
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionUpdate {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub status: String,
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentUpdate {
    pub symbol: String,
    pub quantity: f64,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub profit_loss: Option<f64>,
}

/// User-facing alert carried by `notification` frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEvent {
    pub event: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub details: Value,
}

impl MarketTick {
    pub fn is_up(&self) -> bool {
        self.change_percent.is_some_and(|c| c >= 0.0)
    }

    pub fn datetime_utc(&self) -> Option<DateTime<Utc>> {
        self.timestamp.and_then(DateTime::from_timestamp_millis)
    }

    pub fn datetime_local(&self) -> DateTime<Local> {
        self.datetime_utc()
            .unwrap_or_else(Utc::now)
            .with_timezone(&Local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_routable_market_frame() {
        let text = r#"{"type":"market","payload":{"symbol":"BTC-USD","price":65000,"changePercent":1.2}}"#;
        let ParsedFrame::Routable(frame) = InboundFrame::parse(text) else {
            panic!("expected routable frame");
        };
        assert_eq!(frame.category, Category::Market);
        assert_eq!(
            frame.payload,
            json!({"symbol": "BTC-USD", "price": 65000, "changePercent": 1.2})
        );

        let tick: MarketTick = frame.decode().unwrap();
        assert_eq!(tick.symbol, "BTC-USD");
        assert_eq!(tick.price, 65000.0);
        assert_eq!(tick.change_percent, Some(1.2));
        assert!(tick.is_up());
    }

    #[test]
    fn missing_payload_defaults_to_null() {
        let ParsedFrame::Routable(frame) = InboundFrame::parse(r#"{"type":"user"}"#) else {
            panic!("expected routable frame");
        };
        assert_eq!(frame.category, Category::User);
        assert!(frame.payload.is_null());
    }

    #[test]
    fn classifies_bad_frames() {
        assert!(matches!(
            InboundFrame::parse("not json"),
            ParsedFrame::Malformed(_)
        ));
        assert!(matches!(
            InboundFrame::parse(r#"[1,2,3]"#),
            ParsedFrame::Malformed(_)
        ));
        assert_eq!(
            InboundFrame::parse(r#"{"payload":{}}"#),
            ParsedFrame::MissingCategory
        );
        assert_eq!(
            InboundFrame::parse(r#"{"type":"orderbook","payload":{}}"#),
            ParsedFrame::UnknownCategory("orderbook".to_string())
        );
        // category names are case sensitive on the wire
        assert_eq!(
            InboundFrame::parse(r#"{"type":"Market","payload":{}}"#),
            ParsedFrame::UnknownCategory("Market".to_string())
        );
    }

    #[test]
    fn non_string_type_is_malformed() {
        assert!(matches!(
            InboundFrame::parse(r#"{"type":7,"payload":{}}"#),
            ParsedFrame::Malformed(_)
        ));
    }

    #[test]
    fn category_round_trips_through_str() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>(), Ok(category));
        }
    }

    #[test]
    fn decodes_notice_and_transaction() {
        let notice = InboundFrame::new(
            Category::Notification,
            json!({"title": "Deposit complete", "message": "Your deposit of $500 has cleared"}),
        );
        let notice: Notice = notice.decode().unwrap();
        assert_eq!(notice.title, "Deposit complete");

        let tx = InboundFrame::new(
            Category::Transaction,
            json!({"id": "tx-1", "type": "withdrawal", "status": "pending", "amount": 120.5}),
        );
        let tx: TransactionUpdate = tx.decode().unwrap();
        assert_eq!(tx.kind, TransactionKind::Withdrawal);
        assert_eq!(tx.currency, None);
    }
}
