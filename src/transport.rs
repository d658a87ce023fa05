use std::fmt::Display;

use base64::{Engine, prelude::BASE64_STANDARD};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    errors::Error,
    payment::{Payment, PaymentStatus},
};

/// x402 protocol version marker, serialized as its wire number.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum X402Version {
    V1,
}

impl Serialize for X402Version {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            X402Version::V1 => serializer.serialize_i8(1),
        }
    }
}

impl<'de> Deserialize<'de> for X402Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let v = i8::deserialize(deserializer)?;
        match v {
            1 => Ok(X402Version::V1),
            _ => Err(serde::de::Error::custom(format!(
                "Unknown X402 version: {}",
                v
            ))),
        }
    }
}

impl Display for X402Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            X402Version::V1 => write!(f, "1"),
        }
    }
}

/// One accepted payment method in a 402 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Scheme name, defined in "schemes" protocol
    pub scheme: String,
    /// Network name, defined in "schemes" protocol
    pub network: String,
    /// Maximum amount required for the payment in smallest units
    pub max_amount_required: String,
    /// Resource URL to fetch payment details
    pub resource: Url,
    /// Description of the resource
    pub description: String,
    /// MIME type of the payment payload
    pub mime_type: String,
    /// Destination address or account to pay to
    pub pay_to: String,
    /// Maximum timeout in seconds for the payment to be completed
    pub max_timeout_seconds: u64,
    /// Asset address or identifier
    pub asset: String,
}

impl PaymentRequirements {
    /// Requirements entry advertising `payment` under the exact scheme.
    pub fn for_payment(
        payment: &Payment,
        resource: Url,
        description: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        PaymentRequirements {
            scheme: "exact".to_string(),
            network: payment.network.network_name().to_string(),
            max_amount_required: payment.amount.to_string(),
            resource,
            description: description.into(),
            mime_type: mime_type.into(),
            pay_to: payment.facilitator.to_string(),
            max_timeout_seconds: (payment.expires_at - payment.created_at)
                .num_seconds()
                .max(0) as u64,
            asset: payment.token.asset_address(payment.network),
        }
    }
}

/// Body of a `402 Payment Required` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredBody {
    pub x402_version: X402Version,
    pub error: String,
    pub accepts: Vec<PaymentRequirements>,
}

/// Network-specific payload: the base64 partially-signed transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SvmPayload {
    pub transaction: String,
}

/// Payment payload carried in the `X-PAYMENT` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: X402Version,
    pub scheme: String,
    pub network: String,
    pub payload: SvmPayload,
}

/// Settlement outcome carried in the `X-PAYMENT-RESPONSE` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResponse {
    pub success: bool,
    pub transaction: String,
    pub network: String,
    pub payer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl From<&Payment> for SettlementResponse {
    fn from(payment: &Payment) -> Self {
        SettlementResponse {
            success: payment.status == PaymentStatus::Confirmed,
            transaction: payment
                .ledger_tx
                .map(|sig| sig.to_string())
                .unwrap_or_default(),
            network: payment.network.network_name().to_string(),
            payer: payment.payer.to_string(),
            error_reason: payment.cause.as_ref().map(|cause| cause.to_string()),
        }
    }
}

/// Base64-encoded JSON header value, as x402 headers travel on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64EncodedHeader(pub String);

impl Serialize for Base64EncodedHeader {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Base64EncodedHeader {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Base64EncodedHeader(s))
    }
}

impl Display for Base64EncodedHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<PaymentPayload> for Base64EncodedHeader {
    type Error = serde_json::Error;

    fn try_from(value: PaymentPayload) -> Result<Self, Self::Error> {
        let json = serde_json::to_string(&value)?;
        Ok(Base64EncodedHeader(BASE64_STANDARD.encode(json)))
    }
}

impl TryFrom<Base64EncodedHeader> for PaymentPayload {
    type Error = Error;

    fn try_from(value: Base64EncodedHeader) -> Result<Self, Self::Error> {
        let decoded = BASE64_STANDARD.decode(&value.0)?;
        let json = String::from_utf8(decoded)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl TryFrom<SettlementResponse> for Base64EncodedHeader {
    type Error = serde_json::Error;

    fn try_from(value: SettlementResponse) -> Result<Self, Self::Error> {
        let json = serde_json::to_string(&value)?;
        Ok(Base64EncodedHeader(BASE64_STANDARD.encode(json)))
    }
}

impl TryFrom<Base64EncodedHeader> for SettlementResponse {
    type Error = Error;

    fn try_from(value: Base64EncodedHeader) -> Result<Self, Self::Error> {
        let decoded = BASE64_STANDARD.decode(&value.0)?;
        let json = String::from_utf8(decoded)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// HTTP status the API layer maps an engine error to: 422 for validation,
/// 409 for state conflicts and replays, 402 for failed settlement, 503 for
/// upstream unavailability.
pub fn status_code(err: &Error) -> u16 {
    match err {
        Error::InvalidAmount
        | Error::UnsupportedToken(_)
        | Error::UnsupportedNetwork(_)
        | Error::SignatureMismatch(_)
        | Error::SerdeJson(_)
        | Error::Base64Decode(_)
        | Error::Utf8Decode(_)
        | Error::TxDecode(_)
        | Error::Instruction(_) => 422,
        Error::InvalidState { .. } | Error::StateConflict { .. } => 409,
        Error::PaymentNotFound(_) => 404,
        Error::LedgerRejected(_) | Error::ConfirmedMismatch(_) => 402,
        Error::InsufficientSponsorFunds { .. }
        | Error::LedgerUnavailable(_)
        | Error::GateUnavailable(_)
        | Error::Signer(_) => 503,
        Error::TxEncode(_) => 500,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use solana_pubkey::Pubkey;
    use uuid::Uuid;

    use super::*;
    use crate::{
        networks::Network,
        payment::FailureCause,
        token::{TokenId, WRAPPED_SOL_MINT},
    };

    fn payment(status: PaymentStatus) -> Payment {
        let now = Utc::now();
        Payment {
            id: Uuid::new_v4(),
            payer: Pubkey::new_unique(),
            facilitator: Pubkey::new_unique(),
            token: TokenId::Sol,
            amount: 100_000,
            network: Network::SolanaDevnet,
            status,
            unsigned_tx: None,
            cosigned_tx: None,
            ledger_tx: None,
            cause: None,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(300),
            idempotency_key: None,
        }
    }

    #[test]
    fn test_requirements_for_payment() {
        let payment = payment(PaymentStatus::AwaitingSignature);
        let pr = PaymentRequirements::for_payment(
            &payment,
            Url::parse("https://example.com/payment").unwrap(),
            "Payment for services",
            "application/json",
        );
        assert_eq!(pr.scheme, "exact");
        assert_eq!(pr.network, "solana-devnet");
        assert_eq!(pr.max_amount_required, "100000");
        assert_eq!(pr.pay_to, payment.facilitator.to_string());
        assert_eq!(pr.max_timeout_seconds, 300);
        assert_eq!(pr.asset, WRAPPED_SOL_MINT.to_string());
    }

    #[test]
    fn test_settlement_response_header_round_trip() {
        let mut failed = payment(PaymentStatus::Failed);
        failed.cause = Some(FailureCause::DeadlineExceeded);
        let response = SettlementResponse::from(&failed);
        assert!(!response.success);
        assert_eq!(response.error_reason.as_deref(), Some("deadline exceeded"));

        let header = Base64EncodedHeader::try_from(response.clone()).unwrap();
        let decoded = SettlementResponse::try_from(header).unwrap();
        assert_eq!(decoded.payer, response.payer);
        assert_eq!(decoded.network, "solana-devnet");
    }

    #[test]
    fn test_payment_payload_header_round_trip() {
        let payload = PaymentPayload {
            x402_version: X402Version::V1,
            scheme: "exact".to_string(),
            network: "solana".to_string(),
            payload: SvmPayload {
                transaction: "AQID".to_string(),
            },
        };
        let header = Base64EncodedHeader::try_from(payload).unwrap();
        let decoded = PaymentPayload::try_from(header).unwrap();
        assert_eq!(decoded.scheme, "exact");
        assert_eq!(decoded.payload.transaction, "AQID");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(status_code(&Error::InvalidAmount), 422);
        assert_eq!(
            status_code(&Error::InvalidState {
                current: PaymentStatus::Submitted
            }),
            409
        );
        assert_eq!(status_code(&Error::LedgerRejected("nope".into())), 402);
        assert_eq!(status_code(&Error::GateUnavailable("down".into())), 503);
    }
}
