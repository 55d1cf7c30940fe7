//! Common Types Module
//!
//! 서버와 대시보드 코어가 함께 쓰는 공통 타입 정의

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ethereum 주소 타입
///
/// 항상 lowercase로 정규화해서 보관
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EthAddress(String);

impl EthAddress {
    pub fn new(addr: &str) -> Result<Self, String> {
        let addr = addr.trim().to_lowercase();
        if addr.starts_with("0x")
            && addr.len() == 42
            && addr[2..].chars().all(|c| c.is_ascii_hexdigit())
        {
            Ok(Self(addr))
        } else {
            Err("Invalid Ethereum address format".to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// ethers `Address`로 변환
    pub fn to_address(&self) -> Address {
        // new()에서 이미 검증됨
        Address::from_str(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 사용자 역할
///
/// # Normalization
///
/// 과거 데이터에 "Lender" / "lender" 가 섞여 있음.
/// 파싱은 대소문자 무시, 저장/전송은 항상 lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Borrower,
    Lender,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Borrower => "borrower",
            Role::Lender => "lender",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "borrower" => Ok(Role::Borrower),
            "lender" => Ok(Role::Lender),
            other => Err(format!("Invalid user type: {}", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// 딜 히스토리 타입 (lender 전용)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealType {
    Deposit,
    Withdraw,
}

impl DealType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealType::Deposit => "deposit",
            DealType::Withdraw => "withdraw",
        }
    }
}

impl FromStr for DealType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deposit" => Ok(DealType::Deposit),
            "withdraw" => Ok(DealType::Withdraw),
            other => Err(format!("Invalid deal type: {}", other)),
        }
    }
}

/// 딜 기록 요청 (`POST /deals` body)
///
/// 대시보드가 보내던 camelCase 필드명 유지
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealRecord {
    #[serde(rename = "type")]
    pub deal_type: DealType,
    /// wei (decimal string)
    pub amount: String,
    pub interest_gained: String,
    pub date_time: DateTime<Utc>,
    pub user_id: i64,
}

/// 저장된 딜 (`GET /deals` 응답 원소)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealView {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub deal_type: DealType,
    pub amount: String,
    pub interest_gained: String,
    pub date_time: DateTime<Utc>,
}

/// 사용자 입력 금액 파싱 (컨트랙트 base unit, 즉 wei)
///
/// 소수점/단위 변환 없음. 정수 문자열만 허용
pub fn parse_base_units(input: &str) -> Result<U256, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("Invalid amount: '{}'", input));
    }
    U256::from_dec_str(trimmed).map_err(|e| format!("Invalid amount '{}': {}", input, e))
}
