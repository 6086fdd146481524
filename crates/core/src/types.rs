//! 도메인 타입 — 판정, 보호 모드, IPv4 CIDR
//!
//! 설정 파일의 문자열 값과 패킷 경로의 정수 표현 사이를 잇는 작은 값 타입들입니다.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 패킷 판정 / 차단 목록 액션
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// 정상 전달
    #[default]
    Pass,
    /// 폐기
    Drop,
}

impl Action {
    /// 정수 코드로 변환합니다 (0 = pass, 1 = drop).
    pub const fn code(self) -> u32 {
        match self {
            Self::Pass => 0,
            Self::Drop => 1,
        }
    }

    /// 정수 코드에서 변환합니다. 알 수 없는 코드는 `Pass`로 취급합니다.
    pub const fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Drop,
            _ => Self::Pass,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Drop => write!(f, "drop"),
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pass" => Ok(Self::Pass),
            "drop" => Ok(Self::Drop),
            other => Err(format!("unknown action '{other}', expected 'pass' or 'drop'")),
        }
    }
}

/// 보호 모드
///
/// `Protect`에서는 컨트롤 플레인이 임계값을 넘은 출발지를 차단 목록으로
/// 승격할 수 있습니다. 패킷 경로는 모드를 읽지 않습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtectionMode {
    /// 탐지만 수행
    #[default]
    Normal,
    /// 자동 차단 허용
    Protect,
}

impl ProtectionMode {
    /// 설정 슬롯에 저장되는 정수 값
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Normal => 0,
            Self::Protect => 1,
        }
    }

    /// 설정 슬롯 값에서 변환합니다. 알 수 없는 값은 `Normal`입니다.
    pub const fn from_u32(raw: u32) -> Self {
        match raw {
            1 => Self::Protect,
            _ => Self::Normal,
        }
    }
}

impl fmt::Display for ProtectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Protect => write!(f, "protect"),
        }
    }
}

impl FromStr for ProtectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "protect" => Ok(Self::Protect),
            other => Err(format!(
                "unknown mode '{other}', expected 'normal' or 'protect'"
            )),
        }
    }
}

/// IPv4 CIDR 블록
///
/// 생성 시 프리픽스 아래의 호스트 비트는 0으로 정규화됩니다.
/// 프리픽스 없이 주소만 주어지면 `/32`로 해석합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Cidr {
    /// 주소와 프리픽스 길이로 CIDR을 생성합니다.
    ///
    /// `prefix_len`이 32를 넘으면 `None`을 반환합니다.
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Option<Self> {
        if prefix_len > 32 {
            return None;
        }
        let network = Ipv4Addr::from(u32::from(addr) & prefix_mask(prefix_len));
        Some(Self {
            network,
            prefix_len,
        })
    }

    /// 단일 호스트(`/32`) CIDR
    pub fn host(addr: Ipv4Addr) -> Self {
        Self {
            network: addr,
            prefix_len: 32,
        }
    }

    /// 네트워크 주소
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// 프리픽스 길이
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// 주소가 이 블록에 속하는지 확인합니다.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & prefix_mask(self.prefix_len) == u32::from(self.network)
    }
}

/// 프리픽스 길이에 해당하는 네트워크 마스크 (`/0`은 0)
pub const fn prefix_mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else if prefix_len >= 32 {
        u32::MAX
    } else {
        u32::MAX << (32 - prefix_len)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = match s.trim().split_once('/') {
            Some((addr, prefix)) => {
                let len = prefix
                    .parse::<u8>()
                    .map_err(|_| format!("invalid prefix length in '{s}'"))?;
                (addr, len)
            }
            None => (s.trim(), 32),
        };
        let addr = addr
            .parse::<Ipv4Addr>()
            .map_err(|_| format!("invalid IPv4 address in '{s}'"))?;
        Self::new(addr, prefix).ok_or_else(|| format!("prefix length must be <= 32 in '{s}'"))
    }
}
