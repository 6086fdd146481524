//! 통합 테스트용 프레임 빌더

#![allow(dead_code)]

use std::net::Ipv4Addr;

use floodgate_common::{ETH_P_IP, PROTO_ICMP, PROTO_TCP, PROTO_UDP};
use floodgate_guard::{Guard, GuardBuilder};
use floodgate_core::config::GuardConfig;

pub use floodgate_common::{TCP_ACK, TCP_FIN, TCP_RST, TCP_SYN};

/// 전송 계층 헤더
#[derive(Debug, Clone)]
enum L4 {
    Tcp { dst_port: u16, flags: u8 },
    Udp { dst_port: u16 },
    Icmp { icmp_type: u8 },
    Raw { protocol: u8 },
}

/// Ethernet + IPv4 + L4 프레임 빌더
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    ether_type: u16,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    options: Vec<u8>,
    l4: L4,
    payload: usize,
}

impl FrameBuilder {
    fn new(src_ip: Ipv4Addr, l4: L4) -> Self {
        Self {
            ether_type: ETH_P_IP,
            src_ip,
            dst_ip: Ipv4Addr::new(198, 51, 100, 1),
            options: Vec::new(),
            l4,
            payload: 0,
        }
    }

    /// TCP 세그먼트
    pub fn tcp(src_ip: Ipv4Addr, dst_port: u16, flags: u8) -> Self {
        Self::new(src_ip, L4::Tcp { dst_port, flags })
    }

    /// SYN-only 세그먼트
    pub fn syn(src_ip: Ipv4Addr, dst_port: u16) -> Self {
        Self::tcp(src_ip, dst_port, TCP_SYN)
    }

    /// UDP 데이터그램
    pub fn udp(src_ip: Ipv4Addr, dst_port: u16) -> Self {
        Self::new(src_ip, L4::Udp { dst_port })
    }

    /// ICMP echo request
    pub fn icmp(src_ip: Ipv4Addr) -> Self {
        Self::new(src_ip, L4::Icmp { icmp_type: 8 })
    }

    /// 전송 헤더 없는 임의 IP 프로토콜 (GRE 등)
    pub fn raw(src_ip: Ipv4Addr, protocol: u8) -> Self {
        Self::new(src_ip, L4::Raw { protocol })
    }

    pub fn ether_type(mut self, ether_type: u16) -> Self {
        self.ether_type = ether_type;
        self
    }

    pub fn dst_ip(mut self, ip: Ipv4Addr) -> Self {
        self.dst_ip = ip;
        self
    }

    /// IPv4 옵션 (4바이트 단위로 패딩)
    pub fn ip_options(mut self, options: &[u8]) -> Self {
        self.options = options.to_vec();
        while self.options.len() % 4 != 0 {
            self.options.push(0);
        }
        self
    }

    pub fn payload(mut self, len: usize) -> Self {
        self.payload = len;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(128);

        // Ethernet
        frame.extend_from_slice(&[0xff; 6]);
        frame.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        frame.extend_from_slice(&self.ether_type.to_be_bytes());

        let l4 = self.l4_bytes();
        let ihl = 5 + (self.options.len() / 4) as u8;
        let total_len = usize::from(ihl) * 4 + l4.len() + self.payload;
        let protocol = match self.l4 {
            L4::Tcp { .. } => PROTO_TCP,
            L4::Udp { .. } => PROTO_UDP,
            L4::Icmp { .. } => PROTO_ICMP,
            L4::Raw { protocol } => protocol,
        };

        // IPv4
        frame.push(0x40 | ihl);
        frame.push(0);
        frame.extend_from_slice(&(total_len as u16).to_be_bytes());
        frame.extend_from_slice(&[0, 0, 0x40, 0]);
        frame.push(64);
        frame.push(protocol);
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(&self.src_ip.octets());
        frame.extend_from_slice(&self.dst_ip.octets());
        frame.extend_from_slice(&self.options);

        frame.extend_from_slice(&l4);
        frame.resize(frame.len() + self.payload, 0xab);
        frame
    }

    fn l4_bytes(&self) -> Vec<u8> {
        match self.l4 {
            L4::Tcp { dst_port, flags } => {
                let mut tcp = vec![0u8; 20];
                tcp[0..2].copy_from_slice(&40000u16.to_be_bytes());
                tcp[2..4].copy_from_slice(&dst_port.to_be_bytes());
                tcp[12] = 5 << 4;
                tcp[13] = flags;
                tcp[14..16].copy_from_slice(&64240u16.to_be_bytes());
                tcp
            }
            L4::Udp { dst_port } => {
                let mut udp = vec![0u8; 8];
                udp[0..2].copy_from_slice(&5353u16.to_be_bytes());
                udp[2..4].copy_from_slice(&dst_port.to_be_bytes());
                udp[4..6].copy_from_slice(&((8 + self.payload) as u16).to_be_bytes());
                udp
            }
            L4::Icmp { icmp_type } => vec![icmp_type, 0, 0, 0, 0, 1, 0, 1],
            L4::Raw { .. } => Vec::new(),
        }
    }
}

/// 기본 설정 가드와 이벤트 수신자
pub fn default_guard() -> (Guard, floodgate_guard::EventReceiver) {
    builder().build().expect("default guard config is valid")
}

/// 기본 설정 빌더
pub fn builder() -> GuardBuilder {
    Guard::builder().config(GuardConfig::default())
}

/// 간단한 주소 생성 헬퍼
pub fn ip(a: u8, b: u8, c: u8, d: u8) -> Ipv4Addr {
    Ipv4Addr::new(a, b, c, d)
}
