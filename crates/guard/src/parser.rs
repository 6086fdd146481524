//! 헤더 파서 — Ethernet/IPv4/TCP/UDP/ICMP 필드 추출
//!
//! [`PacketView`]는 선언된 길이로 잘린 원시 버퍼 위의 불변 뷰입니다.
//! 모든 접근자는 `Option`을 반환하며, 범위를 벗어나는 읽기는 `None`
//! ("이 프로토콜이 아님")으로 끝납니다. 각 계층의 접근자는 앞 계층의 길이
//! 검사가 성공한 뒤에만 호출됩니다.
//!
//! [`parse`]는 이 뷰를 한 번 훑어 [`Classified`] 태그 값을 만듭니다.
//! 잘리거나 IPv4가 아닌 프레임(IPv6, ARP, VLAN 태그 포함)은
//! [`Classified::Unclassified`]이며 파이프라인은 이를 그대로 통과시킵니다.
//!
//! ```text
//! 0        14             14+IHL*4
//! ┌────────┬──────────────┬──────────────────┐
//! │  ETH   │  IPv4 (IHL)  │ TCP/UDP/ICMP ... │
//! └────────┴──────────────┴──────────────────┘
//! ```

use std::net::Ipv4Addr;

use floodgate_common::{
    ETH_HDR_LEN, ETH_P_IP, ICMP_HDR_LEN, IPV4_MIN_HDR_LEN, PROTO_ICMP, PROTO_TCP, PROTO_UDP,
    TCP_ACK, TCP_HDR_LEN, TCP_SYN, UDP_HDR_LEN,
};

/// 경계 검사된 패킷 뷰
#[derive(Debug, Clone, Copy)]
pub struct PacketView<'a> {
    buf: &'a [u8],
}

impl<'a> PacketView<'a> {
    /// 버퍼와 선언된 길이로 뷰를 생성합니다.
    ///
    /// 실제 길이는 `min(declared_len, buf.len())`입니다.
    pub fn new(buf: &'a [u8], declared_len: usize) -> Self {
        let len = declared_len.min(buf.len());
        Self { buf: &buf[..len] }
    }

    /// 유효 프레임 길이 (바이트)
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// 프레임이 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn u8_at(&self, offset: usize) -> Option<u8> {
        self.buf.get(offset).copied()
    }

    fn u16_at(&self, offset: usize) -> Option<u16> {
        let bytes = self.buf.get(offset..offset.checked_add(2)?)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32_at(&self, offset: usize) -> Option<u32> {
        let bytes = self.buf.get(offset..offset.checked_add(4)?)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn has(&self, offset: usize, len: usize) -> bool {
        offset
            .checked_add(len)
            .is_some_and(|end| end <= self.buf.len())
    }

    // --- Ethernet ---

    /// EtherType (이더넷 헤더가 완전할 때만)
    pub fn ethertype(&self) -> Option<u16> {
        if !self.has(0, ETH_HDR_LEN) {
            return None;
        }
        self.u16_at(12)
    }

    // --- IPv4 ---

    fn ipv4_base(&self) -> Option<usize> {
        if self.ethertype()? != ETH_P_IP || !self.has(ETH_HDR_LEN, IPV4_MIN_HDR_LEN) {
            return None;
        }
        Some(ETH_HDR_LEN)
    }

    /// IP 버전 (IPv4 프레임일 때만)
    pub fn ip_version(&self) -> Option<u8> {
        let base = self.ipv4_base()?;
        Some(self.u8_at(base)? >> 4)
    }

    /// IPv4 헤더 길이 (바이트). IHL < 5이거나 옵션이 잘렸으면 `None`
    pub fn ipv4_header_len(&self) -> Option<usize> {
        let base = self.ipv4_base()?;
        let version_ihl = self.u8_at(base)?;
        if version_ihl >> 4 != 4 {
            return None;
        }
        let header_len = usize::from(version_ihl & 0x0F) * 4;
        if header_len < IPV4_MIN_HDR_LEN || !self.has(base, header_len) {
            return None;
        }
        Some(header_len)
    }

    /// IP 프로토콜 번호
    pub fn ip_protocol(&self) -> Option<u8> {
        self.ipv4_header_len()?;
        self.u8_at(ETH_HDR_LEN + 9)
    }

    /// 출발지 주소
    pub fn source(&self) -> Option<Ipv4Addr> {
        self.ipv4_header_len()?;
        self.u32_at(ETH_HDR_LEN + 12).map(Ipv4Addr::from)
    }

    /// 목적지 주소
    pub fn destination(&self) -> Option<Ipv4Addr> {
        self.ipv4_header_len()?;
        self.u32_at(ETH_HDR_LEN + 16).map(Ipv4Addr::from)
    }

    // --- Transport ---

    fn transport_offset(&self, protocol: u8, min_len: usize) -> Option<usize> {
        let header_len = self.ipv4_header_len()?;
        if self.u8_at(ETH_HDR_LEN + 9)? != protocol {
            return None;
        }
        let offset = ETH_HDR_LEN + header_len;
        self.has(offset, min_len).then_some(offset)
    }

    /// TCP (출발지 포트, 목적지 포트, 플래그)
    pub fn tcp(&self) -> Option<TcpSegment> {
        let offset = self.transport_offset(PROTO_TCP, TCP_HDR_LEN)?;
        Some(TcpSegment {
            src_port: self.u16_at(offset)?,
            dst_port: self.u16_at(offset + 2)?,
            flags: self.u8_at(offset + 13)?,
        })
    }

    /// UDP (출발지 포트, 목적지 포트)
    pub fn udp(&self) -> Option<(u16, u16)> {
        let offset = self.transport_offset(PROTO_UDP, UDP_HDR_LEN)?;
        Some((self.u16_at(offset)?, self.u16_at(offset + 2)?))
    }

    /// ICMP (타입, 코드)
    pub fn icmp(&self) -> Option<(u8, u8)> {
        let offset = self.transport_offset(PROTO_ICMP, ICMP_HDR_LEN)?;
        Some((self.u8_at(offset)?, self.u8_at(offset + 1)?))
    }
}

/// TCP 세그먼트 헤더 요약
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpSegment {
    /// 출발지 포트
    pub src_port: u16,
    /// 목적지 포트
    pub dst_port: u16,
    /// 플래그 바이트 (오프셋 13)
    pub flags: u8,
}

impl TcpSegment {
    /// SYN이 설정되고 ACK가 없는 연결 개시 세그먼트인지 여부
    pub fn syn_only(&self) -> bool {
        self.flags & TCP_SYN != 0 && self.flags & TCP_ACK == 0
    }
}

/// 전송 계층 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// TCP
    Tcp(TcpSegment),
    /// UDP
    Udp {
        /// 출발지 포트
        src_port: u16,
        /// 목적지 포트
        dst_port: u16,
    },
    /// ICMP
    Icmp {
        /// ICMP 타입
        icmp_type: u8,
        /// ICMP 코드
        code: u8,
    },
    /// 그 밖의 IP 프로토콜
    Other(u8),
}

impl Transport {
    /// IP 프로토콜 번호
    pub fn protocol(&self) -> u8 {
        match self {
            Self::Tcp(_) => PROTO_TCP,
            Self::Udp { .. } => PROTO_UDP,
            Self::Icmp { .. } => PROTO_ICMP,
            Self::Other(proto) => *proto,
        }
    }

    /// 목적지 포트 (TCP/UDP만)
    pub fn dst_port(&self) -> Option<u16> {
        match self {
            Self::Tcp(seg) => Some(seg.dst_port),
            Self::Udp { dst_port, .. } => Some(*dst_port),
            Self::Icmp { .. } | Self::Other(_) => None,
        }
    }
}

/// 분류된 IPv4 패킷
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Packet {
    /// 출발지 주소
    pub source: Ipv4Addr,
    /// 목적지 주소
    pub destination: Ipv4Addr,
    /// 유효 프레임 길이 (바이트)
    pub wire_len: usize,
    /// 전송 계층
    pub transport: Transport,
}

/// 파서 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classified {
    /// 분류 불가 (그대로 통과)
    Unclassified,
    /// IPv4 패킷
    Ipv4(Ipv4Packet),
}

/// 원시 버퍼를 분류합니다.
///
/// 전송 계층 헤더가 잘린 TCP/UDP/ICMP 패킷은 `Unclassified`입니다.
pub fn parse(buf: &[u8], declared_len: usize) -> Classified {
    let view = PacketView::new(buf, declared_len);
    classify(&view).map_or(Classified::Unclassified, Classified::Ipv4)
}

fn classify(view: &PacketView<'_>) -> Option<Ipv4Packet> {
    let protocol = view.ip_protocol()?;
    let transport = match protocol {
        PROTO_TCP => Transport::Tcp(view.tcp()?),
        PROTO_UDP => {
            let (src_port, dst_port) = view.udp()?;
            Transport::Udp { src_port, dst_port }
        }
        PROTO_ICMP => {
            let (icmp_type, code) = view.icmp()?;
            Transport::Icmp { icmp_type, code }
        }
        other => Transport::Other(other),
    };
    Some(Ipv4Packet {
        source: view.source()?,
        destination: view.destination()?,
        wire_len: view.len(),
        transport,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // 테스트 헬퍼: IHL 5 IPv4 + 지정된 전송 계층 헤더
    fn frame(protocol: u8, transport: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; ETH_HDR_LEN];
        buf[12..14].copy_from_slice(&ETH_P_IP.to_be_bytes());
        let total_len = (IPV4_MIN_HDR_LEN + transport.len()) as u16;
        let mut ip = [0u8; IPV4_MIN_HDR_LEN];
        ip[0] = 0x45;
        ip[2..4].copy_from_slice(&total_len.to_be_bytes());
        ip[8] = 64;
        ip[9] = protocol;
        ip[12..16].copy_from_slice(&[1, 2, 3, 4]);
        ip[16..20].copy_from_slice(&[10, 0, 0, 1]);
        buf.extend_from_slice(&ip);
        buf.extend_from_slice(transport);
        buf
    }

    fn tcp_header(dst_port: u16, flags: u8) -> [u8; TCP_HDR_LEN] {
        let mut tcp = [0u8; TCP_HDR_LEN];
        tcp[0..2].copy_from_slice(&40000u16.to_be_bytes());
        tcp[2..4].copy_from_slice(&dst_port.to_be_bytes());
        tcp[12] = 0x50;
        tcp[13] = flags;
        tcp
    }

    #[test]
    fn parses_tcp_syn() {
        let buf = frame(PROTO_TCP, &tcp_header(80, TCP_SYN));
        let Classified::Ipv4(pkt) = parse(&buf, buf.len()) else {
            panic!("expected ipv4");
        };
        assert_eq!(pkt.source, Ipv4Addr::new(1, 2, 3, 4));
        assert_eq!(pkt.destination, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(pkt.wire_len, buf.len());
        let Transport::Tcp(seg) = pkt.transport else {
            panic!("expected tcp");
        };
        assert_eq!(seg.src_port, 40000);
        assert_eq!(seg.dst_port, 80);
        assert!(seg.syn_only());
    }

    #[test]
    fn syn_ack_is_not_syn_only() {
        let seg = TcpSegment {
            src_port: 1,
            dst_port: 2,
            flags: TCP_SYN | TCP_ACK,
        };
        assert!(!seg.syn_only());
    }

    #[test]
    fn parses_udp_and_icmp() {
        let mut udp = [0u8; UDP_HDR_LEN];
        udp[0..2].copy_from_slice(&5353u16.to_be_bytes());
        udp[2..4].copy_from_slice(&53u16.to_be_bytes());
        let buf = frame(PROTO_UDP, &udp);
        assert!(matches!(
            parse(&buf, buf.len()),
            Classified::Ipv4(Ipv4Packet {
                transport: Transport::Udp {
                    src_port: 5353,
                    dst_port: 53
                },
                ..
            })
        ));

        let buf = frame(PROTO_ICMP, &[8, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            parse(&buf, buf.len()),
            Classified::Ipv4(Ipv4Packet {
                transport: Transport::Icmp {
                    icmp_type: 8,
                    code: 0
                },
                ..
            })
        ));
    }

    #[test]
    fn other_protocol_needs_no_transport_header() {
        let buf = frame(47, &[]);
        let Classified::Ipv4(pkt) = parse(&buf, buf.len()) else {
            panic!("expected ipv4");
        };
        assert_eq!(pkt.transport, Transport::Other(47));
        assert_eq!(pkt.transport.dst_port(), None);
    }

    #[test]
    fn every_truncation_of_a_tcp_frame_is_unclassified() {
        let buf = frame(PROTO_TCP, &tcp_header(443, TCP_SYN));
        for len in 0..buf.len() {
            assert_eq!(
                parse(&buf, len),
                Classified::Unclassified,
                "len {} should not classify",
                len
            );
        }
    }

    #[test]
    fn declared_len_longer_than_buffer_is_clamped() {
        let buf = frame(PROTO_TCP, &tcp_header(443, TCP_SYN));
        let Classified::Ipv4(pkt) = parse(&buf, buf.len() + 1000) else {
            panic!("expected ipv4");
        };
        assert_eq!(pkt.wire_len, buf.len());
    }

    #[test]
    fn non_ipv4_ethertypes_pass_through() {
        let mut buf = frame(PROTO_TCP, &tcp_header(80, TCP_SYN));
        // IPv6
        buf[12..14].copy_from_slice(&0x86DDu16.to_be_bytes());
        assert_eq!(parse(&buf, buf.len()), Classified::Unclassified);
        // 802.1Q VLAN
        buf[12..14].copy_from_slice(&0x8100u16.to_be_bytes());
        assert_eq!(parse(&buf, buf.len()), Classified::Unclassified);
    }

    #[test]
    fn bad_version_or_ihl_is_unclassified() {
        let mut buf = frame(PROTO_UDP, &[0u8; UDP_HDR_LEN]);
        buf[ETH_HDR_LEN] = 0x65; // version 6
        assert_eq!(parse(&buf, buf.len()), Classified::Unclassified);
        buf[ETH_HDR_LEN] = 0x44; // IHL 4
        assert_eq!(parse(&buf, buf.len()), Classified::Unclassified);
    }

    #[test]
    fn ip_options_shift_transport_offset() {
        // IHL 6: 4바이트 옵션 뒤에 UDP 헤더
        let mut buf = frame(PROTO_UDP, &[]);
        buf[ETH_HDR_LEN] = 0x46;
        buf.extend_from_slice(&[1, 1, 1, 1]);
        let mut udp = [0u8; UDP_HDR_LEN];
        udp[2..4].copy_from_slice(&27015u16.to_be_bytes());
        buf.extend_from_slice(&udp);

        let view = PacketView::new(&buf, buf.len());
        assert_eq!(view.ipv4_header_len(), Some(24));
        assert_eq!(view.udp(), Some((0, 27015)));
    }

    #[test]
    fn ihl_beyond_buffer_is_unclassified() {
        let mut buf = frame(PROTO_ICMP, &[]);
        buf[ETH_HDR_LEN] = 0x4F; // 60바이트 헤더 주장
        assert_eq!(parse(&buf, buf.len()), Classified::Unclassified);
    }

    #[test]
    fn accessors_fail_closed_on_wrong_protocol() {
        let buf = frame(PROTO_UDP, &[0u8; UDP_HDR_LEN]);
        let view = PacketView::new(&buf, buf.len());
        assert!(view.tcp().is_none());
        assert!(view.icmp().is_none());
        assert!(view.udp().is_some());
        assert_eq!(view.ip_version(), Some(4));
    }

    #[test]
    fn empty_buffer_has_no_fields() {
        let view = PacketView::new(&[], 64);
        assert!(view.is_empty());
        assert!(view.ethertype().is_none());
        assert!(view.source().is_none());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parse_arbitrary_bytes_does_not_panic(
                bytes in prop::collection::vec(any::<u8>(), 0..256),
                declared in 0usize..512,
            ) {
                let _ = parse(&bytes, declared);
            }

            #[test]
            fn classified_wire_len_never_exceeds_buffer(
                bytes in prop::collection::vec(any::<u8>(), 0..256),
                declared in 0usize..512,
            ) {
                if let Classified::Ipv4(pkt) = parse(&bytes, declared) {
                    prop_assert!(pkt.wire_len <= bytes.len());
                    prop_assert!(pkt.wire_len <= declared);
                }
            }
        }
    }
}
