#![no_std]

//! Wire constants for the RakNet offline ping exchange answered by
//! Minecraft Bedrock servers.

/// Packet id of an unconnected ping.
pub const UNCONNECTED_PING: u8 = 0x01;

/// Packet id of an unconnected pong.
pub const UNCONNECTED_PONG: u8 = 0x1C;

/// Offline message id RakNet places in every unconnected packet.
pub const OFFLINE_MAGIC: [u8; 16] = [
    0x00, 0xff, 0xff, 0x00, 0xfe, 0xfe, 0xfe, 0xfe, 0xfd, 0xfd, 0xfd, 0xfd, 0x12, 0x34, 0x56, 0x78,
];

/// id (1) + time (8) + magic (16) + client guid (8)
pub const UNCONNECTED_PING_LEN: usize = 33;

/// Largest datagram we bother reading back. Pongs carry a short
/// server-id string and fit comfortably.
pub const MAX_PONG_LEN: usize = 1024;

/// Builds an unconnected ping. `elapsed_ms` is echoed back by the server
/// and `client_guid` identifies the sender; both are big-endian on the wire.
pub fn unconnected_ping(elapsed_ms: u64, client_guid: u64) -> [u8; UNCONNECTED_PING_LEN] {
    let mut frame = [0u8; UNCONNECTED_PING_LEN];
    frame[0] = UNCONNECTED_PING;
    frame[1..9].copy_from_slice(&elapsed_ms.to_be_bytes());
    frame[9..25].copy_from_slice(&OFFLINE_MAGIC);
    frame[25..33].copy_from_slice(&client_guid.to_be_bytes());
    frame
}

/// True if the datagram is an unconnected pong. Only the packet id is
/// inspected; the payload is the server's business.
pub fn is_unconnected_pong(datagram: &[u8]) -> bool {
    datagram.first() == Some(&UNCONNECTED_PONG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_layout() {
        let frame = unconnected_ping(0x0102_0304_0506_0708, 0xAABB_CCDD_EEFF_0011);

        assert_eq!(frame[0], UNCONNECTED_PING);
        assert_eq!(&frame[1..9], &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        assert_eq!(&frame[9..25], &OFFLINE_MAGIC);
        assert_eq!(&frame[25..33], &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x00, 0x11]);
    }

    #[test]
    fn test_pong_detection() {
        assert!(is_unconnected_pong(&[UNCONNECTED_PONG, 0, 0]));
        assert!(is_unconnected_pong(&[UNCONNECTED_PONG]));
        assert!(!is_unconnected_pong(&[UNCONNECTED_PING]));
        assert!(!is_unconnected_pong(&[]));
    }
}
