use crate::error::CoordinatorError;

/// Block header length per the Zcash v4 header assembly:
/// nVersion(4) || hashPrevBlock(32) || hashMerkleRoot(32) || hashReserved(32)
/// || nTime(4) || nBits(4).
pub const HEADER_PREFIX_LEN: usize = 4 + 32 + 32 + 32 + 4 + 4;

/// Maximum pool-fixed nonce prefix length: the solver needs 3 search bytes
/// and 12 trailing zero bytes out of the 32-byte nonce.
pub const MAX_NONCE_LEFT_LEN: usize = 17;

const ZCASH_V4_VERSION: &str = "04000000";
const ZERO_HASH_RESERVED: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// The in-flight mining job. Created once all four prerequisites are
/// present; replaced wholesale on a `clean_jobs=true` notify, never
/// mutated field-by-field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub job_id: String,
    pub header_prefix: Vec<u8>,
    pub nonce_left: Vec<u8>,
    pub target: [u8; 32],
}

/// Raw fields parsed from a `mining.notify` notification, before being
/// merged with the session's nonce_left and target into a `WorkUnit`.
#[derive(Debug, Clone)]
pub struct NotifyParams {
    pub job_id: String,
    pub n_version: String,
    pub hash_prev_block: String,
    pub hash_merkle_root: String,
    pub hash_reserved: String,
    pub n_time: String,
    pub n_bits: String,
    pub clean_jobs: bool,
}

impl NotifyParams {
    /// Validates the fixed-format fields (§6) and assembles the 108-byte
    /// header prefix by concatenating the fields in wire order, with no
    /// byte reversal.
    pub fn assemble_header_prefix(&self) -> Result<Vec<u8>, CoordinatorError> {
        if self.n_version != ZCASH_V4_VERSION {
            return Err(CoordinatorError::Protocol(format!(
                "unexpected nVersion {}, expected {ZCASH_V4_VERSION}",
                self.n_version
            )));
        }
        if self.hash_reserved != ZERO_HASH_RESERVED {
            return Err(CoordinatorError::Protocol(
                "hashReserved must be 64 zero hex digits".into(),
            ));
        }
        check_hex_len(&self.hash_prev_block, 64, "hashPrevBlock")?;
        check_hex_len(&self.hash_merkle_root, 64, "hashMerkleRoot")?;
        check_hex_len(&self.n_time, 8, "nTime")?;
        check_hex_len(&self.n_bits, 8, "nBits")?;

        let mut prefix = Vec::with_capacity(HEADER_PREFIX_LEN);
        prefix.extend(hex::decode(&self.n_version)?);
        prefix.extend(hex::decode(&self.hash_prev_block)?);
        prefix.extend(hex::decode(&self.hash_merkle_root)?);
        prefix.extend(hex::decode(&self.hash_reserved)?);
        prefix.extend(hex::decode(&self.n_time)?);
        prefix.extend(hex::decode(&self.n_bits)?);

        debug_assert_eq!(prefix.len(), HEADER_PREFIX_LEN);
        Ok(prefix)
    }
}

fn check_hex_len(s: &str, expected: usize, field: &str) -> Result<(), CoordinatorError> {
    if s.len() != expected {
        return Err(CoordinatorError::Protocol(format!(
            "{field} must be {expected} hex digits, got {}",
            s.len()
        )));
    }
    if hex::decode(s).is_err() {
        return Err(CoordinatorError::Protocol(format!("{field} is not valid hex")));
    }
    Ok(())
}

/// Validates a pool-supplied nonce_left and converts it to bytes.
pub fn parse_nonce_left(hex_str: &str) -> Result<Vec<u8>, CoordinatorError> {
    let bytes = hex::decode(hex_str)?;
    if bytes.len() > MAX_NONCE_LEFT_LEN {
        return Err(CoordinatorError::FatalNonceTooLong(bytes.len()));
    }
    Ok(bytes)
}

/// The wire target is 32 bytes big-endian; internally it is stored reversed
/// (little-endian, as the solver expects it).
pub fn parse_wire_target(hex_str: &str) -> Result<[u8; 32], CoordinatorError> {
    let bytes = hex::decode(hex_str)?;
    if bytes.len() != 32 {
        return Err(CoordinatorError::Protocol(format!(
            "target must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    let mut target = [0u8; 32];
    for (i, b) in bytes.iter().rev().enumerate() {
        target[i] = *b;
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_notify() -> NotifyParams {
        NotifyParams {
            job_id: "job1".into(),
            n_version: "04000000".into(),
            hash_prev_block: "a".repeat(64),
            hash_merkle_root: "b".repeat(64),
            hash_reserved: "0".repeat(64),
            n_time: "5a000000".into(),
            n_bits: "1d00ffff".into(),
            clean_jobs: true,
        }
    }

    #[test]
    fn header_prefix_is_108_bytes() {
        let prefix = valid_notify().assemble_header_prefix().unwrap();
        assert_eq!(prefix.len(), HEADER_PREFIX_LEN);
        assert_eq!(prefix.len(), 108);
    }

    #[test]
    fn rejects_wrong_version() {
        let mut n = valid_notify();
        n.n_version = "01000000".into();
        assert!(n.assemble_header_prefix().is_err());
    }

    #[test]
    fn rejects_nonzero_hash_reserved() {
        let mut n = valid_notify();
        n.hash_reserved = "1".repeat(64);
        assert!(n.assemble_header_prefix().is_err());
    }

    #[test]
    fn nonce_left_17_bytes_is_accepted() {
        let hex_str = "ff".repeat(17);
        assert!(parse_nonce_left(&hex_str).is_ok());
    }

    #[test]
    fn nonce_left_18_bytes_is_fatal() {
        let hex_str = "ff".repeat(18);
        match parse_nonce_left(&hex_str) {
            Err(CoordinatorError::FatalNonceTooLong(18)) => {}
            other => panic!("expected FatalNonceTooLong(18), got {other:?}"),
        }
    }

    #[test]
    fn target_round_trips_reversed() {
        let mut wire = [0u8; 32];
        wire[0] = 0xde;
        wire[31] = 0xad;
        let wire_hex = hex::encode(wire);

        let internal = parse_wire_target(&wire_hex).unwrap();
        assert_eq!(internal[0], 0xad);
        assert_eq!(internal[31], 0xde);

        let mut reversed_back = internal;
        reversed_back.reverse();
        assert_eq!(reversed_back, wire);
    }
}
