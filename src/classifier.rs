//! Private vs. public transaction classification.
use crate::chain::ChainTransaction;

/// Recovery markers reserved for privacy-protected signatures (both parities).
pub const PRIVATE_MARKERS: [u64; 2] = [37, 38];

/// Whether a transaction carries a private payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privacy {
    /// Payload is held off-chain by the privacy manager.
    Private,
    /// Ordinary public transaction.
    Public,
}

/// Classify by recovery marker. A missing marker is public.
pub fn classify(marker: Option<u64>) -> Privacy {
    match marker {
        Some(v) if PRIVATE_MARKERS.contains(&v) => Privacy::Private,
        _ => Privacy::Public,
    }
}

/// Classify a transaction as received from the node.
pub fn classify_transaction(tx: &ChainTransaction) -> Privacy {
    classify(tx.recovery_marker())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_markers_are_private() {
        assert_eq!(classify(Some(37)), Privacy::Private);
        assert_eq!(classify(Some(38)), Privacy::Private);
    }

    #[test]
    fn everything_else_is_public() {
        for v in [0, 1, 27, 28, 36, 39, 2_710] {
            assert_eq!(classify(Some(v)), Privacy::Public, "v={v}");
        }
        assert_eq!(classify(None), Privacy::Public);
    }
}
