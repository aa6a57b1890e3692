//! EL/CL consistency gate

use crate::config::TooEarlyBoundary;
use crate::models::ClMeta;
use crate::models::ElMeta;

/// Whether EL data is causally behind what the CL snapshot already implies.
///
/// - No CL meta: nothing to compare against, not too early
/// - CL meta but no EL meta: nothing synced yet, too early
/// - Otherwise compare the CL snapshot's execution block with the EL meta
///   block according to `boundary`
///
/// Evaluate per request; both metas move independently.
#[must_use]
pub fn is_too_early(
    el_meta: Option<&ElMeta>,
    cl_meta: Option<&ClMeta>,
    boundary: TooEarlyBoundary,
) -> bool {
    let Some(cl) = cl_meta else {
        return false;
    };
    let Some(el) = el_meta else {
        return true;
    };

    match boundary {
        TooEarlyBoundary::Strict => cl.block_number > el.block_number,
        TooEarlyBoundary::Inclusive => cl.block_number >= el.block_number,
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::B256;

    use super::*;

    fn el(block_number: u64) -> ElMeta {
        ElMeta {
            block_number,
            block_hash: B256::ZERO,
            timestamp: 0,
        }
    }

    fn cl(block_number: u64) -> ClMeta {
        ClMeta {
            epoch: 10,
            slot: 320,
            slot_state_root: B256::ZERO,
            block_number,
            block_hash: B256::ZERO,
            timestamp: 0,
        }
    }

    #[test]
    fn test_strict_boundary() {
        let b = TooEarlyBoundary::Strict;
        assert!(is_too_early(Some(&el(99)), Some(&cl(100)), b));
        assert!(!is_too_early(Some(&el(100)), Some(&cl(100)), b));
        assert!(!is_too_early(Some(&el(101)), Some(&cl(100)), b));
    }

    #[test]
    fn test_inclusive_boundary() {
        let b = TooEarlyBoundary::Inclusive;
        assert!(is_too_early(Some(&el(99)), Some(&cl(100)), b));
        assert!(is_too_early(Some(&el(100)), Some(&cl(100)), b));
        assert!(!is_too_early(Some(&el(101)), Some(&cl(100)), b));
    }

    #[test]
    fn test_missing_metas() {
        for b in [TooEarlyBoundary::Strict, TooEarlyBoundary::Inclusive] {
            assert!(!is_too_early(None, None, b));
            assert!(!is_too_early(Some(&el(5)), None, b));
            assert!(is_too_early(None, Some(&cl(5)), b));
        }
    }

    #[test]
    fn test_el_catching_up_clears_verdict() {
        let snapshot = cl(100);
        let b = TooEarlyBoundary::default();
        assert!(is_too_early(Some(&el(99)), Some(&snapshot), b));
        assert!(!is_too_early(Some(&el(100)), Some(&snapshot), b));
    }
}
