//! Revert reason extraction for rejected calls.
//!
//! Nodes report a reverting call during gas estimation as a JSON-RPC error
//! response. The revert payload, when present, is ABI-encoded
//! `Error(string)` data; some nodes only put the reason in the message.

use alloy::primitives::Bytes;
use alloy::sol_types::decode_revert_reason;
use alloy::transports::{RpcError, TransportErrorKind};
use tracing::debug;

use crate::AccountError;

/// Maps an RPC failure onto [`AccountError`], lifting execution reverts
/// into [`AccountError::Rejected`] with the best available reason.
pub fn classify_rpc_error(err: RpcError<TransportErrorKind>) -> AccountError {
    let rejected = err.as_error_resp().and_then(|payload| {
        let data = payload.as_revert_data();

        if data.is_none() && !payload.message.contains("revert") {
            return None;
        }

        let reason = data
            .as_deref()
            .and_then(|data| decode_revert_reason(data))
            .unwrap_or_else(|| payload.message.to_string());

        Some((reason, data))
    });

    match rejected {
        Some((reason, data)) => {
            debug!(%reason, "Call rejected by node");
            AccountError::Rejected { reason, data }
        }
        None => AccountError::Transport(err),
    }
}
