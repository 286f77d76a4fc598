//! Shared types used across the coordinator: transaction/branch identifiers,
//! the XID codec, and the Snowflake-style ID generator.

pub mod idgen;

pub type TransactionId = i64;
pub type BranchId = i64;

/// `<addressing>:<transactionID>` — the global transaction identifier, per §6.
///
/// `addressing` is opaque but `:`-free; `transactionID` is the decimal
/// rendering of the generator's `i64`.
pub fn generate_xid(addressing: &str, transaction_id: TransactionId) -> String {
    format!("{addressing}:{transaction_id}")
}

/// Splits an XID back into its addressing and transaction-id parts.
///
/// Invariant 2 (§3) requires the parsed transaction id to equal the
/// `GlobalSession`'s own field; callers that load a session by XID should
/// assert that rather than trust either source blindly.
pub fn parse_xid(xid: &str) -> crate::error::Result<(&str, TransactionId)> {
    let idx = xid.rfind(':').ok_or_else(|| {
        crate::error::CoordinatorError::InvalidXid(format!("missing ':' in xid {xid}"))
    })?;
    let (addressing, rest) = xid.split_at(idx);
    let transaction_id: TransactionId = rest[1..]
        .parse()
        .map_err(|_| crate::error::CoordinatorError::InvalidXid(xid.to_string()))?;
    Ok((addressing, transaction_id))
}

/// `<resourceID>^^^<tableName>^^^<pk>` — the lock table's primary key, per §6.
pub fn row_key(resource_id: &str, table_name: &str, pk: &str) -> String {
    format!("{resource_id}^^^{table_name}^^^{pk}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xid_roundtrip() {
        let xid = generate_xid("orderSvc", 17);
        assert_eq!(xid, "orderSvc:17");
        let (addressing, tid) = parse_xid(&xid).unwrap();
        assert_eq!(addressing, "orderSvc");
        assert_eq!(tid, 17);
    }

    #[test]
    fn xid_missing_separator_is_invalid() {
        assert!(parse_xid("not-an-xid").is_err());
    }

    #[test]
    fn row_key_format() {
        assert_eq!(row_key("orderDB", "so", "1"), "orderDB^^^so^^^1");
    }
}
