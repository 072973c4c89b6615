use crate::ChainRpcError;

/// Parses an Ethereum JSON-RPC hex quantity, e.g. `"0x1b4"`.
pub fn parse_hex_quantity(value: &str) -> Result<u64, ChainRpcError> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| ChainRpcError::InvalidQuantity(value.to_string()))?;
    if digits.is_empty() {
        return Err(ChainRpcError::InvalidQuantity(value.to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|_| ChainRpcError::InvalidQuantity(value.to_string()))
}
