//! Identifier minting

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

// Mint an id with a compile-time prefix. Encoding a 16-byte payload cannot
// overflow the bech32 length limit, so the raw uuid fallback never fires in
// practice.
pub(crate) fn mint_id(prefix: &'static str) -> String {
    let hrp = bech32::Hrp::parse_unchecked(prefix);
    bech32::encode::<Bech32m>(hrp, uuid7().as_bytes()).unwrap_or_else(|_| uuid7().to_string())
}
